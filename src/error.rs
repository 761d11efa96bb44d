//! Unified error taxonomy for the .ovf engines.
//!
//! Every failure is terminal for the call that raised it — the causes are
//! data or usage errors, never transient I/O, so there is no retry layer.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OvfError {
    /// The path could not be opened at all.
    #[error("file not found: {0}")]
    NotFound(String),

    /// File is shorter than the 12-byte header (magic + root pointer).
    #[error("file is empty or truncated: {0} bytes, header needs 12")]
    EmptyOrTruncated(u64),

    /// Bad magic number or an out-of-range/placeholder root pointer.
    #[error("not a valid .ovf file: {0}")]
    InvalidFormat(String),

    /// Structurally broken index data: count mismatches, offsets past EOF,
    /// undecodable records.
    #[error("corrupted file: {0}")]
    Corrupted(String),

    #[error("{entity} index {index} out of range, count is {count}")]
    IndexOutOfRange {
        entity: &'static str,
        index:  usize,
        count:  usize,
    },

    /// A second open/start_write was attempted while one is active.
    #[error("another file operation is already in progress")]
    OperationInProgress,

    /// Accessor called on a reader that has no successfully opened file.
    #[error("no file is open")]
    NotOpen,

    /// Writer API call outside an active write session.
    #[error("no write session active, call start_write first")]
    NotWriting,

    /// `append_vector_block` before the first `append_work_plane`.
    #[error("no workplane appended yet, a workplane must precede vector blocks")]
    NoCurrentWorkPlane,

    /// A job's declared workplane count disagrees with its actual sequence.
    #[error("job declares {declared} workplanes but holds {actual}")]
    InconsistentCount { declared: usize, actual: usize },

    /// Shell projection met a field kind it cannot copy.
    #[error("unsupported field type in projection of field '{0}'")]
    UnsupportedFieldType(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, OvfError>;
