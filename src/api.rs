//! Engine capability traits and the state enums they expose.
//!
//! The traits are the seam for additional container format variants: a new
//! format becomes an alternate implementation, never a subclass sharing
//! engine state.  Exactly one non-idle operation may be active per instance;
//! the operation enums are plain single-writer reentrancy guards, not locks.

use std::path::Path;

use crate::error::Result;
use crate::schema::{Job, VectorBlock, WorkPlane};

/// How much of the job a reader currently holds in memory.
///
/// Monotonic `NotCached → JobShellCached → CompleteJobCached`, except that
/// [`JobFileReader::unload`] explicitly drops back to `NotCached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    NotCached,
    JobShellCached,
    CompleteJobCached,
}

/// Reader-side operation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOperation {
    None,
    /// `open` is running: header and index chain are being validated.
    Validating,
    /// Whole file eagerly cached at open time.
    CompleteRead,
    /// Shell and LUTs cached; records fetched on demand.
    Streaming,
}

/// Writer-side operation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteOperation {
    #[default]
    None,
    PartialWrite,
}

/// Random access over an indexed job file.
///
/// Accessors return owned copies; nothing handed out outlives the engine's
/// file session.
pub trait JobFileReader {
    /// Open and validate a file.  On success the cache state is
    /// `JobShellCached` or `CompleteJobCached`; on failure the instance is
    /// back in its unopened state.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// The cached job shell — metadata only, never any workplanes.
    fn get_job_shell(&self) -> Result<Job>;

    /// Materialize the whole job in memory.  Idempotent.
    fn cache_to_memory(&mut self) -> Result<&Job>;

    /// Drop the materialized job; shells and LUTs remain.
    fn unload(&mut self);

    /// One fully materialized workplane: shell plus every vector block.
    fn get_work_plane(&mut self, i_work_plane: usize) -> Result<WorkPlane>;

    /// Workplane shell only.  O(shell size) no matter how many blocks the
    /// plane has.
    fn get_work_plane_shell(&mut self, i_work_plane: usize) -> Result<WorkPlane>;

    /// One vector block, addressed by workplane and block index.
    fn get_vector_block(&mut self, i_work_plane: usize, i_vector_block: usize)
        -> Result<VectorBlock>;

    /// Release the file handle.  Safe to call repeatedly.
    fn close(&mut self);

    fn cache_state(&self) -> CacheState;
    fn operation(&self) -> ReadOperation;
}

/// Streaming, workplane-at-a-time writer for an indexed job file.
pub trait JobFileWriter {
    /// Begin a write session: truncate `path`, write the header with a
    /// placeholder root pointer, adopt a defensive copy of `job_shell`.
    fn start_write(&mut self, job_shell: &Job, path: &Path) -> Result<()>;

    /// Flush the buffered workplane (if any) and adopt `work_plane` — with
    /// any vector blocks it already carries — as the new buffer.
    fn append_work_plane(&mut self, work_plane: WorkPlane) -> Result<()>;

    /// Buffer a block on the current workplane.  Nothing is written until
    /// the plane is finalized.
    fn append_vector_block(&mut self, block: VectorBlock) -> Result<()>;

    /// Flush the last plane, write job shell and JobLUT, patch the root
    /// pointer.  The file is unreadable until this completes.
    fn finish(&mut self) -> Result<()>;

    /// Convenience: `start_write` + `append_work_plane` for every plane in
    /// `job` + `finish`.
    fn write_complete_job(&mut self, job: &Job, path: &Path) -> Result<()>;

    fn operation(&self) -> WriteOperation;
}
