//! Length-delimited record framing and raw pointer cells.
//!
//! Two kinds of integers live in a .ovf file:
//!
//! - **Framed records** — an unsigned LEB128 varint byte-count prefix
//!   followed by exactly that many bytes of serialized record content.
//!   The prefix makes every record self-terminating, so random-access reads
//!   never need an end offset.
//! - **Raw pointer cells** — the root pointer and the per-workplane pointer
//!   cells are bare i64 little-endian, written as placeholders first and
//!   backpatched once their target offset is known.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{OvfError, Result};

/// Longest legal LEB128 encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

/// A record that can cross the wire as a length-delimited payload.
pub trait Record: Sized {
    /// Append the serialized payload (without the length prefix) to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);
    /// Decode a payload produced by [`Record::encode`].  Must consume the
    /// whole slice; trailing bytes mean the framing is wrong.
    fn decode(payload: &[u8]) -> Result<Self>;
}

// ── Varints ──────────────────────────────────────────────────────────────────

pub fn write_varint<W: Write>(mut writer: W, mut value: u64) -> io::Result<usize> {
    let mut written = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        written += 1;
        if value == 0 {
            writer.write_u8(byte)?;
            return Ok(written);
        }
        writer.write_u8(byte | 0x80)?;
    }
}

pub fn read_varint<R: Read>(mut reader: R) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().map_err(map_eof)?;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(OvfError::Corrupted("varint overflows u64".into()));
            }
            return Ok(value);
        }
    }
    Err(OvfError::Corrupted("varint longer than 10 bytes".into()))
}

// ── Delimited records ────────────────────────────────────────────────────────

/// Write `record` as varint-length-prefixed bytes.  Returns total bytes
/// written (prefix included).
pub fn write_delimited<M: Record, W: Write>(record: &M, mut writer: W) -> Result<u64> {
    let mut payload = Vec::new();
    record.encode(&mut payload);
    let prefix = write_varint(&mut writer, payload.len() as u64)?;
    writer.write_all(&payload)?;
    Ok((prefix + payload.len()) as u64)
}

/// Read one length-delimited record from the current stream position.
pub fn read_delimited<M: Record, R: Read>(mut reader: R) -> Result<M> {
    let len = read_varint(&mut reader)?;
    // The prefix is untrusted input: the buffer grows with the bytes the
    // stream actually delivers, never with the declared length.
    let mut payload = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        return Err(OvfError::Corrupted("record extends past end of file".into()));
    }
    M::decode(&payload)
}

// ── Pointer cells ────────────────────────────────────────────────────────────

pub fn write_pointer_cell<W: Write>(mut writer: W, offset: i64) -> io::Result<()> {
    writer.write_i64::<LittleEndian>(offset)
}

pub fn read_pointer_cell<R: Read>(mut reader: R) -> Result<i64> {
    reader.read_i64::<LittleEndian>().map_err(map_eof)
}

/// A record that stops short of its declared length is a framing defect in
/// the file, not a transient I/O condition.
fn map_eof(e: io::Error) -> OvfError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        OvfError::Corrupted("record extends past end of file".into())
    } else {
        OvfError::Io(e)
    }
}
