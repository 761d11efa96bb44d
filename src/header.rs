//! File header: magic number and root pointer.
//!
//! Layout (bit-exact, always little-endian):
//!
//! ```text
//! offset 0..4   magic number  4C 56 46 21  ("LVF!")
//! offset 4..12  root pointer  i64 LE — byte offset of the JobLUT
//! ```
//!
//! The root pointer is written as [`PLACEHOLDER_ROOT`] when the file is
//! created and overwritten exactly once at finalize time.  A file still
//! carrying the placeholder was never finalized and is invalid.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{OvfError, Result};

pub const MAGIC: &[u8; 4] = &[0x4c, 0x56, 0x46, 0x21];
pub const HEADER_SIZE: u64 = 12;
/// Reserved root-pointer value written at creation, patched on finalize.
pub const PLACEHOLDER_ROOT: i64 = 0;
/// Byte offset of the root pointer within the file.
pub const ROOT_POINTER_OFFSET: u64 = 4;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub root_pointer: i64,
}

impl FileHeader {
    /// Read and validate the 12-byte header.  `file_len` is the total file
    /// length, needed for the root-pointer range check.
    pub fn read<R: Read>(mut reader: R, file_len: u64) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(OvfError::InvalidFormat(format!(
                "bad magic number {magic:02x?}"
            )));
        }
        let root_pointer = reader.read_i64::<LittleEndian>()?;
        if root_pointer == PLACEHOLDER_ROOT {
            return Err(OvfError::InvalidFormat(
                "root pointer is still the creation placeholder (file was never finalized)".into(),
            ));
        }
        if root_pointer < 0 || root_pointer as u64 >= file_len {
            return Err(OvfError::InvalidFormat(format!(
                "root pointer {root_pointer} out of range for {file_len}-byte file"
            )));
        }
        Ok(Self { root_pointer })
    }

    /// Write the magic number followed by the placeholder root pointer.
    /// Returns the byte offset of the pointer so the writer can patch it.
    pub fn write_placeholder<W: Write + Seek>(mut writer: W) -> Result<u64> {
        writer.write_all(MAGIC)?;
        let pointer_offset = writer.stream_position()?;
        writer.write_i64::<LittleEndian>(PLACEHOLDER_ROOT)?;
        Ok(pointer_offset)
    }

    /// Overwrite the placeholder with the true JobLUT offset.  Leaves the
    /// stream position at the patch site.
    pub fn patch_root_pointer<W: Write + Seek>(
        mut writer: W,
        pointer_offset: u64,
        root: i64,
    ) -> Result<()> {
        writer.seek(SeekFrom::Start(pointer_offset))?;
        writer.write_i64::<LittleEndian>(root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn placeholder_header_is_rejected() {
        let mut buf = Cursor::new(Vec::new());
        FileHeader::write_placeholder(&mut buf).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        let err = FileHeader::read(&bytes[..], 100).unwrap_err();
        assert!(matches!(err, OvfError::InvalidFormat(_)));
    }

    #[test]
    fn patched_header_roundtrips() {
        let mut buf = Cursor::new(Vec::new());
        let at = FileHeader::write_placeholder(&mut buf).unwrap();
        assert_eq!(at, ROOT_POINTER_OFFSET);
        FileHeader::patch_root_pointer(&mut buf, at, 42).unwrap();
        let header = FileHeader::read(&buf.into_inner()[..], 100).unwrap();
        assert_eq!(header.root_pointer, 42);
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"NOPE");
        bytes.extend_from_slice(&42i64.to_le_bytes());
        let err = FileHeader::read(&bytes[..], 100).unwrap_err();
        assert!(matches!(err, OvfError::InvalidFormat(_)));
    }

    #[test]
    fn out_of_range_root_is_invalid_format() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&500i64.to_le_bytes());
        let err = FileHeader::read(&bytes[..], 100).unwrap_err();
        assert!(matches!(err, OvfError::InvalidFormat(_)));
    }
}
