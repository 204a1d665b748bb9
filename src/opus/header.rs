//! Reading the fixed file header and the directory of blocks it points to.
use std::ops::Range;

use log::{debug, warn};
use serde::Serialize;

use crate::{error::{OpusError, OpusPointerError, OpusResult}, utils::ByteReader};
use super::{block_type::TypeCode, constants::bruker};

/// Check whether a buffer starts with the Opus magic bytes.
///
/// Empty buffers or ones shorter than the magic are simply not Opus files.
pub fn is_opus(buf: &[u8]) -> bool {
    buf.starts_with(&bruker::MAGIC)
}

/// The values stored in the first 24 bytes of an Opus file
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OpusHeader {
    pub version: f64,
    pub directory_start: i32,
    pub max_blocks: i32,
    pub num_blocks: i32,
}

impl OpusHeader {
    /// Read the header fields. This does not check the magic bytes, use [`is_opus`] first.
    pub fn read(buf: &[u8]) -> OpusResult<Self> {
        let rdr = ByteReader::new(buf);
        if rdr.len() < bruker::HEADER_LEN {
            return Err(OpusError::too_short("file header", bruker::HEADER_LEN, rdr.len()));
        }

        Ok(Self {
            version: rdr.read_f64(bruker::HEADER_VERSION_OFFSET, "program version")?,
            directory_start: rdr.read_i32(bruker::HEADER_DIR_OFFSET, "directory pointer")?,
            max_blocks: rdr.read_i32(bruker::HEADER_MAX_BLOCKS_OFFSET, "directory max size")?,
            num_blocks: rdr.read_i32(bruker::HEADER_NUM_BLOCKS_OFFSET, "directory current size")?,
        })
    }

    fn directory_pointer(&self, buf_len: usize) -> OpusResult<usize> {
        let inner = if self.directory_start < 0 {
            OpusPointerError::Negative
        } else if (self.directory_start as usize) < bruker::HEADER_LEN {
            OpusPointerError::OverlapsHeader
        } else if self.directory_start as usize >= buf_len {
            OpusPointerError::OutOfBounds
        } else {
            return Ok(self.directory_start as usize);
        };

        Err(OpusError::InvalidPointer { pointer_descr: "directory", inner })
    }
}

/// One entry of the directory: where a block is and what type it has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockDescriptor {
    pub block_type: TypeCode,
    /// Size of the block in bytes (stored on disk as a number of 4-byte words)
    pub size: usize,
    /// Byte offset of the block from the start of the file
    pub start: usize,
}

impl BlockDescriptor {
    pub fn new(block_type: TypeCode, size: usize, start: usize) -> Self {
        Self { block_type, size, start }
    }

    /// The byte range of this block. Note that this may run past the end of a truncated file.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start.saturating_add(self.size)
    }

    pub fn label(&self) -> String {
        self.block_type.label()
    }
}

/// The header plus the list of blocks found in the directory
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Directory {
    pub header: OpusHeader,
    pub entries: Vec<BlockDescriptor>,
    /// `true` if reading stopped early because the header or directory was malformed or cut off
    pub truncated: bool,
}

impl Directory {
    /// Read the header and walk the directory.
    ///
    /// This never fails: a header or directory that cannot be read (completely or in part)
    /// gives whatever entries were read before the problem and sets `truncated`.
    /// Scanning stops at the first entry with a start offset <= 0, or after the header's
    /// maximum number of entries.
    pub fn read(buf: &[u8]) -> Self {
        let header = match OpusHeader::read(buf) {
            Ok(h) => h,
            Err(e) => {
                warn!("Could not read Opus header: {e}");
                return Self { header: OpusHeader::default(), entries: vec![], truncated: true };
            }
        };

        let dir_start = match header.directory_pointer(buf.len()) {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}");
                return Self { header, entries: vec![], truncated: true };
            }
        };

        let rdr = ByteReader::new(buf);
        let max_blocks = header.max_blocks.max(0) as usize;
        let mut entries = Vec::with_capacity(max_blocks.min(rdr.len() / bruker::DIR_ENTRY_LEN));
        let mut truncated = false;

        for i in 0..max_blocks {
            let offset = dir_start + i * bruker::DIR_ENTRY_LEN;
            match Self::read_entry(&rdr, offset) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => break,
                Err(e) => {
                    warn!("Directory entry {i} could not be read, stopping directory scan: {e}");
                    truncated = true;
                    break;
                }
            }
        }

        if !truncated && header.num_blocks >= 0 && entries.len() != header.num_blocks as usize {
            debug!("Header lists {} blocks, found {} directory entries", header.num_blocks, entries.len());
        }

        Self { header, entries, truncated }
    }

    /// Read one 12-byte directory entry. `Ok(None)` means the entry is an unused slot.
    fn read_entry(rdr: &ByteReader, offset: usize) -> OpusResult<Option<BlockDescriptor>> {
        let type_int = rdr.read_i32(offset, "directory entry type")?;
        let size_words = rdr.read_i32(offset + 4, "directory entry size")?;
        let start = rdr.read_i32(offset + 8, "directory entry pointer")?;

        if start <= 0 {
            return Ok(None);
        }

        if size_words < 0 {
            return Err(OpusError::InvalidPointer { pointer_descr: "block size", inner: OpusPointerError::Negative });
        }

        Ok(Some(BlockDescriptor::new(TypeCode::from(type_int), size_words as usize * 4, start as usize)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_utils::OpusFileBuilder;

    #[rstest]
    #[case(&[])]
    #[case(&[0x0A, 0x0A, 0xFE])]
    #[case(&[0x0A, 0x0A, 0xFE, 0xFD, 0, 0, 0, 0])]
    #[case(b"not an opus file")]
    fn test_not_opus(#[case] buf: &[u8]) {
        assert!(!is_opus(buf));
    }

    #[test]
    fn test_read_directory() {
        let sample = TypeCode::new(0, 1, 0, 1, 0, 0);
        let buf = OpusFileBuilder::new()
            .block(sample, vec![0; 16])
            .build();
        assert!(is_opus(&buf));

        let dir = Directory::read(&buf);
        assert!(!dir.truncated);
        assert_eq!(dir.header.num_blocks, 2);
        assert_eq!(dir.entries.len(), 2);
        assert_eq!(dir.entries[0].block_type, TypeCode::DIRECTORY);
        assert_eq!(dir.entries[1].block_type, sample);
        assert_eq!(dir.entries[1].size, 16);
        assert_eq!(dir.entries[1].range().len(), 16);
    }

    #[test]
    fn test_stop_at_empty_slot() {
        // The builder leaves spare directory slots zeroed, these must not become entries
        let buf = OpusFileBuilder::new()
            .spare_slots(3)
            .block(TypeCode::new(0, 1, 0, 1, 0, 0), vec![0; 8])
            .build();
        let dir = Directory::read(&buf);
        assert_eq!(dir.header.max_blocks, 5);
        assert_eq!(dir.entries.len(), 2);
        assert!(!dir.truncated);
    }

    #[test]
    fn test_truncated_directory() {
        let buf = OpusFileBuilder::new()
            .block(TypeCode::new(0, 1, 0, 1, 0, 0), vec![0; 8])
            .block(TypeCode::new(0, 1, 1, 1, 0, 0), vec![0; 8])
            .build();

        // Cut the file in the middle of the third directory entry
        let dir_start = i32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;
        let cut = &buf[..dir_start + 2 * bruker::DIR_ENTRY_LEN + 6];
        let dir = Directory::read(cut);
        assert!(dir.truncated);
        assert_eq!(dir.entries.len(), 2);
    }

    #[test]
    fn test_short_header() {
        let dir = Directory::read(&bruker::MAGIC);
        assert!(dir.truncated);
        assert!(dir.entries.is_empty());
    }
}
