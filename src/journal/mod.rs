//! Journal framing for manifest records.
//!
//! The manifest is a sequence of opaque records framed into 32KB blocks.
//! Each physical chunk has a 7-byte header:
//! - Masked CRC32 of type + payload (4 bytes)
//! - Payload length (2 bytes)
//! - Chunk type (1 byte): FULL, FIRST, MIDDLE, LAST
//!
//! Records that don't fit in the remainder of a block are fragmented across
//! blocks using FIRST, MIDDLE and LAST chunks. A block tail too small for a
//! header is zero-padded.

mod reader;
mod writer;

pub use reader::JournalReader;
pub use writer::JournalWriter;

/// Block size (32KB).
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Header size: CRC (4) + Length (2) + Type (1) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Chunk types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// Zero is reserved for padding.
    Zero = 0,
    /// Complete record in a single chunk.
    Full = 1,
    /// First chunk of a record.
    First = 2,
    /// Middle chunk(s) of a record.
    Middle = 3,
    /// Last chunk of a record.
    Last = 4,
}

impl ChunkType {
    /// Create from byte value.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ChunkType::Zero),
            1 => Some(ChunkType::Full),
            2 => Some(ChunkType::First),
            3 => Some(ChunkType::Middle),
            4 => Some(ChunkType::Last),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileDesc, MemStorage, Storage};

    fn write_records(storage: &MemStorage, fd: FileDesc, records: &[Vec<u8>]) {
        let mut writer = JournalWriter::new(storage.create(fd).unwrap());
        for record in records {
            writer.add_record(record).unwrap();
        }
        writer.sync().unwrap();
    }

    fn read_all(storage: &MemStorage, fd: FileDesc, strict: bool) -> crate::Result<Vec<Vec<u8>>> {
        let mut reader = JournalReader::new(storage.open(fd).unwrap(), strict);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record()? {
            out.push(record);
        }
        Ok(out)
    }

    #[test]
    fn test_chunk_type_from_byte() {
        assert_eq!(ChunkType::from_byte(4), Some(ChunkType::Last));
        assert_eq!(ChunkType::from_byte(5), None);
        assert_eq!(ChunkType::from_byte(255), None);
    }

    #[test]
    fn test_empty_journal() {
        let storage = MemStorage::new();
        let fd = FileDesc::manifest(1);
        write_records(&storage, fd, &[]);
        assert!(read_all(&storage, fd, true).unwrap().is_empty());
    }

    #[test]
    fn test_small_and_fragmented_records() {
        let storage = MemStorage::new();
        let fd = FileDesc::manifest(1);
        let records = vec![
            b"first".to_vec(),
            vec![0xAB; BLOCK_SIZE * 2 + 100],
            Vec::new(),
            b"last".to_vec(),
        ];
        write_records(&storage, fd, &records);

        let contents = storage.file_contents(fd).unwrap();
        assert!(contents.len() > BLOCK_SIZE * 2);

        assert_eq!(read_all(&storage, fd, true).unwrap(), records);
    }

    #[test]
    fn test_block_tail_padding() {
        let storage = MemStorage::new();
        let fd = FileDesc::manifest(1);
        // Leave fewer than HEADER_SIZE bytes at the end of the first block.
        let first = vec![1u8; BLOCK_SIZE - HEADER_SIZE - 3];
        let records = vec![first, b"next".to_vec()];
        write_records(&storage, fd, &records);

        let contents = storage.file_contents(fd).unwrap();
        assert_eq!(&contents[BLOCK_SIZE - 3..BLOCK_SIZE], &[0, 0, 0]);
        assert_eq!(read_all(&storage, fd, true).unwrap(), records);
    }

    #[test]
    fn test_checksum_mismatch_strict_and_lenient() {
        let storage = MemStorage::new();
        let fd = FileDesc::manifest(1);
        write_records(&storage, fd, &[b"alpha".to_vec(), b"beta".to_vec()]);

        let mut contents = storage.file_contents(fd).unwrap();
        // Flip a payload byte of the first record.
        contents[HEADER_SIZE] ^= 0xFF;
        storage.set_file_contents(fd, contents);

        let err = read_all(&storage, fd, true).unwrap_err();
        assert!(err.is_corruption());

        // Lenient mode drops the rest of the block.
        assert!(read_all(&storage, fd, false).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_tail_is_end_of_stream() {
        let storage = MemStorage::new();
        let fd = FileDesc::manifest(1);
        write_records(&storage, fd, &[b"complete".to_vec(), b"partial-write".to_vec()]);

        let mut contents = storage.file_contents(fd).unwrap();
        contents.truncate(contents.len() - 4);
        storage.set_file_contents(fd, contents);

        assert_eq!(read_all(&storage, fd, true).unwrap(), vec![b"complete".to_vec()]);
    }
}
