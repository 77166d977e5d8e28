//! Journal writer implementation.

use std::io::Write;

use crate::options::SyncMode;
use crate::storage::StorageWriter;
use crate::util::crc::{crc32_multi, mask_crc};
use crate::Result;

use super::{ChunkType, BLOCK_SIZE, HEADER_SIZE};

/// Appends framed records to a storage file.
pub struct JournalWriter {
    /// Destination file.
    writer: Box<dyn StorageWriter>,
    /// Current position within the current block.
    block_offset: usize,
    /// Sync policy applied after each record.
    sync_mode: SyncMode,
    /// Bytes written since last sync.
    bytes_since_sync: usize,
}

impl JournalWriter {
    /// Create a writer that syncs only when asked.
    pub fn new(writer: Box<dyn StorageWriter>) -> Self {
        Self::with_sync_mode(writer, SyncMode::None)
    }

    /// Create a writer with the given sync policy.
    pub fn with_sync_mode(writer: Box<dyn StorageWriter>, sync_mode: SyncMode) -> Self {
        Self {
            writer,
            block_offset: 0,
            sync_mode,
            bytes_since_sync: 0,
        }
    }

    /// Append a record, fragmenting it across blocks when needed.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut ptr = 0;
        let mut begin = true;

        // An empty record still emits one zero-length FULL chunk.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.writer.write_all(&[0u8; HEADER_SIZE][..leftover])?;
                    self.bytes_since_sync += leftover;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.min(avail);
            let end = left == fragment_length;

            let chunk_type = match (begin, end) {
                (true, true) => ChunkType::Full,
                (true, false) => ChunkType::First,
                (false, true) => ChunkType::Last,
                (false, false) => ChunkType::Middle,
            };

            self.emit_chunk(chunk_type, &data[ptr..ptr + fragment_length])?;

            ptr += fragment_length;
            left -= fragment_length;
            begin = false;

            if left == 0 {
                break;
            }
        }

        self.maybe_sync()
    }

    fn emit_chunk(&mut self, chunk_type: ChunkType, data: &[u8]) -> Result<()> {
        debug_assert!(data.len() <= 0xFFFF);
        debug_assert!(self.block_offset + HEADER_SIZE + data.len() <= BLOCK_SIZE);

        let crc = mask_crc(crc32_multi(&[&[chunk_type.to_byte()], data]));

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&crc.to_le_bytes());
        header[4..6].copy_from_slice(&(data.len() as u16).to_le_bytes());
        header[6] = chunk_type.to_byte();

        self.writer.write_all(&header)?;
        self.writer.write_all(data)?;

        let chunk_size = HEADER_SIZE + data.len();
        self.block_offset += chunk_size;
        self.bytes_since_sync += chunk_size;
        Ok(())
    }

    fn maybe_sync(&mut self) -> Result<()> {
        match self.sync_mode {
            SyncMode::Always => self.sync(),
            SyncMode::Bytes { bytes } if self.bytes_since_sync >= bytes => self.sync(),
            SyncMode::Bytes { .. } => Ok(self.writer.flush()?),
            SyncMode::None => Ok(self.writer.flush()?),
        }
    }

    /// Flush and sync everything written so far.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Sync and release the underlying file.
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}
