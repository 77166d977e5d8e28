//! Journal reader implementation.

use std::io::{self, Read};

use crate::util::crc::{crc32_multi, unmask_crc};
use crate::{Error, Result};

use super::{ChunkType, BLOCK_SIZE, HEADER_SIZE};

/// Reads framed records sequentially.
///
/// In strict mode any corrupt chunk aborts the read with a corruption error.
/// Otherwise the remainder of the offending block is dropped and reading
/// resumes at the next block.
pub struct JournalReader {
    reader: Box<dyn Read + Send>,
    /// Current block buffer.
    buffer: Vec<u8>,
    buffer_offset: usize,
    buffer_size: usize,
    eof: bool,
    strict: bool,
}

enum Chunk {
    Data(ChunkType, Vec<u8>),
    Corrupt(&'static str),
    Eof,
}

impl JournalReader {
    /// Create a reader over `reader`.
    pub fn new(reader: Box<dyn Read + Send>, strict: bool) -> Self {
        Self {
            reader,
            buffer: vec![0u8; BLOCK_SIZE],
            buffer_offset: 0,
            buffer_size: 0,
            eof: false,
            strict,
        }
    }

    /// Read the next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut scratch = Vec::new();
        let mut in_fragment = false;

        loop {
            let (chunk_type, data) = match self.read_chunk()? {
                Chunk::Data(chunk_type, data) => (chunk_type, data),
                Chunk::Corrupt(reason) => {
                    self.drop_block(reason)?;
                    scratch.clear();
                    in_fragment = false;
                    continue;
                }
                // A partially written trailing record is not an error.
                Chunk::Eof => return Ok(None),
            };

            match chunk_type {
                ChunkType::Full => {
                    if in_fragment {
                        self.report("partial record without end", scratch.len())?;
                    }
                    return Ok(Some(data));
                }
                ChunkType::First => {
                    if in_fragment {
                        self.report("partial record without end", scratch.len())?;
                    }
                    scratch = data;
                    in_fragment = true;
                }
                ChunkType::Middle => {
                    if !in_fragment {
                        self.report("orphan middle chunk", data.len())?;
                        continue;
                    }
                    scratch.extend_from_slice(&data);
                }
                ChunkType::Last => {
                    if !in_fragment {
                        self.report("orphan last chunk", data.len())?;
                        continue;
                    }
                    scratch.extend_from_slice(&data);
                    return Ok(Some(scratch));
                }
                ChunkType::Zero => {}
            }
        }
    }

    /// Fail in strict mode; otherwise log the dropped bytes.
    fn report(&self, reason: &'static str, dropped: usize) -> Result<()> {
        if self.strict {
            return Err(Error::corruption(format!("journal: {}", reason)));
        }
        tracing::warn!(reason, dropped, "dropping journal chunk");
        Ok(())
    }

    /// Report a corrupt chunk and skip the rest of its block.
    fn drop_block(&mut self, reason: &'static str) -> Result<()> {
        self.report(reason, self.buffer_size - self.buffer_offset)?;
        self.buffer_offset = self.buffer_size;
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Chunk> {
        loop {
            if self.buffer_offset + HEADER_SIZE > self.buffer_size {
                if !self.read_block()? {
                    return Ok(Chunk::Eof);
                }
                continue;
            }

            let header = &self.buffer[self.buffer_offset..self.buffer_offset + HEADER_SIZE];
            let crc_expected = unmask_crc(u32::from_le_bytes([
                header[0], header[1], header[2], header[3],
            ]));
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let type_byte = header[6];

            // Zero padding at a block tail.
            if type_byte == 0 && length == 0 && crc_expected == unmask_crc(0) {
                self.buffer_offset = self.buffer_size;
                continue;
            }

            let chunk_type = match ChunkType::from_byte(type_byte) {
                Some(ct) => ct,
                None => return Ok(Chunk::Corrupt("invalid chunk type")),
            };

            let data_start = self.buffer_offset + HEADER_SIZE;
            let data_end = data_start + length;
            if data_end > self.buffer_size {
                if self.eof {
                    return Ok(Chunk::Eof);
                }
                return Ok(Chunk::Corrupt("chunk length overflows block"));
            }

            let data = &self.buffer[data_start..data_end];
            if crc32_multi(&[&[type_byte], data]) != crc_expected {
                return Ok(Chunk::Corrupt("checksum mismatch"));
            }

            let data = data.to_vec();
            self.buffer_offset = data_end;
            return Ok(Chunk::Data(chunk_type, data));
        }
    }

    /// Fill the buffer with the next block. Returns false at end of stream.
    fn read_block(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        self.buffer_offset = 0;
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.buffer_size = filled;
        if filled < BLOCK_SIZE {
            self.eof = true;
        }
        Ok(filled > 0)
    }
}
