//! Shared utilities: varint coding, checksums, comparators and file naming.

pub mod coding;
pub mod comparator;
pub mod crc;
pub mod filename;
