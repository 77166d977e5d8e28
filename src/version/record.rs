//! SessionRecord - describes changes between versions.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::options::MAX_LEVELS;
use crate::types::InternalKey;
use crate::util::coding::{
    decode_length_prefixed, decode_varint64, encode_length_prefixed, encode_varint64,
};
use crate::{Error, Result};

use super::{FileMetadata, RecordField};

/// A SessionRecord describes the changes between two Versions.
///
/// It records:
/// - The comparer name and the session counters
/// - Compaction pointers
/// - Tables to delete
/// - Tables to add
///
/// Which scalar fields were set is tracked separately from their values so
/// that recovery can tell "zero" from "never written".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    has: u32,
    comparer: String,
    journal_num: u64,
    prev_journal_num: u64,
    next_num: u64,
    seq: u64,
    compaction_pointers: Vec<(usize, InternalKey)>,
    deleted_tables: BTreeSet<(usize, u64)>,
    added_tables: Vec<(usize, FileMetadata)>,
}

impl SessionRecord {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `field` has been set or decoded at least once.
    pub fn has(&self, field: RecordField) -> bool {
        self.has & field.bit() != 0
    }

    /// Check if the record carries nothing.
    pub fn is_empty(&self) -> bool {
        self.has == 0
    }

    /// Set the comparer name.
    pub fn set_comparer(&mut self, name: impl Into<String>) {
        self.has |= RecordField::Comparer.bit();
        self.comparer = name.into();
    }

    /// Set the journal number.
    pub fn set_journal_num(&mut self, num: u64) {
        self.has |= RecordField::JournalNum.bit();
        self.journal_num = num;
    }

    /// Set the previous journal number.
    pub fn set_prev_journal_num(&mut self, num: u64) {
        self.has |= RecordField::PrevJournalNum.bit();
        self.prev_journal_num = num;
    }

    /// Set the next file number.
    pub fn set_next_num(&mut self, num: u64) {
        self.has |= RecordField::NextNum.bit();
        self.next_num = num;
    }

    /// Set the last sequence number.
    pub fn set_seq(&mut self, seq: u64) {
        self.has |= RecordField::Seq.bit();
        self.seq = seq;
    }

    /// Record a compaction pointer.
    pub fn add_compaction_pointer(&mut self, level: usize, key: InternalKey) {
        self.has |= RecordField::CompactionPointer.bit();
        self.compaction_pointers.push((level, key));
    }

    /// Record a table deletion.
    pub fn delete_table(&mut self, level: usize, number: u64) {
        self.has |= RecordField::DeletedTable.bit();
        self.deleted_tables.insert((level, number));
    }

    /// Record a table addition.
    pub fn add_table(&mut self, level: usize, file: FileMetadata) {
        self.has |= RecordField::AddedTable.bit();
        self.added_tables.push((level, file));
    }

    /// Record the addition of a table already held by a version.
    pub fn add_table_file(&mut self, level: usize, file: &Arc<FileMetadata>) {
        self.add_table(level, FileMetadata::clone(file));
    }

    /// Check that every level the record names is below `MAX_LEVELS`.
    pub fn check_levels(&self) -> Result<()> {
        let levels = self
            .compaction_pointers
            .iter()
            .map(|(level, _)| (RecordField::CompactionPointer, *level))
            .chain(
                self.deleted_tables
                    .iter()
                    .map(|(level, _)| (RecordField::DeletedTable, *level)),
            )
            .chain(
                self.added_tables
                    .iter()
                    .map(|(level, _)| (RecordField::AddedTable, *level)),
            );
        for (field, level) in levels {
            if level >= MAX_LEVELS {
                return Err(Error::InvalidArgument(format!(
                    "{}: invalid level {}",
                    field.name(),
                    level
                )));
            }
        }
        Ok(())
    }

    /// Comparer name, if set.
    pub fn comparer(&self) -> Option<&str> {
        self.has(RecordField::Comparer)
            .then_some(self.comparer.as_str())
    }

    /// Journal number, if set.
    pub fn journal_num(&self) -> Option<u64> {
        self.has(RecordField::JournalNum).then_some(self.journal_num)
    }

    /// Previous journal number, if set.
    pub fn prev_journal_num(&self) -> Option<u64> {
        self.has(RecordField::PrevJournalNum)
            .then_some(self.prev_journal_num)
    }

    /// Next file number, if set.
    pub fn next_num(&self) -> Option<u64> {
        self.has(RecordField::NextNum).then_some(self.next_num)
    }

    /// Last sequence number, if set.
    pub fn seq(&self) -> Option<u64> {
        self.has(RecordField::Seq).then_some(self.seq)
    }

    /// Compaction pointers in record order.
    pub fn compaction_pointers(&self) -> &[(usize, InternalKey)] {
        &self.compaction_pointers
    }

    /// Deleted tables ordered by (level, number).
    pub fn deleted_tables(&self) -> &BTreeSet<(usize, u64)> {
        &self.deleted_tables
    }

    /// Added tables in record order.
    pub fn added_tables(&self) -> &[(usize, FileMetadata)] {
        &self.added_tables
    }

    /// Copy the scalar fields set in `other` into this record.
    pub fn merge_scalars(&mut self, other: &SessionRecord) {
        if let Some(name) = other.comparer() {
            self.set_comparer(name);
        }
        if let Some(num) = other.journal_num() {
            self.set_journal_num(num);
        }
        if let Some(num) = other.prev_journal_num() {
            self.set_prev_journal_num(num);
        }
        if let Some(num) = other.next_num() {
            self.set_next_num(num);
        }
        if let Some(seq) = other.seq() {
            self.set_seq(seq);
        }
    }

    /// Encode the record to bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        if let Some(name) = self.comparer() {
            put_tag(&mut buf, RecordField::Comparer);
            encode_length_prefixed(&mut buf, name.as_bytes());
        }
        if let Some(num) = self.journal_num() {
            put_tag(&mut buf, RecordField::JournalNum);
            encode_varint64(&mut buf, num);
        }
        if let Some(num) = self.prev_journal_num() {
            put_tag(&mut buf, RecordField::PrevJournalNum);
            encode_varint64(&mut buf, num);
        }
        if let Some(num) = self.next_num() {
            put_tag(&mut buf, RecordField::NextNum);
            encode_varint64(&mut buf, num);
        }
        if let Some(seq) = self.seq() {
            put_tag(&mut buf, RecordField::Seq);
            encode_varint64(&mut buf, seq);
        }

        for (level, key) in &self.compaction_pointers {
            put_tag(&mut buf, RecordField::CompactionPointer);
            encode_varint64(&mut buf, *level as u64);
            encode_length_prefixed(&mut buf, &key.encode());
        }

        for &(level, number) in &self.deleted_tables {
            put_tag(&mut buf, RecordField::DeletedTable);
            encode_varint64(&mut buf, level as u64);
            encode_varint64(&mut buf, number);
        }

        for (level, file) in &self.added_tables {
            put_tag(&mut buf, RecordField::AddedTable);
            encode_varint64(&mut buf, *level as u64);
            encode_varint64(&mut buf, file.number());
            encode_varint64(&mut buf, file.size());
            encode_length_prefixed(&mut buf, &file.smallest().encode());
            encode_length_prefixed(&mut buf, &file.largest().encode());
        }

        buf.freeze()
    }

    /// Decode a record from bytes.
    ///
    /// Fields may appear in any order and scalar fields may repeat; the last
    /// occurrence wins.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut rec = SessionRecord::new();
        let mut cursor = data;

        while !cursor.is_empty() {
            let tag = decode_varint64(&mut cursor)
                .ok_or_else(|| Error::manifest("field header: truncated"))?;
            let field = RecordField::from_tag(tag)
                .ok_or_else(|| Error::manifest(format!("field header: unknown tag {}", tag)))?;

            match field {
                RecordField::Comparer => {
                    let name = read_bytes(&mut cursor, field)?;
                    let name = std::str::from_utf8(name)
                        .map_err(|_| Error::manifest("comparer: invalid utf-8"))?;
                    rec.set_comparer(name);
                }
                RecordField::JournalNum => rec.set_journal_num(read_uvarint(&mut cursor, field)?),
                RecordField::PrevJournalNum => {
                    rec.set_prev_journal_num(read_uvarint(&mut cursor, field)?)
                }
                RecordField::NextNum => rec.set_next_num(read_uvarint(&mut cursor, field)?),
                RecordField::Seq => rec.set_seq(read_uvarint(&mut cursor, field)?),
                RecordField::CompactionPointer => {
                    let level = read_level(&mut cursor, field)?;
                    let key = read_ikey(&mut cursor, field)?;
                    rec.add_compaction_pointer(level, key);
                }
                RecordField::DeletedTable => {
                    let level = read_level(&mut cursor, field)?;
                    let number = read_uvarint(&mut cursor, field)?;
                    rec.delete_table(level, number);
                }
                RecordField::AddedTable => {
                    let level = read_level(&mut cursor, field)?;
                    let number = read_uvarint(&mut cursor, field)?;
                    let size = read_uvarint(&mut cursor, field)?;
                    let smallest = read_ikey(&mut cursor, field)?;
                    let largest = read_ikey(&mut cursor, field)?;
                    rec.add_table(level, FileMetadata::new(number, size, smallest, largest));
                }
            }
        }

        Ok(rec)
    }
}

fn put_tag(buf: &mut BytesMut, field: RecordField) {
    encode_varint64(buf, field.tag());
}

fn read_uvarint(cursor: &mut &[u8], field: RecordField) -> Result<u64> {
    decode_varint64(cursor)
        .ok_or_else(|| Error::manifest(format!("{}: truncated varint", field.name())))
}

fn read_level(cursor: &mut &[u8], field: RecordField) -> Result<usize> {
    let level = read_uvarint(cursor, field)?;
    if level >= MAX_LEVELS as u64 {
        return Err(Error::manifest(format!(
            "{}: invalid level {}",
            field.name(),
            level
        )));
    }
    Ok(level as usize)
}

fn read_bytes<'a>(cursor: &mut &'a [u8], field: RecordField) -> Result<&'a [u8]> {
    decode_length_prefixed(cursor)
        .ok_or_else(|| Error::manifest(format!("{}: truncated bytes", field.name())))
}

fn read_ikey(cursor: &mut &[u8], field: RecordField) -> Result<InternalKey> {
    let data = read_bytes(cursor, field)?;
    InternalKey::decode(data)
        .ok_or_else(|| Error::manifest(format!("{}: invalid internal key", field.name())))
}
