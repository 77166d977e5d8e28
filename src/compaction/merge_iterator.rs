//! Merge iterator for combining multiple sorted iterators.
//!
//! Sources are merged in internal key order. No deduplication is done: when
//! several sources hold the same user key, every version is returned,
//! newest first.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::util::comparator::InternalKeyComparator;
use crate::Result;

/// Trait for iterators that can be merged.
pub trait MergeSource {
    /// Check if the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Get the current encoded internal key.
    fn key(&self) -> Option<Bytes>;

    /// Get the current value.
    fn value(&self) -> Option<Bytes>;

    /// Move to the next entry.
    fn next(&mut self) -> Result<()>;

    /// Seek to the first entry.
    fn seek_to_first(&mut self) -> Result<()>;
}

impl<T: MergeSource + ?Sized> MergeSource for Box<T> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn key(&self) -> Option<Bytes> {
        (**self).key()
    }

    fn value(&self) -> Option<Bytes> {
        (**self).value()
    }

    fn next(&mut self) -> Result<()> {
        (**self).next()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        (**self).seek_to_first()
    }
}

/// Merge iterator that combines multiple sorted iterators.
///
/// The smallest current key is found by a linear scan over the sources;
/// compactions merge a handful of sources at most. Ties go to the source
/// with the lower index.
pub struct MergeIterator {
    sources: Vec<Box<dyn MergeSource + Send>>,
    icmp: InternalKeyComparator,
    /// Index of the source holding the current entry.
    current: Option<usize>,
}

impl MergeIterator {
    /// Create a new merge iterator from multiple sources.
    pub fn new(sources: Vec<Box<dyn MergeSource + Send>>, icmp: InternalKeyComparator) -> Self {
        Self {
            sources,
            icmp,
            current: None,
        }
    }

    /// Number of merged sources.
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<(usize, Bytes)> = None;
        for (i, source) in self.sources.iter().enumerate() {
            let key = match source.key() {
                Some(key) if source.valid() => key,
                _ => continue,
            };
            let replace = match &smallest {
                None => true,
                Some((_, best)) => self.icmp.compare_encoded(&key, best) == Ordering::Less,
            };
            if replace {
                smallest = Some((i, key));
            }
        }
        self.current = smallest.map(|(i, _)| i);
    }
}

impl MergeSource for MergeIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<Bytes> {
        self.current.and_then(|i| self.sources[i].key())
    }

    fn value(&self) -> Option<Bytes> {
        self.current.and_then(|i| self.sources[i].value())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(i) = self.current {
            self.sources[i].next()?;
            self.find_smallest();
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        for source in &mut self.sources {
            source.seek_to_first()?;
        }
        self.find_smallest();
        Ok(())
    }
}

/// A simple in-memory merge source.
pub struct VecSource {
    entries: Vec<(Bytes, Bytes)>,
    position: usize,
}

impl VecSource {
    /// Create a new vector-based merge source.
    pub fn new(entries: Vec<(Bytes, Bytes)>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }
}

impl MergeSource for VecSource {
    fn valid(&self) -> bool {
        self.position < self.entries.len()
    }

    fn key(&self) -> Option<Bytes> {
        self.entries.get(self.position).map(|(k, _)| k.clone())
    }

    fn value(&self) -> Option<Bytes> {
        self.entries.get(self.position).map(|(_, v)| v.clone())
    }

    fn next(&mut self) -> Result<()> {
        if self.position < self.entries.len() {
            self.position += 1;
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InternalKey;

    fn entries(keys: &[(&str, u64)]) -> Vec<(Bytes, Bytes)> {
        keys.iter()
            .map(|(k, seq)| {
                (
                    InternalKey::for_value(k.as_bytes().to_vec(), *seq).encode(),
                    Bytes::from(format!("value_{}_{}", k, seq)),
                )
            })
            .collect()
    }

    fn source(keys: &[(&str, u64)]) -> Box<dyn MergeSource + Send> {
        Box::new(VecSource::new(entries(keys)))
    }

    fn collect(iter: &mut MergeIterator) -> Vec<(Vec<u8>, u64)> {
        iter.seek_to_first().unwrap();
        let mut out = Vec::new();
        while iter.valid() {
            let key = InternalKey::decode(&iter.key().unwrap()).unwrap();
            out.push((key.user_key().to_vec(), key.sequence()));
            iter.next().unwrap();
        }
        out
    }

    #[test]
    fn test_merge_iterator_multiple_sources() {
        let mut iter = MergeIterator::new(
            vec![
                source(&[("a", 1), ("c", 1), ("e", 1)]),
                source(&[("b", 1), ("d", 1), ("f", 1)]),
            ],
            InternalKeyComparator::default(),
        );

        let keys: Vec<Vec<u8>> = collect(&mut iter).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec(), b"f".to_vec()]
        );
    }

    #[test]
    fn test_merge_iterator_newest_first() {
        let mut iter = MergeIterator::new(
            vec![
                source(&[("a", 5), ("c", 5)]),
                source(&[("a", 10), ("b", 15), ("c", 1)]),
            ],
            InternalKeyComparator::default(),
        );

        // Every version is kept, newer sequence first for the same key.
        assert_eq!(
            collect(&mut iter),
            vec![
                (b"a".to_vec(), 10),
                (b"a".to_vec(), 5),
                (b"b".to_vec(), 15),
                (b"c".to_vec(), 5),
                (b"c".to_vec(), 1),
            ]
        );
    }

    #[test]
    fn test_merge_iterator_empty_sources() {
        let mut iter = MergeIterator::new(
            vec![source(&[]), source(&[("a", 1)])],
            InternalKeyComparator::default(),
        );

        iter.seek_to_first().unwrap();
        assert!(iter.valid());
        assert!(iter.value().is_some());

        iter.next().unwrap();
        assert!(!iter.valid());
        assert_eq!(iter.key(), None);
    }
}
