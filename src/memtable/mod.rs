//! # MemTable - In-Memory Sorted Table
//!
//! The MemTable buffers recent writes in memory, keeping only the newest
//! [`Record`] per key. It uses a SkipList so scans can run while the single
//! writer keeps inserting.
//!
//! ## Design
//!
//! - Based on crossbeam-skiplist for lock-free concurrent reads
//! - Upsert and Remove both replace the previous record for the key
//! - Tracks the serialized size of its records to decide when to flush
//! - Flushing writes a new SSTable; the engine then swaps in a fresh MemTable

use crate::clock::Clock;
use crate::error::Result;
use crate::record::Record;
use crate::sstable::{SSTable, SSTableBuilder};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// MemTable stores the latest record for every recently written key.
///
/// # Example
///
/// ```rust
/// use stratadb::clock::Clock;
/// use stratadb::memtable::MemTable;
///
/// let clock = Clock::new();
/// let memtable = MemTable::new(4096);
/// memtable.upsert(&clock, b"key1", b"value1");
/// memtable.remove(&clock, b"key2");
///
/// let keys: Vec<_> = memtable.iter(b"").map(|r| r.key().clone()).collect();
/// assert_eq!(keys, vec!["key1", "key2"]);
/// ```
pub struct MemTable {
    /// Key -> newest record for that key
    data: Arc<SkipMap<Bytes, Record>>,

    /// Serialized size of all records in bytes
    size: AtomicUsize,

    /// Flush threshold in bytes
    threshold: usize,
}

impl MemTable {
    /// Creates a new empty MemTable that asks to be flushed above `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self { data: Arc::new(SkipMap::new()), size: AtomicUsize::new(0), threshold }
    }

    /// Inserts or replaces the value for `key`.
    pub fn upsert(&self, clock: &Clock, key: &[u8], value: &[u8]) {
        self.put(Record::of(clock, Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
    }

    /// Inserts or replaces the value for `key`, expiring after `ttl_ms` milliseconds.
    pub fn upsert_with_ttl(&self, clock: &Clock, key: &[u8], value: &[u8], ttl_ms: u64) {
        self.put(Record::with_ttl(
            clock,
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
            ttl_ms,
        ));
    }

    /// Replaces the value for `key` with a tombstone.
    pub fn remove(&self, clock: &Clock, key: &[u8]) {
        self.put(Record::removed(clock, Bytes::copy_from_slice(key)));
    }

    /// Stores a pre-built record, replacing the previous record for its key.
    ///
    /// The size counter is adjusted by the difference between the old and
    /// new record. Callers serialize writes; concurrent `put`s for the same
    /// key may skew the counter.
    pub fn put(&self, record: Record) {
        let new_size = record.size_in_bytes();
        let old_size = self.data.get(record.key()).map(|e| e.value().size_in_bytes());

        self.data.insert(record.key().clone(), record);

        match old_size {
            Some(old) if old > new_size => {
                self.size.fetch_sub(old - new_size, Ordering::Relaxed);
            }
            Some(old) => {
                self.size.fetch_add(new_size - old, Ordering::Relaxed);
            }
            None => {
                self.size.fetch_add(new_size, Ordering::Relaxed);
            }
        }
    }

    /// Returns the newest record for `key`, dead or alive.
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the serialized size of all records in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns the flush threshold in bytes.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns `true` once the serialized size exceeds the threshold.
    pub fn is_flush_needed(&self) -> bool {
        self.size_in_bytes() > self.threshold
    }

    /// Returns `true` if adding `record` would push the size over the threshold.
    pub fn would_exceed(&self, record: &Record) -> bool {
        self.size_in_bytes().saturating_add(record.size_in_bytes()) > self.threshold
    }

    /// Returns the number of keys in the MemTable.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a lazy iterator over records with key >= `from`, in key order.
    pub fn iter(&self, from: &[u8]) -> MemTableIterator {
        MemTableIterator::new(self.data.clone(), Bytes::copy_from_slice(from))
    }

    /// Writes every record (tombstones included) to a new SSTable in `dir`.
    ///
    /// The table is fully published before this returns. The MemTable is not
    /// modified; the caller discards it once the returned table is visible.
    pub fn flush(&self, dir: &Path, file_number: u64, sync: bool) -> Result<SSTable> {
        let mut builder = SSTableBuilder::new(dir, file_number, sync)?;
        for record in self.iter(b"") {
            builder.add(&record)?;
        }
        let path = builder.finish()?;
        SSTable::open(path)
    }
}

/// Iterator over MemTable records in key order.
///
/// Holds its own reference to the SkipList and re-seeks past the last
/// returned key on every step.
pub struct MemTableIterator {
    data: Arc<SkipMap<Bytes, Record>>,
    next_bound: Bound<Bytes>,
}

impl MemTableIterator {
    fn new(data: Arc<SkipMap<Bytes, Record>>, from: Bytes) -> Self {
        Self { data, next_bound: Bound::Included(from) }
    }
}

impl Iterator for MemTableIterator {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        let bound = match &self.next_bound {
            Bound::Included(key) => Bound::Included(key.as_ref()),
            Bound::Excluded(key) => Bound::Excluded(key.as_ref()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let entry = self.data.lower_bound::<[u8]>(bound)?;
        let record = entry.value().clone();
        self.next_bound = Bound::Excluded(entry.key().clone());
        Some(record)
    }
}
