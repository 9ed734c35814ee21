//! Database iterator for scanning key-value pairs.
//!
//! Merges the MemTable with every SSTable, keeps the newest version of each
//! key and hides tombstones and expired records.

use std::sync::Arc;

use bytes::Bytes;

use crate::clock;
use crate::compaction::{merge_collapse, CollapseIterator, MergeIterator, RecordSource};
use crate::memtable::MemTable;
use crate::sstable::SSTable;
use crate::Result;

/// A lazy, single-pass iterator over live key-value pairs in key order.
///
/// The iterator works on the MemTable and SSTable set that were current
/// when it was created; later flushes and compactions do not affect it.
///
/// # Example
///
/// ```rust,no_run
/// use stratadb::{DB, Options};
///
/// # fn main() -> Result<(), stratadb::Error> {
/// let db = DB::open("./data", Options::default())?;
///
/// db.upsert(b"key1", b"value1")?;
/// db.upsert(b"key2", b"value2")?;
///
/// for entry in db.scan(b"key")? {
///     let (key, value) = entry?;
///     println!("{:?} => {:?}", key, value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DBIterator {
    inner: CollapseIterator<MergeIterator>,
    failed: bool,
}

impl DBIterator {
    /// Creates an iterator over records with key >= `from`.
    pub(crate) fn new(memtable: &MemTable, sstables: &[Arc<SSTable>], from: &[u8]) -> Result<Self> {
        let mut sources: Vec<RecordSource> = Vec::with_capacity(sstables.len() + 1);
        sources.push(Box::new(memtable.iter(from).map(Ok)));
        for table in sstables {
            sources.push(Box::new(table.iter(from)?));
        }

        Ok(Self { inner: merge_collapse(sources)?, failed: false })
    }
}

impl Iterator for DBIterator {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            // Checked per record: entries may expire while the scan runs
            if record.is_expired_at(clock::wall_millis()) {
                continue;
            }
            if let Some(value) = record.value() {
                return Some(Ok((record.key().clone(), value.clone())));
            }
        }
    }
}
