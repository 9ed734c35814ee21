//! Multi-way merge and collapse iterators.
//!
//! [`MergeIterator`] merges several sorted record streams into one stream in
//! record order (key ascending, newest first). [`CollapseIterator`] then keeps
//! only the first, i.e. newest, record of every run of equal keys.

use crate::error::{Error, Result};
use crate::record::Record;
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A sorted stream of records from a MemTable or an SSTable.
pub type RecordSource = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Entry in the merge heap
struct MergeEntry {
    record: Record,
    source_index: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest record first)
        other.record.cmp_order(&self.record).then_with(|| {
            // Identical versions: prefer the earlier source
            other.source_index.cmp(&self.source_index)
        })
    }
}

/// Multi-way merge iterator over sorted record sources.
///
/// Every source must yield records in record order. Sources earlier in the
/// list win ties between identical versions.
pub struct MergeIterator {
    heap: BinaryHeap<MergeEntry>,
    sources: Vec<RecordSource>,
    pending_error: Option<Error>,
}

impl MergeIterator {
    /// Create a new merge iterator, pulling the first record of every source.
    pub fn new(sources: Vec<RecordSource>) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            pending_error: None,
        };

        for index in 0..merge.sources.len() {
            merge.advance_source(index)?;
        }

        Ok(merge)
    }

    /// Pull the next record of the source at `index` into the heap
    fn advance_source(&mut self, index: usize) -> Result<()> {
        if let Some(next) = self.sources[index].next() {
            self.heap.push(MergeEntry { record: next?, source_index: index });
        }
        Ok(())
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_error.take() {
            self.heap.clear();
            return Some(Err(err));
        }

        let entry = self.heap.pop()?;

        // Refill from the source that provided this entry
        if let Err(e) = self.advance_source(entry.source_index) {
            self.pending_error = Some(e);
        }

        Some(Ok(entry.record))
    }
}

/// Reduces every run of equal keys to its first record.
///
/// Over a [`MergeIterator`] the first record of a run is the newest version.
pub struct CollapseIterator<I> {
    inner: I,
    last_key: Option<Bytes>,
}

impl<I> CollapseIterator<I>
where
    I: Iterator<Item = Result<Record>>,
{
    /// Wrap a record stream sorted in record order.
    pub fn new(inner: I) -> Self {
        Self { inner, last_key: None }
    }
}

impl<I> Iterator for CollapseIterator<I>
where
    I: Iterator<Item = Result<Record>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            if self.last_key.as_ref() == Some(record.key()) {
                continue;
            }
            self.last_key = Some(record.key().clone());
            return Some(Ok(record));
        }
    }
}

/// Merges `sources` and collapses them to the newest version of each key.
pub fn merge_collapse(sources: Vec<RecordSource>) -> Result<CollapseIterator<MergeIterator>> {
    Ok(CollapseIterator::new(MergeIterator::new(sources)?))
}
