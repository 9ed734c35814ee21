//! SSTable reader implementation.
//!
//! An open table owns one immutable buffer holding the whole file. Records
//! are handed out as bounded, zero-copy slices of that buffer located through
//! the offset index.

use crate::error::{Error, Result};
use crate::record::{self, Record, MIN_RECORD_SIZE};
use crate::sstable::{parse_table_filename, OFFSET_SIZE};
use bytes::{Buf, Bytes};
use std::path::{Path, PathBuf};

/// SSTable provides read access to a published table file.
///
/// Usage:
/// ```no_run
/// use stratadb::sstable::SSTable;
///
/// let table = SSTable::open("./data/000001.dat").unwrap();
/// for record in table.iter(b"key").unwrap() {
///     let record = record.unwrap();
///     println!("{:?} => {:?}", record.key(), record.value());
/// }
/// ```
#[derive(Debug)]
pub struct SSTable {
    path: PathBuf,
    file_number: Option<u64>,
    file_size: u64,
    view: TableView,
}

/// The record region and offset index of a table.
///
/// Cloning only bumps reference counts, so iterators carry their own copy.
#[derive(Debug, Clone)]
struct TableView {
    records: Bytes,
    offsets: Bytes,
    record_count: u64,
}

impl SSTable {
    /// Open an SSTable file for reading.
    ///
    /// Returns [`Error::Corruption`] if the file fails validation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = Bytes::from(std::fs::read(&path)?);
        let file_size = data.len() as u64;

        let view = TableView::parse(data)
            .map_err(|e| Error::corruption(format!("{}: {}", path.display(), e)))?;

        let file_number = path.file_name().and_then(|n| n.to_str()).and_then(parse_table_filename);

        Ok(Self { path, file_number, file_size, view })
    }

    /// Returns the number of records in the table.
    pub fn len(&self) -> u64 {
        self.view.record_count
    }

    /// Returns `true` if the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.view.record_count == 0
    }

    /// Returns the path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file number parsed from the file name, if it has one.
    pub fn file_number(&self) -> Option<u64> {
        self.file_number
    }

    /// Get the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Decodes the record at `index`.
    pub fn record(&self, index: u64) -> Result<Record> {
        self.view.record(index)
    }

    /// Returns the key of the record at `index`.
    pub fn key_at(&self, index: u64) -> Result<Bytes> {
        self.view.key_at(index)
    }

    /// Returns the index of the first record whose key is >= `key`.
    ///
    /// Equals [`len`](Self::len) when every key is smaller.
    pub fn position(&self, key: &[u8]) -> Result<u64> {
        self.view.position(key)
    }

    /// Returns the newest record for `key`, dead or alive.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        let pos = self.view.position(key)?;
        if pos >= self.view.record_count {
            return Ok(None);
        }
        let record = self.view.record(pos)?;
        if record.key().as_ref() == key {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Returns the largest timestamp of any record, or 0 for an empty table.
    ///
    /// Decodes every record, so a damaged record surfaces as
    /// [`Error::Corruption`].
    pub fn max_timestamp(&self) -> Result<i64> {
        let mut max = 0;
        for index in 0..self.view.record_count {
            max = max.max(self.view.record(index)?.timestamp());
        }
        Ok(max)
    }

    /// Create an iterator over records with key >= `from`.
    pub fn iter(&self, from: &[u8]) -> Result<SSTableIterator> {
        let pos = self.view.position(from)?;
        Ok(SSTableIterator { view: self.view.clone(), pos })
    }
}

impl TableView {
    /// Splits a table file into its record region and offset index.
    fn parse(data: Bytes) -> Result<Self> {
        let size = data.len() as u64;
        if size < OFFSET_SIZE as u64 {
            return Err(Error::corruption("file too small to be a valid SSTable"));
        }

        let record_count = (&data[data.len() - OFFSET_SIZE..]).get_u64();

        // Every record takes at least MIN_RECORD_SIZE bytes plus one index slot
        let min_size = record_count
            .checked_mul((MIN_RECORD_SIZE + OFFSET_SIZE) as u64)
            .ok_or_else(|| Error::corruption(format!("record count {} overflows", record_count)))?;
        if size <= min_size {
            return Err(Error::corruption(format!(
                "record count {} inconsistent with file size {}",
                record_count, size
            )));
        }

        let index_size = (record_count + 2) * OFFSET_SIZE as u64;
        if index_size > size {
            return Err(Error::corruption("offset index exceeds file size"));
        }
        let records_end = (size - index_size) as usize;

        let offsets = data.slice(records_end..data.len() - OFFSET_SIZE);
        if offsets.len() as u64 / OFFSET_SIZE as u64 != record_count + 1 {
            return Err(Error::corruption("offset index length mismatch"));
        }
        let records = data.slice(..records_end);

        let view = Self { records, offsets, record_count };
        view.validate_offsets()?;
        Ok(view)
    }

    /// Checks that offsets start at zero, never shrink below a minimal record
    /// and end exactly at the end of the record region.
    fn validate_offsets(&self) -> Result<()> {
        let mut prev = self.offset(0);
        if prev != 0 {
            return Err(Error::corruption(format!("first offset is {}, expected 0", prev)));
        }
        for i in 1..=self.record_count {
            let offset = self.offset(i);
            if offset < prev + MIN_RECORD_SIZE as u64 {
                return Err(Error::corruption(format!("offset {} out of order", i)));
            }
            prev = offset;
        }
        if prev != self.records.len() as u64 {
            return Err(Error::corruption(format!(
                "last offset {} does not match record region size {}",
                prev,
                self.records.len()
            )));
        }
        Ok(())
    }

    fn offset(&self, index: u64) -> u64 {
        let start = index as usize * OFFSET_SIZE;
        (&self.offsets[start..start + OFFSET_SIZE]).get_u64()
    }

    fn record_bytes(&self, index: u64) -> Result<Bytes> {
        if index >= self.record_count {
            return Err(Error::corruption(format!(
                "record index {} out of range ({} records)",
                index, self.record_count
            )));
        }
        let start = self.offset(index) as usize;
        let end = self.offset(index + 1) as usize;
        Ok(self.records.slice(start..end))
    }

    fn record(&self, index: u64) -> Result<Record> {
        Record::decode(self.record_bytes(index)?)
    }

    fn key_at(&self, index: u64) -> Result<Bytes> {
        record::decode_key(&self.record_bytes(index)?)
    }

    fn position(&self, key: &[u8]) -> Result<u64> {
        let mut left = 0;
        let mut right = self.record_count;
        while left < right {
            let mid = left + (right - left) / 2;
            if self.key_at(mid)?.as_ref() < key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }
}

/// Lazy forward iterator over the records of an SSTable.
///
/// Decodes one record per step. Stops after the first decoding error.
pub struct SSTableIterator {
    view: TableView,
    pos: u64,
}

impl SSTableIterator {
    /// Returns `true` if another record is available.
    pub fn has_next(&self) -> bool {
        self.pos < self.view.record_count
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        let result = self.view.record(self.pos);
        self.pos = if result.is_ok() { self.pos + 1 } else { self.view.record_count };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.view.record_count - self.pos) as usize;
        (0, Some(remaining))
    }
}
