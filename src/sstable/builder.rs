//! SSTable builder implementation.
//!
//! Builds an SSTable file from a sequence of sorted records, writing to a
//! temporary file and publishing it with a single rename.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::sstable::{table_filename, temp_filename};
use bytes::BufMut;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// SSTableBuilder builds an SSTable file.
///
/// Usage:
/// ```no_run
/// use stratadb::clock::Clock;
/// use stratadb::record::Record;
/// use stratadb::sstable::SSTableBuilder;
///
/// let clock = Clock::new();
/// let mut builder = SSTableBuilder::new("./data", 1, true).unwrap();
/// builder.add(&Record::of(&clock, "key1", "value1")).unwrap();
/// builder.add(&Record::of(&clock, "key2", "value2")).unwrap();
/// let path = builder.finish().unwrap();
/// ```
pub struct SSTableBuilder {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    offsets: Vec<u64>,
    last_record: Option<Record>,
    buffer: Vec<u8>,
    sync: bool,
    published: bool,
}

impl SSTableBuilder {
    /// Create a new SSTableBuilder writing table `file_number` into `dir`.
    ///
    /// When `sync` is set the file is fsynced before it is published.
    pub fn new<P: AsRef<Path>>(dir: P, file_number: u64, sync: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let temp_path = dir.join(temp_filename(file_number));
        let final_path = dir.join(table_filename(file_number));
        let file = File::create(&temp_path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            temp_path,
            final_path,
            offsets: vec![0],
            last_record: None,
            buffer: Vec::new(),
            sync,
            published: false,
        })
    }

    /// Add a record to the SSTable.
    ///
    /// Records must be added in ascending key order, newer versions of the
    /// same key first.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if record.key().is_empty() {
            return Err(Error::invalid_argument("Key cannot be empty"));
        }

        if let Some(last) = &self.last_record {
            if last.cmp_order(record) != Ordering::Less {
                return Err(Error::invalid_argument("Records must be added in sorted order"));
            }
        }

        self.buffer.clear();
        record.encode_into(&mut self.buffer)?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::invalid_state("SSTable builder already finished"))?;
        writer.write_all(&self.buffer)?;

        let end = self.current_size() + self.buffer.len() as u64;
        self.offsets.push(end);
        self.last_record = Some(record.clone());

        Ok(())
    }

    /// Finish building the SSTable.
    ///
    /// Writes the offset index and record count, then atomically renames
    /// the temporary file to its final name. Returns the final path.
    pub fn finish(mut self) -> Result<PathBuf> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| Error::invalid_state("SSTable builder already finished"))?;

        let mut index = Vec::with_capacity((self.offsets.len() + 1) * 8);
        for offset in &self.offsets {
            index.put_u64(*offset);
        }
        index.put_u64(self.num_entries());
        writer.write_all(&index)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)?;
        self.published = true;

        if self.sync {
            sync_parent_dir(&self.final_path)?;
        }

        log::debug!(
            "Published SSTable {:?}: {} records, {} bytes of records",
            self.final_path,
            self.num_entries(),
            self.current_size()
        );

        Ok(self.final_path.clone())
    }

    /// Get the number of records added
    pub fn num_entries(&self) -> u64 {
        (self.offsets.len() - 1) as u64
    }

    /// Get the size of the record region written so far
    pub fn current_size(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Abandon the SSTable, removing the temporary file
    pub fn abandon(self) -> Result<()> {
        // Drop removes the temporary file
        Ok(())
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        drop(self.writer.take());
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove temporary file {:?}: {}", self.temp_path, e);
            }
        }
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
