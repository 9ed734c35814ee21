//! # StrataDb - An Embedded LSM-Tree Storage Engine
//!
//! StrataDb is an ordered key-value store for byte keys and values. Writes
//! land in an in-memory table that is periodically flushed to immutable
//! sorted files on disk; background-free compaction keeps the number of
//! files bounded and reclaims space held by overwritten, deleted and
//! expired entries.
//!
//! ## Architecture
//!
//! - **Clock**: strictly increasing logical timestamps ordering writes
//! - **Record**: a versioned entry with optional value and time-to-live
//! - **MemTable**: in-memory sorted buffer of the newest record per key
//! - **SSTable**: immutable sorted files with an offset index
//! - **Merge/Collapse**: k-way merge reconciling versions across tables
//! - **Compaction**: rewrites all SSTables into one
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use stratadb::{DB, Options};
//!
//! # fn main() -> Result<(), stratadb::Error> {
//! // Open or create a database
//! let db = DB::open("./data", Options::default())?;
//!
//! // Write operations
//! db.upsert(b"key1", b"value1")?;
//! db.upsert_with_ttl(b"session", b"token", 30_000)?;
//!
//! // Read operations
//! if let Some(value) = db.get(b"key1")? {
//!     println!("Found: {:?}", value);
//! }
//! for entry in db.scan(b"key")? {
//!     let (key, value) = entry?;
//!     println!("{:?} => {:?}", key, value);
//! }
//!
//! // Delete operations
//! db.remove(b"key1")?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod clock;
pub mod compaction;
pub mod config;
pub mod error;
pub mod iterator;
pub mod memtable;
pub mod record;
pub mod sstable;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use iterator::DBIterator;
pub use record::Record;

use bytes::Bytes;
use clock::Clock;
use compaction::CompactionJob;
use memtable::MemTable;
use parking_lot::{Mutex, RwLock};
use sstable::SSTable;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The set of tables visible to readers.
///
/// Replaced as a whole on flush and compaction, never edited in place.
struct DbState {
    /// Current mutable MemTable
    memtable: Arc<MemTable>,

    /// Visible SSTables, newest first
    sstables: Vec<Arc<SSTable>>,
}

/// The main database handle.
///
/// # Thread Safety
///
/// `DB` can be shared across threads using `Arc<DB>`. Writes, flushes and
/// compactions are serialized internally; scans work on a snapshot of the
/// table set and never block writers.
pub struct DB {
    /// Database directory path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// Timestamp source for new records
    clock: Clock,

    /// MemTable and SSTables, swapped atomically
    state: RwLock<Arc<DbState>>,

    /// Serializes writers, flushes and compactions
    write_lock: Mutex<()>,

    /// File number generator for SSTables
    next_file_number: AtomicU64,

    /// Set once `close` has run
    closed: AtomicBool,
}

impl DB {
    /// Opens a database at the specified path with the given options.
    ///
    /// Every `*.dat` file in the directory is opened as an SSTable. Tables
    /// that fail validation are skipped with a warning; leftover `*.tmp`
    /// files from interrupted writes are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The directory is missing and `create_if_missing` is false
    /// - The directory exists and `error_if_exists` is true
    /// - The directory cannot be read
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Validate options
        options.validate()?;

        // Step 1: Create directory if not exists
        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&path)?;
            } else {
                return Err(Error::NotFound(format!(
                    "Database directory does not exist: {:?}",
                    path
                )));
            }
        } else if options.error_if_exists {
            return Err(Error::AlreadyExists(format!("Database already exists: {:?}", path)));
        }

        // Step 2: Load existing SSTables
        let mut sstables = Vec::new();
        let mut max_file_number = 0u64;
        let mut max_timestamp = 0i64;

        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let entry_path = entry.path();
            let extension = entry_path.extension().and_then(|e| e.to_str());

            if extension == Some(sstable::TEMP_EXTENSION) {
                log::debug!("Ignoring unpublished table {:?}", entry_path);
                continue;
            }
            if extension != Some(sstable::TABLE_EXTENSION) {
                continue;
            }

            // Never reuse the number of a table file, even a corrupted one
            if let Some(num) = entry.file_name().to_str().and_then(sstable::parse_table_filename) {
                max_file_number = max_file_number.max(num);
            }

            match SSTable::open(&entry_path).and_then(|t| Ok((t.max_timestamp()?, t))) {
                Ok((table_max, table)) => {
                    log::debug!("Loaded SSTable {:?} ({} records)", entry_path, table.len());
                    max_timestamp = max_timestamp.max(table_max);
                    sstables.push(Arc::new(table));
                }
                Err(e) if e.is_corruption() => {
                    log::warn!("Skipping corrupted SSTable {:?}: {}", entry_path, e);
                }
                Err(e) => return Err(e),
            }
        }

        // Newest tables first
        sstables.sort_by(|a, b| b.file_number().cmp(&a.file_number()));
        log::info!("Opened database {:?} with {} SSTables", path, sstables.len());

        let memtable = Arc::new(MemTable::new(options.memtable_threshold()));

        Ok(DB {
            path,
            options,
            // New writes must order after every version already on disk
            clock: Clock::starting_after(max_timestamp),
            state: RwLock::new(Arc::new(DbState { memtable, sstables })),
            write_lock: Mutex::new(()),
            next_file_number: AtomicU64::new(max_file_number + 1),
            closed: AtomicBool::new(false),
        })
    }

    /// Inserts or replaces the value for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, the database is closed, or a
    /// flush triggered by this write fails. A failed write is not applied.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use stratadb::{DB, Options};
    /// # fn main() -> Result<(), stratadb::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// db.upsert(b"key", b"value")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;
        self.write(|clock| {
            Record::of(clock, Bytes::copy_from_slice(key), Bytes::copy_from_slice(value))
        })
    }

    /// Inserts or replaces the value for a key, expiring it after `ttl_ms`
    /// milliseconds.
    ///
    /// Expired entries are hidden from reads immediately and physically
    /// dropped by the next compaction.
    pub fn upsert_with_ttl(&self, key: &[u8], value: &[u8], ttl_ms: u64) -> Result<()> {
        check_key(key)?;
        self.write(|clock| {
            Record::with_ttl(
                clock,
                Bytes::copy_from_slice(key),
                Bytes::copy_from_slice(value),
                ttl_ms,
            )
        })
    }

    /// Removes a key by writing a tombstone.
    ///
    /// Removing a key that does not exist is not an error.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;
        self.write(|clock| Record::removed(clock, Bytes::copy_from_slice(key)))
    }

    /// Retrieves the live value for a key.
    ///
    /// Returns `None` if the key does not exist, was removed or expired.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let state = self.snapshot()?;

        // The MemTable always holds the newest version
        let newest = match state.memtable.get(key) {
            Some(record) => Some(record),
            None => {
                let mut newest: Option<Record> = None;
                for table in &state.sstables {
                    if let Some(record) = table.get(key)? {
                        if newest.as_ref().map_or(true, |n| record.timestamp() > n.timestamp()) {
                            newest = Some(record);
                        }
                    }
                }
                newest
            }
        };

        Ok(newest.filter(|r| !r.is_removed()).and_then(|r| r.value().cloned()))
    }

    /// Returns a lazy iterator over live entries with key >= `from`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use stratadb::{DB, Options};
    /// # fn main() -> Result<(), stratadb::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// for entry in db.scan(b"user:")? {
    ///     let (key, value) = entry?;
    ///     println!("{:?} => {:?}", key, value);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn scan(&self, from: &[u8]) -> Result<DBIterator> {
        let state = self.snapshot()?;
        DBIterator::new(&state.memtable, &state.sstables, from)
    }

    /// Returns a lazy iterator over all live entries.
    pub fn iter(&self) -> Result<DBIterator> {
        self.scan(b"")
    }

    /// Flushes the MemTable to a new SSTable, compacting afterwards if the
    /// table count exceeds the threshold.
    ///
    /// Does nothing if the MemTable is empty.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;
        self.flush_locked()
    }

    /// Compacts all SSTables into one, regardless of the threshold.
    pub fn compact(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;
        self.compact_locked()
    }

    /// Closes the database, flushing the MemTable to disk.
    ///
    /// Further operations return [`Error::InvalidState`]. Closing twice is
    /// a no-op.
    pub fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        self.flush_locked()?;
        self.closed.store(true, Ordering::Release);

        // Release the table buffers; open iterators keep their own references
        *self.state.write() = Arc::new(DbState {
            memtable: Arc::new(MemTable::new(self.options.memtable_threshold())),
            sstables: Vec::new(),
        });

        log::info!("Database closed successfully");
        Ok(())
    }

    /// Returns the number of visible SSTables.
    pub fn sstable_count(&self) -> usize {
        self.state.read().sstables.len()
    }

    /// Returns the database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the options the database was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Applies one write, flushing first if the record would overflow the
    /// MemTable.
    ///
    /// The record is built under the write lock so that MemTable insertion
    /// order matches timestamp order.
    fn write<F>(&self, make_record: F) -> Result<()>
    where
        F: FnOnce(&Clock) -> Record,
    {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let record = make_record(&self.clock);
        let mut memtable = self.state.read().memtable.clone();

        if !memtable.is_empty() && memtable.would_exceed(&record) {
            log::info!(
                "MemTable is full ({} bytes, threshold {}), triggering flush",
                memtable.size_in_bytes(),
                memtable.threshold()
            );
            self.flush_locked()?;
            memtable = self.state.read().memtable.clone();
        }

        memtable.put(record);
        Ok(())
    }

    /// Flushes the MemTable. Caller holds `write_lock`.
    fn flush_locked(&self) -> Result<()> {
        let state = self.state.read().clone();
        if state.memtable.is_empty() {
            log::debug!("MemTable is empty, nothing to flush");
            return Ok(());
        }

        let file_number = self.next_file_number.fetch_add(1, Ordering::SeqCst);
        let table =
            state.memtable.flush(&self.path, file_number, self.options.sync_on_publish)?;

        log::info!(
            "Flush completed: {} records written to {:?}, file size: {} bytes",
            table.len(),
            table.path(),
            table.file_size()
        );

        // Publish the table and retire the MemTable in one swap
        let mut sstables = Vec::with_capacity(state.sstables.len() + 1);
        sstables.push(Arc::new(table));
        sstables.extend(state.sstables.iter().cloned());
        let table_count = sstables.len();

        *self.state.write() = Arc::new(DbState {
            memtable: Arc::new(MemTable::new(self.options.memtable_threshold())),
            sstables,
        });

        if table_count > self.options.compaction_threshold {
            log::info!(
                "{} SSTables exceed threshold {}, triggering compaction",
                table_count,
                self.options.compaction_threshold
            );
            self.compact_locked()?;
        }

        Ok(())
    }

    /// Rewrites all SSTables into one. Caller holds `write_lock`.
    fn compact_locked(&self) -> Result<()> {
        let state = self.state.read().clone();
        if state.sstables.is_empty() {
            log::debug!("No SSTables to compact");
            return Ok(());
        }

        let file_number = self.next_file_number.fetch_add(1, Ordering::SeqCst);
        let job = CompactionJob::new(
            state.sstables.clone(),
            self.path.clone(),
            self.options.sync_on_publish,
        );
        let result = job.run(file_number)?;

        // The merged table is published: swap it in, then drop the inputs
        *self.state.write() = Arc::new(DbState {
            memtable: state.memtable.clone(),
            sstables: result.table.map(Arc::new).into_iter().collect(),
        });

        for old in &state.sstables {
            match std::fs::remove_file(old.path()) {
                Ok(()) => log::debug!("Deleted compacted file: {:?}", old.path()),
                Err(e) => log::error!("Failed to delete compacted file {:?}: {}", old.path(), e),
            }
        }

        Ok(())
    }

    /// Returns the current table set.
    fn snapshot(&self) -> Result<Arc<DbState>> {
        self.ensure_open()?;
        Ok(self.state.read().clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::invalid_state("database is closed"));
        }
        Ok(())
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        // Errors cannot be propagated from drop
        if let Err(e) = self.close() {
            log::error!("Error closing database during drop: {}", e);
        }
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("Key cannot be empty"));
    }
    Ok(())
}
