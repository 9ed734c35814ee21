//! Configuration options for StrataDb storage engine.

/// Configuration options for opening a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the database directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the database directory already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Memory budget the engine is allowed to spend (in bytes).
    /// Default: 64MB
    pub heap_budget: u64,

    /// The MemTable is flushed once its serialized size exceeds
    /// `heap_budget / flush_divisor` bytes.
    /// Default: 16
    pub flush_divisor: u64,

    /// Compaction runs when the number of visible SSTables exceeds this value.
    /// Default: 8
    pub compaction_threshold: usize,

    /// Sync table files to disk before they are published.
    /// Default: true
    pub sync_on_publish: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            heap_budget: 64 * 1024 * 1024, // 64MB
            flush_divisor: 16,
            compaction_threshold: 8,
            sync_on_publish: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether opening an existing database is an error.
    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the memory budget.
    pub fn heap_budget(mut self, bytes: u64) -> Self {
        self.heap_budget = bytes;
        self
    }

    /// Sets the fraction of the memory budget used by the MemTable.
    pub fn flush_divisor(mut self, divisor: u64) -> Self {
        self.flush_divisor = divisor;
        self
    }

    /// Sets the SSTable count that triggers compaction.
    pub fn compaction_threshold(mut self, count: usize) -> Self {
        self.compaction_threshold = count;
        self
    }

    /// Enables or disables fsync before publishing a table.
    pub fn sync_on_publish(mut self, value: bool) -> Self {
        self.sync_on_publish = value;
        self
    }

    /// Returns the MemTable flush threshold in bytes.
    pub fn memtable_threshold(&self) -> usize {
        if self.flush_divisor == 0 {
            return 0;
        }
        usize::try_from(self.heap_budget / self.flush_divisor).unwrap_or(usize::MAX)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.heap_budget == 0 {
            return Err(crate::Error::invalid_argument("heap_budget must be > 0"));
        }
        if self.flush_divisor == 0 {
            return Err(crate::Error::invalid_argument("flush_divisor must be > 0"));
        }
        if self.memtable_threshold() == 0 {
            return Err(crate::Error::invalid_argument(
                "heap_budget / flush_divisor must be > 0",
            ));
        }
        if self.compaction_threshold == 0 {
            return Err(crate::Error::invalid_argument("compaction_threshold must be > 0"));
        }
        Ok(())
    }
}
