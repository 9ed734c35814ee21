//! Compaction module for rewriting SSTables.
//!
//! Compaction merges a set of SSTables into a single SSTable holding only
//! the newest live version of every key.
//!
//! ## Compaction Trigger
//!
//! The engine compacts once a flush pushes the number of visible SSTables
//! past `Options::compaction_threshold`. All tables are compacted together.
//!
//! ## Process
//!
//! 1. Merge all input tables with a multi-way merge iterator (merge.rs)
//! 2. Collapse each key to its newest version
//! 3. Drop tombstones and expired records
//! 4. Write the survivors to a new SSTable and publish it atomically
//! 5. The engine swaps the table set and deletes the inputs

pub mod merge;

pub use merge::{merge_collapse, CollapseIterator, MergeIterator, RecordSource};

use crate::clock;
use crate::error::Result;
use crate::sstable::{SSTable, SSTableBuilder};
use std::path::PathBuf;
use std::sync::Arc;

/// Compaction job that executes the compaction process
pub struct CompactionJob {
    /// Input SSTables to compact
    pub inputs: Vec<Arc<SSTable>>,
    /// Database directory
    pub db_path: PathBuf,
    /// Sync the output before publishing it
    pub sync: bool,
}

impl CompactionJob {
    /// Create a new compaction job
    pub fn new(inputs: Vec<Arc<SSTable>>, db_path: PathBuf, sync: bool) -> Self {
        Self { inputs, db_path, sync }
    }

    /// Execute the compaction, writing the output as table `file_number`.
    ///
    /// Dropping tombstones is only safe because the inputs cover every
    /// SSTable: no older version of a removed key can survive elsewhere.
    pub fn run(&self, file_number: u64) -> Result<CompactionResult> {
        log::info!(
            "Starting compaction: {} input files -> table {}",
            self.inputs.len(),
            file_number
        );

        let mut sources: Vec<RecordSource> = Vec::with_capacity(self.inputs.len());
        for table in &self.inputs {
            sources.push(Box::new(table.iter(b"")?));
        }

        let mut builder = SSTableBuilder::new(&self.db_path, file_number, self.sync)?;
        let mut entry_count = 0u64;
        let mut dropped_count = 0u64;

        for record in merge_collapse(sources)? {
            let record = record?;
            if record.is_removed_at(clock::wall_millis()) {
                dropped_count += 1;
                continue;
            }
            builder.add(&record)?;
            entry_count += 1;
        }

        // Nothing survived: no output table
        if entry_count == 0 {
            builder.abandon()?;
            log::info!("Compaction produced no output ({} dead keys dropped)", dropped_count);
            return Ok(CompactionResult { table: None, entry_count, dropped_count });
        }

        let output_path = builder.finish()?;
        let table = SSTable::open(&output_path)?;

        log::info!(
            "Compaction completed: {} entries written, {} dead keys dropped, file size: {} bytes",
            entry_count,
            dropped_count,
            table.file_size()
        );

        Ok(CompactionResult { table: Some(table), entry_count, dropped_count })
    }
}

/// Result of a compaction operation
pub struct CompactionResult {
    /// The published output table (`None` if every key was dead)
    pub table: Option<SSTable>,
    /// Number of records written
    pub entry_count: u64,
    /// Number of tombstoned or expired keys dropped
    pub dropped_count: u64,
}
