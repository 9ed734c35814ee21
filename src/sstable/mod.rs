//! SSTable (Sorted String Table) implementation.
//!
//! SSTable is an immutable, sorted file of [`Record`](crate::record::Record)s
//! followed by an offset index that allows binary search by key.
//!
//! ## File Format
//!
//! ```text
//! [Record 0]
//! [Record 1]
//! ...
//! [Record N-1]
//! [offset_0 .. offset_N]   // N+1 u64, offset_0 = 0, offset_i = end of record i-1
//! [N: u64]                 // record count
//! ```
//!
//! All integers are big-endian. See [`crate::record`] for the record layout.
//!
//! ## Publishing
//!
//! Tables are written to `NNNNNN.tmp` and renamed to `NNNNNN.dat` once
//! complete, so a reader never observes a partially written table.

pub mod builder;
pub mod reader;

pub use builder::SSTableBuilder;
pub use reader::{SSTable, SSTableIterator};

/// Extension of published table files.
pub const TABLE_EXTENSION: &str = "dat";

/// Extension of tables still being written.
pub const TEMP_EXTENSION: &str = "tmp";

/// Size of one offset-index entry and of the trailing record count.
pub const OFFSET_SIZE: usize = 8;

/// Returns the file name of the published table with the given number.
pub fn table_filename(file_number: u64) -> String {
    format!("{:06}.{}", file_number, TABLE_EXTENSION)
}

/// Returns the file name used while writing the table with the given number.
pub fn temp_filename(file_number: u64) -> String {
    format!("{:06}.{}", file_number, TEMP_EXTENSION)
}

/// Parses a table file name, returning its file number.
///
/// Returns `None` for temporary files and anything else that is not a table.
pub fn parse_table_filename(filename: &str) -> Option<u64> {
    filename
        .strip_suffix(TABLE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .and_then(|num| num.parse::<u64>().ok())
}
