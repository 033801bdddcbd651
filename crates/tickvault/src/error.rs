//! Error and Result types for tickvault operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for tickvault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all tickvault operations.
///
/// Every public operation surfaces failures through this enum; the engine
/// retries nothing and recovers nothing. A failed append leaves the series
/// in its pre-call state.
#[derive(Debug, Error)]
pub enum Error {
    /// The container file already exists and overwriting was not requested.
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// The container file does not exist.
    #[error("file not found: {}", .0.display())]
    FileMissing(PathBuf),

    /// A series with this name already exists in the file.
    #[error("series already exists: {0}")]
    SeriesExists(String),

    /// No series with this name exists in the file.
    #[error("series not found: {0}")]
    SeriesMissing(String),

    /// A table with this name already exists in the group.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The requested table is absent from its group.
    #[error("table not found: {0}")]
    TableMissing(String),

    /// The table exists but its stored metadata does not parse.
    #[error("table metadata is corrupt: {0}")]
    TableCorrupt(String),

    /// A field type string is unsupported or malformed.
    #[error("invalid field specification: {0}")]
    FieldSpecInvalid(String),

    /// No field with this name exists in the structure.
    #[error("no field named '{0}'")]
    FieldMissing(String),

    /// Records belonging to different structures were mixed.
    #[error("record structures do not match")]
    StructureMismatch,

    /// A record index is outside the bounds of its table or set.
    #[error("record index {index} out of range (size {size})")]
    IndexOutOfRange {
        /// The offending record index.
        index: u64,
        /// The size of the table or record set.
        size: u64,
    },

    /// A requested range has its end before its start.
    #[error("invalid range: {0}")]
    BadRange(String),

    /// An append would violate the monotone-timestamp invariant.
    #[error("timestamp {0} overlaps existing data")]
    TimestampOverlap(i64),

    /// A cell conversion outside the supported matrix was attempted.
    #[error("unsupported cell conversion: {0}")]
    TypeConversion(String),

    /// The requested timestamp range lies outside all stored data.
    #[error("no records in the requested range")]
    NoRecords,

    /// An error surfaced by the underlying container layer.
    #[error("storage error: {0}")]
    Storage(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
