//! Error types and SNAFU context selectors for the `table` module.
//!
//! `TableError` is what the public table API returns. Context selectors are
//! `pub(crate)` so the sibling `scan` and `write` modules can attach context
//! without re-exporting everything at the crate root.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::{
    storage::StorageError,
    transaction_log::{CommitError, LogicalSchemaError, SegmentError},
};

fn fmt_version(v: &Option<u64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "latest".to_string(),
    }
}

fn fmt_latest(v: &Option<u64>) -> String {
    match v {
        Some(v) => format!("latest committed version is {v}"),
        None => "table has no commits".to_string(),
    }
}

/// Errors from high-level table operations.
///
/// The first two variants are the ones callers usually branch on: the table
/// root cannot be reached at all, or it can but the requested version is not
/// there.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The table root does not exist or cannot be read.
    #[snafu(display("Table storage unavailable at {location}: {source}"))]
    StorageUnavailable {
        /// Location string as given by the caller.
        location: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// The requested version has not been committed.
    #[snafu(display(
        "Snapshot {} not found at {location} ({})",
        fmt_version(requested),
        fmt_latest(latest)
    ))]
    SnapshotNotFound {
        /// Location string of the table.
        location: String,
        /// Version asked for; `None` means "latest".
        requested: Option<u64>,
        /// Newest committed version, if any.
        latest: Option<u64>,
    },

    /// Any other error from the transaction log (conflicts, corrupt commits).
    #[snafu(display("Transaction log error: {source}"))]
    TransactionLog {
        /// Underlying transaction log / commit error.
        #[snafu(source, backtrace)]
        source: CommitError,
    },

    /// Attempt to create a table where commits already exist.
    #[snafu(display("Table already exists; current version is {current_version}"))]
    AlreadyExists {
        /// Current version of the existing table.
        current_version: u64,
    },

    /// The Arrow schema cannot be expressed as a table schema.
    #[snafu(display("Invalid table schema: {source}"))]
    InvalidSchema {
        /// Underlying schema conversion error.
        source: LogicalSchemaError,
    },

    /// Appended data does not match the table schema.
    #[snafu(display("Schema mismatch: table is {expected}, batch is {found}"))]
    SchemaMismatch {
        /// Rendered table schema.
        expected: String,
        /// Rendered schema of the offending batch.
        found: String,
    },

    /// A freshly written segment failed validation.
    #[snafu(display("Invalid segment: {source}"))]
    InvalidSegment {
        /// Underlying segment validation error.
        #[snafu(source, backtrace)]
        source: SegmentError,
    },

    /// Storage error while reading or writing table data.
    #[snafu(display("Storage error while accessing table data: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Parquet decode error while scanning a segment.
    #[snafu(display("Parquet read error in {path}: {source}"))]
    ParquetRead {
        /// Segment path relative to the table root.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Parquet encode error while writing a segment.
    #[snafu(display("Parquet write error: {source}"))]
    ParquetWrite {
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow error while decoding or re-typing batches.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

impl TableError {
    /// Map a log error raised while resolving `requested` into the
    /// user-facing variant.
    pub(crate) fn from_resolve(location: String, requested: Option<u64>, err: CommitError) -> Self {
        match err {
            CommitError::VersionNotFound { latest, .. } => TableError::SnapshotNotFound {
                location,
                requested,
                latest,
            },
            source => TableError::TransactionLog { source },
        }
    }
}
