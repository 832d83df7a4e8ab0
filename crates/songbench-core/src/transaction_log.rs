//! Append-only metadata log and table state.
//!
//! This module implements the versioning layer of `songbench` tables and
//! defines the logical metadata model written to and read from the
//! `_songbench_log/` directory.
//!
//! - A simple append-only commit log stored as JSON files under
//!   `_songbench_log/` (for example, `_songbench_log/0000000000.json`).
//! - A `CURRENT` pointer that tracks the latest committed table version.
//!   A missing pointer means "no commits yet".
//! - Strongly-typed metadata structures such as `TableMeta`, `SegmentMeta`
//!   and `LogAction`.
//! - An optimistic concurrency model based on version guards, so that
//!   commits fail cleanly with a conflict error when the expected
//!   version does not match the current version.
//! - A `TableState` representation materialized from the log at any
//!   committed version, which is what time travel reads from.
//!
//! ## On-disk layout
//!
//! ```text
//! table_root/
//!   _songbench_log/
//!     CURRENT                  # latest committed version (e.g. "2\n")
//!     0000000000.json          # Commit version 0 (table creation)
//!     0000000001.json          # Commit version 1
//!     0000000002.json          # Commit version 2
//!   data/                      # Parquet segments
//! ```
//!
//! Each `*.json` file contains a single [`Commit`] value, encoded as JSON. For
//! example:
//!
//! ```json
//! {
//!   "version": 1,
//!   "base_version": 0,
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "actions": [
//!     {
//!       "AddSegment": {
//!         "segment_id": "seg-0000000001-0000",
//!         "path": "data/seg-0000000001-0000.parquet",
//!         "format": "parquet",
//!         "row_count": 1024
//!       }
//!     }
//!   ]
//! }
//! ```
pub mod actions;
pub mod log_store;
pub mod segments;
pub mod table_metadata;
pub mod table_state;

pub use actions::{Commit, LogAction};
pub use log_store::TransactionLogStore;
pub use segments::{FileFormat, SegmentError, SegmentId, SegmentMeta};
pub use table_metadata::{
    LogicalColumn, LogicalDataType, LogicalSchema, LogicalSchemaError, LogicalTimestampUnit,
    TableMeta,
};
pub use table_state::TableState;

use snafu::{Backtrace, prelude::*};

use crate::storage::StorageError;

fn fmt_version(v: &Option<u64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "<none>".to_string(),
    }
}

/// Errors that can occur while reading or writing the commit log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommitError {
    /// The caller's expected version does not match the CURRENT pointer.
    #[snafu(display(
        "Commit conflict: expected version {}, but CURRENT is {}",
        fmt_version(expected),
        fmt_version(found)
    ))]
    Conflict {
        /// The version the caller expected to be current.
        expected: Option<u64>,
        /// The actual current version found.
        found: Option<u64>,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A requested version has not been committed.
    #[snafu(display(
        "Version {requested} does not exist (latest committed version: {})",
        fmt_version(latest)
    ))]
    VersionNotFound {
        /// The version asked for.
        requested: u64,
        /// The newest committed version, if any.
        latest: Option<u64>,
    },

    /// Underlying storage error while working with the log or CURRENT file.
    ///
    /// Backtraces are delegated to the inner StorageError.
    #[snafu(display("Storage error while accessing commit log: {source}"))]
    Storage {
        /// Underlying storage error returned by the storage backend.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// The log or CURRENT file is in an unexpected / malformed state.
    #[snafu(display("Corrupt log state: {msg}"))]
    CorruptState {
        /// A description of the corrupt state.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}
