//! Core engine for a small versioned columnar table format.
//!
//! This crate provides the storage side of `songbench`:
//!
//! - An append-only JSON commit log with version-guard optimistic
//!   concurrency (`transaction_log` module). The first commit is version 0.
//! - Immutable Parquet segments referenced by the log.
//! - A `VersionedTable` handle for create/open/append and a `TableSnapshot`
//!   pinned to one version for readers (`table` module).
//! - Local filesystem helpers with create-only and atomic-replace writes
//!   (`storage` module).
//!
//! Query engines depend on this crate through `TableSnapshot` and never touch
//! the log directly.
#![deny(missing_docs)]
pub mod storage;
pub mod table;
pub mod transaction_log;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
