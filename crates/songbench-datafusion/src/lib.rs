//! DataFusion integration for `songbench-core`.
//!
//! This crate keeps all DataFusion types out of `songbench-core`. The main
//! entry point is [`SnapshotTableProvider`]; [`pretty`] renders query results
//! for terminal output.

pub mod pretty;
mod snapshot_provider;

pub use snapshot_provider::SnapshotTableProvider;
