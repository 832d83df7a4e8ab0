//! Async helpers for persisting and reading the metadata log.
//!
//! This module owns all on-disk interactions with `_songbench_log/`:
//! - Tracking the `CURRENT` pointer and interpreting the "no file" case as
//!   "no commits yet".
//! - Writing zero-padded commit files with optimistic concurrency control so
//!   each version is created exactly once.
//! - Mapping storage-layer failures into [`CommitError`] variants so callers
//!   can tell conflicts, storage errors, and corrupt state apart.
use crate::storage::{self, TableLocation};
use crate::transaction_log::actions::{Commit, LogAction};
use crate::transaction_log::*;
use chrono::Utc;
use log::debug;
use snafu::{Backtrace, prelude::*};
use std::path::{Path, PathBuf};

/// Helper for reading and writing the commit log under a table root.
///
/// Layout:
///   <root>/_songbench_log/0000000000.json
///   <root>/_songbench_log/0000000001.json
///   <root>/_songbench_log/CURRENT
#[derive(Debug, Clone)]
pub struct TransactionLogStore {
    location: TableLocation,
}

impl TransactionLogStore {
    /// Name of the subdirectory containing the commit log.
    pub const LOG_DIR_NAME: &str = "_songbench_log";
    /// Name of the file that stores the current version pointer.
    pub const CURRENT_FILE_NAME: &str = "CURRENT";
    /// Number of digits used in zero-padded commit file names.
    pub const COMMIT_FILENAME_DIGITS: usize = 10;

    /// Create a new TransactionLogStore rooted at a table directory.
    pub fn new(location: TableLocation) -> Self {
        Self { location }
    }

    fn log_rel_dir() -> PathBuf {
        PathBuf::from(Self::LOG_DIR_NAME)
    }

    fn current_rel_path() -> PathBuf {
        Self::log_rel_dir().join(Self::CURRENT_FILE_NAME)
    }

    /// Get the TableLocation of the log store.
    pub fn location(&self) -> &TableLocation {
        &self.location
    }

    /// Relative path of the commit file for `version`.
    pub fn commit_rel_path(version: u64) -> PathBuf {
        let file_name = format!(
            "{:0width$}.json",
            version,
            width = Self::COMMIT_FILENAME_DIGITS
        );
        Self::log_rel_dir().join(file_name)
    }

    async fn write_atomic_rel(&self, rel: &Path, contents: &[u8]) -> Result<(), CommitError> {
        storage::write_atomic(&self.location, rel, contents)
            .await
            .context(StorageSnafu)
    }

    /// Load a single commit by version.
    ///
    /// - On storage-layer failures, returns `CommitError::Storage`.
    /// - On JSON parse failures, returns `CommitError::CorruptState`.
    pub async fn load_commit(&self, version: u64) -> Result<Commit, CommitError> {
        let rel = Self::commit_rel_path(version);
        let json = storage::read_to_string(&self.location, &rel)
            .await
            .context(StorageSnafu)?;

        serde_json::from_str(&json).map_err(|e| CommitError::CorruptState {
            msg: format!("failed to parse commit {version}: {e}"),
            backtrace: Backtrace::capture(),
        })
    }

    /// Load the CURRENT version pointer.
    ///
    /// - If CURRENT does not exist, the table has no commits: `Ok(None)`.
    /// - If CURRENT contains invalid or empty content, returns CorruptState.
    pub async fn load_current_version(&self) -> Result<Option<u64>, CommitError> {
        let rel = Self::current_rel_path();

        let contents = match storage::read_to_string(&self.location, &rel).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => return Err(CommitError::Storage { source }),
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return CorruptStateSnafu {
                msg: format!("CURRENT has empty content at {rel:?}"),
            }
            .fail();
        }

        let version = trimmed
            .parse::<u64>()
            .map_err(|e| CommitError::CorruptState {
                msg: format!("CURRENT has invalid content {trimmed:?}: {e}"),
                backtrace: Backtrace::capture(),
            })?;

        Ok(Some(version))
    }

    /// Commit a new version with an optimistic concurrency guard.
    ///
    /// `expected` is the version the caller believes is current (`None` for
    /// an empty log). The CURRENT check is advisory; the real guard is the
    /// create-only write of the commit file, so a racing writer surfaces as
    /// `CommitError::Storage` wrapping `StorageError::AlreadyExists`.
    ///
    /// If the process dies after the commit file is written but before
    /// CURRENT is updated, the orphaned commit is ignored by readers because
    /// they never look past CURRENT.
    pub async fn commit_with_expected_version(
        &self,
        expected: Option<u64>,
        actions: Vec<LogAction>,
    ) -> Result<u64, CommitError> {
        let current = self.load_current_version().await?;
        if current != expected {
            return ConflictSnafu {
                expected,
                found: current,
            }
            .fail();
        }

        let version = match expected {
            None => 0,
            Some(v) => v.checked_add(1).context(CorruptStateSnafu {
                msg: "version counter overflow".to_string(),
            })?,
        };

        let commit = Commit {
            version,
            base_version: expected,
            timestamp: Utc::now(),
            actions,
        };

        let json = serde_json::to_vec_pretty(&commit).map_err(|e| CommitError::CorruptState {
            msg: format!("failed to serialize commit {version}: {e}"),
            backtrace: Backtrace::capture(),
        })?;

        let commit_rel = Self::commit_rel_path(version);
        storage::write_new(&self.location, &commit_rel, &json)
            .await
            .context(StorageSnafu)?;

        let current_contents = format!("{version}\n");
        self.write_atomic_rel(&Self::current_rel_path(), current_contents.as_bytes())
            .await?;

        debug!(
            "committed version {version} with {} action(s) at {}",
            commit.actions.len(),
            self.location
        );
        Ok(version)
    }

    /// Load every commit from version 0 up to CURRENT, in order.
    pub async fn list_commits(&self) -> Result<Vec<Commit>, CommitError> {
        let Some(current) = self.load_current_version().await? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(current as usize + 1);
        for v in 0..=current {
            out.push(self.load_commit(v).await?);
        }
        Ok(out)
    }
}
