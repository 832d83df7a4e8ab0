use std::{fmt, path::PathBuf};

use snafu::ResultExt;
use tokio::fs;

use crate::storage::{
    BackendError, NotFoundSnafu, OtherIoSnafu, StorageResult, UnsupportedSchemeSnafu,
};

/// Root location of a versioned table.
///
/// Only the local filesystem is supported today; `file://` URIs are accepted
/// and normalized to plain paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableLocation {
    /// A table stored on the local filesystem at the given path.
    Local(PathBuf),
}

impl TableLocation {
    /// Creates a new `TableLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        TableLocation::Local(root.into())
    }

    /// Parse a user-facing location string.
    ///
    /// Accepts plain paths and `file://` URIs. Any other `scheme://` prefix
    /// (for example `hdfs://` or `s3://`) is rejected with
    /// [`StorageError::UnsupportedScheme`].
    pub fn parse(spec: &str) -> StorageResult<Self> {
        if let Some(rest) = spec.strip_prefix("file://") {
            return Ok(TableLocation::local(rest));
        }

        if let Some((scheme, _)) = spec.split_once("://") {
            return UnsupportedSchemeSnafu {
                scheme: scheme.to_string(),
                spec: spec.to_string(),
            }
            .fail();
        }

        Ok(TableLocation::local(spec))
    }

    /// Check that the table root exists and is a directory.
    ///
    /// A missing root (or a root that is not a directory) maps to
    /// [`StorageError::NotFound`]; permission and other I/O failures map to
    /// [`StorageError::OtherIo`].
    pub async fn ensure_reachable(&self) -> StorageResult<()> {
        match self {
            TableLocation::Local(root) => {
                let path = root.display().to_string();
                let meta = match fs::metadata(root).await {
                    Ok(meta) => meta,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(BackendError::Local(e)).context(NotFoundSnafu { path });
                    }
                    Err(e) => {
                        return Err(BackendError::Local(e)).context(OtherIoSnafu { path });
                    }
                };

                if !meta.is_dir() {
                    return Err(BackendError::Local(std::io::Error::other(
                        "table root is not a directory",
                    )))
                    .context(NotFoundSnafu { path });
                }

                Ok(())
            }
        }
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLocation::Local(root) => write!(f, "{}", root.display()),
        }
    }
}

impl From<TableLocation> for PathBuf {
    fn from(location: TableLocation) -> Self {
        match location {
            TableLocation::Local(root) => root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_accepts_plain_paths_and_file_uris() -> TestResult {
        assert_eq!(
            TableLocation::parse("/delta/spotify")?,
            TableLocation::local("/delta/spotify")
        );
        assert_eq!(
            TableLocation::parse("file:///delta/spotify")?,
            TableLocation::local("/delta/spotify")
        );
        Ok(())
    }

    #[test]
    fn parse_rejects_remote_schemes() {
        let err = TableLocation::parse("hdfs://127.0.1.1:9000/delta/spotify")
            .expect_err("hdfs is not served by the local backend");
        assert!(matches!(err, StorageError::UnsupportedScheme { scheme, .. } if scheme == "hdfs"));
    }

    #[tokio::test]
    async fn ensure_reachable_distinguishes_missing_root() -> TestResult {
        let tmp = TempDir::new()?;
        TableLocation::local(tmp.path()).ensure_reachable().await?;

        let missing = TableLocation::local(tmp.path().join("nope"));
        let err = missing
            .ensure_reachable()
            .await
            .expect_err("missing root should fail");
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn ensure_reachable_rejects_plain_files() -> TestResult {
        let tmp = TempDir::new()?;
        let file = tmp.path().join("table.parquet");
        tokio::fs::write(&file, b"x").await?;

        let err = TableLocation::local(&file)
            .ensure_reachable()
            .await
            .expect_err("a file is not a table root");
        assert!(err.is_not_found());
        Ok(())
    }
}
