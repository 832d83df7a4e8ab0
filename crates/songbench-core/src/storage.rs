//! Storage backend and path utilities.
//!
//! This module centralizes all filesystem access for `songbench-core`. It maps
//! a table root to the files the format reads and writes:
//!
//! - The metadata log directory (`<root>/_songbench_log/`).
//! - Individual commit files (`<root>/_songbench_log/0000000000.json`).
//! - The `CURRENT` pointer that records the latest committed version.
//! - Parquet data segments (`<root>/data/*.parquet`).
//!
//! Higher layers (`transaction_log`, `table`) only deal in table-relative
//! paths and the small helpers below; they never build absolute paths by hand.
//! Only the local filesystem is supported, but every helper dispatches on
//! [`TableLocation`] so an object-store backend can slot in later.

mod table_location;

pub use table_location::TableLocation;

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    fmt,
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by the storage backend implementation.
///
/// Backend-specific I/O errors are wrapped here so higher layers can map them
/// into [`StorageError`] variants with path context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The specified path already exists when creation was requested with
    /// create-new semantics.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The path that was found to already exist.
        path: String,
        /// Underlying backend error that indicates the existing resource.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The location string uses a scheme this backend cannot serve.
    #[snafu(display("Unsupported storage scheme '{scheme}' in location {spec}"))]
    UnsupportedScheme {
        /// Scheme prefix found in the location (for example `hdfs`).
        scheme: String,
        /// The full location string supplied by the caller.
        spec: String,
    },
}

impl StorageError {
    /// Returns true when the error means "the thing does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

fn join_local(location: &TableLocation, rel: &Path) -> PathBuf {
    match location {
        TableLocation::Local(root) => root.join(rel),
    }
}

fn classify_io(err: io::Error, path: String) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
        _ => StorageError::OtherIo {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `rel_path` inside `location` using write-then-rename.
///
/// The payload goes to a sibling `.tmp` file, is synced, and is then renamed
/// over the target so readers never observe a partially written file.
pub async fn write_atomic(
    location: &TableLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.write_all(contents)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.sync_all()
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;
    }

    fs::rename(&tmp_path, &abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Create a *new* file at `rel_path` and write `contents`, failing with
/// [`StorageError::AlreadyExists`] if the file is already there.
///
/// Commit files and data segments go through this so each version and each
/// segment is written exactly once.
pub async fn write_new(
    location: &TableLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs).await?;

    let path_str = abs.display().to_string();

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&abs)
        .await
        .map_err(|e| classify_io(e, path_str.clone()))?;

    file.write_all(contents)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?;

    file.sync_all()
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: path_str })?;

    Ok(())
}

/// Read the file at `rel_path` within `location` as UTF-8.
pub async fn read_to_string(location: &TableLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = join_local(location, rel_path);
    fs::read_to_string(&abs)
        .await
        .map_err(|e| classify_io(e, abs.display().to_string()))
}

/// Read the full contents of a file at `rel_path` within `location`.
pub async fn read_all_bytes(location: &TableLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = join_local(location, rel_path);
    fs::read(&abs)
        .await
        .map_err(|e| classify_io(e, abs.display().to_string()))
}

/// Length plus first/last 4 bytes of a file, used to sanity check Parquet
/// segments (`PAR1` magic on both ends) without reading the whole file.
pub struct FileHeadTail4 {
    /// Length of the file in bytes.
    pub len: u64,
    /// First 4 bytes of the file (zero-filled if the file is shorter).
    pub head: [u8; 4],
    /// Last 4 bytes of the file (zero-filled if the file is shorter than 8 bytes).
    pub tail: [u8; 4],
}

/// Read the length, first 4 bytes, and last 4 bytes of a file.
///
/// Non-regular files are reported as [`StorageError::NotFound`].
pub async fn read_head_tail_4(
    location: &TableLocation,
    rel_path: &Path,
) -> StorageResult<FileHeadTail4> {
    let abs = join_local(location, rel_path);
    let path_str = abs.display().to_string();

    let meta = fs::metadata(&abs)
        .await
        .map_err(|e| classify_io(e, path_str.clone()))?;

    if !meta.is_file() {
        return Err(BackendError::Local(io::Error::other("not a regular file")))
            .context(NotFoundSnafu { path: path_str });
    }

    let len = meta.len();
    let mut file = fs::File::open(&abs)
        .await
        .map_err(|e| classify_io(e, path_str.clone()))?;

    let mut head = [0u8; 4];
    let mut tail = [0u8; 4];

    if len >= 4 {
        file.read_exact(&mut head)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_str.clone(),
            })?;
    }

    if len >= 8 {
        file.seek(SeekFrom::End(-4))
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: path_str.clone(),
            })?;
        file.read_exact(&mut tail)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu { path: path_str })?;
    }

    Ok(FileHeadTail4 { len, head, tail })
}
