//! Segment metadata recorded by `AddSegment` actions.
//!
//! A segment is one immutable Parquet file under the table root. The log only
//! stores its relative path, row count and size; the bytes are read at scan
//! time. `SegmentMeta::for_parquet` is the IO boundary that checks a freshly
//! written file before it is referenced by a commit.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::storage::{self, StorageError, TableLocation};

/// Logical identifier for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic segment id for the `ordinal`-th segment written by `version`.
///
/// Ids sort in commit order, which is also the scan order.
pub fn segment_id_for(version: u64, ordinal: usize) -> SegmentId {
    SegmentId(format!("seg-{version:010}-{ordinal:04}"))
}

/// Relative data path for a segment id.
pub fn segment_rel_path(segment_id: &SegmentId) -> String {
    format!("data/{}.parquet", segment_id.0)
}

/// File format of a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Apache Parquet.
    #[default]
    Parquet,
}

/// Metadata for one live data segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Logical id; also the key in `TableState::segments`.
    pub segment_id: SegmentId,
    /// Path relative to the table root.
    pub path: String,
    /// Storage format of the segment file.
    #[serde(default)]
    pub format: FileFormat,
    /// Number of rows in the segment.
    pub row_count: u64,
    /// Size of the segment file in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// Errors raised while validating a segment file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SegmentError {
    /// The file is missing or not a regular file.
    #[snafu(display("Segment file missing or not a regular file: {path}"))]
    MissingFile {
        /// The path to the missing or invalid file.
        path: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The file is too short to be a Parquet file.
    #[snafu(display("Segment file too short to be Parquet: {path}"))]
    TooShort {
        /// Offending path.
        path: String,
    },

    /// Missing `PAR1` magic at the head or the tail of the file.
    #[snafu(display("Segment file has invalid Parquet magic: {path}"))]
    InvalidMagic {
        /// Offending path.
        path: String,
    },

    /// Other storage failure while validating the segment.
    #[snafu(display("I/O error while validating segment at {path}: {source}"))]
    Storage {
        /// Offending path.
        path: String,
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },
}

fn map_storage_error(path: &str, err: StorageError) -> SegmentError {
    if err.is_not_found() {
        SegmentError::MissingFile {
            path: path.to_string(),
            backtrace: Backtrace::capture(),
        }
    } else {
        SegmentError::Storage {
            path: path.to_string(),
            source: err,
        }
    }
}

impl SegmentMeta {
    /// Build metadata for a Parquet segment after checking its magic bytes.
    pub async fn for_parquet(
        location: &TableLocation,
        segment_id: SegmentId,
        path: &str,
        row_count: u64,
    ) -> Result<Self, SegmentError> {
        let probe = storage::read_head_tail_4(location, Path::new(path))
            .await
            .map_err(|e| map_storage_error(path, e))?;

        if probe.len < 8 {
            return TooShortSnafu { path }.fail();
        }

        const PARQUET_MAGIC: &[u8; 4] = b"PAR1";
        if &probe.head != PARQUET_MAGIC || &probe.tail != PARQUET_MAGIC {
            return InvalidMagicSnafu { path }.fail();
        }

        Ok(SegmentMeta {
            segment_id,
            path: path.to_string(),
            format: FileFormat::Parquet,
            row_count,
            file_size: Some(probe.len),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn segment_ids_sort_in_commit_order() {
        let mut ids = vec![
            segment_id_for(10, 0),
            segment_id_for(2, 1),
            segment_id_for(2, 0),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                segment_id_for(2, 0),
                segment_id_for(2, 1),
                segment_id_for(10, 0)
            ]
        );
        assert_eq!(
            segment_rel_path(&segment_id_for(3, 0)),
            "data/seg-0000000003-0000.parquet"
        );
    }

    #[test]
    fn segment_id_serializes_as_plain_string() -> TestResult {
        let json = serde_json::to_string(&SegmentId("seg-a".to_string()))?;
        assert_eq!(json, r#""seg-a""#);
        Ok(())
    }

    #[tokio::test]
    async fn for_parquet_rejects_bad_magic() -> TestResult {
        let tmp = TempDir::new()?;
        let location = TableLocation::local(tmp.path());
        tokio::fs::create_dir_all(tmp.path().join("data")).await?;
        tokio::fs::write(tmp.path().join("data/bad.parquet"), b"NOTPARQUETFILE").await?;

        let err = SegmentMeta::for_parquet(
            &location,
            SegmentId("bad".to_string()),
            "data/bad.parquet",
            1,
        )
        .await
        .expect_err("expected invalid magic");
        assert!(matches!(err, SegmentError::InvalidMagic { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn for_parquet_reports_missing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = TableLocation::local(tmp.path());

        let err = SegmentMeta::for_parquet(
            &location,
            SegmentId("gone".to_string()),
            "data/gone.parquet",
            1,
        )
        .await
        .expect_err("expected missing file");
        assert!(matches!(err, SegmentError::MissingFile { .. }));
        Ok(())
    }
}
