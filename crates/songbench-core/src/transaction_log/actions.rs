//! Log actions and commit payload definitions.
//!
//! Each commit file stores a [`Commit`] containing ordered [`LogAction`] values
//! that evolve table state: adding/removing segments or replacing table
//! metadata.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transaction_log::{
    segments::{SegmentId, SegmentMeta},
    table_metadata::TableMeta,
};

/// An action recorded in a commit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogAction {
    /// Add or replace a segment.
    AddSegment(SegmentMeta),

    /// Remove a segment by its logical ID.
    RemoveSegment {
        /// Logical identifier of the segment to remove.
        segment_id: SegmentId,
    },

    /// Replace table-level metadata.
    UpdateTableMeta(TableMeta),
}

impl LogAction {
    /// Short label used in history listings.
    pub fn label(&self) -> String {
        match self {
            LogAction::AddSegment(seg) => format!("add {} ({} rows)", seg.segment_id, seg.row_count),
            LogAction::RemoveSegment { segment_id } => format!("remove {segment_id}"),
            LogAction::UpdateTableMeta(meta) => format!("metadata {}", meta.logical_schema()),
        }
    }
}

/// A single, immutable commit in the metadata log.
///
/// Commits are written to files such as `_songbench_log/0000000000.json`.
/// The version field must match the file name; `base_version` records what
/// the writer believed was the current version (`None` for the first commit).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// The version number of this commit (monotonic, starting from 0).
    pub version: u64,

    /// The version the writer saw as current when preparing this commit.
    #[serde(default)]
    pub base_version: Option<u64>,

    /// Commit creation timestamp, stored as RFC3339 UTC.
    pub timestamp: DateTime<Utc>,

    /// Ordered list of actions applied by this commit.
    pub actions: Vec<LogAction>,
}
