//! Table layer.
//!
//! This is the user-facing API surface: create, open (optionally at an older
//! version), append and scan. A [`VersionedTable`] is a handle to the latest
//! state it has seen; a [`TableSnapshot`] is an immutable view pinned to one
//! version that readers such as query engines hold on to.

pub mod error;
mod scan;
mod write;

use std::collections::BTreeMap;

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use log::{debug, info};
use snafu::prelude::*;

pub use error::TableError;
pub use scan::SnapshotScan;

use crate::{
    storage::TableLocation,
    transaction_log::{
        ConflictSnafu, LogAction, LogicalSchema, SegmentId, SegmentMeta, TableMeta, TableState,
        TransactionLogStore,
    },
};
use error::{AlreadyExistsSnafu, InvalidSchemaSnafu, StorageUnavailableSnafu, TransactionLogSnafu};

/// Immutable view of a table at one committed version.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    location: TableLocation,
    state: TableState,
}

impl TableSnapshot {
    /// Open the snapshot at `version`, or at the latest version when `None`.
    pub async fn load(location: TableLocation, version: Option<u64>) -> Result<Self, TableError> {
        let table = match version {
            Some(v) => VersionedTable::open_at_version(location, v).await?,
            None => VersionedTable::open(location).await?,
        };
        Ok(table.snapshot())
    }

    /// Root location of the table.
    pub fn location(&self) -> &TableLocation {
        &self.location
    }

    /// Version this snapshot is pinned to.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Table metadata as of this version.
    pub fn table_meta(&self) -> &TableMeta {
        &self.state.table_meta
    }

    /// Arrow schema of the table.
    pub fn schema(&self) -> SchemaRef {
        self.state.table_meta.arrow_schema_ref()
    }

    /// Live segments in scan order.
    pub fn segments(&self) -> &BTreeMap<SegmentId, SegmentMeta> {
        &self.state.segments
    }

    /// Row count from segment metadata; no data is read.
    pub fn row_count(&self) -> u64 {
        self.state.row_count()
    }
}

/// Handle to a versioned table rooted at a [`TableLocation`].
#[derive(Debug)]
pub struct VersionedTable {
    log: TransactionLogStore,
    state: TableState,
}

impl VersionedTable {
    /// Create an empty table: version 0 holds only the table metadata.
    pub async fn create(location: TableLocation, schema: SchemaRef) -> Result<Self, TableError> {
        Self::create_with_batches(location, schema, Vec::new()).await
    }

    /// Create a table whose version 0 already contains `batches`.
    ///
    /// No segment is written when `batches` holds no rows.
    pub async fn create_with_batches(
        location: TableLocation,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self, TableError> {
        Self::create_inner(location, schema, None, batches).await
    }

    /// Like [`create_with_batches`](Self::create_with_batches), recording
    /// `description` in the table metadata.
    pub async fn create_with_description(
        location: TableLocation,
        schema: SchemaRef,
        description: impl Into<String>,
        batches: Vec<RecordBatch>,
    ) -> Result<Self, TableError> {
        Self::create_inner(location, schema, Some(description.into()), batches).await
    }

    async fn create_inner(
        location: TableLocation,
        schema: SchemaRef,
        description: Option<String>,
        batches: Vec<RecordBatch>,
    ) -> Result<Self, TableError> {
        let log = TransactionLogStore::new(location);

        if let Some(current_version) = log
            .load_current_version()
            .await
            .context(TransactionLogSnafu)?
        {
            return AlreadyExistsSnafu { current_version }.fail();
        }

        let logical = LogicalSchema::from_arrow(&schema).context(InvalidSchemaSnafu)?;
        let meta = match description {
            Some(description) => TableMeta::new(logical).with_description(description),
            None => TableMeta::new(logical),
        };
        let table_schema = meta.arrow_schema_ref();

        let mut actions = vec![LogAction::UpdateTableMeta(meta)];
        if let Some(segment) =
            write::write_segment(log.location(), &table_schema, 0, 0, &batches).await?
        {
            actions.push(LogAction::AddSegment(segment));
        }

        let version = log
            .commit_with_expected_version(None, actions)
            .await
            .context(TransactionLogSnafu)?;
        let state = log
            .rebuild_table_state_at(version)
            .await
            .context(TransactionLogSnafu)?;

        info!(
            "created table at {} with {} row(s)",
            log.location(),
            state.row_count()
        );
        Ok(Self { log, state })
    }

    /// Open the table at its latest committed version.
    pub async fn open(location: TableLocation) -> Result<Self, TableError> {
        Self::open_inner(location, None).await
    }

    /// Open the table as of `version` (time travel).
    pub async fn open_at_version(location: TableLocation, version: u64) -> Result<Self, TableError> {
        Self::open_inner(location, Some(version)).await
    }

    async fn open_inner(location: TableLocation, version: Option<u64>) -> Result<Self, TableError> {
        location
            .ensure_reachable()
            .await
            .context(StorageUnavailableSnafu {
                location: location.to_string(),
            })?;

        let log = TransactionLogStore::new(location);
        let rebuilt = match version {
            Some(v) => log.rebuild_table_state_at(v).await,
            None => log.rebuild_table_state().await,
        };
        let state =
            rebuilt.map_err(|e| TableError::from_resolve(log.location().to_string(), version, e))?;

        debug!(
            "opened {} at version {} ({} segment(s))",
            log.location(),
            state.version,
            state.segments.len()
        );
        Ok(Self { log, state })
    }

    /// Root location of the table.
    pub fn location(&self) -> &TableLocation {
        self.log.location()
    }

    /// Version this handle currently reflects.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Arrow schema of the table.
    pub fn schema(&self) -> SchemaRef {
        self.state.table_meta.arrow_schema_ref()
    }

    /// Pin the current state as an immutable snapshot.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            location: self.log.location().clone(),
            state: self.state.clone(),
        }
    }

    /// Append `batches` as one new segment and commit the next version.
    ///
    /// Returns the new version. Batches must match the table schema by
    /// column name and type; a table column that is not nullable rejects
    /// batches carrying nulls in it.
    pub async fn append_batches(&mut self, batches: Vec<RecordBatch>) -> Result<u64, TableError> {
        let expected = self.state.version;
        let next = expected + 1;
        let schema = self.schema();

        // A stale handle would otherwise collide on the segment path.
        let found = self
            .log
            .load_current_version()
            .await
            .context(TransactionLogSnafu)?;
        if found != Some(expected) {
            return Err(ConflictSnafu {
                expected: Some(expected),
                found,
            }
            .build())
            .context(TransactionLogSnafu);
        }

        let mut actions = Vec::new();
        if let Some(segment) =
            write::write_segment(self.log.location(), &schema, next, 0, &batches).await?
        {
            actions.push(LogAction::AddSegment(segment));
        }

        let version = self
            .log
            .commit_with_expected_version(Some(expected), actions)
            .await
            .context(TransactionLogSnafu)?;
        self.state = self
            .log
            .rebuild_table_state_at(version)
            .await
            .context(TransactionLogSnafu)?;

        info!(
            "appended version {version} to {} ({} row(s) total)",
            self.log.location(),
            self.state.row_count()
        );
        Ok(version)
    }
}
