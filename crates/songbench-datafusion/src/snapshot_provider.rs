use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::catalog::TableProvider;
use datafusion::datasource::{MemTable, TableType};
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::logical_expr::Expr;
use datafusion::physical_plan::ExecutionPlan;
use log::debug;
use songbench_core::table::TableSnapshot;

/// DataFusion table provider over one pinned [`TableSnapshot`].
///
/// Registering the provider reads no data. Segment bytes are read when
/// DataFusion asks for a physical plan, and the decoded batches are handed to
/// an in-memory plan that applies projection and limit.
#[derive(Debug)]
pub struct SnapshotTableProvider {
    snapshot: Arc<TableSnapshot>,
    schema: SchemaRef,
}

impl SnapshotTableProvider {
    /// Creates a provider for the given snapshot.
    pub fn new(snapshot: Arc<TableSnapshot>) -> Self {
        let schema = snapshot.schema();
        Self { snapshot, schema }
    }

    /// The snapshot this provider serves.
    pub fn snapshot(&self) -> &TableSnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl TableProvider for SnapshotTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    async fn scan(
        &self,
        state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        let batches = self
            .snapshot
            .collect_batches()
            .await
            .map_err(|e| DataFusionError::External(Box::new(e)))?;

        debug!(
            "scanning {} at version {}: {} batch(es)",
            self.snapshot.location(),
            self.snapshot.version(),
            batches.len()
        );

        let mem = MemTable::try_new(Arc::clone(&self.schema), vec![batches])?;
        mem.scan(state, projection, filters, limit).await
    }
}
