//! Session seams used by the loader and the runner.
//!
//! The loader only needs to check, drop and register relation names; the
//! runner only needs to submit SQL. Both are traits so tests can hand in a
//! catalog that misbehaves or a session that counts submissions, while
//! production code uses one [`DataFusionSession`] for both.

use std::sync::Arc;

use async_trait::async_trait;
use datafusion::catalog::TableProvider;
use datafusion::dataframe::DataFrame;
use datafusion::error::DataFusionError;
use datafusion::prelude::{SessionConfig, SessionContext};
use snafu::Snafu;

/// Errors from catalog operations on a relation name.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CatalogError {
    /// The relation was not registered when it was dropped.
    #[snafu(display("relation '{relation}' not found"))]
    RelationNotFound { relation: String },

    /// The engine refused the catalog change.
    #[snafu(display("catalog error for '{relation}': {source}"))]
    Engine {
        relation: String,
        source: DataFusionError,
    },
}

/// Name-level catalog operations on a live session.
pub trait RelationCatalog: Send + Sync {
    /// Whether `relation` is currently registered.
    fn relation_exists(&self, relation: &str) -> Result<bool, CatalogError>;

    /// Drop `relation`; `CatalogError::RelationNotFound` if it is absent.
    fn deregister_relation(&self, relation: &str) -> Result<(), CatalogError>;

    /// Bind `relation` to `provider`. Fails if the name is taken.
    fn register_relation(
        &self,
        relation: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<(), CatalogError>;
}

/// Submits SQL against the session's current catalog state.
#[async_trait]
pub trait QuerySession: Send + Sync {
    /// Plan `sql`. DataFusion is lazy: no data is read until the returned
    /// frame is collected.
    async fn submit(&self, sql: &str) -> Result<DataFrame, DataFusionError>;
}

/// A DataFusion `SessionContext` used as both catalog and query session.
#[derive(Clone)]
pub struct DataFusionSession {
    ctx: SessionContext,
}

impl DataFusionSession {
    pub fn new() -> Self {
        let cfg = SessionConfig::new();
        Self {
            ctx: SessionContext::new_with_config(cfg),
        }
    }
}

impl Default for DataFusionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationCatalog for DataFusionSession {
    fn relation_exists(&self, relation: &str) -> Result<bool, CatalogError> {
        self.ctx
            .table_exist(relation)
            .map_err(|source| CatalogError::Engine {
                relation: relation.to_string(),
                source,
            })
    }

    fn deregister_relation(&self, relation: &str) -> Result<(), CatalogError> {
        match self.ctx.deregister_table(relation) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => RelationNotFoundSnafu { relation }.fail(),
            Err(source) => Err(CatalogError::Engine {
                relation: relation.to_string(),
                source,
            }),
        }
    }

    fn register_relation(
        &self,
        relation: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<(), CatalogError> {
        self.ctx
            .register_table(relation, provider)
            .map(|_| ())
            .map_err(|source| CatalogError::Engine {
                relation: relation.to_string(),
                source,
            })
    }
}

#[async_trait]
impl QuerySession for DataFusionSession {
    async fn submit(&self, sql: &str) -> Result<DataFrame, DataFusionError> {
        self.ctx.sql(sql).await
    }
}
