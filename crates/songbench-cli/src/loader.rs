//! Load a versioned snapshot and bind it to a relation name.

use std::sync::Arc;

use datafusion::catalog::TableProvider;
use log::{debug, info};
use snafu::ResultExt;
use songbench_core::{storage::TableLocation, table::TableSnapshot};
use songbench_datafusion::SnapshotTableProvider;

use crate::{
    catalog::{CatalogError, RelationCatalog},
    error::{CliError, CliResult, RegistrationSnafu},
};

/// What the loader bound, for logging and reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRelation {
    pub relation: String,
    pub version: u64,
    pub row_count: u64,
}

/// Make `relation` refer to `provider`, replacing any existing binding.
///
/// The name is dropped first when the catalog reports it as present. If the
/// drop finds nothing (someone else removed it in between) the name is
/// absent, which is what we wanted, so that case is not an error.
pub fn replace_relation<C: RelationCatalog + ?Sized>(
    catalog: &C,
    relation: &str,
    provider: Arc<dyn TableProvider>,
) -> CliResult<()> {
    if catalog
        .relation_exists(relation)
        .context(RegistrationSnafu { relation })?
    {
        match catalog.deregister_relation(relation) {
            Ok(()) => debug!("dropped existing relation '{relation}'"),
            Err(CatalogError::RelationNotFound { .. }) => {
                debug!("relation '{relation}' vanished before it was dropped")
            }
            Err(source) => {
                return Err(source).context(RegistrationSnafu { relation });
            }
        }
    }

    catalog
        .register_relation(relation, provider)
        .context(RegistrationSnafu { relation })
}

/// Open `location` at `version` (latest when `None`) and register it as
/// `relation` on `catalog`.
pub async fn load_and_register<C: RelationCatalog + ?Sized>(
    catalog: &C,
    location: &TableLocation,
    version: Option<u64>,
    relation: &str,
) -> CliResult<LoadedRelation> {
    let snapshot = TableSnapshot::load(location.clone(), version)
        .await
        .map_err(|e| CliError::from_open(&location.to_string(), e))?;

    let provider = Arc::new(SnapshotTableProvider::new(Arc::new(snapshot)));
    let loaded = LoadedRelation {
        relation: relation.to_string(),
        version: provider.snapshot().version(),
        row_count: provider.snapshot().row_count(),
    };
    replace_relation(catalog, relation, provider)?;

    info!(
        "registered '{}' from {} at version {} ({} rows)",
        loaded.relation, location, loaded.version, loaded.row_count
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataFusionSession, QuerySession};
    use arrow::array::Int64Array;
    use datafusion::datasource::empty::EmptyTable;
    use songbench_core::test_util::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Catalog that reports the name as present but loses it before the drop.
    #[derive(Default)]
    struct RacingCatalog {
        registered: Mutex<Vec<String>>,
    }

    impl RelationCatalog for RacingCatalog {
        fn relation_exists(&self, _relation: &str) -> Result<bool, CatalogError> {
            Ok(true)
        }

        fn deregister_relation(&self, relation: &str) -> Result<(), CatalogError> {
            Err(CatalogError::RelationNotFound {
                relation: relation.to_string(),
            })
        }

        fn register_relation(
            &self,
            relation: &str,
            _provider: Arc<dyn TableProvider>,
        ) -> Result<(), CatalogError> {
            self.registered
                .lock()
                .expect("lock")
                .push(relation.to_string());
            Ok(())
        }
    }

    /// Catalog whose drop fails for a reason other than "not found".
    struct LockedCatalog;

    impl RelationCatalog for LockedCatalog {
        fn relation_exists(&self, _relation: &str) -> Result<bool, CatalogError> {
            Ok(true)
        }

        fn deregister_relation(&self, relation: &str) -> Result<(), CatalogError> {
            Err(CatalogError::Engine {
                relation: relation.to_string(),
                source: datafusion::error::DataFusionError::Plan("catalog is read-only".into()),
            })
        }

        fn register_relation(
            &self,
            _relation: &str,
            _provider: Arc<dyn TableProvider>,
        ) -> Result<(), CatalogError> {
            panic!("must not register after a failed drop");
        }
    }

    fn empty_provider() -> Arc<dyn TableProvider> {
        Arc::new(EmptyTable::new(songs_schema()))
    }

    async fn count(session: &DataFusionSession, sql: &str) -> i64 {
        let batches = session
            .submit(sql)
            .await
            .expect("plan")
            .collect()
            .await
            .expect("collect");
        batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("count is Int64")
            .value(0)
    }

    #[tokio::test]
    async fn load_twice_is_idempotent() -> TestResult {
        let tmp = TempDir::new()?;
        let location = write_songs_table(tmp.path(), &pop_rock_2023()).await?;
        let session = DataFusionSession::new();

        let first = load_and_register(&session, &location, Some(0), "demo").await?;
        let before = count(&session, "select count(*) from demo").await;

        let second = load_and_register(&session, &location, Some(0), "demo").await?;
        let after = count(&session, "select count(*) from demo").await;

        assert_eq!(first, second);
        assert_eq!(before, 5);
        assert_eq!(before, after);
        Ok(())
    }

    #[tokio::test]
    async fn pop_count_matches_fixture() -> TestResult {
        let tmp = TempDir::new()?;
        let rows = pop_rock_2023();
        let expected = rows.iter().filter(|r| r.genre == "pop").count() as i64;
        let location = write_songs_table(tmp.path(), &rows).await?;

        let session = DataFusionSession::new();
        load_and_register(&session, &location, Some(0), "demo").await?;

        let got = count(&session, "select count(*) from demo where genre = 'pop'").await;
        assert_eq!(got, expected);
        assert_eq!(got, 3);
        Ok(())
    }

    #[tokio::test]
    async fn raced_drop_is_treated_as_success() -> TestResult {
        let tmp = TempDir::new()?;
        let location = write_songs_table(tmp.path(), &pop_rock_2023()).await?;
        let catalog = RacingCatalog::default();

        load_and_register(&catalog, &location, None, "demo").await?;
        assert_eq!(
            *catalog.registered.lock().expect("lock"),
            vec!["demo".to_string()]
        );
        Ok(())
    }

    #[test]
    fn other_drop_failures_are_registration_errors() {
        let err = replace_relation(&LockedCatalog, "demo", empty_provider())
            .expect_err("drop failed");
        match err {
            CliError::Registration { relation, source } => {
                assert_eq!(relation, "demo");
                assert!(matches!(source, CatalogError::Engine { .. }));
            }
            other => panic!("expected Registration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_location_is_storage_unavailable() -> TestResult {
        let tmp = TempDir::new()?;
        let session = DataFusionSession::new();
        let location = TableLocation::local(tmp.path().join("nowhere"));

        let err = load_and_register(&session, &location, Some(0), "demo")
            .await
            .expect_err("missing root");
        assert!(matches!(err, CliError::StorageUnavailable { .. }));
        assert!(!session.relation_exists("demo")?);
        Ok(())
    }

    #[tokio::test]
    async fn missing_version_is_snapshot_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let location = write_songs_table(tmp.path(), &pop_rock_2023()).await?;
        let session = DataFusionSession::new();

        let err = load_and_register(&session, &location, Some(3), "demo")
            .await
            .expect_err("only version 0 exists");
        assert!(matches!(err, CliError::SnapshotNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn replacing_rebinds_to_the_new_snapshot() -> TestResult {
        let tmp = TempDir::new()?;
        let location = write_songs_table(tmp.path(), &pop_rock_2023()).await?;
        append_songs(&location, &[song(2024, "pop", "New", "n", Some(1))]).await?;

        let session = DataFusionSession::new();
        load_and_register(&session, &location, Some(0), "demo").await?;
        assert_eq!(count(&session, "select count(*) from demo").await, 5);

        let loaded = load_and_register(&session, &location, None, "demo").await?;
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.row_count, 6);
        assert_eq!(count(&session, "select count(*) from demo").await, 6);
        Ok(())
    }
}
