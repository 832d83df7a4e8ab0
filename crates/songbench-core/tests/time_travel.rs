//! Integration tests for opening older versions of a table.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use arrow::array::{Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use songbench_core::storage::TableLocation;
use songbench_core::table::{TableError, TableSnapshot, VersionedTable};
use songbench_core::transaction_log::TransactionLogStore;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int64, false),
        Field::new("genre", DataType::Utf8, true),
    ]))
}

fn batch(rows: &[(i64, &str)]) -> RecordBatch {
    let years: Vec<i64> = rows.iter().map(|(y, _)| *y).collect();
    let genres: Vec<&str> = rows.iter().map(|(_, g)| *g).collect();
    RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(Int64Array::from(years)),
            Arc::new(StringArray::from(genres)),
        ],
    )
    .unwrap()
}

async fn total_rows(snapshot: &TableSnapshot) -> usize {
    snapshot
        .collect_batches()
        .await
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum()
}

#[tokio::test]
async fn each_version_reads_back_its_own_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let location = TableLocation::local(tmp.path());

    let mut table =
        VersionedTable::create_with_batches(location.clone(), schema(), vec![batch(&[(2020, "pop")])])
            .await?;
    table
        .append_batches(vec![batch(&[(2021, "rock"), (2021, "pop")])])
        .await?;
    table.append_batches(vec![batch(&[(2022, "jazz")])]).await?;

    let expected = [(0, 1usize), (1, 3), (2, 4)];
    for (version, rows) in expected {
        let snap = TableSnapshot::load(location.clone(), Some(version)).await?;
        assert_eq!(snap.version(), version);
        assert_eq!(snap.row_count(), rows as u64);
        assert_eq!(total_rows(&snap).await, rows);
    }
    Ok(())
}

#[tokio::test]
async fn old_snapshot_is_stable_after_new_commits() -> TestResult {
    let tmp = TempDir::new()?;
    let location = TableLocation::local(tmp.path());

    let mut table =
        VersionedTable::create_with_batches(location.clone(), schema(), vec![batch(&[(2020, "pop")])])
            .await?;
    let pinned = table.snapshot();

    table.append_batches(vec![batch(&[(2021, "rock")])]).await?;

    assert_eq!(pinned.version(), 0);
    assert_eq!(total_rows(&pinned).await, 1);
    assert_eq!(total_rows(&table.snapshot()).await, 2);
    Ok(())
}

#[tokio::test]
async fn stale_writer_conflicts_instead_of_overwriting() -> TestResult {
    let tmp = TempDir::new()?;
    let location = TableLocation::local(tmp.path());

    let mut first = VersionedTable::create(location.clone(), schema()).await?;
    let mut second = VersionedTable::open(location.clone()).await?;

    first.append_batches(vec![batch(&[(2020, "pop")])]).await?;
    let err = second
        .append_batches(vec![batch(&[(2021, "rock")])])
        .await
        .expect_err("second writer is stale");
    assert!(matches!(err, TableError::TransactionLog { .. }));

    let log = TransactionLogStore::new(location);
    assert_eq!(log.load_current_version().await?, Some(1));
    Ok(())
}

#[tokio::test]
async fn file_uri_locations_open_the_same_table() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().to_string_lossy().to_string();
    VersionedTable::create_with_batches(
        TableLocation::local(tmp.path()),
        schema(),
        vec![batch(&[(2020, "pop"), (2021, "pop")])],
    )
    .await?;

    let location = TableLocation::parse(&format!("file://{path}"))?;
    let snap = TableSnapshot::load(location, None).await?;
    assert_eq!(snap.row_count(), 2);
    Ok(())
}
