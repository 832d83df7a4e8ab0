//! Full-snapshot scan.
//!
//! Segments are streamed in id order (which is commit order). Each segment is
//! read into memory through the storage layer and decoded with a Parquet
//! reader over the in-memory buffer; decoded batches are re-typed onto the
//! table schema so every batch a caller sees carries the same `SchemaRef`.
use std::{path::Path, pin::Pin};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;

use crate::{
    storage::{self, TableLocation},
    table::{
        TableSnapshot,
        error::{ArrowSnafu, ParquetReadSnafu, StorageSnafu, TableError},
    },
    transaction_log::SegmentMeta,
};

/// Stream of record batches produced by [`TableSnapshot::scan`].
pub type SnapshotScan = Pin<Box<dyn Stream<Item = Result<RecordBatch, TableError>> + Send>>;

async fn read_segment(
    location: &TableLocation,
    segment: &SegmentMeta,
    schema: &SchemaRef,
) -> Result<Vec<RecordBatch>, TableError> {
    let rel_path = Path::new(&segment.path);

    let bytes = storage::read_all_bytes(location, rel_path)
        .await
        .context(StorageSnafu)?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
        .and_then(|builder| builder.build())
        .context(ParquetReadSnafu {
            path: segment.path.clone(),
        })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        let batch =
            RecordBatch::try_new(schema.clone(), batch.columns().to_vec()).context(ArrowSnafu)?;
        if batch.num_rows() > 0 {
            out.push(batch);
        }
    }
    Ok(out)
}

impl TableSnapshot {
    /// Stream every live row of this snapshot.
    pub fn scan(&self) -> SnapshotScan {
        let location = self.location.clone();
        let schema = self.schema();
        let segments: Vec<SegmentMeta> = self.state.segments.values().cloned().collect();

        let stream = futures::stream::iter(segments)
            .then(move |seg| {
                let location = location.clone();
                let schema = schema.clone();

                async move {
                    let batches = read_segment(&location, &seg, &schema).await?;
                    Ok::<_, TableError>(futures::stream::iter(
                        batches.into_iter().map(Ok::<_, TableError>),
                    ))
                }
            })
            .try_flatten();

        Box::pin(stream)
    }

    /// Collect the whole snapshot into memory.
    pub async fn collect_batches(&self) -> Result<Vec<RecordBatch>, TableError> {
        self.scan().try_collect().await
    }
}
