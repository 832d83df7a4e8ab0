//! Segment write path: Arrow batches to one create-only Parquet file.

use std::path::Path;

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use log::debug;
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};
use snafu::prelude::*;

use crate::{
    storage::{self, TableLocation},
    table::error::{
        ArrowSnafu, InvalidSegmentSnafu, ParquetWriteSnafu, SchemaMismatchSnafu, StorageSnafu,
        TableError,
    },
    transaction_log::{
        LogicalSchema, SegmentMeta,
        segments::{segment_id_for, segment_rel_path},
    },
};

fn render_schema(schema: &SchemaRef) -> String {
    match LogicalSchema::from_arrow(schema) {
        Ok(logical) => logical.to_string(),
        Err(_) => format!("{schema:?}"),
    }
}

/// Re-type `batch` onto the table schema.
///
/// Columns must match by name and data type, in order. Nullability follows
/// the table schema, so nulls in a non-nullable table column are rejected by
/// Arrow.
pub(crate) fn conform_batch(
    table_schema: &SchemaRef,
    batch: &RecordBatch,
) -> Result<RecordBatch, TableError> {
    let batch_schema = batch.schema();
    let same_shape = table_schema.fields().len() == batch_schema.fields().len()
        && table_schema
            .fields()
            .iter()
            .zip(batch_schema.fields().iter())
            .all(|(t, b)| t.name() == b.name() && t.data_type() == b.data_type());

    if !same_shape {
        return SchemaMismatchSnafu {
            expected: render_schema(table_schema),
            found: render_schema(&batch_schema),
        }
        .fail();
    }

    RecordBatch::try_new(table_schema.clone(), batch.columns().to_vec()).context(ArrowSnafu)
}

fn encode_parquet(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<Vec<u8>, TableError> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();

    let mut buf = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buf, schema.clone(), Some(props)).context(ParquetWriteSnafu)?;
    for batch in batches {
        writer.write(batch).context(ParquetWriteSnafu)?;
    }
    writer.close().context(ParquetWriteSnafu)?;
    Ok(buf)
}

/// Write `batches` as the `ordinal`-th segment of `version`.
///
/// Returns `None` when the batches carry no rows, so callers can commit a
/// version without a segment.
pub(crate) async fn write_segment(
    location: &TableLocation,
    table_schema: &SchemaRef,
    version: u64,
    ordinal: usize,
    batches: &[RecordBatch],
) -> Result<Option<SegmentMeta>, TableError> {
    let conformed = batches
        .iter()
        .map(|b| conform_batch(table_schema, b))
        .collect::<Result<Vec<_>, _>>()?;

    let row_count: u64 = conformed.iter().map(|b| b.num_rows() as u64).sum();
    if row_count == 0 {
        return Ok(None);
    }

    let bytes = encode_parquet(table_schema, &conformed)?;

    let segment_id = segment_id_for(version, ordinal);
    let rel_path = segment_rel_path(&segment_id);
    storage::write_new(location, Path::new(&rel_path), &bytes)
        .await
        .context(StorageSnafu)?;

    let meta = SegmentMeta::for_parquet(location, segment_id, &rel_path, row_count)
        .await
        .context(InvalidSegmentSnafu)?;

    debug!(
        "wrote segment {} ({} rows, {} bytes)",
        meta.path,
        row_count,
        bytes.len()
    );
    Ok(Some(meta))
}
