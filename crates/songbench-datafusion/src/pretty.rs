//! Pretty-print helpers for Arrow `RecordBatch` output.
//!
//! Floats are printed with a fixed maximum number of decimal places and
//! trailing zeros trimmed, which avoids artifacts like `115.38499999999999`.
//! Other types go through Arrow's display formatter. The grid itself is drawn
//! with `tabled`.

use arrow::{
    array::{Array, Float32Array, Float64Array, RecordBatch},
    datatypes::{DataType, SchemaRef},
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use tabled::{builder::Builder, settings::Style};

/// Default maximum number of decimal places used for `f32`/`f64` values.
pub const DEFAULT_FLOAT_MAX_DECIMALS: usize = 6;

/// Text shown for SQL NULL.
pub const NULL_TEXT: &str = "NULL";

/// Format a float with at most `max_decimals` decimals, trimming trailing zeros.
pub fn format_compact_float(value: f64, max_decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let prec = max_decimals.min(15);
    let mut s = format!("{value:.prec$}", prec = prec);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }

    if s == "-0" {
        s.clear();
        s.push('0');
    }

    s
}

fn column_cells(array: &dyn Array, max_decimals: usize) -> Result<Vec<String>, ArrowError> {
    let len = array.len();
    let compact = |is_null: bool, v: f64| {
        if is_null {
            NULL_TEXT.to_string()
        } else {
            format_compact_float(v, max_decimals)
        }
    };

    match array.data_type() {
        DataType::Float64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| ArrowError::CastError("expected Float64Array".to_string()))?;
            Ok((0..len)
                .map(|i| compact(arr.is_null(i), arr.value(i)))
                .collect())
        }
        DataType::Float32 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| ArrowError::CastError("expected Float32Array".to_string()))?;
            Ok((0..len)
                .map(|i| compact(arr.is_null(i), arr.value(i) as f64))
                .collect())
        }
        _ => {
            let options = FormatOptions::default().with_null(NULL_TEXT);
            let formatter = ArrayFormatter::try_new(array, &options)?;
            (0..len).map(|i| formatter.value(i).try_to_string()).collect()
        }
    }
}

/// Convert batches into rendered rows, one `Vec<String>` per row.
pub fn batches_to_rows(
    batches: &[RecordBatch],
    max_decimals: usize,
) -> Result<Vec<Vec<String>>, ArrowError> {
    let mut rows = Vec::new();
    for batch in batches {
        let columns = batch
            .columns()
            .iter()
            .map(|c| column_cells(c.as_ref(), max_decimals))
            .collect::<Result<Vec<_>, _>>()?;

        for row_idx in 0..batch.num_rows() {
            rows.push(columns.iter().map(|col| col[row_idx].clone()).collect());
        }
    }
    Ok(rows)
}

/// Draw a rounded grid with a header row.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// Render a query result for a terminal.
///
/// `schema` supplies the header when the result has no batches at all. An
/// empty result renders the header followed by a `(no rows)` line.
pub fn render_batches(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<String, ArrowError> {
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let rows = batches_to_rows(batches, DEFAULT_FLOAT_MAX_DECIMALS)?;

    let mut out = render_table(&columns, &rows);
    if rows.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("(no rows)");
    }
    Ok(out)
}
