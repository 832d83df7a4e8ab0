//! Table-level metadata structures recorded in the log.
//!
//! This module models the payload of `LogAction::UpdateTableMeta`: the
//! logical schema every segment must match, plus basic bookkeeping. The
//! logical types are a small, serde-friendly mirror of the Arrow types the
//! format supports, so commit files stay readable JSON.
use std::{collections::HashSet, fmt, sync::Arc};

use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Current table metadata / log format version.
///
/// Bumped only when we make a breaking change to the on-disk JSON format.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// High-level table metadata stored in the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableMeta {
    /// Canonical logical schema; every segment must match it exactly.
    pub(crate) logical_schema: LogicalSchema,

    /// Creation timestamp of the table, stored as RFC3339 UTC.
    pub(crate) created_at: DateTime<Utc>,

    /// Format version for future evolution of the log/table format.
    pub(crate) format_version: u32,

    /// Free-form description, shown by `history`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
}

impl TableMeta {
    /// Build metadata for a new table with the given logical schema.
    pub fn new(logical_schema: LogicalSchema) -> Self {
        TableMeta {
            logical_schema,
            created_at: Utc::now(),
            format_version: TABLE_FORMAT_VERSION,
            description: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the logical schema.
    pub fn logical_schema(&self) -> &LogicalSchema {
        &self.logical_schema
    }

    /// Returns the UTC timestamp when the table was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the on-disk table metadata format version.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Returns the optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Convert the table's logical schema to a shared Arrow [`SchemaRef`].
    pub fn arrow_schema_ref(&self) -> SchemaRef {
        self.logical_schema.to_arrow_schema_ref()
    }
}

/// Units for logical timestamps recorded in the table metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogicalTimestampUnit {
    /// Second precision timestamps.
    Seconds,
    /// Millisecond precision timestamps.
    Millis,
    /// Microsecond precision timestamps.
    Micros,
    /// Nanosecond precision timestamps.
    Nanos,
}

impl LogicalTimestampUnit {
    fn to_arrow_time_unit(self) -> TimeUnit {
        match self {
            LogicalTimestampUnit::Seconds => TimeUnit::Second,
            LogicalTimestampUnit::Millis => TimeUnit::Millisecond,
            LogicalTimestampUnit::Micros => TimeUnit::Microsecond,
            LogicalTimestampUnit::Nanos => TimeUnit::Nanosecond,
        }
    }

    fn from_arrow_time_unit(unit: &TimeUnit) -> Self {
        match unit {
            TimeUnit::Second => LogicalTimestampUnit::Seconds,
            TimeUnit::Millisecond => LogicalTimestampUnit::Millis,
            TimeUnit::Microsecond => LogicalTimestampUnit::Micros,
            TimeUnit::Nanosecond => LogicalTimestampUnit::Nanos,
        }
    }
}

impl fmt::Display for LogicalTimestampUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalTimestampUnit::Seconds => write!(f, "s"),
            LogicalTimestampUnit::Millis => write!(f, "ms"),
            LogicalTimestampUnit::Micros => write!(f, "us"),
            LogicalTimestampUnit::Nanos => write!(f, "ns"),
        }
    }
}

/// Logical data types that can be stored in the table schema metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogicalDataType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 encoded string.
    Utf8,
    /// UTF-8 encoded string with 64-bit offsets.
    LargeUtf8,
    /// Variable-length binary data.
    Binary,
    /// Days since the UNIX epoch.
    Date32,
    /// Milliseconds since the UNIX epoch.
    Date64,
    /// Timestamp value with a precision unit and optional timezone.
    Timestamp {
        /// Timestamp precision unit.
        unit: LogicalTimestampUnit,
        /// Optional IANA timezone identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

impl LogicalDataType {
    fn to_arrow_datatype(&self) -> DataType {
        match self {
            LogicalDataType::Bool => DataType::Boolean,
            LogicalDataType::Int32 => DataType::Int32,
            LogicalDataType::Int64 => DataType::Int64,
            LogicalDataType::Float32 => DataType::Float32,
            LogicalDataType::Float64 => DataType::Float64,
            LogicalDataType::Utf8 => DataType::Utf8,
            LogicalDataType::LargeUtf8 => DataType::LargeUtf8,
            LogicalDataType::Binary => DataType::Binary,
            LogicalDataType::Date32 => DataType::Date32,
            LogicalDataType::Date64 => DataType::Date64,
            LogicalDataType::Timestamp { unit, timezone } => {
                let tz: Option<Arc<str>> = timezone.as_deref().map(Arc::<str>::from);
                DataType::Timestamp(unit.to_arrow_time_unit(), tz)
            }
        }
    }

    fn from_arrow_datatype(column: &str, dt: &DataType) -> Result<Self, LogicalSchemaError> {
        Ok(match dt {
            DataType::Boolean => LogicalDataType::Bool,
            DataType::Int32 => LogicalDataType::Int32,
            DataType::Int64 => LogicalDataType::Int64,
            DataType::Float32 => LogicalDataType::Float32,
            DataType::Float64 => LogicalDataType::Float64,
            DataType::Utf8 => LogicalDataType::Utf8,
            DataType::LargeUtf8 => LogicalDataType::LargeUtf8,
            DataType::Binary => LogicalDataType::Binary,
            DataType::Date32 => LogicalDataType::Date32,
            DataType::Date64 => LogicalDataType::Date64,
            DataType::Timestamp(unit, tz) => LogicalDataType::Timestamp {
                unit: LogicalTimestampUnit::from_arrow_time_unit(unit),
                timezone: tz.as_ref().map(|s| s.to_string()),
            },
            other => {
                return UnsupportedTypeSnafu {
                    column: column.to_string(),
                    data_type: format!("{other:?}"),
                }
                .fail();
            }
        })
    }
}

impl fmt::Display for LogicalDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalDataType::Timestamp {
                unit,
                timezone: Some(tz),
            } => write!(f, "Timestamp({unit}, {tz})"),
            LogicalDataType::Timestamp {
                unit,
                timezone: None,
            } => write!(f, "Timestamp({unit})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Logical column definition in a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicalColumn {
    /// Column name as stored in the schema.
    pub name: String,
    /// Logical data type for the column.
    pub data_type: LogicalDataType,
    /// Whether the column allows null values.
    #[serde(default)]
    pub nullable: bool,
}

impl LogicalColumn {
    /// Build a column definition.
    pub fn new(name: impl Into<String>, data_type: LogicalDataType, nullable: bool) -> Self {
        LogicalColumn {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    fn to_arrow_field_ref(&self) -> FieldRef {
        Arc::new(Field::new(
            self.name.clone(),
            self.data_type.to_arrow_datatype(),
            self.nullable,
        ))
    }
}

impl fmt::Display for LogicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?: {}", self.name, self.data_type)
        } else {
            write!(f, "{}: {}", self.name, self.data_type)
        }
    }
}

/// Errors raised while building or converting a [`LogicalSchema`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LogicalSchemaError {
    /// Two columns share the same name.
    #[snafu(display("Duplicate column name in logical schema: {column}"))]
    DuplicateColumn {
        /// The repeated column name.
        column: String,
    },

    /// The Arrow type has no logical counterpart in the table format.
    #[snafu(display("Column {column} has unsupported Arrow type {data_type}"))]
    UnsupportedType {
        /// Column carrying the unsupported type.
        column: String,
        /// Debug rendering of the Arrow type.
        data_type: String,
    },
}

/// Ordered set of logical columns with unique names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicalSchema {
    columns: Vec<LogicalColumn>,
}

impl LogicalSchema {
    /// Build a schema, rejecting duplicate column names.
    pub fn new(columns: Vec<LogicalColumn>) -> Result<Self, LogicalSchemaError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return DuplicateColumnSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
        }
        Ok(Self { columns })
    }

    /// Derive a logical schema from an Arrow schema.
    pub fn from_arrow(schema: &Schema) -> Result<Self, LogicalSchemaError> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                Ok(LogicalColumn {
                    name: f.name().clone(),
                    data_type: LogicalDataType::from_arrow_datatype(f.name(), f.data_type())?,
                    nullable: f.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>, LogicalSchemaError>>()?;

        Self::new(columns)
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[LogicalColumn] {
        &self.columns
    }

    /// Convert to an Arrow schema.
    pub fn to_arrow_schema_ref(&self) -> SchemaRef {
        let fields: Vec<FieldRef> = self
            .columns
            .iter()
            .map(LogicalColumn::to_arrow_field_ref)
            .collect();
        Arc::new(Schema::new(fields))
    }
}

impl fmt::Display for LogicalSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.columns.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_roundtrip_keeps_types_and_nullability() -> Result<(), LogicalSchemaError> {
        let arrow = Schema::new(vec![
            Field::new("year", DataType::Int64, false),
            Field::new("genre", DataType::Utf8, true),
            Field::new("tempo", DataType::Float64, true),
            Field::new(
                "released_at",
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                true,
            ),
        ]);

        let logical = LogicalSchema::from_arrow(&arrow)?;
        assert_eq!(logical.columns().len(), 4);
        assert!(!logical.columns()[0].nullable);
        assert_eq!(logical.to_arrow_schema_ref().as_ref(), &arrow);
        Ok(())
    }

    #[test]
    fn from_arrow_rejects_nested_types() {
        let arrow = Schema::new(vec![Field::new(
            "tags",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);

        let err = LogicalSchema::from_arrow(&arrow).expect_err("lists are not supported");
        assert!(matches!(err, LogicalSchemaError::UnsupportedType { column, .. } if column == "tags"));
    }

    #[test]
    fn display_marks_nullable_columns() -> Result<(), LogicalSchemaError> {
        let schema = LogicalSchema::new(vec![
            LogicalColumn {
                name: "year".to_string(),
                data_type: LogicalDataType::Int64,
                nullable: false,
            },
            LogicalColumn {
                name: "popularity".to_string(),
                data_type: LogicalDataType::Int64,
                nullable: true,
            },
        ])?;

        assert_eq!(schema.to_string(), "{year: Int64, popularity?: Int64}");
        Ok(())
    }
}
