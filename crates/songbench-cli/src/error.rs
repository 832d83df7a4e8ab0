use std::path::PathBuf;

use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use snafu::Snafu;
use songbench_core::{storage::StorageError, table::TableError, transaction_log::CommitError};

use crate::{catalog::CatalogError, runner::RunState};

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Failure of one query inside the timed window.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueryError {
    #[snafu(display("planning failed: {source}"))]
    Plan { source: DataFusionError },

    #[snafu(display("execution failed: {source}"))]
    Execute { source: DataFusionError },

    #[snafu(display("rendering failed: {source}"))]
    Render { source: ArrowError },

    #[snafu(display("writing output failed: {source}"))]
    WriteOutput { source: std::io::Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid table location '{location}': {source}"))]
    InvalidLocation {
        location: String,
        source: StorageError,
    },

    #[snafu(display("Dataset storage unavailable at {location}: {source}"))]
    StorageUnavailable {
        location: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("{source}"))]
    SnapshotNotFound {
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Failed to open table at {table}: {source}"))]
    OpenTable {
        table: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display(
        "Failed to create table at {table}: {source}. Ensure the directory is writable."
    ))]
    CreateTable {
        table: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display(
        "Append failed for table {table}: {source}. Ensure the CSV matches the table schema."
    ))]
    AppendBatches {
        table: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Failed to read history of {table}: {source}"))]
    History { table: String, source: CommitError },

    #[snafu(display("Failed to register relation '{relation}': {source}"))]
    Registration {
        relation: String,
        source: CatalogError,
    },

    #[snafu(display("Query '{name}' failed: {source}"))]
    QueryExecution {
        name: String,
        #[snafu(source(from(QueryError, Box::new)))]
        source: Box<QueryError>,
    },

    #[snafu(display("Illegal run state transition: {from:?} -> {to:?}"))]
    IllegalTransition { from: RunState, to: RunState },

    #[snafu(display("Query batch is empty ({origin})"))]
    EmptyBatch { origin: String },

    #[snafu(display("Unknown query '{name}'. Available: {available}"))]
    UnknownQuery { name: String, available: String },

    #[snafu(display("Failed to read query file {}: {source}", path.display()))]
    ReadQueryFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid query file {}: {source}", path.display()))]
    ParseQueryFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("CSV file not found or not accessible: {}", path.display()))]
    CsvOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read CSV {}: {source}", path.display()))]
    CsvRead { path: PathBuf, source: ArrowError },

    #[snafu(display("Failed to write output: {source}"))]
    Output { source: std::io::Error },

    #[snafu(display("Failed to initialize logging: {source}"))]
    Logging { source: log::SetLoggerError },
}

impl CliError {
    /// Map a table error raised while opening a snapshot for querying.
    pub(crate) fn from_open(location: &str, err: TableError) -> Self {
        match err {
            TableError::StorageUnavailable { .. } => CliError::StorageUnavailable {
                location: location.to_string(),
                source: Box::new(err),
            },
            TableError::SnapshotNotFound { .. } => CliError::SnapshotNotFound {
                source: Box::new(err),
            },
            other => CliError::OpenTable {
                table: location.to_string(),
                source: Box::new(other),
            },
        }
    }
}
