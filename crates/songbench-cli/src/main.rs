//! Batch analytical query runner over a versioned songs table.

mod catalog;
mod config;
mod error;
mod loader;
mod queries;
mod runner;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow_csv::ReaderBuilder;
use arrow_csv::reader::Format;
use clap::{Args, Parser, Subcommand};
use simplelog::LevelFilter;
use snafu::ResultExt;
use songbench_core::{
    storage::TableLocation,
    table::VersionedTable,
    transaction_log::{Commit, TransactionLogStore},
};
use songbench_datafusion::pretty::render_table;

use crate::{
    catalog::DataFusionSession,
    config::QueryBatchFile,
    error::{
        AppendBatchesSnafu, CliError, CliResult, CreateTableSnafu, CsvOpenSnafu, CsvReadSnafu,
        HistorySnafu, InvalidLocationSnafu, LoggingSnafu, OutputSnafu,
    },
    queries::{DEFAULT_RELATION, QuerySpec, adhoc_queries, builtin_batch, select_queries},
    runner::{BatchRun, RunOptions},
};

/// Where the snapshot comes from and what it is called in the session.
#[derive(Debug, Args)]
struct SourceArgs {
    /// Table root: a local path or a file:// URI
    #[arg(long, env = "SONGBENCH_TABLE")]
    table: String,

    /// Version to load [default: 0]
    #[arg(long, env = "SONGBENCH_VERSION")]
    version: Option<u64>,

    /// Load the latest committed version; takes precedence over --version
    #[arg(long, default_value_t = false)]
    latest: bool,

    /// Relation name the snapshot is registered under [default: demo]
    #[arg(long)]
    relation: Option<String>,
}

impl SourceArgs {
    fn requested_version(&self) -> Option<u64> {
        if self.latest {
            None
        } else {
            Some(self.version.unwrap_or(0))
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a snapshot and run the query batch against it
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// TOML file with the query batch (default: the built-in batch)
        #[arg(long = "queries")]
        queries_file: Option<PathBuf>,

        /// Run only these queries, in this order (repeatable)
        #[arg(long = "query")]
        query: Vec<String>,

        /// Collect results of queries that are not displayed.
        /// Timings then include full evaluation.
        #[arg(long, default_value_t = false)]
        force_materialize: bool,

        /// Do not print result tables, only timing lines
        #[arg(long, default_value_t = false)]
        no_display: bool,
    },

    /// Run one SQL statement against a snapshot
    Query {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        sql: String,
    },

    /// Commit the rows of a CSV file (with header) as a new table version
    Ingest {
        #[arg(long, env = "SONGBENCH_TABLE")]
        table: String,

        #[arg(long)]
        csv: PathBuf,

        /// Create the table (version 0) with a schema inferred from the CSV
        #[arg(long, default_value_t = false)]
        create: bool,

        /// Description stored in the table metadata (with --create)
        #[arg(long, requires = "create")]
        description: Option<String>,
    },

    /// List committed versions
    History {
        #[arg(long, env = "SONGBENCH_TABLE")]
        table: String,
    },
}

#[derive(Debug, Parser)]
#[command(name = "songbench", version, about)]
struct Cli {
    /// Log level written to stderr (off, error, warn, info, debug, trace)
    #[arg(long, global = true, env = "SONGBENCH_LOG", default_value = "warn")]
    log_level: LevelFilter,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(level: LevelFilter) -> CliResult<()> {
    let mut config = simplelog::ConfigBuilder::new();
    if level < LevelFilter::Debug {
        config.add_filter_allow_str("songbench");
    }
    simplelog::WriteLogger::init(level, config.build(), std::io::stderr()).context(LoggingSnafu)
}

fn parse_location(table: &str) -> CliResult<TableLocation> {
    TableLocation::parse(table).context(InvalidLocationSnafu { location: table })
}

/// Resolve the batch: file or built-in, then the `--query` selection.
async fn resolve_queries(
    relation: Option<String>,
    queries_file: Option<&Path>,
    names: &[String],
) -> CliResult<(String, Vec<QuerySpec>)> {
    let (relation, batch) = match queries_file {
        Some(path) => {
            let file = QueryBatchFile::from_file(path).await?;
            let relation = relation
                .or_else(|| file.relation.clone())
                .unwrap_or_else(|| DEFAULT_RELATION.to_string());
            let batch = file.into_specs(&relation, path)?;
            (relation, batch)
        }
        None => {
            let relation = relation.unwrap_or_else(|| DEFAULT_RELATION.to_string());
            let batch = builtin_batch(&relation);
            (relation, batch)
        }
    };

    if names.is_empty() {
        return Ok((relation, batch));
    }

    let mut available = batch;
    available.extend(adhoc_queries(&relation));
    let picked = select_queries(&available, names)?;
    Ok((relation, picked))
}

/// Load the snapshot, run `queries`, then print the total line.
///
/// `start` is taken by the caller so the total covers loading too.
async fn load_and_run(
    start: Instant,
    source: &SourceArgs,
    relation: &str,
    queries: &[QuerySpec],
    options: RunOptions,
) -> CliResult<()> {
    let location = parse_location(&source.table)?;
    let session = DataFusionSession::new();
    let mut batch = BatchRun::new();

    let loaded = batch
        .load(&session, &location, source.requested_version(), relation)
        .await?;
    log::info!(
        "running {} queries against '{}' (version {}, {} rows)",
        queries.len(),
        loaded.relation,
        loaded.version,
        loaded.row_count
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    batch.run(&session, queries, options, &mut out).await?;

    writeln!(
        out,
        "Total elapsed time for processing the main function {}",
        start.elapsed().as_secs_f64()
    )
    .context(OutputSnafu)?;
    out.flush().context(OutputSnafu)
}

async fn cmd_run(
    source: SourceArgs,
    queries_file: Option<PathBuf>,
    names: Vec<String>,
    force_materialize: bool,
    no_display: bool,
) -> CliResult<()> {
    let start = Instant::now();

    let (relation, mut queries) =
        resolve_queries(source.relation.clone(), queries_file.as_deref(), &names).await?;
    if no_display {
        for q in &mut queries {
            q.display = false;
        }
    }

    load_and_run(
        start,
        &source,
        &relation,
        &queries,
        RunOptions { force_materialize },
    )
    .await
}

async fn cmd_query(source: SourceArgs, sql: String) -> CliResult<()> {
    let start = Instant::now();
    let relation = source
        .relation
        .clone()
        .unwrap_or_else(|| DEFAULT_RELATION.to_string());
    let queries = [QuerySpec::new("sql", sql, true)];
    load_and_run(start, &source, &relation, &queries, RunOptions::default()).await
}

fn read_csv(path: &Path, schema: SchemaRef) -> CliResult<Vec<RecordBatch>> {
    let file = File::open(path).context(CsvOpenSnafu { path })?;
    let reader = ReaderBuilder::new(schema)
        .with_format(Format::default().with_header(true))
        .build(file)
        .context(CsvReadSnafu { path })?;

    reader
        .collect::<Result<Vec<_>, _>>()
        .context(CsvReadSnafu { path })
}

fn infer_csv_schema(path: &Path) -> CliResult<SchemaRef> {
    let file = File::open(path).context(CsvOpenSnafu { path })?;
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(file, None)
        .context(CsvReadSnafu { path })?;
    Ok(Arc::new(schema))
}

async fn cmd_ingest(
    table: &str,
    csv: &Path,
    create: bool,
    description: Option<String>,
) -> CliResult<()> {
    let location = parse_location(table)?;

    if create {
        let schema = infer_csv_schema(csv)?;
        let batches = read_csv(csv, schema.clone())?;
        let created = match description {
            Some(description) => {
                VersionedTable::create_with_description(location, schema, description, batches)
                    .await
            }
            None => VersionedTable::create_with_batches(location, schema, batches).await,
        };
        let t = created.context(CreateTableSnafu { table })?;
        println!(
            "Created table at {table} (version {}, {} rows)",
            t.version(),
            t.snapshot().row_count()
        );
        return Ok(());
    }

    let mut t = VersionedTable::open(location)
        .await
        .map_err(|e| CliError::from_open(table, e))?;
    let batches = read_csv(csv, t.schema())?;
    let version = t
        .append_batches(batches)
        .await
        .context(AppendBatchesSnafu { table })?;
    println!(
        "Appended version {version} to {table} ({} rows total)",
        t.snapshot().row_count()
    );
    Ok(())
}

fn history_row(commit: &Commit) -> Vec<String> {
    let actions: Vec<String> = commit.actions.iter().map(|a| a.label()).collect();
    vec![
        commit.version.to_string(),
        commit.timestamp.to_rfc3339(),
        commit
            .base_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        if actions.is_empty() {
            "(no actions)".to_string()
        } else {
            actions.join("; ")
        },
    ]
}

async fn cmd_history(table: &str) -> CliResult<()> {
    let location = parse_location(table)?;
    let t = VersionedTable::open(location.clone())
        .await
        .map_err(|e| CliError::from_open(table, e))?;

    let commits = TransactionLogStore::new(location)
        .list_commits()
        .await
        .context(HistorySnafu { table })?;

    let columns = ["version", "committed_at", "base", "actions"].map(String::from);
    let rows: Vec<Vec<String>> = commits.iter().map(history_row).collect();
    println!("{}", render_table(&columns, &rows));

    let snapshot = t.snapshot();
    let meta = snapshot.table_meta();
    println!("Latest version: {}", t.version());
    println!("Created at: {}", meta.created_at().to_rfc3339());
    println!("Format version: {}", meta.format_version());
    if let Some(description) = meta.description() {
        println!("Description: {description}");
    }
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.cmd {
        Command::Run {
            source,
            queries_file,
            query,
            force_materialize,
            no_display,
        } => cmd_run(source, queries_file, query, force_materialize, no_display).await,

        Command::Query { source, sql } => cmd_query(source, sql).await,

        Command::Ingest {
            table,
            csv,
            create,
            description,
        } => cmd_ingest(&table, &csv, create, description).await,

        Command::History { table } => cmd_history(&table).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
