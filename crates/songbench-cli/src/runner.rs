//! Sequential, fail-fast execution of a query batch.
//!
//! A [`BatchRun`] walks one run through its states:
//!
//! ```text
//! NotStarted -> Loading -> LoaderReady -> Running(0) -> ... -> Running(n-1) -> Completed
//!                  |                          |                      |
//!                  +--------------------------+----------------------+--> Aborted
//! ```
//!
//! `Aborted` and `Completed` are terminal; a new run starts from a new
//! `BatchRun`.
//!
//! Each query is timed on the monotonic clock from submission until its
//! result has been rendered. DataFusion plans lazily, so a query that is
//! neither displayed nor force-materialized only measures planning; pass
//! [`RunOptions::force_materialize`] to time the full evaluation.

use std::io::Write;
use std::time::{Duration, Instant};

use arrow::array::RecordBatch;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use snafu::ResultExt;
use songbench_core::storage::TableLocation;
use songbench_datafusion::pretty::render_batches;

use crate::{
    catalog::{QuerySession, RelationCatalog},
    error::{
        CliError, CliResult, EmptyBatchSnafu, ExecuteSnafu, PlanSnafu, QueryError,
        QueryExecutionSnafu, RenderSnafu, WriteOutputSnafu,
    },
    loader::{LoadedRelation, load_and_register},
    queries::QuerySpec,
};

/// Where a batch run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Loading,
    LoaderReady,
    /// Executing the query at this zero-based position.
    Running(usize),
    Completed,
    Aborted,
}

impl RunState {
    fn can_move_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (NotStarted, Loading) => true,
            (Loading, LoaderReady) | (Loading, Aborted) => true,
            (LoaderReady, Running(0)) => true,
            (Running(i), Running(j)) => j == i + 1,
            (Running(_), Completed) | (Running(_), Aborted) => true,
            _ => false,
        }
    }
}

/// Knobs for one batch execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Collect every result set, even for queries that are not displayed.
    /// This changes what the elapsed time measures.
    pub force_materialize: bool,
}

/// Timing and outcome of one query.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Monotonic time from submission to the end of rendering.
    pub elapsed: Duration,
    /// `None` when the result was never materialized.
    pub row_count: Option<u64>,
    pub batches: Option<Vec<RecordBatch>>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub records: Vec<ExecutionRecord>,
    /// Wall time across the whole batch, measured independently of the
    /// per-query timings.
    pub total_elapsed: Duration,
}

/// State of a single run from load to completion.
#[derive(Debug)]
pub struct BatchRun {
    state: RunState,
}

impl Default for BatchRun {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRun {
    pub fn new() -> Self {
        Self {
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: RunState) -> CliResult<()> {
        if !self.state.can_move_to(next) {
            return Err(CliError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn abort(&mut self) {
        // Only reachable from Loading or Running.
        if self.state.can_move_to(RunState::Aborted) {
            self.state = RunState::Aborted;
        }
    }

    /// Load the snapshot and bind it as `relation`, moving to `LoaderReady`.
    pub async fn load<C: RelationCatalog + ?Sized>(
        &mut self,
        catalog: &C,
        location: &TableLocation,
        version: Option<u64>,
        relation: &str,
    ) -> CliResult<LoadedRelation> {
        self.advance(RunState::Loading)?;
        match load_and_register(catalog, location, version, relation).await {
            Ok(loaded) => {
                self.advance(RunState::LoaderReady)?;
                Ok(loaded)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Execute `queries` strictly in order, writing results and timing lines
    /// to `out`.
    ///
    /// The first failing query aborts the run; later queries are never
    /// submitted.
    pub async fn run<S, W>(
        &mut self,
        session: &S,
        queries: &[QuerySpec],
        options: RunOptions,
        out: &mut W,
    ) -> CliResult<BatchReport>
    where
        S: QuerySession + ?Sized,
        W: Write + ?Sized,
    {
        if queries.is_empty() {
            return EmptyBatchSnafu {
                origin: "no queries selected",
            }
            .fail();
        }

        let batch_start = Instant::now();
        let mut records = Vec::with_capacity(queries.len());

        for (i, spec) in queries.iter().enumerate() {
            self.advance(RunState::Running(i))?;

            match execute_query(session, spec, options, out).await {
                Ok(record) => {
                    debug!(
                        "query '{}' finished in {:?} ({:?} rows)",
                        record.name, record.elapsed, record.row_count
                    );
                    records.push(record);
                }
                Err(source) => {
                    warn!(
                        "query '{}' failed at position {}; skipping {} remaining",
                        spec.name,
                        i,
                        queries.len() - i - 1
                    );
                    self.abort();
                    return Err(source).context(QueryExecutionSnafu {
                        name: spec.name.clone(),
                    });
                }
            }
        }

        let total_elapsed = batch_start.elapsed();
        self.advance(RunState::Completed)?;
        info!(
            "ran {} queries in {:.3}s",
            records.len(),
            total_elapsed.as_secs_f64()
        );

        Ok(BatchReport {
            records,
            total_elapsed,
        })
    }
}

async fn execute_query<S, W>(
    session: &S,
    spec: &QuerySpec,
    options: RunOptions,
    out: &mut W,
) -> Result<ExecutionRecord, QueryError>
where
    S: QuerySession + ?Sized,
    W: Write + ?Sized,
{
    let started_at = Utc::now();
    let start = Instant::now();

    let df = session.submit(&spec.sql).await.context(PlanSnafu)?;

    let batches = if spec.display || options.force_materialize {
        let schema = df.schema().inner().clone();
        let batches = df.collect().await.context(ExecuteSnafu)?;
        if spec.display {
            let rendered = render_batches(&schema, &batches).context(RenderSnafu)?;
            writeln!(out, "{rendered}").context(WriteOutputSnafu)?;
        }
        Some(batches)
    } else {
        None
    };

    let elapsed = start.elapsed();
    let finished_at = Utc::now();

    writeln!(
        out,
        "Time elapsed to execute the query {}",
        elapsed.as_secs_f64()
    )
    .context(WriteOutputSnafu)?;

    let row_count = batches
        .as_ref()
        .map(|b| b.iter().map(|batch| batch.num_rows() as u64).sum());

    Ok(ExecutionRecord {
        name: spec.name.clone(),
        started_at,
        finished_at,
        elapsed,
        row_count,
        batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataFusionSession;
    use crate::queries::{DEFAULT_RELATION, builtin_batch};
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use async_trait::async_trait;
    use datafusion::dataframe::DataFrame;
    use datafusion::error::DataFusionError;
    use songbench_core::test_util::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts submissions before handing them to a real session.
    struct CountingSession {
        inner: DataFusionSession,
        submitted: AtomicUsize,
    }

    impl CountingSession {
        fn new(inner: DataFusionSession) -> Self {
            Self {
                inner,
                submitted: AtomicUsize::new(0),
            }
        }

        fn submitted(&self) -> usize {
            self.submitted.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuerySession for CountingSession {
        async fn submit(&self, sql: &str) -> Result<DataFrame, DataFusionError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            self.inner.submit(sql).await
        }
    }

    async fn loaded_run(
        root: &std::path::Path,
        rows: &[SongRow],
    ) -> Result<(BatchRun, DataFusionSession), Box<dyn std::error::Error>> {
        let location = write_songs_table(root, rows).await?;
        let session = DataFusionSession::new();
        let mut run = BatchRun::new();
        run.load(&session, &location, Some(0), DEFAULT_RELATION)
            .await?;
        Ok((run, session))
    }

    fn timing_lines(out: &[u8]) -> usize {
        String::from_utf8_lossy(out)
            .lines()
            .filter(|l| l.starts_with("Time elapsed to execute the query "))
            .count()
    }

    #[tokio::test]
    async fn fails_fast_at_the_first_bad_query() -> TestResult {
        let tmp = TempDir::new()?;
        let (mut run, session) = loaded_run(tmp.path(), &pop_rock_2023()).await?;
        let session = CountingSession::new(session);

        let queries = vec![
            QuerySpec::new("q1", "select count(*) from demo", false),
            QuerySpec::new("q2", "select genre from demo", true),
            QuerySpec::new("q3", "select no_such_column from demo", true),
            QuerySpec::new("q4", "select 1", true),
        ];

        let mut out = Vec::new();
        let err = run
            .run(&session, &queries, RunOptions::default(), &mut out)
            .await
            .expect_err("q3 is malformed");

        match err {
            CliError::QueryExecution { name, .. } => assert_eq!(name, "q3"),
            other => panic!("expected QueryExecution, got {other:?}"),
        }
        assert_eq!(session.submitted(), 3);
        assert_eq!(timing_lines(&out), 2);
        assert_eq!(run.state(), RunState::Aborted);
        Ok(())
    }

    #[tokio::test]
    async fn first_query_failure_submits_nothing_else() -> TestResult {
        let tmp = TempDir::new()?;
        let (mut run, session) = loaded_run(tmp.path(), &pop_rock_2023()).await?;
        let session = CountingSession::new(session);

        let queries = vec![
            QuerySpec::new("broken", "selec 1", true),
            QuerySpec::new("fine", "select 1", true),
        ];

        let mut out = Vec::new();
        let err = run
            .run(&session, &queries, RunOptions::default(), &mut out)
            .await
            .expect_err("syntax error");
        assert!(err.to_string().starts_with("Query 'broken' failed"));
        assert_eq!(session.submitted(), 1);
        assert!(out.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn counts_pop_rows() -> TestResult {
        let tmp = TempDir::new()?;
        let rows = pop_rock_2023();
        let expected = rows.iter().filter(|r| r.genre == "pop").count() as i64;
        let (mut run, session) = loaded_run(tmp.path(), &rows).await?;

        let queries = vec![QuerySpec::new(
            "count_pop",
            "select count(*) as n from demo where genre = 'pop'",
            true,
        )];
        let mut out = Vec::new();
        let report = run
            .run(&session, &queries, RunOptions::default(), &mut out)
            .await?;

        let batches = report.records[0].batches.as_ref().expect("displayed");
        let n = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("Int64 count")
            .value(0);
        assert_eq!(n, expected);
        assert_eq!(run.state(), RunState::Completed);

        let text = String::from_utf8(out)?;
        let table_at = text.find("│ 3").expect("rendered count");
        let timing_at = text
            .find("Time elapsed to execute the query")
            .expect("timing line");
        assert!(table_at < timing_at);
        Ok(())
    }

    #[tokio::test]
    async fn best_genre_each_year_keeps_ties() -> TestResult {
        let tmp = TempDir::new()?;
        let rows = vec![
            song(2020, "pop", "A", "a", Some(80)),
            song(2020, "rock", "B", "b", Some(70)),
            song(2020, "rock", "C", "c", Some(90)),
            song(2020, "jazz", "D", "d", Some(40)),
            song(2021, "jazz", "E", "e", Some(50)),
        ];
        let (mut run, session) = loaded_run(tmp.path(), &rows).await?;

        let best = builtin_batch(DEFAULT_RELATION)
            .into_iter()
            .filter(|q| q.name == "best_genre_each_year")
            .collect::<Vec<_>>();
        let mut out = Vec::new();
        let report = run
            .run(&session, &best, RunOptions::default(), &mut out)
            .await?;

        let record = &report.records[0];
        assert_eq!(record.row_count, Some(3));

        let mut got = Vec::new();
        for batch in record.batches.as_deref().unwrap_or_default() {
            let years = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("year");
            let genres = batch
                .column(1)
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("genre");
            let avgs = batch
                .column(2)
                .as_any()
                .downcast_ref::<Float64Array>()
                .expect("avg");
            for i in 0..batch.num_rows() {
                got.push((years.value(i), genres.value(i).to_string(), avgs.value(i)));
            }
        }
        assert_eq!(
            got,
            vec![
                (2020, "pop".to_string(), 80.0),
                (2020, "rock".to_string(), 80.0),
                (2021, "jazz".to_string(), 50.0),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_relation_runs_the_full_batch() -> TestResult {
        let tmp = TempDir::new()?;
        let (mut run, session) = loaded_run(tmp.path(), &[]).await?;

        let batch = builtin_batch(DEFAULT_RELATION);
        let mut out = Vec::new();
        let report = run
            .run(&session, &batch, RunOptions::default(), &mut out)
            .await?;

        assert_eq!(report.records.len(), 8);
        for record in &report.records {
            assert_eq!(record.row_count, Some(0), "{}", record.name);
        }
        assert_eq!(timing_lines(&out), 8);
        assert!(String::from_utf8(out)?.contains("(no rows)"));
        assert_eq!(run.state(), RunState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn timestamps_are_ordered() -> TestResult {
        let tmp = TempDir::new()?;
        let (mut run, session) = loaded_run(tmp.path(), &pop_rock_2023()).await?;

        let batch = builtin_batch(DEFAULT_RELATION);
        let mut out = Vec::new();
        let report = run
            .run(&session, &batch, RunOptions::default(), &mut out)
            .await?;

        let per_query: Duration = report.records.iter().map(|r| r.elapsed).sum();
        assert!(report.total_elapsed >= per_query);
        for pair in report.records.windows(2) {
            assert!(pair[0].finished_at <= pair[1].started_at);
        }
        for record in &report.records {
            assert!(record.started_at <= record.finished_at);
        }
        Ok(())
    }

    #[tokio::test]
    async fn force_materialize_collects_hidden_queries() -> TestResult {
        let tmp = TempDir::new()?;
        let queries = vec![QuerySpec::new("hidden", "select * from demo", false)];

        let (mut lazy, session) = loaded_run(&tmp.path().join("a"), &pop_rock_2023()).await?;
        let mut out = Vec::new();
        let report = lazy
            .run(&session, &queries, RunOptions::default(), &mut out)
            .await?;
        assert_eq!(report.records[0].row_count, None);
        assert!(report.records[0].batches.is_none());

        let (mut forced, session) = loaded_run(&tmp.path().join("b"), &pop_rock_2023()).await?;
        let mut forced_out = Vec::new();
        let report = forced
            .run(
                &session,
                &queries,
                RunOptions {
                    force_materialize: true,
                },
                &mut forced_out,
            )
            .await?;
        assert_eq!(report.records[0].row_count, Some(5));

        // Hidden queries print only their timing line either way.
        for text in [String::from_utf8(out)?, String::from_utf8(forced_out)?] {
            assert_eq!(text.lines().count(), 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn running_before_loading_is_illegal() {
        let session = DataFusionSession::new();
        let mut run = BatchRun::new();
        let mut out = Vec::new();

        let err = run
            .run(
                &session,
                &[QuerySpec::new("q", "select 1", true)],
                RunOptions::default(),
                &mut out,
            )
            .await
            .expect_err("not loaded");
        assert!(matches!(
            err,
            CliError::IllegalTransition {
                from: RunState::NotStarted,
                to: RunState::Running(0),
            }
        ));
    }

    #[tokio::test]
    async fn failed_load_aborts_and_cannot_resume() -> TestResult {
        let tmp = TempDir::new()?;
        let session = DataFusionSession::new();
        let mut run = BatchRun::new();

        let missing = TableLocation::local(tmp.path().join("missing"));
        run.load(&session, &missing, None, "demo")
            .await
            .expect_err("no table");
        assert_eq!(run.state(), RunState::Aborted);

        let location = write_songs_table(tmp.path(), &pop_rock_2023()).await?;
        let err = run
            .load(&session, &location, None, "demo")
            .await
            .expect_err("aborted is terminal");
        assert!(matches!(err, CliError::IllegalTransition { .. }));
        Ok(())
    }

    #[test]
    fn transitions_follow_the_run_order() {
        use RunState::*;
        assert!(NotStarted.can_move_to(Loading));
        assert!(Loading.can_move_to(Aborted));
        assert!(LoaderReady.can_move_to(Running(0)));
        assert!(Running(2).can_move_to(Running(3)));
        assert!(Running(2).can_move_to(Completed));

        assert!(!NotStarted.can_move_to(Running(0)));
        assert!(!LoaderReady.can_move_to(Running(1)));
        assert!(!Running(2).can_move_to(Running(2)));
        assert!(!LoaderReady.can_move_to(Completed));
        assert!(!Completed.can_move_to(Aborted));
        assert!(!Aborted.can_move_to(NotStarted));
    }
}
