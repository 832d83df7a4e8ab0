//! Song fixtures shared by the tests of every songbench crate.
//!
//! Compiled for this crate's own tests and, for downstream crates, behind the
//! `test-util` feature.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Builder, Int64Builder, RecordBatch, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;

use crate::storage::TableLocation;
use crate::table::{TableSnapshot, VersionedTable};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// One row of the songs table.
#[derive(Debug, Clone)]
pub struct SongRow {
    /// Release year.
    pub year: i64,
    /// Genre label.
    pub genre: &'static str,
    /// Artist name.
    pub artist_name: &'static str,
    /// Track name.
    pub track_name: &'static str,
    /// Popularity score, if known.
    pub popularity: Option<i64>,
    /// Tempo in BPM, if known.
    pub tempo: Option<f64>,
    /// Danceability in `[0, 1]`, if known.
    pub danceability: Option<f64>,
}

/// A song with tempo 120 and danceability 0.6.
pub fn song(
    year: i64,
    genre: &'static str,
    artist_name: &'static str,
    track_name: &'static str,
    popularity: Option<i64>,
) -> SongRow {
    SongRow {
        year,
        genre,
        artist_name,
        track_name,
        popularity,
        tempo: Some(120.0),
        danceability: Some(0.6),
    }
}

/// Five 2023 rows: three pop, two rock.
pub fn pop_rock_2023() -> Vec<SongRow> {
    vec![
        song(2023, "pop", "Ava", "Glass", Some(81)),
        song(2023, "pop", "Ben", "Neon", Some(64)),
        song(2023, "pop", "Cleo", "Tide", Some(72)),
        song(2023, "rock", "Dax", "Iron", Some(90)),
        song(2023, "rock", "Eli", "Ash", Some(55)),
    ]
}

/// Arrow schema of the songs table.
pub fn songs_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int64, false),
        Field::new("genre", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, false),
        Field::new("track_name", DataType::Utf8, false),
        Field::new("popularity", DataType::Int64, true),
        Field::new("tempo", DataType::Float64, true),
        Field::new("danceability", DataType::Float64, true),
    ]))
}

/// Build one batch holding `rows` in the songs schema.
pub fn songs_batch(rows: &[SongRow]) -> Result<RecordBatch, ArrowError> {
    let mut year = Int64Builder::with_capacity(rows.len());
    let mut genre = StringBuilder::new();
    let mut artist = StringBuilder::new();
    let mut track = StringBuilder::new();
    let mut popularity = Int64Builder::with_capacity(rows.len());
    let mut tempo = Float64Builder::with_capacity(rows.len());
    let mut danceability = Float64Builder::with_capacity(rows.len());

    for row in rows {
        year.append_value(row.year);
        genre.append_value(row.genre);
        artist.append_value(row.artist_name);
        track.append_value(row.track_name);
        popularity.append_option(row.popularity);
        tempo.append_option(row.tempo);
        danceability.append_option(row.danceability);
    }

    RecordBatch::try_new(
        songs_schema(),
        vec![
            Arc::new(year.finish()),
            Arc::new(genre.finish()),
            Arc::new(artist.finish()),
            Arc::new(track.finish()),
            Arc::new(popularity.finish()),
            Arc::new(tempo.finish()),
            Arc::new(danceability.finish()),
        ],
    )
}

/// A batch whose schema has nothing in common with the songs table.
pub fn other_batch() -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let mut ids = Int64Builder::new();
    ids.append_value(1);
    RecordBatch::try_new(schema, vec![Arc::new(ids.finish())])
}

/// Create a songs table at `location` whose version 0 holds `rows`.
///
/// No segment is written when `rows` is empty.
pub async fn create_songs_table(
    location: TableLocation,
    rows: &[SongRow],
) -> TestResult<VersionedTable> {
    let batches = if rows.is_empty() {
        Vec::new()
    } else {
        vec![songs_batch(rows)?]
    };
    Ok(VersionedTable::create_with_batches(location, songs_schema(), batches).await?)
}

/// Create a songs table at `root/songs` and return its location.
pub async fn write_songs_table(root: &Path, rows: &[SongRow]) -> TestResult<TableLocation> {
    let location = TableLocation::local(root.join("songs"));
    create_songs_table(location.clone(), rows).await?;
    Ok(location)
}

/// Create a songs table directly at `root` and pin its version 0.
pub async fn songs_snapshot(root: &Path, rows: &[SongRow]) -> TestResult<Arc<TableSnapshot>> {
    let table = create_songs_table(TableLocation::local(root), rows).await?;
    Ok(Arc::new(table.snapshot()))
}

/// Commit `rows` as the next version of the table at `location`.
pub async fn append_songs(location: &TableLocation, rows: &[SongRow]) -> TestResult<u64> {
    let mut table = VersionedTable::open(location.clone()).await?;
    Ok(table.append_batches(vec![songs_batch(rows)?]).await?)
}
