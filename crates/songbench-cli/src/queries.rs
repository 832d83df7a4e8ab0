//! The built-in analytical query batch over the songs relation.
//!
//! Every query is written against a `{relation}` placeholder so the batch
//! can run against whatever name the loader registered. The "best of"
//! queries are equality joins against a MAX, so tied rows all come back.

use crate::error::{CliError, CliResult};

/// Placeholder substituted with the relation name.
pub const RELATION_PLACEHOLDER: &str = "{relation}";

/// Relation name used when none is configured.
pub const DEFAULT_RELATION: &str = "demo";

/// One named query in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub name: String,
    pub sql: String,
    /// Render the result set before the timing line.
    pub display: bool,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, display: bool) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            display,
        }
    }
}

/// Replace every `{relation}` placeholder in `template`.
pub fn bind_relation(template: &str, relation: &str) -> String {
    template.replace(RELATION_PLACEHOLDER, relation)
}

const BEST_GENRE_EACH_YEAR: &str = "
    WITH avgGenrePopulerYear(year, genre, avg_popularity) AS (
            SELECT year, genre, avg(popularity)
            FROM {relation}
            WHERE popularity IS NOT NULL
            GROUP BY year, genre),
        maxAvgPopulerYear(year, max_popularity) AS (
            SELECT year, max(avg_popularity)
            FROM avgGenrePopulerYear
            GROUP BY year)
    SELECT avgGenrePopulerYear.year, genre, avg_popularity
    FROM avgGenrePopulerYear
    JOIN maxAvgPopulerYear
    ON avgGenrePopulerYear.year = maxAvgPopulerYear.year
        AND avg_popularity = max_popularity
    ORDER BY avgGenrePopulerYear.year, genre
";

const BEST_SONG_IN_YEAR: &str = "
    WITH bestSonginYear(year, genre, max_popularity) AS (
        SELECT year, genre, max(popularity)
        FROM {relation}
        WHERE popularity IS NOT NULL
        GROUP BY year, genre
    )
    SELECT {relation}.year, artist_name, track_name, max_popularity AS popularity
    FROM (
        SELECT year, max(max_popularity) max_popularity FROM bestSonginYear
        GROUP BY year
    ) a JOIN {relation}
    ON max_popularity = popularity AND a.year = {relation}.year
    ORDER BY {relation}.year
";

const BEST_SONG_OF_HEAVY_METAL: &str = "
    WITH bestOfHeavyMetal(genre, max_popularity) AS (
        SELECT genre, max(popularity)
        FROM {relation}
        WHERE genre = 'heavy-metal'
        GROUP BY genre
    )
    SELECT artist_name, track_name, popularity
    FROM {relation}
    JOIN bestOfHeavyMetal
    ON popularity = max_popularity
    WHERE {relation}.genre = 'heavy-metal'
";

const BEST_SONG_OF_POP_GENRE_IN_YEAR: &str = "
    WITH bestOfPop(year, genre, max_popularity) AS (
        SELECT year, genre, max(popularity)
        FROM {relation}
        WHERE genre = 'pop'
        GROUP BY year, genre
    )
    SELECT {relation}.year, artist_name, track_name, popularity
    FROM {relation}
    JOIN bestOfPop
    ON popularity = max_popularity AND {relation}.year = bestOfPop.year
    WHERE {relation}.genre = 'pop'
    ORDER BY {relation}.year
";

const TOP_10_ARTIST_WITH_POPULARITY_OVER80: &str = "
    SELECT artist_name, COUNT(artist_name) best_artist
    FROM {relation}
    WHERE popularity >= 80
    GROUP BY artist_name
    ORDER BY best_artist DESC
    LIMIT 10
";

const STATS_TEMPO_EACH_GENRE: &str = "
    WITH avgTempoGenre(genre, min_tempo, avg_tempo, max_tempo) AS (
        SELECT genre, min(tempo), avg(tempo), max(tempo)
        FROM {relation}
        WHERE tempo IS NOT NULL AND tempo > 20
        GROUP BY genre
    )
    SELECT * FROM avgTempoGenre
    ORDER BY genre
";

const TOP_10_GENRE_DANCEABILITY: &str = "
    WITH avgDanceableGenre(genre, avg_danceable_genre) AS (
        SELECT genre, avg(danceability)
        FROM {relation}
        WHERE danceability > 0.2 AND danceability < 1
        GROUP BY genre
    )
    SELECT genre, avg_danceable_genre danceability
    FROM avgDanceableGenre
    WHERE avg_danceable_genre >= 0.557
    ORDER BY avg_danceable_genre DESC
    LIMIT 10
";

const BEST_SONG_2023_BASED_POPULARITY_AND_GENRE: &str = "
    WITH bestGenrein2023(year, genre, max_popularity) AS (
        SELECT year, genre, max(popularity)
        FROM {relation}
        WHERE year = 2023
        GROUP BY year, genre
    )
    SELECT artist_name, track_name, {relation}.genre, popularity
    FROM {relation}
    JOIN bestGenrein2023 a
    ON {relation}.genre = a.genre AND popularity = max_popularity
    WHERE {relation}.year = 2023
    ORDER BY {relation}.genre
";

const BUILTIN: [(&str, &str); 8] = [
    ("best_genre_each_year", BEST_GENRE_EACH_YEAR),
    ("best_song_in_year", BEST_SONG_IN_YEAR),
    ("best_song_of_heavy_metal", BEST_SONG_OF_HEAVY_METAL),
    (
        "best_song_of_pop_genre_in_year",
        BEST_SONG_OF_POP_GENRE_IN_YEAR,
    ),
    (
        "top_10_artist_with_popularity_over80",
        TOP_10_ARTIST_WITH_POPULARITY_OVER80,
    ),
    ("stats_tempo_each_genre", STATS_TEMPO_EACH_GENRE),
    ("top_10_genre_danceability", TOP_10_GENRE_DANCEABILITY),
    (
        "best_song_2023_based_popularity_and_genre",
        BEST_SONG_2023_BASED_POPULARITY_AND_GENRE,
    ),
];

// Not part of the default batch; selectable by name.
const ADHOC: [(&str, &str); 2] = [
    ("select_all", "SELECT * FROM {relation} LIMIT 100"),
    ("count_rows", "SELECT count(*) FROM {relation}"),
];

/// The default eight-query batch, in execution order.
pub fn builtin_batch(relation: &str) -> Vec<QuerySpec> {
    BUILTIN
        .iter()
        .map(|(name, sql)| QuerySpec::new(*name, bind_relation(sql, relation), true))
        .collect()
}

/// Ad-hoc queries that can be picked by name.
pub fn adhoc_queries(relation: &str) -> Vec<QuerySpec> {
    ADHOC
        .iter()
        .map(|(name, sql)| QuerySpec::new(*name, bind_relation(sql, relation), true))
        .collect()
}

/// Keep only the queries named in `names`, in the order `names` lists them.
///
/// `available` is searched for each name; an unknown name is an error that
/// lists what could have been picked.
pub fn select_queries(available: &[QuerySpec], names: &[String]) -> CliResult<Vec<QuerySpec>> {
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|q| &q.name == name)
                .cloned()
                .ok_or_else(|| CliError::UnknownQuery {
                    name: name.clone(),
                    available: available
                        .iter()
                        .map(|q| q.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}
