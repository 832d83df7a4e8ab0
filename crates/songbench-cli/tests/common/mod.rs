use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const HEADER: &str = "year,genre,artist_name,track_name,popularity,tempo,danceability";

/// `(year, genre, artist, track, popularity)`; tempo and danceability are
/// fixed per row.
pub type Song = (i64, &'static str, &'static str, &'static str, i64);

pub const POP_ROCK_2023: [Song; 5] = [
    (2023, "pop", "Ava", "Glass", 81),
    (2023, "pop", "Ben", "Neon", 64),
    (2023, "pop", "Cleo", "Tide", 72),
    (2023, "rock", "Dax", "Iron", 90),
    (2023, "rock", "Eli", "Ash", 55),
];

pub fn table_root(tmp: &TempDir, name: &str) -> PathBuf {
    tmp.path().join(name)
}

pub fn write_songs_csv(path: &Path, rows: &[Song]) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut text = String::from(HEADER);
    text.push('\n');
    for (i, (year, genre, artist, track, popularity)) in rows.iter().enumerate() {
        let tempo = 100.5 + i as f64;
        let danceability = 0.6;
        text.push_str(&format!(
            "{year},{genre},{artist},{track},{popularity},{tempo},{danceability}\n"
        ));
    }
    std::fs::write(path, text)?;
    Ok(())
}
