//! TOML query-batch files.
//!
//! ```toml
//! relation = "demo"          # optional
//!
//! [[query]]
//! name = "count_pop"
//! sql = "select count(*) from {relation} where genre = 'pop'"
//! display = true             # optional, defaults to true
//! ```

use std::path::Path;

use serde::Deserialize;
use snafu::ResultExt;

use crate::{
    error::{CliResult, EmptyBatchSnafu, ParseQueryFileSnafu, ReadQueryFileSnafu},
    queries::{QuerySpec, bind_relation},
};

fn default_display() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueryEntry {
    pub name: String,
    pub sql: String,
    #[serde(default = "default_display")]
    pub display: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueryBatchFile {
    /// Relation name the file was written for; the command line wins.
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default, rename = "query")]
    pub queries: Vec<QueryEntry>,
}

impl QueryBatchFile {
    pub fn parse(path: &Path, text: &str) -> CliResult<Self> {
        toml::from_str(text).context(ParseQueryFileSnafu { path })
    }

    pub async fn from_file(path: &Path) -> CliResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .context(ReadQueryFileSnafu { path })?;
        Self::parse(path, &text)
    }

    /// Bind the entries to `relation`, in file order.
    pub fn into_specs(self, relation: &str, origin: &Path) -> CliResult<Vec<QuerySpec>> {
        if self.queries.is_empty() {
            return EmptyBatchSnafu {
                origin: origin.display().to_string(),
            }
            .fail();
        }

        Ok(self
            .queries
            .into_iter()
            .map(|q| QuerySpec::new(q.name, bind_relation(&q.sql, relation), q.display))
            .collect())
    }
}
