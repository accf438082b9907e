//! Housekeeping - drop the tables belonging to a teaching activity
//!
//! Each activity (books, movies, ...) creates a known set of tables. A
//! `TableGroups` registry names those sets so they can be dropped together.

use crate::config::PgSettings;
use crate::db::connection::{close_with, connect};
use crate::db::identifier::validate_identifier;
use crate::error::{Result, TabulatorError};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Groups dropped when no group is named explicitly. `drugs` is registered
/// but only dropped on request.
pub const DEFAULT_GROUP_NAMES: &[&str] = &["movies", "books", "references"];

const BOOKS: &[&str] = &[
    "book_authors",
    "author",
    "books_purchased",
    "order_item_book",
    "order_customer",
    "order_item",
    "book",
    "orders",
    "customer",
];

const MOVIES: &[&str] = &[
    "movie_genres_list",
    "movie_genres_array",
    "movie_actor",
    "movie_country",
    "movie_director",
    "movie_genre",
    "movie",
    "movie_unnormalised",
];

const DRUGS: &[&str] = &[
    "drugs_prescribed",
    "patient_prescription",
    "patient_doctor",
    "prescription",
    "drug",
    "doctor",
    "patient",
];

const REFERENCES: &[&str] = &["referencing_table", "referenced_table"];

/// Named lists of tables, dropped in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl Default for TableGroups {
    fn default() -> Self {
        let mut groups = TableGroups::empty();
        groups.insert("books", BOOKS.iter().copied());
        groups.insert("movies", MOVIES.iter().copied());
        groups.insert("drugs", DRUGS.iter().copied());
        groups.insert("references", REFERENCES.iter().copied());
        groups
    }
}

impl TableGroups {
    pub fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub fn insert<I, S>(&mut self, name: impl Into<String>, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), tables.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Read a registry from a JSON object of `{"group": ["table", ...]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let groups: TableGroups = serde_json::from_str(&content)?;
        for tables in groups.groups.values() {
            for table in tables {
                validate_identifier(table)?;
            }
        }
        Ok(groups)
    }

    /// `DROP TABLE IF EXISTS ... CASCADE` for every table in the requested
    /// groups. Unknown group names are skipped with a warning.
    pub fn drop_statements<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for name in requested {
            let name = name.as_ref();
            let Some(tables) = self.get(name) else {
                warn!("No table group named '{}', skipping", name);
                continue;
            };
            for table in tables {
                let table = validate_identifier(table)?;
                statements.push(format!("DROP TABLE IF EXISTS {} CASCADE", table));
            }
        }
        Ok(statements)
    }
}

/// Drop every table in the requested groups; returns the statements executed.
pub async fn drop_table_groups<S: AsRef<str>>(
    requested: &[S],
    groups: &TableGroups,
    settings: &PgSettings,
) -> Result<Vec<String>> {
    let statements = groups.drop_statements(requested)?;
    if statements.is_empty() {
        info!("Nothing to drop");
        return Ok(statements);
    }

    let mut conn = connect(settings).await?;
    let result = execute_all(&mut conn, &statements).await;
    close_with(conn, result).await?;

    info!("Dropped {} table(s) from {}", statements.len(), settings.dbname);
    Ok(statements)
}

async fn execute_all(conn: &mut PgConnection, statements: &[String]) -> Result<()> {
    for statement in statements {
        sqlx::raw_sql(statement)
            .execute(&mut *conn)
            .await
            .map_err(TabulatorError::from)?;
    }
    Ok(())
}
