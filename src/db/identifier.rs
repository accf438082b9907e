//! SQL identifier checks for statements that cannot take bind parameters
//!
//! `COPY` and `DROP TABLE` need the table name spliced into the statement
//! text, so names are validated against a strict pattern first.

use crate::error::{Result, TabulatorError};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    // `table`, `schema.table`, or either part double-quoted.
    static ref IDENTIFIER: Regex = Regex::new(
        r#"^(?:[A-Za-z_][A-Za-z0-9_$]*|"[^"]+")(?:\.(?:[A-Za-z_][A-Za-z0-9_$]*|"[^"]+"))?$"#
    )
    .expect("identifier pattern is valid");
}

pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(TabulatorError::InvalidIdentifier(name.to_string()))
    }
}

/// Table name implied by a data file: the file name up to its first dot, so
/// `data/movie.tsv` and `movie.2020.csv` both load into `movie`.
pub fn table_name_from_path(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TabulatorError::Config(format!("cannot derive a table name from {}", path.display())))?;

    let stem = file_name.split('.').next().unwrap_or_default();
    validate_identifier(stem).map(str::to_string)
}
