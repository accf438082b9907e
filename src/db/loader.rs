//! Delimited-file loading via `COPY ... FROM STDIN`

use crate::config::PgSettings;
use crate::db::connection::{close_with, connect};
use crate::db::identifier::{table_name_from_path, validate_identifier};
use crate::error::{Result, TabulatorError};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlx::postgres::PgConnection;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_DELIMITER: char = '\t';

/// `COPY table FROM STDIN` in Postgres text format with `delimiter`.
///
/// The delimiter must be a single-byte character other than newline, carriage
/// return or backslash.
pub fn copy_statement(table: &str, delimiter: char) -> Result<String> {
    let table = validate_identifier(table)?;
    Ok(format!(
        "COPY {} FROM STDIN WITH (FORMAT text, DELIMITER {})",
        table,
        delimiter_literal(delimiter)?
    ))
}

fn delimiter_literal(delimiter: char) -> Result<String> {
    match delimiter {
        '\t' => Ok("E'\\t'".to_string()),
        '\'' => Ok("''''".to_string()),
        '\n' | '\r' | '\\' => Err(TabulatorError::Config(format!(
            "{:?} cannot be used as a COPY delimiter",
            delimiter
        ))),
        c if c.is_ascii() && !c.is_ascii_control() => Ok(format!("'{}'", c)),
        c => Err(TabulatorError::Config(format!(
            "COPY delimiter must be a single printable ASCII character or tab, got {:?}",
            c
        ))),
    }
}

/// Table created by the first `CREATE TABLE` statement in `ddl`, if any.
pub fn ddl_table_name(ddl: &str) -> Result<Option<String>> {
    let statements =
        Parser::parse_sql(&PostgreSqlDialect {}, ddl).map_err(|e| TabulatorError::Sql(e.to_string()))?;

    Ok(statements.iter().find_map(|statement| match statement {
        Statement::CreateTable { name, .. } => Some(name.to_string()),
        _ => None,
    }))
}

/// Load the contents of a delimited data file into an existing table and
/// return the number of rows copied.
///
/// When `table` is `None` the name is taken from the file name, e.g.
/// `data/movie.tsv` loads into `movie`.
pub async fn load_delimited_file(
    path: &Path,
    table: Option<&str>,
    delimiter: char,
    settings: &PgSettings,
) -> Result<u64> {
    let table = match table {
        Some(table) => validate_identifier(table)?.to_string(),
        None => table_name_from_path(path)?,
    };
    let statement = copy_statement(&table, delimiter)?;

    info!("Populating {} using data from {}", table, path.display());
    let data = tokio::fs::read(path).await?;

    let mut conn = connect(settings).await?;
    let result = copy_in(&mut conn, &statement, data).await;
    let rows = close_with(conn, result).await?;

    info!("Copied {} rows into {}", rows, table);
    Ok(rows)
}

async fn copy_in(conn: &mut PgConnection, statement: &str, data: Vec<u8>) -> Result<u64> {
    debug!("{}", statement);
    let mut copy = conn.copy_in_raw(statement).await?;

    let sent = copy.send(data).await.map(|_| ());
    match sent {
        Ok(()) => Ok(copy.finish().await?),
        Err(e) => {
            copy.abort(e.to_string()).await?;
            Err(e.into())
        }
    }
}

/// Run `ddl` to create a table, then load `path` into it.
///
/// Without an explicit `table`, the name comes from the DDL's first
/// `CREATE TABLE`, then from the file name.
pub async fn create_and_load(
    ddl: &str,
    path: &Path,
    table: Option<&str>,
    delimiter: char,
    settings: &PgSettings,
) -> Result<u64> {
    let table = load_target(ddl, path, table)?;

    // Fail on an unusable delimiter before any DDL runs.
    delimiter_literal(delimiter)?;

    let mut conn = connect(settings).await?;
    let result = sqlx::raw_sql(ddl).execute(&mut conn).await.map_err(TabulatorError::from);
    close_with(conn, result).await?;
    debug!("Executed table creation statement");

    load_delimited_file(path, Some(&table), delimiter, settings).await
}

/// Table that `create_and_load` fills: `table` if given, else the DDL's first
/// `CREATE TABLE`, else the file name. DDL the parser cannot read still runs
/// on the server, so a parse failure only drops to the file name.
fn load_target(ddl: &str, path: &Path, table: Option<&str>) -> Result<String> {
    if let Some(table) = table {
        return Ok(validate_identifier(table)?.to_string());
    }
    match ddl_table_name(ddl) {
        Ok(Some(name)) => Ok(name),
        Ok(None) => table_name_from_path(path),
        Err(e) => {
            warn!("Could not read table name from DDL ({}), using file name", e);
            table_name_from_path(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_statement() {
        assert_eq!(
            copy_statement("movie", '\t').unwrap(),
            "COPY movie FROM STDIN WITH (FORMAT text, DELIMITER E'\\t')"
        );
        assert_eq!(
            copy_statement("public.book", ',').unwrap(),
            "COPY public.book FROM STDIN WITH (FORMAT text, DELIMITER ',')"
        );
        assert_eq!(
            copy_statement("book", '\'').unwrap(),
            "COPY book FROM STDIN WITH (FORMAT text, DELIMITER '''')"
        );
    }

    #[test]
    fn test_copy_statement_rejects_bad_input() {
        assert!(matches!(
            copy_statement("book; DROP TABLE movie", ','),
            Err(TabulatorError::InvalidIdentifier(_))
        ));
        assert!(matches!(copy_statement("book", '\n'), Err(TabulatorError::Config(_))));
        assert!(matches!(copy_statement("book", '\\'), Err(TabulatorError::Config(_))));
        assert!(matches!(copy_statement("book", 'é'), Err(TabulatorError::Config(_))));
    }

    #[test]
    fn test_ddl_table_name() {
        let ddl = "CREATE TABLE movie (movie_id INTEGER PRIMARY KEY, title VARCHAR(100));";
        assert_eq!(ddl_table_name(ddl).unwrap(), Some("movie".to_string()));

        let ddl = "DROP TABLE IF EXISTS book; CREATE TABLE public.book (isbn CHAR(13));";
        assert_eq!(ddl_table_name(ddl).unwrap(), Some("public.book".to_string()));

        assert_eq!(ddl_table_name("CREATE INDEX i ON movie (title);").unwrap(), None);
        assert!(matches!(ddl_table_name("CREATE TABLE ("), Err(TabulatorError::Sql(_))));
    }

    #[test]
    fn test_load_target() {
        let path = Path::new("data/movie_genres.tsv");
        let ddl = "CREATE TABLE film (id INTEGER);";
        assert_eq!(load_target(ddl, path, Some("book")).unwrap(), "book");
        assert_eq!(load_target(ddl, path, None).unwrap(), "film");
        assert_eq!(load_target("CREATE INDEX i ON film (id);", path, None).unwrap(), "movie_genres");
    }

    #[test]
    fn test_load_target_falls_back_on_unparseable_ddl() {
        let path = Path::new("data/movie.tsv");
        let ddl = "CREATE TABLE movie (id INTEGER) WITH (fillfactor = 70) TABLESPACE )";
        assert!(ddl_table_name(ddl).is_err());
        assert_eq!(load_target(ddl, path, None).unwrap(), "movie");
    }
}
