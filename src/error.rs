use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabulatorError {
    #[error("Malformed record at position {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Record {record} has no field '{field}' after flattening")]
    MissingField { field: String, record: usize },

    #[error("No label for {field} = {value}")]
    UnknownLabel { field: String, value: String },

    #[error("Field '{field}' appears at more than one nesting level in record {record}")]
    FieldCollision { field: String, record: usize },

    #[error("Label '{label}' is used for more than one {field} value")]
    DuplicateLabel { field: String, label: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Column '{column}' has type {type_name}; cast it to text or a numeric type in the query")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store error: {0}")]
    DocumentStore(#[from] mongodb::error::Error),

    #[error("SQL parse error: {0}")]
    Sql(String),

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<polars::prelude::PolarsError> for TabulatorError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        TabulatorError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TabulatorError>;
