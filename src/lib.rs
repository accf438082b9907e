//! Tabulator - query helpers for teaching databases and a reshaper that turns
//! grouped query output into labelled pivot tables.

pub mod config;
pub mod db;
pub mod docstore;
pub mod error;
pub mod reports;
pub mod reshape;

pub use config::{DocStoreSettings, PgSettings, Settings};
pub use error::{Result, TabulatorError};
pub use reshape::{
    to_table, AggregationRecord, CollisionPolicy, LabelMap, LabelTable, PivotSpec, Scalar, TableReshaper,
};
