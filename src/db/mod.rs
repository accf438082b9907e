//! Database module for PostgreSQL helpers
//!
//! Thin wrappers over one connection each: run a query, list catalog objects,
//! clear sessions, load delimited files, and drop groups of tables.

pub mod connection;
pub mod housekeeping;
pub mod identifier;
pub mod loader;
pub mod query;

pub use connection::connect;
pub use housekeeping::{drop_table_groups, TableGroups, DEFAULT_GROUP_NAMES};
pub use identifier::{table_name_from_path, validate_identifier};
pub use loader::{create_and_load, load_delimited_file, DEFAULT_DELIMITER};
pub use query::{
    clear_connections, run_query, show_connections, show_databases, show_tables, QueryResult,
};
