//! Reshaping of aggregation results into labelled two-dimensional tables
//!
//! Grouped query output arrives as a batch of records such as
//! `{"_id": {"Speed_limit": 30, "Severity": 1}, "count": 10}`. The reshaper
//! flattens each record, pivots one field onto rows and another onto columns,
//! fills gaps, and optionally swaps coded axis values for display labels.
//!
//! The transform is pure: it performs no I/O and fails fast without returning
//! partial tables.

pub mod flatten;
pub mod labels;
pub mod pivot;
pub mod record;
pub mod table;

pub use flatten::{flatten, CollisionPolicy};
pub use labels::LabelMap;
pub use pivot::{to_table, PivotSpec, TableReshaper};
pub use record::{AggregationRecord, FieldValue, FlatRecord, Scalar};
pub use table::LabelTable;
