//! Flattening - merge nested group keys into the top level of a record

use crate::error::{Result, TabulatorError};
use crate::reshape::record::{AggregationRecord, FieldValue, FlatRecord};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do when the same field name occurs at more than one nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the value seen first in traversal order.
    FirstWins,
    /// Keep the value seen last in traversal order.
    LastWins,
    /// Fail with `FieldCollision`.
    #[default]
    Reject,
}

impl FromStr for CollisionPolicy {
    type Err = TabulatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_wins" | "first" => Ok(CollisionPolicy::FirstWins),
            "last_wins" | "last" => Ok(CollisionPolicy::LastWins),
            "reject" => Ok(CollisionPolicy::Reject),
            other => Err(TabulatorError::Config(format!(
                "unknown collision policy '{}' (expected first-wins, last-wins or reject)",
                other
            ))),
        }
    }
}

/// Flatten `record`, keying every leaf by its innermost field name.
///
/// Fields are visited in key order, depth first, so "first" and "last" under
/// `FirstWins`/`LastWins` refer to that order. `index` is the record's position
/// in its batch, reported on collision.
pub fn flatten(record: &AggregationRecord, policy: CollisionPolicy, index: usize) -> Result<FlatRecord> {
    let mut out = FlatRecord::new();
    merge_into(record, &mut out, policy, index)?;
    Ok(out)
}

fn merge_into(
    record: &AggregationRecord,
    out: &mut FlatRecord,
    policy: CollisionPolicy,
    index: usize,
) -> Result<()> {
    for (name, value) in record.fields() {
        match value {
            FieldValue::Nested(inner) => merge_into(inner, out, policy, index)?,
            FieldValue::Scalar(scalar) => {
                if out.contains(name) {
                    match policy {
                        CollisionPolicy::FirstWins => continue,
                        CollisionPolicy::LastWins => {}
                        CollisionPolicy::Reject => {
                            return Err(TabulatorError::FieldCollision {
                                field: name.clone(),
                                record: index,
                            })
                        }
                    }
                }
                out.insert(name.clone(), scalar.clone());
            }
        }
    }
    Ok(())
}
