//! Aggregation records - typed view of grouped query output
//!
//! Query engines hand back JSON-like documents. Before reshaping, each one is
//! converted into an explicit tree of `FieldValue`s so that nesting and scalar
//! values are distinguished by type rather than by inspection at use sites.

use crate::error::{Result, TabulatorError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A leaf value in an aggregation record.
///
/// Scalars double as axis keys, so they are hashable. Floats compare and hash
/// by bit pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Scalar>),
}

impl Scalar {
    /// Total order for sorting axis keys: nulls, booleans, numbers (ints and
    /// floats compared by value), text, lists.
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        fn rank(s: &Scalar) -> u8 {
            match s {
                Scalar::Null => 0,
                Scalar::Bool(_) => 1,
                Scalar::Int(_) | Scalar::Float(_) => 2,
                Scalar::Text(_) => 3,
                Scalar::List(_) => 4,
            }
        }
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(f64::NAN), other.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::List(a), Scalar::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Coerce a raw text cell into the narrowest scalar that represents it.
    pub fn parse_cell(s: &str) -> Scalar {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Scalar::Null;
        }

        if trimmed.eq_ignore_ascii_case("true") {
            return Scalar::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Scalar::Bool(false);
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return Scalar::Int(i);
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            return Scalar::Float(f);
        }

        Scalar::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::List(items) => Value::Array(items.iter().map(Scalar::to_json).collect()),
        }
    }

    /// Convert a non-object JSON value. Objects are not scalars; `None` is
    /// returned for them and for arrays that contain them.
    pub fn from_json(value: &Value) -> Option<Scalar> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Scalar::List),
            Value::Object(_) => None,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::List(a), Scalar::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Text(s) => s.hash(state),
            Scalar::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A field in an aggregation record: either a leaf or a nested group key.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Scalar),
    Nested(AggregationRecord),
}

/// One grouped result row, e.g. `{"_id": {"Speed_limit": 30}, "count": 10}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl AggregationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(name, FieldValue::Scalar(value.into()));
        self
    }

    pub fn with_nested(mut self, name: impl Into<String>, value: AggregationRecord) -> Self {
        self.insert(name, FieldValue::Nested(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object. `index` is the record's position in
    /// its batch and is only used for error reporting.
    pub fn from_json(value: &Value, index: usize) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(TabulatorError::MalformedRecord {
                    index,
                    reason: format!("expected a mapping, found {}", json_kind(other)),
                })
            }
        };

        let mut record = AggregationRecord::new();
        for (name, field) in map {
            let value = match field {
                Value::Object(_) => FieldValue::Nested(AggregationRecord::from_json(field, index)?),
                other => match Scalar::from_json(other) {
                    Some(scalar) => FieldValue::Scalar(scalar),
                    None => {
                        return Err(TabulatorError::MalformedRecord {
                            index,
                            reason: format!("field '{}' is a list containing mappings", name),
                        })
                    }
                },
            };
            record.insert(name.clone(), value);
        }

        Ok(record)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// A record with every nested group merged into a single level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatRecord {
    fields: BTreeMap<String, Scalar>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn insert(&mut self, name: String, value: Scalar) {
        self.fields.insert(name, value);
    }
}

impl From<FlatRecord> for AggregationRecord {
    fn from(flat: FlatRecord) -> Self {
        let mut record = AggregationRecord::new();
        for (name, value) in flat.fields {
            record.insert(name, FieldValue::Scalar(value));
        }
        record
    }
}
