//! Label maps - display names for coded values
//!
//! A label map translates `(field, raw value)` pairs such as
//! `("Accident_Severity", 1)` into human-readable labels such as `"Fatal"`.
//! Maps are built once by the caller and passed into the reshaper; nothing in
//! this crate mutates a map after construction.

use crate::error::{Result, TabulatorError};
use crate::reshape::record::Scalar;
use csv::ReaderBuilder;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    fields: HashMap<String, HashMap<Scalar, String>>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, raw: impl Into<Scalar>, label: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(raw.into(), label.into());
    }

    pub fn with(mut self, field: impl Into<String>, raw: impl Into<Scalar>, label: impl Into<String>) -> Self {
        self.insert(field, raw, label);
        self
    }

    pub fn get(&self, field: &str, raw: &Scalar) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|labels| labels.get(raw))
            .map(String::as_str)
    }

    /// Like `get`, but a miss is an `UnknownLabel` error.
    pub fn lookup(&self, field: &str, raw: &Scalar) -> Result<&str> {
        self.get(field, raw).ok_or_else(|| TabulatorError::UnknownLabel {
            field: field.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse `{"field": {"raw": "label", ...}, ...}`.
    ///
    /// JSON object keys are always strings, so raw values are coerced with
    /// `Scalar::parse_cell`: `"1"` becomes the integer 1.
    pub fn from_json(value: &Value) -> Result<Self> {
        let fields = value.as_object().ok_or_else(|| {
            TabulatorError::Config("label map must be an object of field -> {raw: label}".to_string())
        })?;

        let mut map = LabelMap::new();
        for (field, labels) in fields {
            let labels = labels.as_object().ok_or_else(|| {
                TabulatorError::Config(format!("labels for field '{}' must be an object", field))
            })?;
            for (raw, label) in labels {
                let label = label.as_str().ok_or_else(|| {
                    TabulatorError::Config(format!("label for {} = {} must be a string", field, raw))
                })?;
                map.insert(field.clone(), Scalar::parse_cell(raw), label);
            }
        }
        Ok(map)
    }

    /// Read rows of `field,value,label` with a header line.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut map = LabelMap::new();
        for result in rdr.records() {
            let record = result?;
            if record.len() < 3 {
                return Err(TabulatorError::Config(format!(
                    "label map row {:?} needs field, value and label columns",
                    record.iter().collect::<Vec<_>>()
                )));
            }
            map.insert(&record[0], Scalar::parse_cell(&record[1]), &record[2]);
        }
        Ok(map)
    }

    /// Load from a `.json` or `.csv` file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let map = match ext.as_deref() {
            Some("json") => {
                let content = std::fs::read_to_string(path)?;
                LabelMap::from_json(&serde_json::from_str(&content)?)?
            }
            Some("csv") => LabelMap::from_csv_reader(std::fs::File::open(path)?)?,
            _ => {
                return Err(TabulatorError::Config(format!(
                    "label map {} must be a .json or .csv file",
                    path.display()
                )))
            }
        };

        debug!("Loaded {} labels from {}", map.len(), path.display());
        Ok(map)
    }
}
