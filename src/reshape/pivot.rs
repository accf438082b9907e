//! Pivot - aggregation records to a labelled wide table

use crate::error::{Result, TabulatorError};
use crate::reshape::flatten::{flatten, CollisionPolicy};
use crate::reshape::labels::LabelMap;
use crate::reshape::record::{AggregationRecord, FlatRecord, Scalar};
use crate::reshape::table::LabelTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Which fields become rows, columns and cells, and how to present them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    pub row_field: String,
    pub column_field: String,
    pub value_field: String,

    /// Substituted for (row, column) pairs with no record.
    #[serde(default)]
    pub fill_value: Option<Scalar>,

    #[serde(default)]
    pub relabel_rows: bool,

    #[serde(default)]
    pub relabel_columns: bool,

    /// Displayed row axis name; defaults to `row_field`.
    #[serde(default)]
    pub row_axis_label: Option<String>,

    /// Displayed column axis name; defaults to `column_field`.
    #[serde(default)]
    pub column_axis_label: Option<String>,

    #[serde(default)]
    pub collision: CollisionPolicy,

    /// Order rows by raw key instead of first occurrence.
    #[serde(default)]
    pub sort_rows: bool,

    /// Order columns by raw key instead of first occurrence.
    #[serde(default)]
    pub sort_columns: bool,
}

impl PivotSpec {
    pub fn new(
        row_field: impl Into<String>,
        column_field: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            row_field: row_field.into(),
            column_field: column_field.into(),
            value_field: value_field.into(),
            fill_value: None,
            relabel_rows: false,
            relabel_columns: false,
            row_axis_label: None,
            column_axis_label: None,
            collision: CollisionPolicy::default(),
            sort_rows: false,
            sort_columns: false,
        }
    }

    pub fn fill(mut self, value: impl Into<Scalar>) -> Self {
        self.fill_value = Some(value.into());
        self
    }

    pub fn relabel_rows(mut self) -> Self {
        self.relabel_rows = true;
        self
    }

    pub fn relabel_columns(mut self) -> Self {
        self.relabel_columns = true;
        self
    }

    pub fn row_axis_label(mut self, label: impl Into<String>) -> Self {
        self.row_axis_label = Some(label.into());
        self
    }

    pub fn column_axis_label(mut self, label: impl Into<String>) -> Self {
        self.column_axis_label = Some(label.into());
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }

    pub fn sort_rows(mut self) -> Self {
        self.sort_rows = true;
        self
    }

    pub fn sort_columns(mut self) -> Self {
        self.sort_columns = true;
        self
    }
}

/// Reshapes batches of aggregation records into `LabelTable`s.
///
/// The label map is borrowed for the reshaper's lifetime and consulted only
/// for axes whose relabeling the `PivotSpec` requests.
pub struct TableReshaper<'a> {
    labels: &'a LabelMap,
}

impl<'a> TableReshaper<'a> {
    pub fn new(labels: &'a LabelMap) -> Self {
        Self { labels }
    }

    /// Reshape raw JSON records. Any non-object record is a `MalformedRecord`.
    pub fn to_table(&self, records: &[Value], spec: &PivotSpec) -> Result<LabelTable> {
        let records = records
            .iter()
            .enumerate()
            .map(|(index, value)| AggregationRecord::from_json(value, index))
            .collect::<Result<Vec<_>>>()?;
        self.reshape(&records, spec)
    }

    pub fn reshape(&self, records: &[AggregationRecord], spec: &PivotSpec) -> Result<LabelTable> {
        let flat = records
            .iter()
            .enumerate()
            .map(|(index, record)| flatten(record, spec.collision, index))
            .collect::<Result<Vec<_>>>()?;

        // Validate every record before building anything.
        let mut triples = Vec::with_capacity(flat.len());
        for (index, record) in flat.iter().enumerate() {
            let row = required(record, &spec.row_field, index)?;
            let column = required(record, &spec.column_field, index)?;
            let value = required(record, &spec.value_field, index)?;
            triples.push((row, column, value));
        }

        let mut row_keys = AxisKeys::default();
        let mut column_keys = AxisKeys::default();
        let positions: Vec<(usize, usize)> = triples
            .iter()
            .map(|(row, column, _)| (row_keys.position(row), column_keys.position(column)))
            .collect();

        let mut cells: Vec<Vec<Option<Scalar>>> = vec![vec![None; column_keys.len()]; row_keys.len()];
        for ((r, c), (_, _, value)) in positions.into_iter().zip(&triples) {
            // Later records overwrite earlier ones for the same (row, column).
            cells[r][c] = Some((*value).clone());
        }

        if let Some(fill) = &spec.fill_value {
            for cell in cells.iter_mut().flatten() {
                if cell.is_none() {
                    *cell = Some(fill.clone());
                }
            }
        }

        // Sorting uses raw keys, so it happens before relabeling.
        let mut row_keys = row_keys.keys;
        let mut column_keys = column_keys.keys;
        if spec.sort_rows {
            let order = sorted_order(&row_keys);
            row_keys = permute(row_keys, &order);
            cells = permute(cells, &order);
        }
        if spec.sort_columns {
            let order = sorted_order(&column_keys);
            column_keys = permute(column_keys, &order);
            cells = cells.into_iter().map(|row| permute(row, &order)).collect();
        }

        let row_keys = if spec.relabel_rows {
            self.relabel(&spec.row_field, row_keys)?
        } else {
            row_keys
        };
        let column_keys = if spec.relabel_columns {
            self.relabel(&spec.column_field, column_keys)?
        } else {
            column_keys
        };

        debug!(
            "Reshaped {} records into {} rows x {} columns ({} x {})",
            records.len(),
            row_keys.len(),
            column_keys.len(),
            spec.row_field,
            spec.column_field
        );

        Ok(LabelTable::new(
            spec.row_axis_label.clone().unwrap_or_else(|| spec.row_field.clone()),
            spec.column_axis_label.clone().unwrap_or_else(|| spec.column_field.clone()),
            row_keys,
            column_keys,
            cells,
        ))
    }

    fn relabel(&self, field: &str, keys: Vec<Scalar>) -> Result<Vec<Scalar>> {
        let mut seen = HashSet::with_capacity(keys.len());
        keys.iter()
            .map(|raw| {
                let label = self.labels.lookup(field, raw)?;
                if !seen.insert(label) {
                    return Err(TabulatorError::DuplicateLabel {
                        field: field.to_string(),
                        label: label.to_string(),
                    });
                }
                Ok(Scalar::Text(label.to_string()))
            })
            .collect()
    }
}

/// Convenience wrapper around `TableReshaper::to_table`.
pub fn to_table(records: &[Value], spec: &PivotSpec, labels: &LabelMap) -> Result<LabelTable> {
    TableReshaper::new(labels).to_table(records, spec)
}

fn required<'r>(record: &'r FlatRecord, field: &str, index: usize) -> Result<&'r Scalar> {
    record.get(field).ok_or_else(|| TabulatorError::MissingField {
        field: field.to_string(),
        record: index,
    })
}

fn sorted_order(keys: &[Scalar]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| keys[a].sort_cmp(&keys[b]));
    order
}

fn permute<T>(items: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// Distinct axis values in first-occurrence order.
#[derive(Default)]
struct AxisKeys {
    keys: Vec<Scalar>,
    index: HashMap<Scalar, usize>,
}

impl AxisKeys {
    fn position(&mut self, key: &Scalar) -> usize {
        if let Some(&pos) = self.index.get(key) {
            return pos;
        }
        let pos = self.keys.len();
        self.keys.push(key.clone());
        self.index.insert(key.clone(), pos);
        pos
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}
