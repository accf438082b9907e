//! Label tables - the two-dimensional result of a reshape

use crate::error::Result;
use crate::reshape::record::Scalar;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, Table};
use polars::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Rows x columns of optional scalar cells, with one axis name per dimension.
///
/// A `None` cell means no input record produced that (row, column) pair and no
/// fill value was supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    row_axis: String,
    column_axis: String,
    row_keys: Vec<Scalar>,
    column_keys: Vec<Scalar>,
    cells: Vec<Vec<Option<Scalar>>>,
}

impl LabelTable {
    pub(crate) fn new(
        row_axis: String,
        column_axis: String,
        row_keys: Vec<Scalar>,
        column_keys: Vec<Scalar>,
        cells: Vec<Vec<Option<Scalar>>>,
    ) -> Self {
        debug_assert_eq!(cells.len(), row_keys.len());
        debug_assert!(cells.iter().all(|row| row.len() == column_keys.len()));
        Self {
            row_axis,
            column_axis,
            row_keys,
            column_keys,
            cells,
        }
    }

    pub fn row_axis(&self) -> &str {
        &self.row_axis
    }

    pub fn column_axis(&self) -> &str {
        &self.column_axis
    }

    pub fn row_keys(&self) -> &[Scalar] {
        &self.row_keys
    }

    pub fn column_keys(&self) -> &[Scalar] {
        &self.column_keys
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_keys.len(), self.column_keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty() && self.column_keys.is_empty()
    }

    pub fn row_index(&self, row: &Scalar) -> Option<usize> {
        self.row_keys.iter().position(|k| k == row)
    }

    pub fn column_index(&self, column: &Scalar) -> Option<usize> {
        self.column_keys.iter().position(|k| k == column)
    }

    /// Value at (`row`, `column`), or `None` if either key is unknown or the
    /// cell is empty.
    pub fn get(&self, row: &Scalar, column: &Scalar) -> Option<&Scalar> {
        let r = self.row_index(row)?;
        let c = self.column_index(column)?;
        self.cell(r, c)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Scalar> {
        self.cells.get(row)?.get(column)?.as_ref()
    }

    /// Iterate rows as (row key, cells).
    pub fn rows(&self) -> impl Iterator<Item = (&Scalar, &[Option<Scalar>])> {
        self.row_keys
            .iter()
            .zip(self.cells.iter().map(Vec::as_slice))
    }

    /// Convert to a polars `DataFrame`.
    ///
    /// The first column holds the row keys and is named after the row axis;
    /// every column key becomes a column named by its display form. Columns
    /// whose values are all integers stay `i64`, all-numeric columns become
    /// `f64`, anything else is rendered as text.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(self.column_keys.len() + 1);
        let keys: Vec<Option<Scalar>> = self.row_keys.iter().cloned().map(Some).collect();
        series.push(scalar_series(&self.row_axis, &keys));

        for (c, key) in self.column_keys.iter().enumerate() {
            let column: Vec<Option<Scalar>> = self.cells.iter().map(|row| row[c].clone()).collect();
            series.push(scalar_series(&key.to_string(), &column));
        }

        Ok(DataFrame::new(series)?)
    }
}

pub(crate) fn scalar_series(name: &str, values: &[Option<Scalar>]) -> Series {
    let present = || values.iter().flatten().filter(|v| !v.is_null());

    if present().all(|v| matches!(v, Scalar::Int(_))) {
        let ints: Vec<Option<i64>> = values.iter().map(|v| v.as_ref().and_then(Scalar::as_i64)).collect();
        return Series::new(name, ints);
    }

    if present().all(|v| matches!(v, Scalar::Int(_) | Scalar::Float(_))) {
        let floats: Vec<Option<f64>> = values.iter().map(|v| v.as_ref().and_then(Scalar::as_f64)).collect();
        return Series::new(name, floats);
    }

    if present().all(|v| matches!(v, Scalar::Bool(_))) {
        let bools: Vec<Option<bool>> = values
            .iter()
            .map(|v| match v {
                Some(Scalar::Bool(b)) => Some(*b),
                _ => None,
            })
            .collect();
        return Series::new(name, bools);
    }

    let text: Vec<Option<String>> = values
        .iter()
        .map(|v| match v {
            Some(Scalar::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .collect();
    Series::new(name, text)
}

impl Serialize for LabelTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LabelTable", 5)?;
        state.serialize_field("row_axis", &self.row_axis)?;
        state.serialize_field("column_axis", &self.column_axis)?;
        state.serialize_field("rows", &self.row_keys)?;
        state.serialize_field("columns", &self.column_keys)?;
        state.serialize_field("cells", &self.cells)?;
        state.end()
    }
}

/// Aligned text grid, roughly how a notebook prints a pivoted frame:
///
/// ```text
/// Severity     1  2
/// Speed_limit
/// 30          10  4
/// 40           7  0
/// ```
/// Rendered with comfy-table. The corner cell names both axes, column axis
/// first; missing cells show as `-`.
impl fmt::Display for LabelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut grid = Table::new();
        grid.load_preset(UTF8_FULL_CONDENSED);

        let corner = Cell::new(format!("{}\n{}", self.column_axis, self.row_axis));
        grid.set_header(std::iter::once(corner).chain(self.column_keys.iter().map(Cell::new)));

        for (key, row) in self.row_keys.iter().zip(&self.cells) {
            let cells = row
                .iter()
                .map(|cell| cell.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string()));
            grid.add_row(std::iter::once(key.to_string()).chain(cells));
        }
        for column in grid.column_iter_mut().skip(1) {
            column.set_cell_alignment(CellAlignment::Right);
        }

        write!(f, "{}", grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> LabelTable {
        LabelTable::new(
            "Speed_limit".to_string(),
            "Severity".to_string(),
            vec![Scalar::Int(30), Scalar::Int(40)],
            vec![Scalar::Text("Fatal".to_string()), Scalar::Text("Serious".to_string())],
            vec![
                vec![Some(Scalar::Int(10)), Some(Scalar::Int(4))],
                vec![Some(Scalar::Int(7)), None],
            ],
        )
    }

    #[test]
    fn test_get_and_cell() {
        let table = sample();
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.get(&Scalar::Int(30), &"Serious".into()), Some(&Scalar::Int(4)));
        assert_eq!(table.get(&Scalar::Int(40), &"Serious".into()), None);
        assert_eq!(table.get(&Scalar::Int(50), &"Fatal".into()), None);
        assert_eq!(table.cell(1, 0), Some(&Scalar::Int(7)));
        assert_eq!(table.cell(2, 0), None);
    }

    #[test]
    fn test_serialize() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "row_axis": "Speed_limit",
                "column_axis": "Severity",
                "rows": [30, 40],
                "columns": ["Fatal", "Serious"],
                "cells": [[10, 4], [7, null]]
            })
        );
    }

    #[test]
    fn test_display() {
        let rendered = sample().to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        // Border, two header lines, separator, two rows, border.
        assert_eq!(lines.len(), 7);
        assert!(lines[1].contains("Severity") && lines[1].contains("Fatal") && lines[1].contains("Serious"));
        assert!(lines[2].contains("Speed_limit"));
        assert!(lines[4].contains("30") && lines[4].contains("10"));
        assert!(lines[5].contains("40") && lines[5].contains('-'));
    }

    #[test]
    fn test_to_dataframe() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.get_column_names(), vec!["Speed_limit", "Fatal", "Serious"]);

        let serious = df.column("Serious").unwrap().i64().unwrap();
        assert_eq!(serious.get(0), Some(4));
        assert_eq!(serious.get(1), None);
    }

    #[test]
    fn test_to_dataframe_mixed_column_becomes_text() {
        let table = LabelTable::new(
            "r".to_string(),
            "c".to_string(),
            vec![Scalar::Int(1), Scalar::Int(2)],
            vec![Scalar::Text("x".to_string())],
            vec![vec![Some(Scalar::Int(1))], vec![Some(Scalar::Text("n/a".to_string()))]],
        );
        let df = table.to_dataframe().unwrap();
        let x = df.column("x").unwrap().str().unwrap();
        assert_eq!(x.get(0), Some("1"));
        assert_eq!(x.get(1), Some("n/a"));
    }
}
