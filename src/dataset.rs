//! Tabular point inventories.
//!
//! A [`Dataset`] is what the I/O collaborators hand to the core: named
//! columns of equal length, with row order preserved so results can be
//! correlated back to the source rows. Values are compared as strings when
//! grouping or filtering, mirroring how the inventories are keyed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OptionExt, Result, SakuraError};
use crate::Coordinate;

/// A single dataset cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Numeric view of the cell; numeric text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Missing => None,
        }
    }

    /// String key used for grouping and filtering.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Missing => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

/// Row-major table with named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Empty dataset with the given column names.
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from `(name, values)` columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<CellValue>)>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |(_, v)| v.len());
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != n_rows) {
            return Err(SakuraError::config(format!(
                "column '{}' has {} values, expected {}",
                name,
                values.len(),
                n_rows
            )));
        }

        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let mut rows: Vec<Vec<CellValue>> = vec![Vec::with_capacity(names.len()); n_rows];
        for (_, values) in columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Ok(Self {
            columns: names,
            rows,
        })
    }

    /// Append a row; it must have one value per column.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SakuraError::config(format!(
                "row has {} values, dataset has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn row(&self, index: usize) -> &[CellValue] {
        &self.rows[index]
    }

    /// Value at `(row, column)`; `None` when the column is unknown.
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&CellValue>> {
        let col = self.column_index(name).ok_or_missing_column(name)?;
        Ok(self.rows.iter().map(|r| &r[col]).collect())
    }

    /// Index of `name`, appending an all-missing column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(CellValue::Missing);
        }
        self.columns.len() - 1
    }

    /// Overwrite one cell.
    pub fn set_value(&mut self, row: usize, column: usize, value: CellValue) {
        self.rows[row][column] = value;
    }

    /// New dataset containing the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Keep the rows for which `keep` returns true.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[CellValue]) -> bool) {
        self.rows.retain(|r| keep(r));
    }

    /// Parse the coordinate columns of every row.
    ///
    /// Fails when a column is missing, a value is not numeric, or a
    /// coordinate is out of range.
    pub fn coordinates(&self, lat_column: &str, lon_column: &str) -> Result<Vec<Coordinate>> {
        let lat_idx = self.column_index(lat_column).ok_or_missing_column(lat_column)?;
        let lon_idx = self.column_index(lon_column).ok_or_missing_column(lon_column)?;

        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let lat = row[lat_idx]
                    .as_f64()
                    .ok_or_else(|| SakuraError::InvalidCoordinates {
                        index: i,
                        message: format!("non-numeric latitude '{}'", row[lat_idx]),
                    })?;
                let lon = row[lon_idx]
                    .as_f64()
                    .ok_or_else(|| SakuraError::InvalidCoordinates {
                        index: i,
                        message: format!("non-numeric longitude '{}'", row[lon_idx]),
                    })?;
                let c = Coordinate::new(lat, lon);
                if !c.is_valid() {
                    return Err(SakuraError::InvalidCoordinates {
                        index: i,
                        message: format!("({}, {}) out of range", lat, lon),
                    });
                }
                Ok(c)
            })
            .collect()
    }
}
