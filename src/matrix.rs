//! Dense distance matrix storage.
//!
//! Matrices are stored row-major. Entry `(i, j)` is the travel distance in
//! meters from point `i` (source) to point `j` (destination).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SakuraError};

/// A dense `rows × cols` matrix of distances in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from nested rows; all rows must share one length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(SakuraError::Internal {
                    message: format!(
                        "ragged matrix: row {} has {} columns, expected {}",
                        i,
                        row.len(),
                        n_cols
                    ),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Build a square matrix by evaluating `f(i, j)` for every `i < j` and
    /// mirroring it, leaving a zero diagonal.
    pub fn symmetric_from_fn(size: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut m = Self::zeros(size, size);
        for i in 0..size {
            for j in (i + 1)..size {
                let d = f(i, j);
                m.set(i, j, d);
                m.set(j, i, d);
            }
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Number of points for a square matrix.
    pub fn size(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Borrow a single row.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Copy out as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }

    /// Copy `block` into this matrix with its top-left corner at `(row, col)`.
    pub fn set_block(&mut self, row: usize, col: usize, block: &DistanceMatrix) {
        for i in 0..block.rows {
            for j in 0..block.cols {
                self.set(row + i, col + j, block.get(i, j));
            }
        }
    }

    /// Copy the transpose of `block` with its top-left corner at `(row, col)`.
    pub fn set_block_transposed(&mut self, row: usize, col: usize, block: &DistanceMatrix) {
        for i in 0..block.rows {
            for j in 0..block.cols {
                self.set(row + j, col + i, block.get(i, j));
            }
        }
    }

    /// Square sub-matrix restricted to `indices` (in the given order).
    pub fn submatrix(&self, indices: &[usize]) -> DistanceMatrix {
        let n = indices.len();
        let mut data = Vec::with_capacity(n * n);
        for &i in indices {
            for &j in indices {
                data.push(self.get(i, j));
            }
        }
        DistanceMatrix {
            rows: n,
            cols: n,
            data,
        }
    }

    /// Permute a square matrix so that new entry `(a, b)` is old
    /// `(order[a], order[b])`.
    pub fn reordered(&self, order: &[usize]) -> DistanceMatrix {
        self.submatrix(order)
    }

    /// Location and value of the largest entry.
    ///
    /// Square matrices only consider off-diagonal entries. Ties resolve to
    /// the first maximum in row-major order. Returns `None` when there is no
    /// candidate entry.
    pub fn farthest_pair(&self) -> Option<(usize, usize, f64)> {
        let square = self.is_square();
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..self.rows {
            for j in 0..self.cols {
                if square && i == j {
                    continue;
                }
                let v = self.get(i, j);
                match best {
                    Some((_, _, b)) if v <= b => {}
                    _ => best = Some((i, j, v)),
                }
            }
        }
        best
    }

    /// True when square and `|m[i][j] - m[j][i]| <= tolerance` everywhere.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        (0..self.rows).all(|i| {
            ((i + 1)..self.cols).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= tolerance)
        })
    }

    /// Largest absolute difference between two matrices of the same shape.
    pub fn max_abs_diff(&self, other: &DistanceMatrix) -> Option<f64> {
        if self.rows != other.rows || self.cols != other.cols {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}
