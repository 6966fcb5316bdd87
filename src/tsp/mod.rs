//! Closed-tour solving over a distance matrix.
//!
//! Three methods are available:
//! - [`TourMethod::Exact`]: Held-Karp dynamic programming, optimal but
//!   exponential; refused above [`MAX_EXACT_POINTS`]
//! - [`TourMethod::Local`]: multi-start nearest neighbour followed by 2-opt
//!   and Or-opt improvement; the primary method
//! - [`TourMethod::Annealing`]: seeded simulated annealing over 2-opt moves;
//!   used to cross-check the primary result
//!
//! Every returned [`Tour`] is a closed loop: `order` visits each index once,
//! starts at index 0 and implicitly returns to it. `length` includes the
//! closing edge. Matrices may be asymmetric; every move is costed in the
//! direction it is travelled.

mod annealing;
mod exact;
mod local;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SakuraError};
use crate::matrix::DistanceMatrix;

pub use annealing::AnnealingConfig;
pub use exact::MAX_EXACT_POINTS;

/// Default relative length difference above which a cross-check warns.
pub const DEFAULT_CROSS_CHECK_THRESHOLD: f64 = 0.05;

/// Tour solving method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TourMethod {
    Exact,
    Local,
    Annealing,
}

impl TourMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TourMethod::Exact => "exact",
            TourMethod::Local => "local",
            TourMethod::Annealing => "annealing",
        }
    }
}

impl fmt::Display for TourMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TourMethod {
    type Err = SakuraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(TourMethod::Exact),
            "local" => Ok(TourMethod::Local),
            "annealing" => Ok(TourMethod::Annealing),
            other => Err(SakuraError::config(format!(
                "unknown tour method '{}' (expected exact, local or annealing)",
                other
            ))),
        }
    }
}

/// A closed tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    /// Visit order; a permutation of `0..N` starting at 0
    pub order: Vec<usize>,
    /// Total length in meters, including the edge back to the start
    pub length: f64,
}

impl Tour {
    fn from_order(matrix: &DistanceMatrix, mut order: Vec<usize>) -> Self {
        if let Some(pos) = order.iter().position(|&i| i == 0) {
            order.rotate_left(pos);
        }
        let length = tour_length(matrix, &order);
        Self { order, length }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Length of the closed loop through `order`, including the closing edge.
pub fn tour_length(matrix: &DistanceMatrix, order: &[usize]) -> f64 {
    if order.len() <= 1 {
        return 0.0;
    }
    let legs: f64 = order.windows(2).map(|w| matrix.get(w[0], w[1])).sum();
    legs + matrix.get(order[order.len() - 1], order[0])
}

/// Solves tours with a fixed annealing configuration.
#[derive(Debug, Clone, Default)]
pub struct TourSolver {
    pub annealing: AnnealingConfig,
}

impl TourSolver {
    pub fn new(annealing: AnnealingConfig) -> Self {
        Self { annealing }
    }

    /// Solve a closed tour over a square matrix.
    ///
    /// Fails on non-square matrices, NaN entries, and exact solves above
    /// [`MAX_EXACT_POINTS`].
    pub fn solve(&self, matrix: &DistanceMatrix, method: TourMethod) -> Result<Tour> {
        validate(matrix)?;
        let n = matrix.size();
        if n <= 2 {
            return Ok(Tour::from_order(matrix, (0..n).collect()));
        }

        let order = match method {
            TourMethod::Exact => exact::solve_exact(matrix)?,
            TourMethod::Local => local::solve_local(matrix),
            TourMethod::Annealing => annealing::solve_annealing(matrix, &self.annealing),
        };
        let tour = Tour::from_order(matrix, order);
        debug!(
            "[TourSolver] {} tour over {} points: {:.1}m",
            method, n, tour.length
        );
        Ok(tour)
    }

    /// Re-solve `matrix` with annealing and compare against `primary`.
    ///
    /// `primary` must have been solved on this same matrix. Divergence above
    /// `threshold` is logged as a warning and reported, never an error.
    pub fn cross_check(
        &self,
        matrix: &DistanceMatrix,
        primary: &Tour,
        threshold: f64,
    ) -> Result<CrossCheck> {
        let check = self.solve(matrix, TourMethod::Annealing)?;
        let relative_difference = relative_difference(primary.length, check.length);
        let diverged = relative_difference > threshold;
        if diverged {
            warn!(
                "[TourSolver] cross-check off by {:.1}% (primary {:.1}m, check {:.1}m, max {:.1}%)",
                relative_difference * 100.0,
                primary.length,
                check.length,
                threshold * 100.0
            );
        } else {
            info!(
                "[TourSolver] cross-check within {:.1}% ({:.1}% difference)",
                threshold * 100.0,
                relative_difference * 100.0
            );
        }
        Ok(CrossCheck {
            primary_length: primary.length,
            check_length: check.length,
            relative_difference,
            threshold,
            diverged,
        })
    }
}

/// Solve with the default annealing configuration.
pub fn solve(matrix: &DistanceMatrix, method: TourMethod) -> Result<Tour> {
    TourSolver::default().solve(matrix, method)
}

/// Outcome of comparing the primary tour with an annealing re-solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub primary_length: f64,
    pub check_length: f64,
    /// `|primary - check| / primary`
    pub relative_difference: f64,
    pub threshold: f64,
    /// True when the difference exceeded the threshold
    pub diverged: bool,
}

fn relative_difference(primary: f64, check: f64) -> f64 {
    let diff = (primary - check).abs();
    if diff == 0.0 {
        0.0
    } else if primary == 0.0 {
        f64::INFINITY
    } else {
        diff / primary
    }
}

fn validate(matrix: &DistanceMatrix) -> Result<()> {
    if !matrix.is_square() {
        return Err(SakuraError::config(format!(
            "tour solving needs a square matrix, got {}x{}",
            matrix.rows(),
            matrix.cols()
        )));
    }
    for i in 0..matrix.rows() {
        if let Some(j) = matrix.row(i).iter().position(|d| d.is_nan()) {
            return Err(SakuraError::config(format!(
                "distance matrix entry ({}, {}) is NaN",
                i, j
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Points on a circle of radius 100; the optimal tour follows the rim.
    pub(crate) fn circle_matrix(n: usize) -> (DistanceMatrix, f64) {
        let pts: Vec<(f64, f64)> = (0..n)
            .map(|k| {
                // Scrambled visiting order so index order is not the answer
                let slot = (k * 7) % n;
                let a = 2.0 * std::f64::consts::PI * slot as f64 / n as f64;
                (100.0 * a.cos(), 100.0 * a.sin())
            })
            .collect();
        let m = DistanceMatrix::symmetric_from_fn(n, |i, j| {
            ((pts[i].0 - pts[j].0).powi(2) + (pts[i].1 - pts[j].1).powi(2)).sqrt()
        });
        let side = 2.0 * 100.0 * (std::f64::consts::PI / n as f64).sin();
        (m, side * n as f64)
    }

    pub(crate) fn assert_permutation(order: &[usize], n: usize) {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("Local".parse::<TourMethod>().unwrap(), TourMethod::Local);
        assert!("genetic".parse::<TourMethod>().is_err());
        let m: TourMethod = serde_json::from_str("\"annealing\"").unwrap();
        assert_eq!(m, TourMethod::Annealing);
    }

    #[test]
    fn test_trivial_sizes() {
        let empty = solve(&DistanceMatrix::zeros(0, 0), TourMethod::Local).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.length, 0.0);

        let one = solve(&DistanceMatrix::zeros(1, 1), TourMethod::Exact).unwrap();
        assert_eq!(one.order, vec![0]);
        assert_eq!(one.length, 0.0);

        let two = DistanceMatrix::from_rows(vec![vec![0.0, 3.0], vec![4.0, 0.0]]).unwrap();
        let tour = solve(&two, TourMethod::Annealing).unwrap();
        assert_eq!(tour.order, vec![0, 1]);
        assert_eq!(tour.length, 7.0);
    }

    #[test]
    fn test_zero_matrix_local() {
        for n in [3, 5, 12] {
            let tour = solve(&DistanceMatrix::zeros(n, n), TourMethod::Local).unwrap();
            assert_permutation(&tour.order, n);
            assert_eq!(tour.length, 0.0);
        }
    }

    #[test]
    fn test_tours_start_at_zero_and_close() {
        let (m, _) = circle_matrix(9);
        for method in [TourMethod::Exact, TourMethod::Local, TourMethod::Annealing] {
            let tour = solve(&m, method).unwrap();
            assert_eq!(tour.order[0], 0);
            assert_permutation(&tour.order, 9);
            assert!((tour.length - tour_length(&m, &tour.order)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_local_matches_exact_on_circle() {
        let (m, optimum) = circle_matrix(12);
        let exact = solve(&m, TourMethod::Exact).unwrap();
        let local = solve(&m, TourMethod::Local).unwrap();
        assert!((exact.length - optimum).abs() < 1e-6);
        assert!((local.length - optimum).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_matrices() {
        assert!(solve(&DistanceMatrix::zeros(2, 3), TourMethod::Local).is_err());
        let mut m = DistanceMatrix::zeros(3, 3);
        m.set(1, 2, f64::NAN);
        assert!(matches!(
            solve(&m, TourMethod::Local),
            Err(SakuraError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_cross_check_reports_divergence() {
        let (m, _) = circle_matrix(10);
        let solver = TourSolver::default();
        let primary = solver.solve(&m, TourMethod::Local).unwrap();
        let check = solver.cross_check(&m, &primary, 0.10).unwrap();
        assert!(!check.diverged);

        // A deliberately bad "primary" tour
        let bad = Tour {
            order: (0..10).collect(),
            length: tour_length(&m, &(0..10).collect::<Vec<_>>()),
        };
        let check = solver.cross_check(&m, &bad, 0.05).unwrap();
        assert!(check.diverged);
        assert!(check.relative_difference > 0.05);
    }

    #[test]
    fn test_relative_difference_zero_primary() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert!(relative_difference(0.0, 1.0).is_infinite());
        assert!((relative_difference(100.0, 104.0) - 0.04).abs() < 1e-12);
    }
}
