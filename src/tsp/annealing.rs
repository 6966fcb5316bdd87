//! Seeded simulated annealing over segment reversals.
//!
//! Starts from a random permutation (independent of the local-search
//! result) and cools geometrically. The best tour seen is returned.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::matrix::DistanceMatrix;
use crate::tsp::tour_length;

/// Configuration for the annealing cross-check solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// RNG seed; equal seeds give equal tours
    pub seed: u64,
    /// Starting temperature in meters. `None` picks one so that an average
    /// uphill move is initially accepted half of the time.
    pub initial_temperature: Option<f64>,
    /// Multiplier applied to the temperature after every `N` moves
    pub cooling_rate: f64,
    /// Stop once the temperature falls below this fraction of the start
    pub final_temperature_ratio: f64,
    /// Hard cap on proposed moves
    pub max_iterations: usize,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_5a4b,
            initial_temperature: None,
            cooling_rate: 0.995,
            final_temperature_ratio: 1e-4,
            max_iterations: 500_000,
        }
    }
}

/// Moves sampled to pick the automatic initial temperature.
const TEMPERATURE_SAMPLES: usize = 100;

pub(crate) fn solve_annealing(matrix: &DistanceMatrix, config: &AnnealingConfig) -> Vec<usize> {
    let n = matrix.size();
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let mut length = tour_length(matrix, &order);

    let initial = match config.initial_temperature {
        Some(t) => t,
        None => auto_temperature(matrix, &order, &mut rng),
    };
    if initial.is_nan() || initial <= 0.0 {
        // Flat landscape (e.g. zero matrix): every tour is as good as any
        return order;
    }

    let mut best = order.clone();
    let mut best_length = length;
    let mut temperature = initial;
    let floor = initial * config.final_temperature_ratio;

    let mut iteration = 0;
    while iteration < config.max_iterations && temperature > floor {
        for _ in 0..n {
            let (i, j) = random_segment(n, &mut rng);
            let delta = reversal_delta(matrix, &order, i, j);
            if delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp() {
                order[i..=j].reverse();
                length += delta;
                if length < best_length {
                    best_length = length;
                    best.clone_from(&order);
                }
            }
            iteration += 1;
        }
        temperature *= config.cooling_rate;
    }
    best
}

/// Positions `i < j` of a segment to reverse, never the whole tour.
fn random_segment(n: usize, rng: &mut SmallRng) -> (usize, usize) {
    loop {
        let a = rng.gen_range(0..n);
        let b = rng.gen_range(0..n);
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        if i != j && !(i == 0 && j == n - 1) {
            return (i, j);
        }
    }
}

/// Length change from reversing `order[i..=j]`, costed in travel direction.
fn reversal_delta(matrix: &DistanceMatrix, order: &[usize], i: usize, j: usize) -> f64 {
    let n = order.len();
    let prev = order[(i + n - 1) % n];
    let next = order[(j + 1) % n];

    let mut forward = 0.0;
    let mut backward = 0.0;
    for k in i..j {
        forward += matrix.get(order[k], order[k + 1]);
        backward += matrix.get(order[k + 1], order[k]);
    }
    let before = matrix.get(prev, order[i]) + forward + matrix.get(order[j], next);
    let after = matrix.get(prev, order[j]) + backward + matrix.get(order[i], next);
    after - before
}

fn auto_temperature(matrix: &DistanceMatrix, order: &[usize], rng: &mut SmallRng) -> f64 {
    let mut sum = 0.0;
    let mut uphill = 0usize;
    for _ in 0..TEMPERATURE_SAMPLES {
        let (i, j) = random_segment(order.len(), rng);
        let delta = reversal_delta(matrix, order, i, j);
        if delta > 0.0 && delta.is_finite() {
            sum += delta;
            uphill += 1;
        }
    }
    if uphill == 0 {
        return 0.0;
    }
    (sum / uphill as f64) / std::f64::consts::LN_2
}
