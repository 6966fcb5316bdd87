//! Multi-start nearest neighbour + 2-opt + Or-opt local search.
//!
//! Move gains are evaluated in O(1): 2-opt uses prefix sums of the forward
//! and backward leg costs so reversed segments are costed correctly on
//! asymmetric matrices, and Or-opt moves segments without reversing them.

use crate::matrix::DistanceMatrix;
use crate::tsp::tour_length;

/// Number of nearest-neighbour starts, spread evenly over the points.
const MAX_STARTS: usize = 8;
/// Cap on improvement rounds per start.
const MAX_ROUNDS: usize = 1_000;
/// Longest segment Or-opt relocates.
const OR_OPT_MAX_SEGMENT: usize = 3;
/// Minimum gain (meters) for a move to count as an improvement.
const MIN_GAIN: f64 = 1e-7;

pub(crate) fn solve_local(matrix: &DistanceMatrix) -> Vec<usize> {
    let n = matrix.size();
    let starts = n.min(MAX_STARTS);

    let mut best: Option<(Vec<usize>, f64)> = None;
    for s in 0..starts {
        let start = s * n / starts;
        let mut order = nearest_neighbour(matrix, start);
        improve(matrix, &mut order);
        let length = tour_length(matrix, &order);
        if best.as_ref().map_or(true, |(_, b)| length < *b) {
            best = Some((order, length));
        }
    }
    best.map(|(order, _)| order).unwrap_or_default()
}

/// Greedy tour: always travel to the closest unvisited point.
fn nearest_neighbour(matrix: &DistanceMatrix, start: usize) -> Vec<usize> {
    let n = matrix.size();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = start;
    visited[current] = true;
    order.push(current);

    for _ in 1..n {
        let mut next: Option<(usize, f64)> = None;
        for j in 0..n {
            if visited[j] {
                continue;
            }
            let d = matrix.get(current, j);
            if next.map_or(true, |(_, best)| d < best) {
                next = Some((j, d));
            }
        }
        match next {
            Some((j, _)) => {
                visited[j] = true;
                order.push(j);
                current = j;
            }
            None => break,
        }
    }
    order
}

fn improve(matrix: &DistanceMatrix, order: &mut Vec<usize>) {
    for _ in 0..MAX_ROUNDS {
        let reversed = two_opt_pass(matrix, order);
        let relocated = or_opt_pass(matrix, order);
        if !reversed && !relocated {
            break;
        }
    }
}

/// Prefix sums of leg costs: `fwd[k]` is the cost of walking positions
/// `0..k` forwards, `bwd[k]` the cost of walking them backwards.
fn leg_sums(matrix: &DistanceMatrix, order: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let mut fwd = vec![0.0; order.len()];
    let mut bwd = vec![0.0; order.len()];
    for k in 1..order.len() {
        fwd[k] = fwd[k - 1] + matrix.get(order[k - 1], order[k]);
        bwd[k] = bwd[k - 1] + matrix.get(order[k], order[k - 1]);
    }
    (fwd, bwd)
}

/// First-improvement 2-opt: reverse `order[i+1..=j]` when it shortens the
/// loop. Returns true if any move was applied.
fn two_opt_pass(matrix: &DistanceMatrix, order: &mut [usize]) -> bool {
    let n = order.len();
    if n < 3 {
        return false;
    }
    let (mut fwd, mut bwd) = leg_sums(matrix, order);
    let mut improved = false;

    for i in 0..n - 2 {
        for j in (i + 2)..n {
            let a = order[i];
            let b = order[i + 1];
            let c = order[j];
            let e = order[(j + 1) % n];

            let before = matrix.get(a, b) + (fwd[j] - fwd[i + 1]) + matrix.get(c, e);
            let after = matrix.get(a, c) + (bwd[j] - bwd[i + 1]) + matrix.get(b, e);
            if after < before - MIN_GAIN {
                order[i + 1..=j].reverse();
                let sums = leg_sums(matrix, order);
                fwd = sums.0;
                bwd = sums.1;
                improved = true;
            }
        }
    }
    improved
}

/// First-improvement Or-opt: move a segment of up to three consecutive
/// points between two other neighbours. Returns true if a move was applied.
fn or_opt_pass(matrix: &DistanceMatrix, order: &mut Vec<usize>) -> bool {
    let n = order.len();
    let max_len = OR_OPT_MAX_SEGMENT.min(n.saturating_sub(3));

    for len in 1..=max_len {
        for s in 0..n {
            let first = order[s];
            let last = order[(s + len - 1) % n];
            let p = order[(s + n - 1) % n];
            let q = order[(s + len) % n];
            let removal_gain =
                matrix.get(p, first) + matrix.get(last, q) - matrix.get(p, q);

            // Remaining loop in order q .. p; try every edge except (p, q)
            let rest: Vec<usize> = (0..n - len).map(|t| order[(s + len + t) % n]).collect();
            for k in 0..rest.len() - 1 {
                let x = rest[k];
                let y = rest[k + 1];
                let insert_cost =
                    matrix.get(x, first) + matrix.get(last, y) - matrix.get(x, y);
                if insert_cost < removal_gain - MIN_GAIN {
                    let segment: Vec<usize> = (0..len).map(|t| order[(s + t) % n]).collect();
                    let mut moved = Vec::with_capacity(n);
                    moved.extend_from_slice(&rest[..=k]);
                    moved.extend_from_slice(&segment);
                    moved.extend_from_slice(&rest[k + 1..]);
                    *order = moved;
                    return true;
                }
            }
        }
    }
    false
}
