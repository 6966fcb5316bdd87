//! Held-Karp dynamic programming.

use crate::error::{OptionExt, Result, SakuraError};
use crate::matrix::DistanceMatrix;

/// Largest point count the exact solver accepts.
///
/// Memory and time grow as `2^N * N`; at 16 points the table holds about
/// half a million entries.
pub const MAX_EXACT_POINTS: usize = 16;

/// Optimal closed tour starting at 0. Requires `3 <= N <= MAX_EXACT_POINTS`.
pub(crate) fn solve_exact(matrix: &DistanceMatrix) -> Result<Vec<usize>> {
    let n = matrix.size();
    if n > MAX_EXACT_POINTS {
        return Err(SakuraError::SolverLimit {
            method: "exact".to_string(),
            points: n,
            limit: MAX_EXACT_POINTS,
        });
    }

    // Node 0 is the fixed start; subsets range over nodes 1..n, where node
    // k maps to bit k-1.
    let m = n - 1;
    let full = (1usize << m) - 1;
    let mut cost: Vec<Option<f64>> = vec![None; (full + 1) * m];
    let mut parent: Vec<usize> = vec![usize::MAX; (full + 1) * m];
    let slot = |mask: usize, last: usize| mask * m + last;

    for k in 0..m {
        cost[slot(1 << k, k)] = Some(matrix.get(0, k + 1));
    }

    for mask in 1..=full {
        for last in 0..m {
            if mask & (1 << last) == 0 {
                continue;
            }
            let here = match cost[slot(mask, last)] {
                Some(c) => c,
                None => continue,
            };
            for next in 0..m {
                if mask & (1 << next) != 0 {
                    continue;
                }
                let grown = mask | (1 << next);
                let candidate = here + matrix.get(last + 1, next + 1);
                let entry = slot(grown, next);
                if cost[entry].map_or(true, |best| candidate < best) {
                    cost[entry] = Some(candidate);
                    parent[entry] = last;
                }
            }
        }
    }

    // Close the loop back to node 0
    let mut best: Option<(usize, f64)> = None;
    for last in 0..m {
        if let Some(c) = cost[slot(full, last)] {
            let total = c + matrix.get(last + 1, 0);
            if best.map_or(true, |(_, b)| total < b) {
                best = Some((last, total));
            }
        }
    }
    let (mut last, _) = best.ok_or_internal("exact solver found no complete tour")?;

    let mut order = Vec::with_capacity(n);
    let mut mask = full;
    loop {
        order.push(last + 1);
        let prev = parent[slot(mask, last)];
        mask &= !(1 << last);
        if mask == 0 {
            break;
        }
        if prev == usize::MAX {
            return Err(SakuraError::Internal {
                message: "exact solver lost its back-pointer".to_string(),
            });
        }
        last = prev;
    }
    order.push(0);
    order.reverse();
    Ok(order)
}
