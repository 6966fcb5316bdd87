//! Diameter-bounded cluster splitting.
//!
//! A group whose farthest pair is at least `max_distance` apart is bisected:
//! the two farthest points seed two halves and every other point joins the
//! seed it is closer to (ties stay with the first seed). Each half is then
//! processed again with its slice of the parent matrix.
//!
//! The bisection runs on an explicit work stack, so large co-located groups
//! cannot exhaust the call stack.

use log::debug;

use crate::distance_matrix::geodesic_distance_matrix;
use crate::matrix::DistanceMatrix;
use crate::Coordinate;

/// Split `coords` into groups whose pairwise geodesic distances all stay
/// below `max_distance` (or which contain a single point).
///
/// Returns index lists into `coords` that partition `0..coords.len()`.
///
/// # Example
/// ```
/// use sakura_run::Coordinate;
/// use sakura_run::clustering::split_by_max_distance;
///
/// let street = vec![
///     Coordinate::new(51.0500, 3.7000),
///     Coordinate::new(51.0501, 3.7001),
///     Coordinate::new(51.0600, 3.7000),
/// ];
/// let groups = split_by_max_distance(&street, 100.0);
/// assert_eq!(groups, vec![vec![0, 1], vec![2]]);
/// ```
pub fn split_by_max_distance(coords: &[Coordinate], max_distance: f64) -> Vec<Vec<usize>> {
    if coords.is_empty() {
        return vec![];
    }
    let matrix = geodesic_distance_matrix(coords);
    split_matrix_by_max_distance(&matrix, max_distance)
}

/// Same as [`split_by_max_distance`] over a precomputed square matrix.
pub fn split_matrix_by_max_distance(matrix: &DistanceMatrix, max_distance: f64) -> Vec<Vec<usize>> {
    let n = matrix.size();
    if n == 0 {
        return vec![];
    }

    // Each entry: original indices of the group and the matrix over them.
    // The second half is pushed first so the first half is finished first,
    // which keeps the output in depth-first "left then right" order.
    let mut stack: Vec<(Vec<usize>, DistanceMatrix)> = vec![((0..n).collect(), matrix.clone())];
    let mut groups = Vec::new();

    while let Some((ids, sub)) = stack.pop() {
        if ids.len() == 1 {
            groups.push(ids);
            continue;
        }

        let (seed_1, seed_2, maxdist) = match sub.farthest_pair() {
            Some(pair) => pair,
            None => continue,
        };
        if maxdist < max_distance {
            let mut ids = ids;
            ids.sort_unstable();
            groups.push(ids);
            continue;
        }

        let mut local_1 = vec![seed_1];
        let mut local_2 = vec![seed_2];
        for idx in 0..ids.len() {
            if idx == seed_1 || idx == seed_2 {
                continue;
            }
            if sub.get(idx, seed_1) <= sub.get(idx, seed_2) {
                local_1.push(idx);
            } else {
                local_2.push(idx);
            }
        }

        debug!(
            "[ClusterSplitter] split {} points ({:.1}m apart) into {} + {}",
            ids.len(),
            maxdist,
            local_1.len(),
            local_2.len()
        );

        let half_2 = (
            local_2.iter().map(|&i| ids[i]).collect(),
            sub.submatrix(&local_2),
        );
        let half_1 = (
            local_1.iter().map(|&i| ids[i]).collect(),
            sub.submatrix(&local_1),
        );
        stack.push(half_2);
        stack.push(half_1);
    }

    groups
}

/// Largest pairwise distance inside `group`, measured on `matrix`.
pub fn group_diameter(matrix: &DistanceMatrix, group: &[usize]) -> f64 {
    let mut max = 0.0_f64;
    for (a, &i) in group.iter().enumerate() {
        for &j in &group[a + 1..] {
            max = max.max(matrix.get(i, j)).max(matrix.get(j, i));
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(groups: &[Vec<usize>], n: usize) {
        let mut all: Vec<usize> = groups.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
        assert!(groups.iter().all(|g| !g.is_empty()));
    }

    fn long_street(n: usize) -> Vec<Coordinate> {
        // ~11m spacing along a meridian
        (0..n)
            .map(|i| Coordinate::new(51.05 + 0.0001 * i as f64, 3.70))
            .collect()
    }

    #[test]
    fn test_compact_group_not_split() {
        let coords = long_street(5);
        let groups = split_by_max_distance(&coords, 1000.0);
        assert_eq!(groups, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn test_groups_respect_max_distance() {
        let coords = long_street(60);
        let matrix = geodesic_distance_matrix(&coords);
        let groups = split_matrix_by_max_distance(&matrix, 100.0);
        assert_partition(&groups, 60);
        assert!(groups.len() > 1);
        for g in &groups {
            assert!(g.len() == 1 || group_diameter(&matrix, g) < 100.0);
        }
    }

    #[test]
    fn test_tie_goes_to_first_seed() {
        // Point 1 is exactly halfway between 0 and 2
        let matrix = DistanceMatrix::from_rows(vec![
            vec![0.0, 5.0, 10.0],
            vec![5.0, 0.0, 5.0],
            vec![10.0, 5.0, 0.0],
        ])
        .unwrap();
        let groups = split_matrix_by_max_distance(&matrix, 6.0);
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_zero_max_distance_yields_singletons() {
        let coords = vec![Coordinate::new(51.0, 3.0); 4];
        let groups = split_by_max_distance(&coords, 0.0);
        assert_partition(&groups, 4);
        assert_eq!(groups.len(), 4);
    }

    #[test]
    fn test_many_colocated_points() {
        let coords = vec![Coordinate::new(51.0, 3.0); 500];
        let groups = split_by_max_distance(&coords, 5.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 500);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(split_by_max_distance(&[], 10.0).is_empty());
        assert_eq!(
            split_by_max_distance(&[Coordinate::new(0.0, 0.0)], 10.0),
            vec![vec![0]]
        );
    }
}
