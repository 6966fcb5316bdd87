//! Complete-linkage agglomerative clustering with a distance threshold.
//!
//! Two clusters merge while their complete-link distance (largest pairwise
//! member distance) is strictly below the threshold. There is no target
//! cluster count.
//!
//! For coordinate input the points are first split into connected components
//! of the "closer than threshold" graph: a complete-linkage cluster can never
//! span two components, so each component is clustered on its own geodesic
//! sub-matrix. Neighbours are found with an R-tree over unit vectors, where
//! the chord length is monotonic in great-circle distance and wraps across
//! the antimeridian and poles without special cases.

use log::{debug, info};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::reduce::{reduce_groups, ClusterResult, ReduceColumns};
use crate::dataset::Dataset;
use crate::distance_matrix::geodesic_distance_matrix;
use crate::error::{Result, SakuraError};
use crate::geo_utils::EARTH_RADIUS_M;
use crate::matrix::DistanceMatrix;
use crate::union_find::UnionFind;
use crate::Coordinate;

/// Options for [`cluster_distance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOptions {
    /// Clusters merge while their complete-link distance is below this (meters)
    pub distance_threshold: f64,
    pub lat_column: String,
    pub lon_column: String,
    /// Column receiving the member count of each cluster (appended if absent)
    pub count_column: Option<String>,
}

impl Default for ThresholdOptions {
    fn default() -> Self {
        Self {
            distance_threshold: 1.0,
            lat_column: "lat".to_string(),
            lon_column: "lon".to_string(),
            count_column: Some("num".to_string()),
        }
    }
}

// =============================================================================
// Public entry points
// =============================================================================

/// Cluster `coords` on geodesic distance.
///
/// Returns index groups (ascending members) ordered by their lowest member.
///
/// # Example
/// ```
/// use sakura_run::Coordinate;
/// use sakura_run::clustering::cluster_by_distance_threshold;
///
/// let points = vec![
///     Coordinate::new(51.0489, 3.6951),
///     Coordinate::new(51.0462, 3.6984),
///     Coordinate::new(51.0521, 3.6995),
/// ];
/// let groups = cluster_by_distance_threshold(&points, 1.0);
/// assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
/// ```
pub fn cluster_by_distance_threshold(coords: &[Coordinate], threshold: f64) -> Vec<Vec<usize>> {
    let components = geodesic_components(coords, threshold);
    debug!(
        "[Clustering] {} points form {} components at {:.1}m",
        coords.len(),
        components.len(),
        threshold
    );

    let cluster_component = |members: &Vec<usize>| -> Vec<Vec<usize>> {
        if members.len() == 1 {
            return vec![members.clone()];
        }
        let sub: Vec<Coordinate> = members.iter().map(|&i| coords[i]).collect();
        complete_linkage(&geodesic_distance_matrix(&sub), threshold)
            .into_iter()
            .map(|g| g.into_iter().map(|i| members[i]).collect())
            .collect()
    };

    #[cfg(feature = "parallel")]
    let nested: Vec<Vec<Vec<usize>>> = components.par_iter().map(cluster_component).collect();
    #[cfg(not(feature = "parallel"))]
    let nested: Vec<Vec<Vec<usize>>> = components.iter().map(cluster_component).collect();

    sort_groups(nested.into_iter().flatten().collect())
}

/// Cluster on a precomputed square matrix.
///
/// Asymmetric matrices are treated symmetrically using the larger of the two
/// directed distances.
pub fn cluster_matrix_by_threshold(
    matrix: &DistanceMatrix,
    threshold: f64,
) -> Result<Vec<Vec<usize>>> {
    if !matrix.is_square() {
        return Err(SakuraError::config(format!(
            "threshold clustering needs a square matrix, got {}x{}",
            matrix.rows(),
            matrix.cols()
        )));
    }
    let n = matrix.size();
    let symmetric = DistanceMatrix::symmetric_from_fn(n, |i, j| {
        matrix.get(i, j).max(matrix.get(j, i))
    });

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if symmetric.get(i, j) < threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups = Vec::new();
    for members in uf.groups() {
        if members.len() == 1 {
            groups.push(members);
            continue;
        }
        let sub = symmetric.submatrix(&members);
        for g in complete_linkage(&sub, threshold) {
            groups.push(g.into_iter().map(|i| members[i]).collect());
        }
    }
    Ok(sort_groups(groups))
}

/// Cluster the rows of `dataset` by distance and reduce each cluster to its
/// center row.
pub fn cluster_distance(dataset: &Dataset, options: &ThresholdOptions) -> Result<ClusterResult> {
    let coords = dataset.coordinates(&options.lat_column, &options.lon_column)?;
    let groups = cluster_by_distance_threshold(&coords, options.distance_threshold);
    info!(
        "[Clustering] distance clustering reduced {} rows to {} clusters",
        dataset.len(),
        groups.len()
    );
    reduce_groups(
        dataset,
        groups,
        ReduceColumns {
            lat: Some(&options.lat_column),
            lon: Some(&options.lon_column),
            count: options.count_column.as_deref(),
        },
    )
}

// =============================================================================
// Connected components
// =============================================================================

/// Point on the unit sphere with its index for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct UnitPoint {
    idx: usize,
    xyz: [f64; 3],
}

impl UnitPoint {
    fn new(idx: usize, c: &Coordinate) -> Self {
        let (lat, lon) = (c.lat.to_radians(), c.lon.to_radians());
        Self {
            idx,
            xyz: [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()],
        }
    }
}

impl RTreeObject for UnitPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for UnitPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Squared chord length on the unit sphere matching `meters` along the
/// surface, padded slightly so rounding can only add neighbours.
fn chord_radius_2(meters: f64) -> f64 {
    let half_angle = (meters / (2.0 * EARTH_RADIUS_M)).min(std::f64::consts::FRAC_PI_2);
    let chord = 2.0 * half_angle.sin() * (1.0 + 1e-9) + 1e-12;
    chord * chord
}

/// Components of the graph linking points closer than `threshold`.
///
/// Over-linking is harmless (components are only an optimization), so the
/// query radius errs on the large side. Non-finite coordinates stay isolated.
fn geodesic_components(coords: &[Coordinate], threshold: f64) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(coords.len());
    if threshold > 0.0 {
        let points: Vec<UnitPoint> = coords
            .iter()
            .enumerate()
            .filter(|(_, c)| c.lat.is_finite() && c.lon.is_finite())
            .map(|(i, c)| UnitPoint::new(i, c))
            .collect();
        let radius_2 = chord_radius_2(threshold);
        let tree = RTree::bulk_load(points.clone());
        for p in &points {
            for neighbour in tree.locate_within_distance(p.xyz, radius_2) {
                if neighbour.idx > p.idx {
                    uf.union(p.idx, neighbour.idx);
                }
            }
        }
    }
    uf.groups()
}

// =============================================================================
// Complete linkage
// =============================================================================

/// Complete-linkage clustering of a symmetric matrix using the
/// nearest-neighbour chain algorithm.
///
/// Reciprocal nearest neighbours merge; a cluster whose nearest neighbour is
/// already at or beyond the threshold is retired as final.
fn complete_linkage(matrix: &DistanceMatrix, threshold: f64) -> Vec<Vec<usize>> {
    let n = matrix.size();
    let mut dist = matrix.clone();
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active = vec![true; n];
    let mut remaining = n;
    let mut done: Vec<Vec<usize>> = Vec::new();
    let mut chain: Vec<usize> = Vec::new();

    while remaining > 0 {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }
        let a = match chain.last() {
            Some(&a) => a,
            None => break,
        };
        let previous = if chain.len() >= 2 {
            Some(chain[chain.len() - 2])
        } else {
            None
        };

        // Nearest active neighbour; prefer the previous chain element on ties
        let mut nearest: Option<(usize, f64)> = previous.map(|p| (p, linkage(&dist, a, p)));
        for b in 0..n {
            if b == a || !active[b] {
                continue;
            }
            let d = linkage(&dist, a, b);
            match nearest {
                Some((_, best)) if d >= best => {}
                _ => nearest = Some((b, d)),
            }
        }

        let b = match nearest {
            Some((b, d)) if d < threshold => b,
            _ => {
                // Every other cluster is at least `threshold` away and
                // merging elsewhere only increases that: a is final
                chain.pop();
                active[a] = false;
                done.push(std::mem::take(&mut members[a]));
                remaining -= 1;
                continue;
            }
        };

        if Some(b) != previous {
            chain.push(b);
            continue;
        }

        // Reciprocal nearest neighbours below the threshold
        chain.pop();
        chain.pop();
        let (keep, drop) = if a < b { (a, b) } else { (b, a) };
        let moved = std::mem::take(&mut members[drop]);
        members[keep].extend(moved);
        active[drop] = false;
        remaining -= 1;
        for k in 0..n {
            if active[k] && k != keep {
                let merged = linkage(&dist, keep, k).max(linkage(&dist, drop, k));
                dist.set(keep, k, merged);
                dist.set(k, keep, merged);
            }
        }
    }

    sort_groups(done)
}

/// Cluster distance with NaN read as unreachable.
#[inline]
fn linkage(dist: &DistanceMatrix, a: usize, b: usize) -> f64 {
    let d = dist.get(a, b);
    if d.is_nan() {
        f64::INFINITY
    } else {
        d
    }
}

/// Sort members ascending and groups by their lowest member.
fn sort_groups(mut groups: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    for g in &mut groups {
        g.sort_unstable();
    }
    groups.sort_by_key(|g| g.first().copied().unwrap_or(usize::MAX));
    groups
}
