//! Travel-distance matrix construction.
//!
//! Matrices come either from the geodesic (haversine) approximation or from
//! a remote [`RoutingProvider`]. Providers limit how many points one request
//! may carry, so large remote matrices are assembled from blocks:
//!
//! - no batch size, or fewer points than the batch size: one request
//! - batch size 2: one request per unordered pair (legacy, O(N²) requests)
//! - batch size n > 2: one request per (row-block, column-block) pair on and
//!   above the block diagonal; lower blocks are filled by transposition
//!
//! Blocks are copied verbatim, so a batched matrix equals the one a single
//! unbatched request would return.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SakuraError};
use crate::geo_utils::haversine_distance;
use crate::matrix::DistanceMatrix;
use crate::provider::{RetryPolicy, RoutingProvider};
use crate::Coordinate;

/// Where distances come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixMode {
    /// Ask the routing provider
    #[default]
    Remote,
    /// Great-circle approximation, no provider needed
    Geodesic,
}

/// Configuration for distance matrix construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Distance source. Default: remote
    pub mode: MatrixMode,
    /// Travel profile passed to the provider ("foot", "bike", "car").
    /// Default: "foot"
    pub profile: String,
    /// Maximum number of points per provider request; `None` sends the
    /// whole set at once. Must be 2 (one request per pair) or lie strictly
    /// between 2 and the point count. Ignored in geodesic mode. Default: None
    pub max_batch_size: Option<usize>,
    /// Destination set for from/to queries; `None` builds the square matrix
    pub to_coords: Option<Vec<Coordinate>>,
    /// Rate-limit handling
    pub retry: RetryPolicy,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            mode: MatrixMode::Remote,
            profile: "foot".to_string(),
            max_batch_size: None,
            to_coords: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl MatrixConfig {
    /// Geodesic configuration (no provider required).
    pub fn geodesic() -> Self {
        Self {
            mode: MatrixMode::Geodesic,
            ..Self::default()
        }
    }
}

/// Full pairwise geodesic matrix: zero diagonal, symmetric.
pub fn geodesic_distance_matrix(coords: &[Coordinate]) -> DistanceMatrix {
    DistanceMatrix::symmetric_from_fn(coords.len(), |i, j| {
        haversine_distance(&coords[i], &coords[j])
    })
}

/// Geodesic `from × to` block.
pub fn geodesic_block(from: &[Coordinate], to: &[Coordinate]) -> DistanceMatrix {
    let mut m = DistanceMatrix::zeros(from.len(), to.len());
    for (i, a) in from.iter().enumerate() {
        for (j, b) in to.iter().enumerate() {
            m.set(i, j, haversine_distance(a, b));
        }
    }
    m
}

/// Builds distance matrices for coordinate sets.
pub struct DistanceMatrixBuilder<'a> {
    config: MatrixConfig,
    provider: Option<&'a dyn RoutingProvider>,
}

impl<'a> DistanceMatrixBuilder<'a> {
    pub fn new(config: MatrixConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Attach the routing provider used in remote mode.
    pub fn with_provider(mut self, provider: &'a dyn RoutingProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Build the matrix for `coords`, or the `coords × to_coords` block when
    /// the configuration names destinations.
    pub fn build(&self, coords: &[Coordinate]) -> Result<DistanceMatrix> {
        if let Some(to) = &self.config.to_coords {
            return self.build_between(coords, to);
        }
        match self.config.mode {
            MatrixMode::Geodesic => {
                debug!(
                    "[DistanceMatrix] geodesic matrix for {} points",
                    coords.len()
                );
                Ok(geodesic_distance_matrix(coords))
            }
            MatrixMode::Remote => {
                self.validate_batch_size(coords.len())?;
                let provider = self.provider()?;
                match self.config.max_batch_size {
                    Some(2) => self.build_pairwise(provider, coords),
                    Some(n) => self.build_blocked(provider, coords, n),
                    None => self.request(provider, coords, None, || {
                        format!("points 0..{}", coords.len())
                    }),
                }
            }
        }
    }

    /// Build the asymmetric `from × to` matrix.
    ///
    /// A batch size must split at least one of the two axes.
    pub fn build_between(&self, from: &[Coordinate], to: &[Coordinate]) -> Result<DistanceMatrix> {
        match self.config.mode {
            MatrixMode::Geodesic => Ok(geodesic_block(from, to)),
            MatrixMode::Remote => {
                self.validate_batch_size(from.len().max(to.len()))?;
                let provider = self.provider()?;
                let batch = self
                    .config
                    .max_batch_size
                    .unwrap_or_else(|| from.len().max(to.len()).max(1));

                let mut result = DistanceMatrix::zeros(from.len(), to.len());
                let row_starts: Vec<usize> = (0..from.len()).step_by(batch).collect();
                let col_starts: Vec<usize> = (0..to.len()).step_by(batch).collect();
                let total = row_starts.len() * col_starts.len();
                let mut counter = 0;

                for &r in &row_starts {
                    let r_end = (r + batch).min(from.len());
                    for &c in &col_starts {
                        let c_end = (c + batch).min(to.len());
                        counter += 1;
                        debug!("[DistanceMatrix] from/to block {} of {}", counter, total);
                        let block = self.request(
                            provider,
                            &from[r..r_end],
                            Some(&to[c..c_end]),
                            || format!("from {}..{}, to {}..{}", r, r_end, c, c_end),
                        )?;
                        result.set_block(r, c, &block);
                    }
                }
                Ok(result)
            }
        }
    }

    fn provider(&self) -> Result<&'a dyn RoutingProvider> {
        self.provider
            .ok_or_else(|| SakuraError::config("remote matrix mode requires a routing provider"))
    }

    /// Accept `None`, 2 (pairwise), or a window strictly between 2 and `len`.
    fn validate_batch_size(&self, len: usize) -> Result<()> {
        match self.config.max_batch_size {
            None | Some(2) => Ok(()),
            Some(n) if n > 2 && n < len => Ok(()),
            Some(n) => Err(SakuraError::config(format!(
                "max_batch_size {} invalid for {} points (expected 2, 3..{} or None)",
                n, len, len
            ))),
        }
    }

    /// One provider call with rate-limit retries and shape checking.
    fn request(
        &self,
        provider: &dyn RoutingProvider,
        from: &[Coordinate],
        to: Option<&[Coordinate]>,
        context: impl Fn() -> String,
    ) -> Result<DistanceMatrix> {
        let block = self.config.retry.run(&context, || {
            provider.post_matrix(from, to, &self.config.profile)
        })?;

        let expected_cols = to.map_or(from.len(), |t| t.len());
        if block.rows() != from.len() || block.cols() != expected_cols {
            return Err(SakuraError::ProviderError {
                message: format!(
                    "expected a {}x{} matrix, got {}x{}",
                    from.len(),
                    expected_cols,
                    block.rows(),
                    block.cols()
                ),
                status_code: None,
                context: Some(context()),
            });
        }
        Ok(block)
    }

    /// Legacy mode: one request per unordered pair.
    fn build_pairwise(
        &self,
        provider: &dyn RoutingProvider,
        coords: &[Coordinate],
    ) -> Result<DistanceMatrix> {
        let n = coords.len();
        let total = n * n.saturating_sub(1) / 2;
        info!(
            "[DistanceMatrix] pairwise mode: {} requests for {} points",
            total, n
        );

        let mut result = DistanceMatrix::zeros(n, n);
        let mut counter = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                counter += 1;
                debug!("[DistanceMatrix] pair {} of {}", counter, total);
                let pair = [coords[i], coords[j]];
                let m = self.request(provider, &pair, None, || format!("pair {}-{}", i, j))?;
                result.set(i, j, m.get(0, 1));
                result.set(j, i, m.get(1, 0));
            }
        }
        Ok(result)
    }

    /// Upper-triangular block requests, mirrored into the lower triangle.
    fn build_blocked(
        &self,
        provider: &dyn RoutingProvider,
        coords: &[Coordinate],
        batch: usize,
    ) -> Result<DistanceMatrix> {
        let n = coords.len();
        let blocks_1d = n.div_ceil(batch);
        let total = blocks_1d * (blocks_1d + 1) / 2;
        info!(
            "[DistanceMatrix] blocked mode: {} requests of up to {} points for {} points",
            total, batch, n
        );

        let mut result = DistanceMatrix::zeros(n, n);
        let mut counter = 0;
        for i in (0..n).step_by(batch) {
            let i_end = (i + batch).min(n);
            for j in (i..n).step_by(batch) {
                let j_end = (j + batch).min(n);
                counter += 1;
                debug!("[DistanceMatrix] block {} of {}", counter, total);
                let block = self.request(
                    provider,
                    &coords[i..i_end],
                    Some(&coords[j..j_end]),
                    || format!("rows {}..{}, cols {}..{}", i, i_end, j, j_end),
                )?;
                result.set_block(i, j, &block);
                if i != j {
                    result.set_block_transposed(j, i, &block);
                }
            }
        }
        Ok(result)
    }
}
