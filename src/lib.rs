//! # Sakura Run
//!
//! Plan a closed walking or running loop through a set of points of
//! interest, such as the blooming cherry trees of a city inventory.
//!
//! This library provides:
//! - Geodesic and provider-backed distance matrices, batched to respect
//!   provider point limits
//! - Waypoint reduction by categorical grouping or complete-linkage
//!   distance clustering
//! - Closed-tour solving (exact, local search, simulated annealing) with an
//!   annealing cross-check
//! - Chunked route retrieval and KML export
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel clustering with rayon
//! - **`http`** - Enable the GraphHopper client
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use sakura_run::{Coordinate, MatrixConfig, PlannerConfig, RoutePlanner};
//!
//! let trees = vec![
//!     Coordinate::new(51.0489, 3.6951),
//!     Coordinate::new(51.0540, 3.7210),
//!     Coordinate::new(51.0462, 3.6984),
//!     Coordinate::new(51.0380, 3.7300),
//! ];
//!
//! let config = PlannerConfig {
//!     matrix: MatrixConfig::geodesic(),
//!     ..PlannerConfig::default()
//! };
//! let plan = RoutePlanner::new(config).plan(&trees).unwrap();
//! println!("loop of {:.2} km", plan.tour.length / 1000.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SakuraError};

// Union-Find data structure for connected components
pub mod union_find;
pub use union_find::UnionFind;

// Geographic utilities (distance, center calculations)
pub mod geo_utils;
pub use geo_utils::haversine_distance;

// Dense distance matrices
pub mod matrix;
pub use matrix::DistanceMatrix;

// Routing provider seam and rate-limit retries
pub mod provider;
pub use provider::{RetryPolicy, RouteDetail, RoutingProvider};

// Distance matrix construction (remote batched or geodesic)
pub mod distance_matrix;
pub use distance_matrix::{
    geodesic_distance_matrix, DistanceMatrixBuilder, MatrixConfig, MatrixMode,
};

// Tabular point inventories
pub mod dataset;
pub use dataset::{CellValue, Dataset};

// Bounding-box and select/veto row filters
pub mod filter;
pub use filter::{filter_dataset, BoundsFilter, FilterConfig};

// Waypoint reduction
pub mod clustering;
pub use clustering::{
    cluster_by_distance_threshold, cluster_categorical, cluster_distance,
    split_by_max_distance, ClusterOptions, ClusterResult, ThresholdOptions,
};

// Closed-tour solvers
pub mod tsp;
pub use tsp::{CrossCheck, Tour, TourMethod, TourSolver};

// Route geometry retrieval
pub mod route;
pub use route::{fetch_route, RouteConfig};

// KML export
pub mod kml;
pub use kml::coords_to_kml;

// End-to-end planning
pub mod pipeline;
pub use pipeline::{ClusteringStrategy, DatasetPlan, PlannerConfig, RoutePlan, RoutePlanner};

// GraphHopper client
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{GraphHopperClient, GraphHopperConfig};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in decimal degrees.
///
/// # Example
/// ```
/// use sakura_run::Coordinate;
/// let point = Coordinate::new(51.0543, 3.7174); // Ghent
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check if the coordinate is finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
    }
}
