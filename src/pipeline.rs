//! End-to-end route planning.
//!
//! [`RoutePlanner`] runs the full sakura-run pipeline:
//!
//! 1. filter the inventory ([`BoundsFilter`], then [`FilterConfig`])
//! 2. reduce it to waypoints (categorical or distance-threshold clustering)
//! 3. build the distance matrix (remote or geodesic)
//! 4. solve the closed tour with the primary method
//! 5. reorder waypoints and matrix by the tour
//! 6. cross-check the tour with annealing (advisory only)
//! 7. fetch the route geometry through the provider
//!
//! The routing provider is an explicit handle owned by the caller; nothing
//! in the pipeline keeps global session state.

use log::info;
use serde::{Deserialize, Serialize};

use crate::clustering::{
    cluster_categorical, cluster_distance, reduce_groups, ClusterOptions, ClusterResult,
    ReduceColumns, ThresholdOptions,
};
use crate::dataset::Dataset;
use crate::distance_matrix::{DistanceMatrixBuilder, MatrixConfig};
use crate::error::Result;
use crate::filter::{filter_dataset, BoundsFilter, FilterConfig};
use crate::matrix::DistanceMatrix;
use crate::provider::{RouteDetail, RoutingProvider};
use crate::route::{fetch_route, RouteConfig};
use crate::tsp::{
    AnnealingConfig, CrossCheck, Tour, TourMethod, TourSolver, DEFAULT_CROSS_CHECK_THRESHOLD,
};
use crate::Coordinate;

/// How the inventory is reduced to waypoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ClusteringStrategy {
    /// Every row is a waypoint
    #[default]
    None,
    /// Group by categorical columns
    Categorical {
        group_by: Vec<String>,
        #[serde(default)]
        options: ClusterOptions,
    },
    /// Complete-linkage clustering on distance
    Threshold {
        #[serde(default)]
        options: ThresholdOptions,
    },
}

/// Configuration for [`RoutePlanner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Bounding box applied before the row filters; `None` keeps all rows
    pub bounds: Option<BoundsFilter>,
    /// Row filters applied before clustering
    pub filters: Vec<FilterConfig>,
    /// Waypoint reduction
    pub clustering: ClusteringStrategy,
    /// Coordinate columns of the inventory
    pub lat_column: String,
    pub lon_column: String,
    /// Distance matrix construction
    pub matrix: MatrixConfig,
    /// Method for the primary solve. Default: local
    pub method: TourMethod,
    /// Relative difference above which the cross-check warns; values <= 0
    /// skip the cross-check. Default: 0.05
    pub cross_check_threshold: f64,
    pub annealing: AnnealingConfig,
    /// Route retrieval; `None` skips it
    pub route: Option<RouteConfig>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            bounds: None,
            filters: Vec::new(),
            clustering: ClusteringStrategy::None,
            lat_column: "lat".to_string(),
            lon_column: "lon".to_string(),
            matrix: MatrixConfig::default(),
            method: TourMethod::Local,
            cross_check_threshold: DEFAULT_CROSS_CHECK_THRESHOLD,
            annealing: AnnealingConfig::default(),
            route: Some(RouteConfig::default()),
        }
    }
}

impl PlannerConfig {
    /// Load a configuration from JSON, validating the embedded filters.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlannerConfig = serde_json::from_str(json)?;
        if let Some(bounds) = &config.bounds {
            bounds.validate()?;
        }
        for f in &config.filters {
            f.validate()?;
        }
        Ok(config)
    }
}

/// Result of planning over a waypoint list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Waypoints in visiting order; the loop returns to the first
    pub waypoints: Vec<Coordinate>,
    /// Tour over the input indices
    pub tour: Tour,
    /// Distance matrix in visiting order
    pub matrix: DistanceMatrix,
    /// Annealing comparison, when enabled
    pub cross_check: Option<CrossCheck>,
    /// Route geometry, when a provider and route config are available
    pub route: Option<RouteDetail>,
}

impl RoutePlan {
    /// Waypoints with the first repeated at the end, closing the loop.
    pub fn closed_loop(&self) -> Vec<Coordinate> {
        let mut loop_points = self.waypoints.clone();
        if let Some(&first) = self.waypoints.first() {
            loop_points.push(first);
        }
        loop_points
    }
}

/// Result of planning over a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetPlan {
    /// Reduced waypoint rows, in input (not visiting) order
    pub clusters: ClusterResult,
    pub plan: RoutePlan,
}

/// Runs the planning pipeline with an explicit provider handle.
pub struct RoutePlanner<'a> {
    config: PlannerConfig,
    provider: Option<&'a dyn RoutingProvider>,
}

impl<'a> RoutePlanner<'a> {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Attach the routing provider for remote matrices and route retrieval.
    pub fn with_provider(mut self, provider: &'a dyn RoutingProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Filter and reduce `dataset` to waypoint rows.
    pub fn reduce(&self, dataset: &Dataset) -> Result<ClusterResult> {
        let filtered =
            filter_dataset(dataset, &self.config.filters, self.config.bounds.as_ref())?;
        let result = match &self.config.clustering {
            ClusteringStrategy::None => {
                let groups = (0..filtered.len()).map(|i| vec![i]).collect();
                reduce_groups(
                    &filtered,
                    groups,
                    ReduceColumns {
                        lat: Some(self.config.lat_column.as_str()),
                        lon: Some(self.config.lon_column.as_str()),
                        count: None,
                    },
                )?
            }
            ClusteringStrategy::Categorical { group_by, options } => {
                let keys: Vec<&str> = group_by.iter().map(String::as_str).collect();
                cluster_categorical(&filtered, &keys, options)?
            }
            ClusteringStrategy::Threshold { options } => cluster_distance(&filtered, options)?,
        };
        info!(
            "[RoutePlanner] {} rows -> {} after filters -> {} waypoints",
            dataset.len(),
            filtered.len(),
            result.len()
        );
        Ok(result)
    }

    /// Run the whole pipeline on an inventory.
    pub fn plan_dataset(&self, dataset: &Dataset) -> Result<DatasetPlan> {
        let clusters = self.reduce(dataset)?;
        let (lat, lon) = self.waypoint_columns();
        let waypoints = clusters.dataset.coordinates(lat, lon)?;
        let plan = self.plan(&waypoints)?;
        Ok(DatasetPlan { clusters, plan })
    }

    /// Plan the closed tour over `waypoints`.
    pub fn plan(&self, waypoints: &[Coordinate]) -> Result<RoutePlan> {
        let mut builder = DistanceMatrixBuilder::new(self.config.matrix.clone());
        if let Some(provider) = self.provider {
            builder = builder.with_provider(provider);
        }
        let matrix = builder.build(waypoints)?;

        let solver = TourSolver::new(self.config.annealing.clone());
        let tour = solver.solve(&matrix, self.config.method)?;
        info!(
            "[RoutePlanner] {} tour over {} waypoints: {:.3} km",
            self.config.method,
            waypoints.len(),
            tour.length / 1000.0
        );

        let ordered: Vec<Coordinate> = tour.order.iter().map(|&i| waypoints[i]).collect();
        let reordered = matrix.reordered(&tour.order);

        let cross_check = if self.config.cross_check_threshold > 0.0 && waypoints.len() > 2 {
            let identity = Tour {
                order: (0..ordered.len()).collect(),
                length: tour.length,
            };
            Some(solver.cross_check(&reordered, &identity, self.config.cross_check_threshold)?)
        } else {
            None
        };

        let mut plan = RoutePlan {
            waypoints: ordered,
            tour,
            matrix: reordered,
            cross_check,
            route: None,
        };

        match (&self.config.route, self.provider) {
            (Some(route_config), Some(provider)) if plan.waypoints.len() > 1 => {
                let detail = fetch_route(provider, &plan.closed_loop(), route_config)?;
                info!(
                    "[RoutePlanner] route distance {:.3} km",
                    detail.distance / 1000.0
                );
                plan.route = Some(detail);
            }
            (Some(_), None) => {
                info!("[RoutePlanner] no routing provider, skipping route geometry");
            }
            _ => {}
        }
        Ok(plan)
    }

    fn waypoint_columns(&self) -> (&str, &str) {
        match &self.config.clustering {
            ClusteringStrategy::Threshold { options } => {
                (options.lat_column.as_str(), options.lon_column.as_str())
            }
            ClusteringStrategy::Categorical { options, .. } => (
                options
                    .lat_column
                    .as_deref()
                    .unwrap_or(self.config.lat_column.as_str()),
                options
                    .lon_column
                    .as_deref()
                    .unwrap_or(self.config.lon_column.as_str()),
            ),
            ClusteringStrategy::None => {
                (self.config.lat_column.as_str(), self.config.lon_column.as_str())
            }
        }
    }
}
