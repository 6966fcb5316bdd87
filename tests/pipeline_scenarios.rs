//! End-to-end scenarios over the public API, using an in-process routing
//! provider in place of the remote service.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use sakura_run::clustering::group_diameter;
use sakura_run::distance_matrix::geodesic_block;
use sakura_run::geo_utils::polyline_length;
use sakura_run::tsp::tour_length;
use sakura_run::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Answers with great-circle distances; can be told to rate-limit the first
/// few calls.
struct FakeProvider {
    matrix_calls: RefCell<Vec<usize>>,
    route_calls: Cell<usize>,
    rate_limited_calls: Cell<usize>,
}

impl FakeProvider {
    fn new() -> Self {
        Self::rate_limited(0)
    }

    fn rate_limited(calls: usize) -> Self {
        Self {
            matrix_calls: RefCell::new(Vec::new()),
            route_calls: Cell::new(0),
            rate_limited_calls: Cell::new(calls),
        }
    }

    fn throttle(&self) -> Result<()> {
        let remaining = self.rate_limited_calls.get();
        if remaining > 0 {
            self.rate_limited_calls.set(remaining - 1);
            return Err(SakuraError::RateLimited {
                retry_after: Some(Duration::ZERO),
            });
        }
        Ok(())
    }
}

impl RoutingProvider for FakeProvider {
    fn post_matrix(
        &self,
        from: &[Coordinate],
        to: Option<&[Coordinate]>,
        _profile: &str,
    ) -> Result<DistanceMatrix> {
        self.throttle()?;
        let to = to.unwrap_or(from);
        self.matrix_calls.borrow_mut().push(from.len() + to.len());
        Ok(geodesic_block(from, to))
    }

    fn post_route(&self, points: &[Coordinate], _profile: &str) -> Result<RouteDetail> {
        self.throttle()?;
        self.route_calls.set(self.route_calls.get() + 1);
        Ok(RouteDetail {
            points: points.to_vec(),
            distance: polyline_length(points),
        })
    }
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy {
        cooldown: Duration::ZERO,
        max_retries: Some(3),
    }
}

fn ghent_trees() -> Vec<Coordinate> {
    vec![
        Coordinate::new(51.0489, 3.6951),
        Coordinate::new(51.0462, 3.6984),
        Coordinate::new(51.0521, 3.6995),
        Coordinate::new(51.0540, 3.7210),
        Coordinate::new(51.0380, 3.7300),
        Coordinate::new(51.0415, 3.7105),
        Coordinate::new(51.0573, 3.7102),
    ]
}

fn tree_inventory() -> Dataset {
    let streets = ["Kouter", "Kouter", "Veldstraat", "Kouter", "Coupure", "Veldstraat"];
    let species = ["Prunus", "Prunus", "Prunus", "Malus", "Prunus", "Prunus"];
    let lats = [51.0500, 51.0502, 51.0530, 51.0501, 51.0460, 51.0534];
    let lons = [3.7230, 3.7232, 3.7210, 3.7231, 3.7120, 3.7212];
    Dataset::from_columns(vec![
        (
            "street".to_string(),
            streets.iter().map(|&s| s.into()).collect(),
        ),
        (
            "species".to_string(),
            species.iter().map(|&s| s.into()).collect(),
        ),
        ("lat".to_string(), lats.iter().map(|&v| v.into()).collect()),
        ("lon".to_string(), lons.iter().map(|&v| v.into()).collect()),
    ])
    .unwrap()
}

// ============================================================================
// Distance matrices
// ============================================================================

#[test]
fn geodesic_matrix_is_symmetric_with_zero_diagonal() {
    let matrix = geodesic_distance_matrix(&ghent_trees());
    assert_eq!(matrix.size(), 7);
    for i in 0..7 {
        assert_eq!(matrix.get(i, i), 0.0);
        for j in 0..7 {
            assert_eq!(matrix.get(i, j), matrix.get(j, i));
        }
    }
    assert!(matrix.get(0, 4) > 1000.0);
}

#[test]
fn batched_remote_matrix_equals_single_request() {
    init_logging();
    let points: Vec<Coordinate> = ghent_trees().into_iter().take(4).collect();

    let single_provider = FakeProvider::new();
    let single = DistanceMatrixBuilder::new(MatrixConfig::default())
        .with_provider(&single_provider)
        .build(&points)
        .unwrap();
    assert_eq!(single_provider.matrix_calls.borrow().len(), 1);

    let batched_provider = FakeProvider::new();
    let batched = DistanceMatrixBuilder::new(MatrixConfig {
        max_batch_size: Some(2),
        ..MatrixConfig::default()
    })
    .with_provider(&batched_provider)
    .build(&points)
    .unwrap();

    assert!(batched_provider.matrix_calls.borrow().len() > 1);
    assert!(batched_provider
        .matrix_calls
        .borrow()
        .iter()
        .all(|&n| n <= 4));
    assert!(single.max_abs_diff(&batched).unwrap() < 1e-9);
}

#[test]
fn rate_limited_requests_are_retried() {
    init_logging();
    let provider = FakeProvider::rate_limited(2);
    let matrix = DistanceMatrixBuilder::new(MatrixConfig {
        retry: instant_retry(),
        ..MatrixConfig::default()
    })
    .with_provider(&provider)
    .build(&ghent_trees())
    .unwrap();
    assert_eq!(matrix.size(), 7);
    assert_eq!(provider.matrix_calls.borrow().len(), 1);
}

#[test]
fn persistent_rate_limit_gives_up_after_max_retries() {
    let provider = FakeProvider::rate_limited(10);
    let result = DistanceMatrixBuilder::new(MatrixConfig {
        retry: instant_retry(),
        ..MatrixConfig::default()
    })
    .with_provider(&provider)
    .build(&ghent_trees());
    assert!(result.is_err());
    assert!(provider.matrix_calls.borrow().is_empty());
}

// ============================================================================
// Clustering
// ============================================================================

#[test]
fn splitter_partitions_and_bounds_group_diameter() {
    let points = ghent_trees();
    let matrix = geodesic_distance_matrix(&points);
    let groups = split_by_max_distance(&points, 800.0);

    let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..points.len()).collect::<Vec<_>>());
    for group in &groups {
        assert!(group.len() == 1 || group_diameter(&matrix, group) < 800.0);
    }
}

#[test]
fn distinct_points_under_one_meter_threshold_stay_apart_and_exact_tour_is_optimal() {
    init_logging();
    let points = vec![
        Coordinate::new(51.0489, 3.6951),
        Coordinate::new(51.0462, 3.6984),
        Coordinate::new(51.0521, 3.6995),
    ];
    let groups = cluster_by_distance_threshold(&points, 1.0);
    assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);

    let matrix = geodesic_distance_matrix(&points);
    let tour = tsp::solve(&matrix, TourMethod::Exact).unwrap();
    let legs = matrix.get(0, 1) + matrix.get(1, 2) + matrix.get(2, 0);
    assert!((tour.length - legs).abs() < 1e-6);

    for order in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        assert!(tour.length <= tour_length(&matrix, &order) + 1e-9);
    }
}

#[test]
fn categorical_clustering_reduces_streets() {
    let result = cluster_categorical(&tree_inventory(), &["street"], &ClusterOptions::default())
        .unwrap();
    assert_eq!(result.len(), 3);

    // Coupure, Kouter, Veldstraat
    assert_eq!(result.groups, vec![vec![4], vec![0, 1, 3], vec![2, 5]]);
    assert_eq!(
        result.dataset.value(1, "num").and_then(CellValue::as_f64),
        Some(3.0)
    );
    let kouter_lat = result.dataset.value(1, "lat").and_then(CellValue::as_f64).unwrap();
    assert!((kouter_lat - (51.0500 + 51.0502 + 51.0501) / 3.0).abs() < 1e-9);
}

#[test]
fn filters_then_threshold_clustering() {
    let filters = FilterConfig::list_from_json_str(
        r#"[{"column_name": "species", "select": ["Prunus"]}]"#,
    )
    .unwrap();
    let prunus = filter_dataset(&tree_inventory(), &filters, None).unwrap();
    assert_eq!(prunus.len(), 5);

    let result = cluster_distance(
        &prunus,
        &ThresholdOptions {
            distance_threshold: 100.0,
            ..ThresholdOptions::default()
        },
    )
    .unwrap();
    // The two Kouter trees and the two Veldstraat trees each merge
    assert_eq!(result.len(), 3);
    let total: usize = result.centers.iter().map(|c| c.member_count).sum();
    assert_eq!(total, 5);
}

// ============================================================================
// Tours
// ============================================================================

#[test]
fn zero_matrix_local_tour_is_a_permutation_of_length_zero() {
    let matrix = DistanceMatrix::zeros(6, 6);
    let tour = tsp::solve(&matrix, TourMethod::Local).unwrap();
    let mut order = tour.order.clone();
    order.sort_unstable();
    assert_eq!(order, (0..6).collect::<Vec<_>>());
    assert_eq!(tour.order[0], 0);
    assert_eq!(tour.length, 0.0);
}

#[test]
fn all_methods_agree_on_a_small_instance() {
    let matrix = geodesic_distance_matrix(&ghent_trees());
    let exact = tsp::solve(&matrix, TourMethod::Exact).unwrap();
    let local = tsp::solve(&matrix, TourMethod::Local).unwrap();
    let annealing = tsp::solve(&matrix, TourMethod::Annealing).unwrap();

    assert!(local.length <= exact.length * 1.05 + 1e-6);
    assert!(annealing.length <= exact.length * 1.05 + 1e-6);
    assert!(exact.length <= local.length + 1e-6);
}

#[test]
fn method_names_parse() {
    assert_eq!("exact".parse::<TourMethod>().unwrap(), TourMethod::Exact);
    assert_eq!("annealing".parse::<TourMethod>().unwrap(), TourMethod::Annealing);
    assert!("greedy".parse::<TourMethod>().is_err());
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn planner_builds_closed_route_through_provider() {
    init_logging();
    let provider = FakeProvider::new();
    let config = PlannerConfig {
        matrix: MatrixConfig {
            max_batch_size: Some(3),
            retry: instant_retry(),
            ..MatrixConfig::default()
        },
        route: Some(RouteConfig {
            chunk_size: Some(4),
            retry: instant_retry(),
            ..RouteConfig::default()
        }),
        ..PlannerConfig::default()
    };

    let points = ghent_trees();
    let plan = RoutePlanner::new(config)
        .with_provider(&provider)
        .plan(&points)
        .unwrap();

    let route = plan.route.as_ref().unwrap();
    let closed = plan.closed_loop();
    assert_eq!(closed.len(), points.len() + 1);
    // 8 waypoints in chunks of 4 overlapping by one: 3 requests
    assert_eq!(provider.route_calls.get(), 3);
    assert_eq!(route.points, closed);
    assert!((route.distance - plan.tour.length).abs() < 1e-6);

    let check = plan.cross_check.unwrap();
    assert!(check.relative_difference >= 0.0);
    assert_eq!(check.primary_length, plan.tour.length);

    let kml = coords_to_kml(&route.points, Some("ff0000ff"));
    assert_eq!(kml.matches(", 0.").count(), closed.len());
}

#[test]
fn planner_runs_from_json_config_over_dataset() {
    init_logging();
    let config = PlannerConfig::from_json_str(
        r#"{
            "bounds": {"lat_min": 51.047},
            "filters": [{"column": "species", "veto": ["Malus"]}],
            "clustering": {"strategy": "categorical", "group_by": ["street"]},
            "matrix": {"mode": "geodesic"},
            "method": "exact",
            "route": null
        }"#,
    )
    .unwrap();

    let result = RoutePlanner::new(config)
        .plan_dataset(&tree_inventory())
        .unwrap();
    // Coupure lies south of the box; Kouter and Veldstraat remain
    assert_eq!(result.clusters.len(), 2);
    assert_eq!(result.plan.waypoints.len(), 2);
    assert!(result.plan.route.is_none());
    assert!(result.plan.tour.length > 0.0);
}
