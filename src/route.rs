//! Route geometry for an ordered waypoint list.
//!
//! Providers cap the number of points per route request, so long tours are
//! fetched in chunks that overlap by one waypoint: chunk `k` ends where chunk
//! `k + 1` starts. Chunk distances add up to the route distance, and the
//! shared junction point appears once in the joined polyline.

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SakuraError};
use crate::geo_utils::meters_to_degrees;
use crate::provider::{RetryPolicy, RouteDetail, RoutingProvider};
use crate::Coordinate;

/// Configuration for route retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Travel profile passed to the provider. Default: "foot"
    pub profile: String,
    /// Maximum waypoints per request (at least 2); `None` sends all at once
    pub chunk_size: Option<usize>,
    /// Douglas-Peucker tolerance in meters applied to the joined polyline;
    /// `None` keeps the provider geometry as-is
    pub simplify_tolerance: Option<f64>,
    /// Rate-limit handling
    pub retry: RetryPolicy,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            profile: "foot".to_string(),
            chunk_size: None,
            simplify_tolerance: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Waypoint index ranges `[start, end]` (inclusive) of each route chunk.
///
/// Consecutive chunks share their boundary waypoint.
pub fn route_chunks(len: usize, chunk_size: Option<usize>) -> Result<Vec<(usize, usize)>> {
    if len < 2 {
        return Ok(vec![]);
    }
    match chunk_size {
        Some(size) if size < 2 => Err(SakuraError::config(format!(
            "route chunk size must be at least 2, got {}",
            size
        ))),
        Some(size) if size < len => {
            let step = size - 1;
            Ok((0..len - 1)
                .step_by(step)
                .map(|start| (start, (start + step).min(len - 1)))
                .collect())
        }
        _ => Ok(vec![(0, len - 1)]),
    }
}

/// Fetch the route through `waypoints` in order.
pub fn fetch_route<P: RoutingProvider + ?Sized>(
    provider: &P,
    waypoints: &[Coordinate],
    config: &RouteConfig,
) -> Result<RouteDetail> {
    let chunks = route_chunks(waypoints.len(), config.chunk_size)?;
    if chunks.is_empty() {
        return Ok(RouteDetail {
            points: waypoints.to_vec(),
            distance: 0.0,
        });
    }

    let mut points: Vec<Coordinate> = Vec::new();
    let mut distance = 0.0;
    for (k, &(start, end)) in chunks.iter().enumerate() {
        debug!(
            "[RouteDetail] requesting chunk {} of {} (waypoints {}..={})",
            k + 1,
            chunks.len(),
            start,
            end
        );
        let chunk = &waypoints[start..=end];
        let detail = config.retry.run(
            || format!("route chunk waypoints {}..={}", start, end),
            || provider.post_route(chunk, &config.profile),
        )?;

        let skip_junction =
            usize::from(points.last().is_some() && points.last() == detail.points.first());
        points.extend_from_slice(&detail.points[skip_junction..]);
        distance += detail.distance;
    }

    if let Some(tolerance) = config.simplify_tolerance {
        let before = points.len();
        points = simplify_polyline(&points, tolerance);
        debug!(
            "[RouteDetail] simplified polyline from {} to {} points",
            before,
            points.len()
        );
    }

    info!(
        "[RouteDetail] route over {} waypoints: {:.1}m in {} request(s)",
        waypoints.len(),
        distance,
        chunks.len()
    );
    Ok(RouteDetail { points, distance })
}

/// Douglas-Peucker simplification with a tolerance in meters.
pub fn simplify_polyline(points: &[Coordinate], tolerance_meters: f64) -> Vec<Coordinate> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let ref_lat = points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64;
    let (tolerance_deg, _) = meters_to_degrees(tolerance_meters, ref_lat);

    let line = LineString::new(
        points
            .iter()
            .map(|p| Coord { x: p.lon, y: p.lat })
            .collect(),
    );
    line.simplify(&tolerance_deg)
        .coords()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect()
}
