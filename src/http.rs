//! GraphHopper routing client.
//!
//! Implements [`RoutingProvider`] over the GraphHopper `matrix` and `route`
//! JSON APIs. Calls are blocking: the client owns a tokio runtime and waits
//! on each request, so the pipeline keeps one request in flight at a time.
//!
//! Response classification:
//! - HTTP 429 → [`SakuraError::RateLimited`], with the cool-down taken from
//!   `Retry-After` or `X-RateLimit-Reset` when present
//! - HTTP 400 mentioning too many points → [`SakuraError::PointLimitExceeded`]
//! - anything else non-2xx → [`SakuraError::ProviderError`]

use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::error::{Result, SakuraError};
use crate::matrix::DistanceMatrix;
use crate::provider::{RouteDetail, RoutingProvider};
use crate::Coordinate;

/// Public GraphHopper API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://graphhopper.com/api/1";

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Connection settings for [`GraphHopperClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphHopperConfig {
    pub api_key: String,
    /// Service root; requests go to `{base_url}/{service}?key=...`
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GraphHopperConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    distances: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    paths: Vec<RoutePath>,
}

#[derive(Debug, Deserialize)]
struct RoutePath {
    distance: f64,
    points: RoutePoints,
}

#[derive(Debug, Deserialize)]
struct RoutePoints {
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Blocking GraphHopper client.
pub struct GraphHopperClient {
    client: Client,
    runtime: Runtime,
    config: GraphHopperConfig,
}

impl GraphHopperClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_config(GraphHopperConfig {
            api_key: api_key.to_string(),
            ..GraphHopperConfig::default()
        })
    }

    pub fn with_config(config: GraphHopperConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SakuraError::config("GraphHopper API key is empty"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SakuraError::config(format!("failed to create HTTP client: {}", e)))?;
        let runtime = Runtime::new()
            .map_err(|e| SakuraError::Internal {
                message: format!("failed to create tokio runtime: {}", e),
            })?;
        Ok(Self {
            client,
            runtime,
            config,
        })
    }

    fn url(&self, service: &str) -> String {
        format!(
            "{}/{}?key={}",
            self.config.base_url.trim_end_matches('/'),
            service,
            self.config.api_key
        )
    }

    /// POST `body` to `service` and return the raw JSON text of a 2xx reply.
    fn post(&self, service: &str, body: serde_json::Value, points: usize) -> Result<String> {
        let url = self.url(service);
        debug!("[GraphHopper] POST {} with {} points", service, points);
        self.runtime.block_on(async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| SakuraError::provider(format!("request failed: {}", e)))?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response
                .text()
                .await
                .map_err(|e| SakuraError::provider(format!("failed to read response: {}", e)))?;

            if status.is_success() {
                Ok(text)
            } else {
                let err = classify_error(status, retry_after, &text, points);
                if !err.is_transient() {
                    warn!("[GraphHopper] {} request failed: {}", service, err);
                }
                Err(err)
            }
        })
    }
}

impl RoutingProvider for GraphHopperClient {
    fn post_matrix(
        &self,
        from: &[Coordinate],
        to: Option<&[Coordinate]>,
        profile: &str,
    ) -> Result<DistanceMatrix> {
        let points = from.len() + to.map_or(0, |t| t.len());
        let text = self.post("matrix", matrix_body(from, to, profile), points)?;
        parse_matrix(&text)
    }

    fn post_route(&self, points: &[Coordinate], profile: &str) -> Result<RouteDetail> {
        let text = self.post("route", route_body(points, profile), points.len())?;
        parse_route(&text)
    }
}

// =============================================================================
// Request bodies and response parsing
// =============================================================================

fn lon_lat(coords: &[Coordinate]) -> Vec<[f64; 2]> {
    coords.iter().map(|c| [c.lon, c.lat]).collect()
}

fn matrix_body(from: &[Coordinate], to: Option<&[Coordinate]>, profile: &str) -> serde_json::Value {
    match to {
        Some(to) => json!({
            "profile": profile,
            "from_points": lon_lat(from),
            "to_points": lon_lat(to),
            "out_arrays": ["distances"]
        }),
        None => json!({
            "profile": profile,
            "points": lon_lat(from),
            "out_arrays": ["distances"]
        }),
    }
}

fn route_body(points: &[Coordinate], profile: &str) -> serde_json::Value {
    json!({
        "profile": profile,
        "points": lon_lat(points),
        "instructions": false,
        "points_encoded": false
    })
}

fn parse_matrix(text: &str) -> Result<DistanceMatrix> {
    let response: MatrixResponse = serde_json::from_str(text)
        .map_err(|e| SakuraError::provider(format!("malformed matrix response: {}", e)))?;
    let rows = response
        .distances
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .enumerate()
                .map(|(j, d)| {
                    d.ok_or_else(|| {
                        SakuraError::provider(format!("no route between points {} and {}", i, j))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    DistanceMatrix::from_rows(rows)
}

fn parse_route(text: &str) -> Result<RouteDetail> {
    let response: RouteResponse = serde_json::from_str(text)
        .map_err(|e| SakuraError::provider(format!("malformed route response: {}", e)))?;
    let path = response
        .paths
        .into_iter()
        .next()
        .ok_or_else(|| SakuraError::provider("route response contains no path"))?;
    let points = path
        .points
        .coordinates
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coordinate::new(c[1], c[0]))
        .collect();
    Ok(RouteDetail {
        points,
        distance: path.distance,
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-2xx reply to the matching error variant.
fn classify_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    points: usize,
) -> SakuraError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return SakuraError::RateLimited { retry_after };
    }
    let lower = message.to_ascii_lowercase();
    if status == StatusCode::BAD_REQUEST
        && (lower.contains("too many points") || lower.contains("points exceed"))
    {
        return SakuraError::PointLimitExceeded {
            requested: points,
            message,
        };
    }
    SakuraError::ProviderError {
        message,
        status_code: Some(status.as_u16()),
        context: None,
    }
}
