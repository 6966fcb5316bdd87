//! Collapse index groups into one representative row each.

use serde::{Deserialize, Serialize};

use crate::dataset::{CellValue, Dataset};
use crate::error::{OptionExt, Result, SakuraError};
use crate::Coordinate;

/// One reduced cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCenter {
    /// Source row whose non-spatial fields the center keeps (first member)
    pub representative_row: usize,
    /// Mean of the member coordinates, when coordinate columns are configured
    pub position: Option<Coordinate>,
    /// Number of source rows in the cluster
    pub member_count: usize,
}

/// Output of a clustering pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterResult {
    /// One row per cluster, in cluster order
    pub dataset: Dataset,
    /// Cluster summaries, parallel to `dataset` rows
    pub centers: Vec<ClusterCenter>,
    /// Member rows of each cluster, as indices into the input dataset
    pub groups: Vec<Vec<usize>>,
    /// Non-fatal configuration problems that were ignored
    pub warnings: Vec<String>,
}

impl ClusterResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Column names used while reducing groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceColumns<'a> {
    pub lat: Option<&'a str>,
    pub lon: Option<&'a str>,
    pub count: Option<&'a str>,
}

/// Reduce each group to its center row.
///
/// The first member's row is copied verbatim; when both coordinate columns
/// are given their values become the member means, and the count column is
/// overwritten (or appended) with the group size.
pub fn reduce_groups(
    dataset: &Dataset,
    groups: Vec<Vec<usize>>,
    columns: ReduceColumns<'_>,
) -> Result<ClusterResult> {
    let spatial = match (columns.lat, columns.lon) {
        (Some(lat), Some(lon)) => {
            let lat_idx = dataset.column_index(lat).ok_or_missing_column(lat)?;
            let lon_idx = dataset.column_index(lon).ok_or_missing_column(lon)?;
            Some((lat_idx, lon_idx))
        }
        _ => None,
    };

    let representatives: Vec<usize> = groups
        .iter()
        .map(|g| g.first().copied().ok_or_internal("empty cluster group"))
        .collect::<Result<_>>()?;
    let mut out = dataset.take_rows(&representatives);
    let count_idx = columns.count.map(|name| out.ensure_column(name));

    let mut centers = Vec::with_capacity(groups.len());
    for (row, group) in groups.iter().enumerate() {
        let position = match spatial {
            Some((lat_idx, lon_idx)) => {
                let center = mean_position(dataset, group, lat_idx, lon_idx)?;
                out.set_value(row, lat_idx, CellValue::Number(center.lat));
                out.set_value(row, lon_idx, CellValue::Number(center.lon));
                Some(center)
            }
            None => None,
        };
        if let Some(idx) = count_idx {
            out.set_value(row, idx, CellValue::Number(group.len() as f64));
        }
        centers.push(ClusterCenter {
            representative_row: representatives[row],
            position,
            member_count: group.len(),
        });
    }

    Ok(ClusterResult {
        dataset: out,
        centers,
        groups,
        warnings: Vec::new(),
    })
}

fn mean_position(
    dataset: &Dataset,
    group: &[usize],
    lat_idx: usize,
    lon_idx: usize,
) -> Result<Coordinate> {
    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;
    for &i in group {
        let row = dataset.row(i);
        lat_sum += numeric(&row[lat_idx], i, "latitude")?;
        lon_sum += numeric(&row[lon_idx], i, "longitude")?;
    }
    let n = group.len() as f64;
    Ok(Coordinate::new(lat_sum / n, lon_sum / n))
}

fn numeric(value: &CellValue, row: usize, what: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| SakuraError::InvalidCoordinates {
        index: row,
        message: format!("non-numeric {} '{}'", what, value),
    })
}
