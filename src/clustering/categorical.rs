//! Clustering by combinations of categorical column values.
//!
//! Typical use: collapse all trees in the same street into one waypoint,
//! optionally splitting long streets so no cluster spans more than
//! `max_distance` meters.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::reduce::{reduce_groups, ClusterResult, ReduceColumns};
use super::splitter::split_by_max_distance;
use crate::dataset::Dataset;
use crate::error::{OptionExt, Result, SakuraError};

/// Options for [`cluster_categorical`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Column receiving the member count of each cluster (appended if absent)
    pub count_column: Option<String>,
    /// Latitude column, used for cluster centers and splitting
    pub lat_column: Option<String>,
    /// Longitude column, used for cluster centers and splitting
    pub lon_column: Option<String>,
    /// Split clusters whose farthest pair is at least this many meters apart.
    /// Values <= 0 disable splitting.
    pub max_distance: Option<f64>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            count_column: Some("num".to_string()),
            lat_column: Some("lat".to_string()),
            lon_column: Some("lon".to_string()),
            max_distance: None,
        }
    }
}

impl ClusterOptions {
    fn columns(&self) -> ReduceColumns<'_> {
        ReduceColumns {
            lat: self.lat_column.as_deref(),
            lon: self.lon_column.as_deref(),
            count: self.count_column.as_deref(),
        }
    }
}

/// Partition `dataset` by the distinct value combinations of `group_by` and
/// reduce each partition to one center row.
///
/// Partitions come out in lexicographic order of the string-coerced values,
/// first column varying slowest. With a positive `max_distance` each
/// partition is further split by [`split_by_max_distance`]; sub-groups keep
/// the splitter's order.
pub fn cluster_categorical(
    dataset: &Dataset,
    group_by: &[&str],
    options: &ClusterOptions,
) -> Result<ClusterResult> {
    if group_by.is_empty() {
        return Err(SakuraError::config(
            "categorical clustering needs at least one group-by column",
        ));
    }
    let key_columns: Vec<usize> = group_by
        .iter()
        .map(|name| dataset.column_index(name).ok_or_missing_column(name))
        .collect::<Result<_>>()?;

    // Row indices per value combination; BTreeMap ordering on Vec<String>
    // is the Cartesian product order of the sorted per-column values
    let mut partitions: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for row in 0..dataset.len() {
        let values = dataset.row(row);
        let key: Vec<String> = key_columns.iter().map(|&c| values[c].key()).collect();
        partitions.entry(key).or_default().push(row);
    }
    info!(
        "[Clustering] {} rows fall into {} categories over {:?}",
        dataset.len(),
        partitions.len(),
        group_by
    );

    let mut warnings = Vec::new();
    let max_distance = options.max_distance.filter(|d| *d > 0.0);
    let split_columns = match (max_distance, &options.lat_column, &options.lon_column) {
        (Some(d), Some(lat), Some(lon)) => Some((d, lat.as_str(), lon.as_str())),
        (Some(_), _, _) => {
            let msg = "max_distance was provided without latitude and longitude columns; \
                       it will be ignored"
                .to_string();
            warn!("[Clustering] {}", msg);
            warnings.push(msg);
            None
        }
        _ => None,
    };

    let partitions: Vec<Vec<usize>> = partitions.into_values().collect();
    let groups = match split_columns {
        Some((max_distance, lat, lon)) => {
            let split = split_partitions(dataset, partitions, max_distance, lat, lon)?;
            info!(
                "[Clustering] splitting at {:.1}m resulted in {} clusters",
                max_distance,
                split.len()
            );
            split
        }
        None => partitions,
    };

    let mut result = reduce_groups(dataset, groups, options.columns())?;
    result.warnings = warnings;
    Ok(result)
}

fn split_partition(
    dataset: &Dataset,
    rows: &[usize],
    max_distance: f64,
    lat: &str,
    lon: &str,
) -> Result<Vec<Vec<usize>>> {
    let coords = dataset.take_rows(rows).coordinates(lat, lon)?;
    Ok(split_by_max_distance(&coords, max_distance)
        .into_iter()
        .map(|sub| sub.into_iter().map(|i| rows[i]).collect())
        .collect())
}

#[cfg(not(feature = "parallel"))]
fn split_partitions(
    dataset: &Dataset,
    partitions: Vec<Vec<usize>>,
    max_distance: f64,
    lat: &str,
    lon: &str,
) -> Result<Vec<Vec<usize>>> {
    let mut groups = Vec::with_capacity(partitions.len());
    for rows in &partitions {
        groups.extend(split_partition(dataset, rows, max_distance, lat, lon)?);
    }
    Ok(groups)
}

#[cfg(feature = "parallel")]
fn split_partitions(
    dataset: &Dataset,
    partitions: Vec<Vec<usize>>,
    max_distance: f64,
    lat: &str,
    lon: &str,
) -> Result<Vec<Vec<usize>>> {
    let per_partition: Vec<Vec<Vec<usize>>> = partitions
        .par_iter()
        .map(|rows| split_partition(dataset, rows, max_distance, lat, lon))
        .collect::<Result<_>>()?;
    Ok(per_partition.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CellValue;

    fn street_trees() -> Dataset {
        Dataset::from_columns(vec![
            (
                "street".to_string(),
                vec![
                    "Veldstraat".into(),
                    "Kouter".into(),
                    "Veldstraat".into(),
                    "Kouter".into(),
                ],
            ),
            (
                "species".to_string(),
                vec!["prunus".into(), "prunus".into(), "malus".into(), "prunus".into()],
            ),
            (
                "lat".to_string(),
                vec![51.050.into(), 51.052.into(), 51.051.into(), 51.054.into()],
            ),
            (
                "lon".to_string(),
                vec![3.720.into(), 3.724.into(), 3.721.into(), 3.726.into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_single_street_collapses_to_one_row() {
        let ds = Dataset::from_columns(vec![
            ("street".to_string(), vec!["A".into(); 3]),
            ("lat".to_string(), vec![1.0.into(), 2.0.into(), 3.0.into()]),
            ("lon".to_string(), vec![4.0.into(), 5.0.into(), 9.0.into()]),
        ])
        .unwrap();
        let result = cluster_categorical(&ds, &["street"], &ClusterOptions::default()).unwrap();
        assert_eq!(result.dataset.len(), 1);
        assert_eq!(result.dataset.value(0, "num"), Some(&CellValue::Number(3.0)));
        assert_eq!(result.dataset.value(0, "lat"), Some(&CellValue::Number(2.0)));
        assert_eq!(result.dataset.value(0, "lon"), Some(&CellValue::Number(6.0)));
    }

    #[test]
    fn test_partitions_in_lexicographic_order() {
        let result =
            cluster_categorical(&street_trees(), &["street"], &ClusterOptions::default()).unwrap();
        assert_eq!(result.groups, vec![vec![1, 3], vec![0, 2]]);
        assert_eq!(result.dataset.value(0, "street"), Some(&"Kouter".into()));
    }

    #[test]
    fn test_multi_column_skips_empty_combinations() {
        let result = cluster_categorical(
            &street_trees(),
            &["street", "species"],
            &ClusterOptions::default(),
        )
        .unwrap();
        // (Kouter, malus) never occurs
        assert_eq!(result.groups, vec![vec![1, 3], vec![2], vec![0]]);
    }

    #[test]
    fn test_empty_group_by_is_rejected() {
        let err = cluster_categorical(&street_trees(), &[], &ClusterOptions::default());
        assert!(matches!(err, Err(SakuraError::ConfigError { .. })));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = cluster_categorical(&street_trees(), &["district"], &ClusterOptions::default());
        assert!(matches!(err, Err(SakuraError::ConfigError { .. })));
    }

    #[test]
    fn test_max_distance_splits_long_street() {
        let options = ClusterOptions {
            max_distance: Some(100.0),
            ..ClusterOptions::default()
        };
        // Kouter trees are ~300m apart, Veldstraat trees ~130m apart
        let result = cluster_categorical(&street_trees(), &["street"], &options).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.centers.iter().all(|c| c.member_count == 1));
    }

    #[test]
    fn test_max_distance_without_coordinates_warns() {
        let options = ClusterOptions {
            lat_column: None,
            max_distance: Some(10.0),
            ..ClusterOptions::default()
        };
        let result = cluster_categorical(&street_trees(), &["street"], &options).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.warnings.len(), 1);
    }
}
