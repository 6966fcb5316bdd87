//! Row filtering of datasets.
//!
//! A [`FilterConfig`] names one column and optionally a set of values to keep
//! (`select`) and a set of values to drop (`veto`). Values are compared as
//! strings. A [`BoundsFilter`] keeps rows strictly inside a latitude and
//! longitude window. Filters are validated when loaded, so a typo in a key
//! or an empty filter fails early instead of silently passing every row.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dataset::{CellValue, Dataset};
use crate::error::{OptionExt, Result, SakuraError};

/// One select/veto filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Column the filter applies to
    #[serde(alias = "column_name")]
    pub column: String,
    /// Keep only rows whose value is in this set
    #[serde(default)]
    pub select: Option<BTreeSet<String>>,
    /// Drop rows whose value is in this set
    #[serde(default)]
    pub veto: Option<BTreeSet<String>>,
}

impl FilterConfig {
    /// Parse and validate a single filter from JSON.
    ///
    /// # Example
    /// ```
    /// use sakura_run::filter::FilterConfig;
    ///
    /// let f = FilterConfig::from_json_str(
    ///     r#"{"column_name": "species", "select": ["Prunus serrulata"]}"#,
    /// ).unwrap();
    /// assert_eq!(f.column, "species");
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let filter: FilterConfig = serde_json::from_str(json)?;
        filter.validate()?;
        Ok(filter)
    }

    /// Parse a JSON array of filters, validating each.
    pub fn list_from_json_str(json: &str) -> Result<Vec<Self>> {
        let filters: Vec<FilterConfig> = serde_json::from_str(json)?;
        for f in &filters {
            f.validate()?;
        }
        Ok(filters)
    }

    pub fn validate(&self) -> Result<()> {
        if self.column.trim().is_empty() {
            return Err(SakuraError::config("filter has an empty column name"));
        }
        if self.select.is_none() && self.veto.is_none() {
            return Err(SakuraError::config(format!(
                "filter on '{}' has neither select nor veto values",
                self.column
            )));
        }
        Ok(())
    }

    /// True when a value passes this filter.
    pub fn accepts(&self, value: &str) -> bool {
        let selected = self.select.as_ref().map_or(true, |s| s.contains(value));
        let vetoed = self.veto.as_ref().map_or(false, |v| v.contains(value));
        selected && !vetoed
    }

    /// Rows of `dataset` that pass this filter, in their original order.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        self.validate()?;
        let col = dataset
            .column_index(&self.column)
            .ok_or_missing_column(&self.column)?;
        let mut out = dataset.clone();
        out.retain_rows(|row| self.accepts(&row[col].key()));
        debug!(
            "[DatasetFilter] '{}' kept {} of {} rows",
            self.column,
            out.len(),
            dataset.len()
        );
        Ok(out)
    }
}

/// Bounding-box selection on the coordinate columns.
///
/// Each bound is optional and exclusive: a row is kept when
/// `lat_min < lat < lat_max` and `lon_min < lon < lon_max` for the bounds
/// that are set. A row whose bounded column is not numeric is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsFilter {
    /// Latitude column. Default: "lat"
    pub lat_column: String,
    /// Longitude column. Default: "lon"
    pub lon_column: String,
    pub lat_min: Option<f64>,
    pub lat_max: Option<f64>,
    pub lon_min: Option<f64>,
    pub lon_max: Option<f64>,
}

impl Default for BoundsFilter {
    fn default() -> Self {
        Self {
            lat_column: "lat".to_string(),
            lon_column: "lon".to_string(),
            lat_min: None,
            lat_max: None,
            lon_min: None,
            lon_max: None,
        }
    }
}

impl BoundsFilter {
    /// Parse and validate a bounding box from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let bounds: BoundsFilter = serde_json::from_str(json)?;
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = [self.lat_min, self.lat_max, self.lon_min, self.lon_max];
        if bounds.iter().flatten().any(|b| !b.is_finite()) {
            return Err(SakuraError::config("bounding box limits must be finite"));
        }
        for (axis, min, max) in [
            ("lat", self.lat_min, self.lat_max),
            ("lon", self.lon_min, self.lon_max),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min >= max {
                    return Err(SakuraError::config(format!(
                        "bounding box {}_min {} is not below {}_max {}",
                        axis, min, axis, max
                    )));
                }
            }
        }
        Ok(())
    }

    fn is_unbounded(&self) -> bool {
        self.lat_min.is_none()
            && self.lat_max.is_none()
            && self.lon_min.is_none()
            && self.lon_max.is_none()
    }

    /// Rows of `dataset` strictly inside the box, in their original order.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        self.validate()?;
        if self.is_unbounded() {
            return Ok(dataset.clone());
        }
        let lat_col = bounded_column(dataset, &self.lat_column, self.lat_min, self.lat_max)?;
        let lon_col = bounded_column(dataset, &self.lon_column, self.lon_min, self.lon_max)?;

        let mut out = dataset.clone();
        out.retain_rows(|row| {
            within(lat_col.map(|c| &row[c]), self.lat_min, self.lat_max)
                && within(lon_col.map(|c| &row[c]), self.lon_min, self.lon_max)
        });
        debug!(
            "[DatasetFilter] bounding box kept {} of {} rows",
            out.len(),
            dataset.len()
        );
        Ok(out)
    }
}

/// Column index, looked up only when the axis has a bound.
fn bounded_column(
    dataset: &Dataset,
    name: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<usize>> {
    if min.is_none() && max.is_none() {
        return Ok(None);
    }
    dataset
        .column_index(name)
        .ok_or_missing_column(name)
        .map(Some)
}

fn within(cell: Option<&CellValue>, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(cell) = cell else {
        return true;
    };
    match cell.as_f64() {
        Some(v) => min.map_or(true, |m| v > m) && max.map_or(true, |m| v < m),
        None => false,
    }
}

/// Apply the bounding box, then `filters` one after another.
pub fn filter_dataset(
    dataset: &Dataset,
    filters: &[FilterConfig],
    bounds: Option<&BoundsFilter>,
) -> Result<Dataset> {
    let mut current = match bounds {
        Some(b) => b.apply(dataset)?,
        None => dataset.clone(),
    };
    for f in filters {
        current = f.apply(&current)?;
    }
    info!(
        "[DatasetFilter] {} filter(s) kept {} of {} rows",
        filters.len(),
        current.len(),
        dataset.len()
    );
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trees() -> Dataset {
        Dataset::from_columns(vec![
            (
                "species".to_string(),
                vec![
                    "Prunus serrulata".into(),
                    "Malus".into(),
                    "Prunus avium".into(),
                    CellValue::Missing,
                ],
            ),
            (
                "status".to_string(),
                vec!["ok".into(), "ok".into(), "dead".into(), "ok".into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_select_keeps_listed_values() {
        let f = FilterConfig::from_json_str(
            r#"{"column": "species", "select": ["Prunus serrulata", "Prunus avium"]}"#,
        )
        .unwrap();
        let out = f.apply(&trees()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.value(1, "species"), Some(&"Prunus avium".into()));
    }

    #[test]
    fn test_veto_drops_listed_values() {
        let filters = FilterConfig::list_from_json_str(
            r#"[{"column_name": "status", "veto": ["dead"]},
                {"column_name": "species", "veto": ["Malus"]}]"#,
        )
        .unwrap();
        let out = filter_dataset(&trees(), &filters, None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.value(1, "species"), Some(&CellValue::Missing));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = FilterConfig::from_json_str(r#"{"column": "species", "selct": ["x"]}"#);
        assert!(matches!(err, Err(SakuraError::ConfigError { .. })));
    }

    #[test]
    fn test_empty_filter_is_rejected() {
        assert!(FilterConfig::from_json_str(r#"{"column": "species"}"#).is_err());
    }

    #[test]
    fn test_missing_column() {
        let f = FilterConfig {
            column: "height".to_string(),
            veto: Some(BTreeSet::new()),
            ..FilterConfig::default()
        };
        assert!(f.apply(&trees()).is_err());
    }

    fn located() -> Dataset {
        Dataset::from_columns(vec![
            (
                "lat".to_string(),
                vec![51.0.into(), 51.05.into(), 51.1.into(), "51.02".into(), CellValue::Missing],
            ),
            (
                "lon".to_string(),
                vec![3.7.into(), 3.7.into(), 3.7.into(), 3.8.into(), 3.7.into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let bounds = BoundsFilter::from_json_str(r#"{"lat_min": 51.0, "lat_max": 51.1}"#).unwrap();
        let out = bounds.apply(&located()).unwrap();
        // 51.0 and 51.1 sit on the bounds, the missing latitude cannot compare
        assert_eq!(out.len(), 2);
        assert_eq!(out.value(0, "lat"), Some(&CellValue::Number(51.05)));
        assert_eq!(out.value(1, "lat"), Some(&"51.02".into()));

        let bounds = BoundsFilter {
            lon_max: Some(3.8),
            ..bounds
        };
        assert_eq!(bounds.apply(&located()).unwrap().len(), 1);
    }

    #[test]
    fn test_unbounded_box_keeps_everything() {
        let bounds = BoundsFilter::from_json_str("{}").unwrap();
        let data = located();
        assert_eq!(bounds.apply(&data).unwrap(), data);

        // Columns are only required for bounded axes
        let only_lon = BoundsFilter {
            lat_column: "latitude".to_string(),
            lon_min: Some(3.75),
            ..BoundsFilter::default()
        };
        assert_eq!(only_lon.apply(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(BoundsFilter::from_json_str(r#"{"lat_min": 52.0, "lat_max": 51.0}"#).is_err());
        assert!(BoundsFilter::from_json_str(r#"{"lat_mn": 51.0}"#).is_err());
    }

    #[test]
    fn test_bounds_apply_before_filters() {
        let mut data = located();
        let idx = data.ensure_column("species");
        for row in 0..data.len() {
            data.set_value(row, idx, "Prunus".into());
        }
        let filters = FilterConfig::list_from_json_str(
            r#"[{"column": "species", "select": ["Prunus"]}]"#,
        )
        .unwrap();
        let bounds = BoundsFilter {
            lat_min: Some(51.03),
            ..BoundsFilter::default()
        };
        let out = filter_dataset(&data, &filters, Some(&bounds)).unwrap();
        assert_eq!(out.len(), 2);
    }
}
