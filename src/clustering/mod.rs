//! Waypoint reduction: collapse dense groups of points into cluster centers.
//!
//! Two strategies are available:
//! - [`cluster_categorical`]: group by categorical columns (e.g. street name),
//!   optionally splitting groups that span more than a maximum distance
//! - [`cluster_distance`]: complete-linkage clustering purely on distance,
//!   for inventories without a natural grouping key
//!
//! Both reduce every group to one row via [`reduce_groups`].

mod categorical;
mod reduce;
mod splitter;
mod threshold;

pub use categorical::{cluster_categorical, ClusterOptions};
pub use reduce::{reduce_groups, ClusterCenter, ClusterResult, ReduceColumns};
pub use splitter::{group_diameter, split_by_max_distance, split_matrix_by_max_distance};
pub use threshold::{
    cluster_by_distance_threshold, cluster_distance, cluster_matrix_by_threshold,
    ThresholdOptions,
};
