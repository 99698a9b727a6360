//! Point cloud processing for feature-based registration
//!
//! - `spatial`: R*-tree backed neighbour queries
//! - `normals`: PCA normal estimation and orientation
//! - `fpfh`: Fast Point Feature Histogram descriptors
//! - `feature_cloud`: points + normals + descriptors, the unit of comparison
//!   in registration
//! - `filtering`: voxel-grid down-sampling

pub mod feature_cloud;
pub mod filtering;
pub mod fpfh;
pub mod normals;
pub mod spatial;

pub use feature_cloud::{oriented_normals, DegeneratePolicy, FeatureCloud, FeatureConfig, OrientedNormals};
pub use filtering::voxel_down_sample;
pub use fpfh::{compute_fpfh, compute_pair_features, FpfhSignature, FPFH_BINS};
pub use normals::{estimate_normal, estimate_normals, orient_normal, NormalOrientation};
pub use spatial::{Neighbor, SpatialIndex};
