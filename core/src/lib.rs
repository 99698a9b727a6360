//! Core types shared by the cv-align crates: generic point records and
//! clouds, rigid-transform helpers, the error taxonomy and the global
//! thread pool.

pub mod error;
pub mod geometry;
pub mod point_cloud;
pub mod runtime;

pub use error::{Error, Result};
pub use geometry::*;
pub use point_cloud::{
    PointCloud, PointCloudNormal, PointCloudXYZ, PointCloudXYZI, PointNormal, PointRecord,
    PointXYZ, PointXYZI,
};
pub use runtime::{current_cpu_threads, init_global_thread_pool};
