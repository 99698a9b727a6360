//! Feature-based 3D template alignment
//!
//! Umbrella crate over the workspace:
//! - `core`: point records, clouds, rigid transforms, errors
//! - `io`: PCD, template-list and matrix files
//! - `point_cloud`: spatial index, normals, FPFH, feature clouds
//! - `registration`: SAC-IA, template selection, ICP
//! - `pipeline`: explicit stages driven by a TOML configuration

pub use cv_core as core;
pub use cv_io as io;
pub use cv_point_cloud as point_cloud;
pub use cv_registration as registration;

pub mod pipeline;

pub use cv_core::{Error, Result};
pub use pipeline::{run_pipeline, run_stage, PipelineConfig, Stage, StageReport};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before running any stage.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `CV_ALIGN_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> std::result::Result<(), String> {
    cv_core::init_global_thread_pool(num_threads)
}
