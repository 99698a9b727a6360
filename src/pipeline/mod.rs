//! Explicit stage pipeline
//!
//! A [`PipelineConfig`] lists the stages to run and the parameters of each
//! algorithm. Stages run in order and each returns a [`StageReport`].

pub mod config;
pub mod report;
pub mod stages;

pub use config::{EstimateStage, IcpStage, MatchStage, NormalsStage, PipelineConfig, Stage, TransformStage};
pub use report::{
    EstimateReport, IcpReport, MatchReport, MatrixDisplay, NormalsReport, RigidDisplay, StageReport,
    TransformReport,
};
pub use stages::{
    load_cloud, resolve_template_paths, run_estimate_transform, run_icp, run_normals, run_template_match,
    run_transform,
};

use cv_core::Result;

/// Run a single stage.
pub fn run_stage(stage: &Stage, config: &PipelineConfig) -> Result<StageReport> {
    tracing::info!("running stage {}", stage.name());
    let report = match stage {
        Stage::TemplateMatch(s) => StageReport::TemplateMatch(run_template_match(s, config)?),
        Stage::Icp(s) => StageReport::Icp(run_icp(s, config)?),
        Stage::EstimateTransform(s) => StageReport::EstimateTransform(run_estimate_transform(s)?),
        Stage::Transform(s) => StageReport::Transform(run_transform(s)?),
        Stage::Normals(s) => StageReport::Normals(run_normals(s, config)?),
    };
    Ok(report)
}

/// Run every configured stage in order, stopping at the first failure.
pub fn run_pipeline(config: &PipelineConfig) -> Result<Vec<StageReport>> {
    if config.stages.is_empty() {
        tracing::warn!("pipeline has no stages");
    }
    config.stages.iter().map(|stage| run_stage(stage, config)).collect()
}
