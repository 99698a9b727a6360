//! Stage implementations. Each stage reads its inputs from disk, writes its
//! outputs and returns a report; no state is shared between stages.

use super::config::{EstimateStage, IcpStage, MatchStage, NormalsStage, PipelineConfig, TransformStage};
use super::report::{EstimateReport, IcpReport, MatchReport, NormalsReport, TransformReport};
use cv_core::{axis_angle_transform, Error, PointCloud, PointCloudNormal, PointRecord, PointXYZ, Result};
use cv_io::{load_matrix, load_pcd, read_template_list, save_matrix, save_pcd, PcdData};
use cv_point_cloud::{oriented_normals, voxel_down_sample, FeatureCloud};
use cv_registration::{
    estimate_rigid_transform, IterativeClosestPoint, SampleConsensusAligner, Template, TemplateRegistry,
};
use nalgebra::{Matrix4, Vector3};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Load a cloud and drop records with non-finite coordinates.
pub fn load_cloud<P: PointRecord>(path: &Path) -> Result<PointCloud<P>> {
    let mut cloud: PointCloud<P> = load_pcd(path)?;
    let removed = cloud.retain_finite();
    if removed > 0 {
        tracing::warn!("{}: dropped {} non-finite points", path.display(), removed);
    }
    Ok(cloud)
}

/// Template paths from a list file; relative entries resolve against the
/// directory holding the list.
pub fn resolve_template_paths(list: &Path) -> Result<Vec<PathBuf>> {
    let base = list.parent().unwrap_or_else(|| Path::new(""));
    Ok(read_template_list(list)?
        .into_iter()
        .map(|p| if p.is_relative() { base.join(p) } else { p })
        .collect())
}

pub fn run_template_match(stage: &MatchStage, config: &PipelineConfig) -> Result<MatchReport> {
    let mut target: PointCloud<PointXYZ> = load_cloud(&stage.target)?;
    if let Some(leaf) = stage.target_voxel_size {
        target = voxel_down_sample(&target, leaf);
    }
    let target_features = FeatureCloud::compute(&target, &config.features)?;
    tracing::info!(
        "target {}: {} points, {} features",
        stage.target.display(),
        target.len(),
        target_features.len()
    );

    let paths = resolve_template_paths(&stage.templates)?;
    let templates: Vec<(PathBuf, PointCloud<PointXYZ>, FeatureCloud)> = paths
        .into_par_iter()
        .map(|path| -> Result<(PathBuf, PointCloud<PointXYZ>, FeatureCloud)> {
            let cloud = load_cloud(&path)?;
            let features = FeatureCloud::compute(&cloud, &config.features)?;
            tracing::debug!("template {}: {} features", path.display(), features.len());
            Ok((path, cloud, features))
        })
        .collect::<Result<_>>()?;

    let registry: TemplateRegistry = templates
        .iter()
        .map(|(path, _, features)| Template::new(path.display().to_string(), features.clone()))
        .collect();

    let aligner = SampleConsensusAligner::new(config.sac_ia);
    let (index, best) = aligner.find_best_alignment(&target_features, &registry)?;
    let (template_path, template_cloud, _) = &templates[index];

    let refinement = if stage.refine {
        let icp = IterativeClosestPoint::new(config.icp);
        Some(icp.align(template_cloud, &target, &best.transformation)?)
    } else {
        None
    };

    let report = MatchReport {
        template_index: index,
        template_path: template_path.clone(),
        fitness_score: best.fitness_score,
        transformation: best.transformation,
        refinement,
        output: stage.output.clone(),
    };
    let aligned = template_cloud.transformed(report.final_transformation());
    save_pcd(&stage.output, &aligned, PcdData::Binary)?;
    Ok(report)
}

pub fn run_icp(stage: &IcpStage, config: &PipelineConfig) -> Result<IcpReport> {
    let source: PointCloud<PointXYZ> = load_cloud(&stage.source)?;
    let target: PointCloud<PointXYZ> = load_cloud(&stage.target)?;
    let initial = match &stage.initial_matrix {
        Some(path) => load_matrix(path)?,
        None => Matrix4::identity(),
    };

    let result = IterativeClosestPoint::new(config.icp).align(&source, &target, &initial)?;
    if !result.converged {
        tracing::warn!("ICP did not converge after {} iterations", result.iterations);
    }

    save_matrix(&stage.output_matrix, &result.transformation)?;
    if let Some(path) = &stage.output_cloud {
        save_pcd(path, &source.transformed(&result.transformation), PcdData::Binary)?;
    }

    Ok(IcpReport {
        result,
        output_matrix: stage.output_matrix.clone(),
        output_cloud: stage.output_cloud.clone(),
    })
}

pub fn run_estimate_transform(stage: &EstimateStage) -> Result<EstimateReport> {
    let source: PointCloud<PointXYZ> = load_cloud(&stage.source)?;
    let target: PointCloud<PointXYZ> = load_cloud(&stage.target)?;
    if source.len() != target.len() {
        return Err(Error::InvalidInput(format!(
            "clouds must correspond point by point: {} vs {} points",
            source.len(),
            target.len()
        )));
    }

    let transformation = estimate_rigid_transform(&source.positions(), &target.positions())
        .ok_or_else(|| Error::AlignmentFailure("degenerate point configuration".to_string()))?;
    if let Some(path) = &stage.output_matrix {
        save_matrix(path, &transformation)?;
    }

    Ok(EstimateReport {
        transformation,
        output_matrix: stage.output_matrix.clone(),
    })
}

pub fn run_transform(stage: &TransformStage) -> Result<TransformReport> {
    let transformation = match &stage.matrix {
        Some(path) => load_matrix(path)?,
        None => axis_angle_transform(
            &Vector3::z(),
            stage.rotation_z_degrees.to_radians(),
            &Vector3::from(stage.translation),
        ),
    };

    let cloud: PointCloud<PointXYZ> = load_cloud(&stage.input)?;
    let moved = cloud.transformed(&transformation);
    save_pcd(&stage.output, &moved, PcdData::Ascii)?;

    Ok(TransformReport {
        transformation,
        points: moved.len(),
        output: stage.output.clone(),
    })
}

pub fn run_normals(stage: &NormalsStage, config: &PipelineConfig) -> Result<NormalsReport> {
    let cloud: PointCloud<PointXYZ> = load_cloud(&stage.input)?;
    config.features.validate()?;
    let estimate = oriented_normals(&cloud.positions(), &config.features)?;
    let with_normals = PointCloudNormal::with_normals(&estimate.points, &estimate.normals)?;
    save_pcd(&stage.output, &with_normals, PcdData::Ascii)?;

    Ok(NormalsReport {
        points: with_normals.len(),
        excluded: estimate.excluded,
        output: stage.output.clone(),
    })
}
