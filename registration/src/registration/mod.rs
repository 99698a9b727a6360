//! 3D Registration Module
//!
//! Implements the feature-based alignment pipeline:
//! - Sample-consensus initial alignment (SAC-IA) over FPFH descriptors
//! - Best-template selection across a template registry
//! - Point-to-point ICP refinement

pub mod global;
pub mod icp;
pub mod selection;

pub use cv_core::{Error, Result};
pub use global::{AlignmentResult, SacIaConfig, SampleConsensusAligner};
pub use icp::{refine, IcpConfig, IcpResult, IterativeClosestPoint};
pub use selection::{select_best, Template, TemplateRegistry};

use cv_core::rigid_transform;
use cv_point_cloud::SpatialIndex;
use nalgebra::{Matrix3, Matrix4, Point3};
use rayon::prelude::*;

/// Compute rigid transformation from correspondences using SVD
///
/// Finds the rotation and translation minimising the summed squared
/// distance between `R * source[s] + t` and `target[t]` over every
/// `(s, t)` pair.
///
/// # Returns
///
/// * `Some(transform)` - Proper rigid transform (determinant +1)
/// * `None` - Fewer than 3 pairs, or the source points are collinear
pub fn compute_transformation_from_correspondences(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    correspondences: &[(usize, usize)],
) -> Option<Matrix4<f32>> {
    if correspondences.len() < 3 {
        return None;
    }

    // Compute centroids
    let mut source_centroid = Point3::origin();
    let mut target_centroid = Point3::origin();

    for &(src_idx, tgt_idx) in correspondences {
        source_centroid += source[src_idx].coords;
        target_centroid += target[tgt_idx].coords;
    }

    let n = correspondences.len() as f32;
    source_centroid /= n;
    target_centroid /= n;

    // Compute covariance matrix
    let mut covariance = Matrix3::<f32>::zeros();

    for &(src_idx, tgt_idx) in correspondences {
        let src = source[src_idx] - source_centroid;
        let tgt = target[tgt_idx] - target_centroid;
        covariance += tgt * src.transpose();
    }

    // SVD to find rotation
    let svd = covariance.svd(true, true);
    let scale = svd.singular_values[0];
    if !scale.is_finite() || svd.singular_values[1] <= scale * 1e-6 {
        return None;
    }
    let u = svd.u?;
    let vt = svd.v_t?;

    let mut rotation = u * vt;

    // Ensure proper rotation (det = 1)
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * vt;
    }

    // Compute translation
    let translation = target_centroid.coords - rotation * source_centroid.coords;

    Some(rigid_transform(&rotation, &translation))
}

/// Rigid transform mapping `source[i]` onto `target[i]` for every `i`.
///
/// `None` when the slices differ in length, hold fewer than 3 points or the
/// points are collinear.
pub fn estimate_rigid_transform(source: &[Point3<f32>], target: &[Point3<f32>]) -> Option<Matrix4<f32>> {
    if source.len() != target.len() {
        return None;
    }
    let pairs: Vec<(usize, usize)> = (0..source.len()).map(|i| (i, i)).collect();
    compute_transformation_from_correspondences(source, target, &pairs)
}

/// Nearest-neighbour residuals of a transformed source against a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessScore {
    /// Mean squared distance over inliers (`d² <= max_range`), `f32::MAX`
    /// when there are none.
    pub mean_squared_error: f32,
    pub inlier_count: usize,
    /// `Σ min(d², max_range) / n` over every source point.
    pub truncated_error: f32,
}

impl FitnessScore {
    pub fn inlier_fraction(&self, total: usize) -> f32 {
        if total == 0 {
            0.0
        } else {
            self.inlier_count as f32 / total as f32
        }
    }
}

/// Evaluate registration quality
///
/// # Arguments
///
/// * `source` - Source points, before `transform` is applied
/// * `target` - Spatial index over the target points
/// * `transform` - Candidate source-to-target transform
/// * `max_range` - Squared distance cap separating inliers from outliers
pub fn evaluate_fitness(
    source: &[Point3<f32>],
    target: &SpatialIndex,
    transform: &Matrix4<f32>,
    max_range: f32,
) -> FitnessScore {
    // Summed sequentially in index order; the score must not depend on the rayon split.
    let distances: Vec<f32> = source
        .par_iter()
        .map(|p| {
            target
                .nearest_neighbor(&transform.transform_point(p))
                .map_or(f32::MAX, |n| n.distance_sq)
        })
        .collect();

    let mut inlier_sum = 0.0f64;
    let mut inlier_count = 0usize;
    let mut truncated_sum = 0.0f64;
    for d2 in distances {
        if d2 <= max_range {
            inlier_sum += d2 as f64;
            inlier_count += 1;
            truncated_sum += d2 as f64;
        } else {
            truncated_sum += max_range as f64;
        }
    }

    let mean_squared_error = if inlier_count > 0 {
        (inlier_sum / inlier_count as f64) as f32
    } else {
        f32::MAX
    };
    let truncated_error = if source.is_empty() {
        f32::MAX
    } else {
        (truncated_sum / source.len() as f64) as f32
    };

    FitnessScore {
        mean_squared_error,
        inlier_count,
        truncated_error,
    }
}

#[cfg(test)]
mod mod_test;
