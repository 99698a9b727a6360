//! Surface normal estimation by PCA over radius neighbourhoods.

use crate::spatial::SpatialIndex;
use cv_core::{Error, Result};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimum neighbourhood size (query point included) for a defined normal.
pub const MIN_NORMAL_NEIGHBORS: usize = 3;

/// Ratio of the middle to the largest covariance eigenvalue below which a
/// neighbourhood counts as a line or a single point.
const MIN_PLANARITY: f64 = 1e-10;

/// How the sign of each estimated normal is chosen.
///
/// PCA only yields a normal axis. Inconsistent signs flip the angular
/// features of neighbouring points, so descriptors of the same surface seen
/// in two poses can differ unless the sign is fixed by a rule that moves
/// with the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalOrientation {
    /// Point away from the centroid of the whole cloud.
    #[default]
    Centroid,
    /// Point towards a fixed sensor position.
    Viewpoint([f32; 3]),
    /// Keep whatever sign the eigen solver returns.
    Unoriented,
}

/// Estimate the normal at `points[index]` from all points within `radius`.
///
/// # Errors
/// [`Error::FeatureComputation`] when fewer than [`MIN_NORMAL_NEIGHBORS`]
/// points (the query included) fall inside the radius, when the
/// neighbourhood is coincident or collinear, or when the covariance does not
/// yield a finite eigenvector.
pub fn estimate_normal(
    points: &[Point3<f32>],
    tree: &SpatialIndex,
    index: usize,
    radius: f32,
) -> Result<Vector3<f32>> {
    let neighbors = tree.search_radius(&points[index], radius);
    let degenerate = Error::FeatureComputation {
        index,
        neighbors: neighbors.len(),
    };
    if neighbors.len() < MIN_NORMAL_NEIGHBORS {
        return Err(degenerate);
    }

    // Accumulated in f64: clouds far from the origin lose the local
    // spread to rounding in f32.
    let count = neighbors.len() as f64;
    let mut centroid = Vector3::<f64>::zeros();
    for n in &neighbors {
        centroid += points[n.index].coords.cast::<f64>();
    }
    centroid /= count;

    let mut cov = Matrix3::<f64>::zeros();
    for n in &neighbors {
        let d = points[n.index].coords.cast::<f64>() - centroid;
        cov += d * d.transpose();
    }
    cov /= count;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let middle = eigen.eigenvalues[order[1]];
    let largest = eigen.eigenvalues[order[2]];
    if !(largest > 0.0) || middle <= largest * MIN_PLANARITY {
        return Err(degenerate);
    }

    let normal = eigen.eigenvectors.column(order[0]).into_owned();
    let norm = normal.norm();
    if !norm.is_finite() || norm < 1e-6 {
        return Err(degenerate);
    }
    Ok((normal / norm).cast::<f32>())
}

/// Estimate normals for every point in parallel. Each entry is either the
/// unit normal or the degeneracy error for that point.
pub fn estimate_normals(
    points: &[Point3<f32>],
    tree: &SpatialIndex,
    radius: f32,
) -> Vec<Result<Vector3<f32>>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| estimate_normal(points, tree, i, radius))
        .collect()
}

/// Flip `normal` in place according to `orientation`.
///
/// `centroid` is the centroid of the whole cloud; it is only read for
/// [`NormalOrientation::Centroid`].
pub fn orient_normal(
    normal: &mut Vector3<f32>,
    point: &Point3<f32>,
    centroid: &Point3<f32>,
    orientation: NormalOrientation,
) {
    let reference = match orientation {
        NormalOrientation::Unoriented => return,
        NormalOrientation::Centroid => point - centroid,
        NormalOrientation::Viewpoint(vp) => Point3::from(vp) - point,
    };

    let dot = normal.dot(&reference);
    if dot.abs() > 1e-6 * reference.norm() {
        if dot < 0.0 {
            *normal = -*normal;
        }
        return;
    }

    // Reference direction lies in the tangent plane: make the dominant
    // component positive so the choice is at least deterministic.
    let dominant = normal.iamax();
    if normal[dominant] < 0.0 {
        *normal = -*normal;
    }
}
