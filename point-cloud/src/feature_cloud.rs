//! Feature clouds: points with their normals and FPFH descriptors.

use crate::fpfh::{compute_fpfh, FpfhSignature};
use crate::normals::{estimate_normals, orient_normal, NormalOrientation};
use crate::spatial::SpatialIndex;
use cv_core::{Error, PointCloud, PointRecord, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// What to do with a point whose neighbourhood is too sparse for a normal
/// or a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Drop the point; the feature cloud shrinks.
    #[default]
    Exclude,
    /// Abort extraction with the first degenerate point.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Neighbourhood radius for normal estimation.
    pub normal_radius: f32,
    /// Neighbourhood radius for FPFH.
    pub feature_radius: f32,
    pub degenerate_policy: DegeneratePolicy,
    pub orientation: NormalOrientation,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            normal_radius: 0.02,
            feature_radius: 0.02,
            degenerate_policy: DegeneratePolicy::default(),
            orientation: NormalOrientation::default(),
        }
    }
}

impl FeatureConfig {
    pub fn new(normal_radius: f32, feature_radius: f32) -> Self {
        Self {
            normal_radius,
            feature_radius,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("normal_radius", self.normal_radius),
            ("feature_radius", self.feature_radius),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidInput(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Oriented unit normals of the non-degenerate points of a cloud.
#[derive(Debug, Clone, Default)]
pub struct OrientedNormals {
    pub points: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    /// Index of each kept point in the input.
    pub source_indices: Vec<usize>,
    /// Points dropped for a degenerate neighbourhood.
    pub excluded: usize,
}

/// Estimate and orient a normal at every point using
/// [`FeatureConfig::normal_radius`] and [`FeatureConfig::orientation`].
///
/// # Errors
/// [`Error::FeatureComputation`] for the first degenerate point under
/// [`DegeneratePolicy::Fail`].
pub fn oriented_normals(positions: &[Point3<f32>], config: &FeatureConfig) -> Result<OrientedNormals> {
    let mut out = OrientedNormals::default();
    let Some(centroid) = centroid(positions) else {
        return Ok(out);
    };

    let tree = SpatialIndex::build(positions);
    for (i, normal) in estimate_normals(positions, &tree, config.normal_radius)
        .into_iter()
        .enumerate()
    {
        match normal {
            Ok(mut n) => {
                orient_normal(&mut n, &positions[i], &centroid, config.orientation);
                out.points.push(positions[i]);
                out.normals.push(n);
                out.source_indices.push(i);
            }
            Err(e) if config.degenerate_policy == DegeneratePolicy::Fail => return Err(e),
            Err(e) => {
                tracing::debug!("excluding point: {e}");
                out.excluded += 1;
            }
        }
    }
    Ok(out)
}

fn centroid(points: &[Point3<f32>]) -> Option<Point3<f32>> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f32))
}

/// Points, unit normals and descriptors derived from one point cloud.
///
/// All sequences have the same length and share indices. A feature cloud is
/// never updated in place; recompute it when the source points change.
#[derive(Debug, Clone, Default)]
pub struct FeatureCloud {
    points: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    descriptors: Vec<FpfhSignature>,
    source_indices: Vec<usize>,
}

impl FeatureCloud {
    /// Estimate normals and FPFH descriptors for `cloud`.
    ///
    /// Points with a degenerate neighbourhood are handled per
    /// [`FeatureConfig::degenerate_policy`]. Descriptors are computed over
    /// the points that received a normal only.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] for non-positive radii, and
    /// [`Error::FeatureComputation`] under [`DegeneratePolicy::Fail`].
    pub fn compute<P: PointRecord>(cloud: &PointCloud<P>, config: &FeatureConfig) -> Result<Self> {
        config.validate()?;
        let positions = cloud.positions();

        // 1. Normals over the whole cloud
        let OrientedNormals {
            points,
            normals,
            source_indices,
            mut excluded,
        } = oriented_normals(&positions, config)?;

        // 2. Descriptors over the points that kept a normal
        let tree = SpatialIndex::build(&points);
        let descriptors = compute_fpfh(&points, &normals, &tree, config.feature_radius);

        let mut features = Self {
            points: Vec::with_capacity(points.len()),
            normals: Vec::with_capacity(points.len()),
            descriptors: Vec::with_capacity(points.len()),
            source_indices: Vec::with_capacity(points.len()),
        };
        for (i, descriptor) in descriptors.into_iter().enumerate() {
            match descriptor {
                Ok(d) => {
                    features.points.push(points[i]);
                    features.normals.push(normals[i]);
                    features.descriptors.push(d);
                    features.source_indices.push(source_indices[i]);
                }
                Err(Error::FeatureComputation { neighbors, .. })
                    if config.degenerate_policy == DegeneratePolicy::Fail =>
                {
                    return Err(Error::FeatureComputation {
                        index: source_indices[i],
                        neighbors,
                    });
                }
                Err(e) => {
                    tracing::debug!("excluding point {}: {e}", source_indices[i]);
                    excluded += 1;
                }
            }
        }

        if excluded > 0 {
            tracing::warn!(
                "excluded {} of {} points with degenerate neighbourhoods",
                excluded,
                positions.len()
            );
        }
        tracing::debug!(
            "computed {} FPFH descriptors (normal radius {}, feature radius {})",
            features.len(),
            config.normal_radius,
            config.feature_radius
        );
        Ok(features)
    }

    /// Assemble a feature cloud from precomputed parts.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] when the sequences differ in length.
    pub fn from_parts(
        points: Vec<Point3<f32>>,
        normals: Vec<Vector3<f32>>,
        descriptors: Vec<FpfhSignature>,
    ) -> Result<Self> {
        if normals.len() != points.len() || descriptors.len() != points.len() {
            return Err(Error::InvalidInput(format!(
                "feature cloud parts differ in length: {} points, {} normals, {} descriptors",
                points.len(),
                normals.len(),
                descriptors.len()
            )));
        }
        let source_indices = (0..points.len()).collect();
        Ok(Self {
            points,
            normals,
            descriptors,
            source_indices,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    pub fn normals(&self) -> &[Vector3<f32>] {
        &self.normals
    }

    pub fn descriptors(&self) -> &[FpfhSignature] {
        &self.descriptors
    }

    /// Index of each feature point in the cloud it was computed from.
    pub fn source_indices(&self) -> &[usize] {
        &self.source_indices
    }
}
