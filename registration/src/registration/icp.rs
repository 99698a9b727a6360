//! Point-to-point ICP refinement

use super::{compute_transformation_from_correspondences, evaluate_fitness};
use cv_core::{rotation_angle, translation_block, Error, PointCloud, PointRecord, Result};
use cv_point_cloud::SpatialIndex;
use nalgebra::{Matrix4, Point3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// ICP parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    pub max_iterations: usize,
    /// Correspondences farther apart than this are rejected; `None` keeps all.
    pub max_correspondence_distance: Option<f32>,
    /// Converged when the squared translation of an update falls below this
    /// (together with `rotation_epsilon`).
    pub transformation_epsilon: f32,
    /// Rotation angle (radians) of an update below which it counts as still.
    pub rotation_epsilon: f32,
    /// Converged when the fitness changes by less than this between iterations.
    pub euclidean_fitness_epsilon: f32,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_correspondence_distance: None,
            transformation_epsilon: 1e-10,
            rotation_epsilon: 1e-6,
            euclidean_fitness_epsilon: 1e-12,
        }
    }
}

/// ICP (Iterative Closest Point) registration result
///
/// Non-convergence is not an error: `converged` is `false` when the loop
/// ran out of iterations or correspondences, and the caller decides
/// whether to accept the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct IcpResult {
    pub converged: bool,
    /// Mean squared nearest-point distance of the transformed source.
    pub fitness_score: f32,
    /// Cumulative source-to-target transform, initial guess included.
    pub transformation: Matrix4<f32>,
    pub iterations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IterativeClosestPoint {
    config: IcpConfig,
}

impl IterativeClosestPoint {
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Refine `initial` so that it maps `source` onto `target`.
    ///
    /// Each iteration:
    /// 1. Pair every transformed source point with its nearest target point
    /// 2. Drop pairs beyond `max_correspondence_distance`
    /// 3. Fit the rigid update by SVD and compose it into the transform
    /// 4. Stop on the epsilon thresholds (converged) or the budget
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when either cloud is empty.
    pub fn align<P: PointRecord, Q: PointRecord>(
        &self,
        source: &PointCloud<P>,
        target: &PointCloud<Q>,
        initial: &Matrix4<f32>,
    ) -> Result<IcpResult> {
        if source.is_empty() || target.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot run ICP on empty clouds (source {}, target {})",
                source.len(),
                target.len()
            )));
        }

        let source_pts = source.positions();
        let target_pts = target.positions();
        let target_index = SpatialIndex::build(&target_pts);
        let max_range = self
            .config
            .max_correspondence_distance
            .map_or(f32::INFINITY, |d| d * d);

        let mut transformation = *initial;
        let mut previous_fitness: Option<f32> = None;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            let moved: Vec<Point3<f32>> = source_pts
                .par_iter()
                .map(|p| transformation.transform_point(p))
                .collect();

            let correspondences: Vec<(usize, usize)> = moved
                .par_iter()
                .enumerate()
                .filter_map(|(i, p)| {
                    target_index
                        .nearest_neighbor(p)
                        .filter(|n| n.distance_sq <= max_range)
                        .map(|n| (i, n.index))
                })
                .collect();

            if correspondences.len() < 3 {
                tracing::warn!(
                    "ICP stopped after {} iterations: {} correspondences",
                    iterations,
                    correspondences.len()
                );
                break;
            }

            let Some(update) =
                compute_transformation_from_correspondences(&moved, &target_pts, &correspondences)
            else {
                tracing::warn!("ICP stopped after {} iterations: degenerate correspondences", iterations);
                break;
            };
            transformation = update * transformation;
            iterations += 1;

            let fitness = correspondences
                .iter()
                .map(|&(s, t)| (update.transform_point(&moved[s]) - target_pts[t]).norm_squared() as f64)
                .sum::<f64>()
                / correspondences.len() as f64;
            let fitness = fitness as f32;

            let still = translation_block(&update).norm_squared() < self.config.transformation_epsilon
                && rotation_angle(&update) < self.config.rotation_epsilon;
            let settled = previous_fitness
                .is_some_and(|prev| (prev - fitness).abs() < self.config.euclidean_fitness_epsilon);
            if still || settled {
                converged = true;
                break;
            }
            previous_fitness = Some(fitness);
        }

        let score = evaluate_fitness(&source_pts, &target_index, &transformation, max_range);
        tracing::debug!(
            "ICP: converged {}, {} iterations, fitness {:.3e}",
            converged,
            iterations,
            score.mean_squared_error
        );

        Ok(IcpResult {
            converged,
            fitness_score: score.mean_squared_error,
            transformation,
            iterations,
        })
    }
}

/// Run ICP from the identity transform.
pub fn refine<P: PointRecord, Q: PointRecord>(
    source: &PointCloud<P>,
    target: &PointCloud<Q>,
    config: &IcpConfig,
) -> Result<IcpResult> {
    IterativeClosestPoint::new(*config).align(source, target, &Matrix4::identity())
}
