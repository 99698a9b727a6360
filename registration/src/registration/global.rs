//! Sample-consensus initial alignment (SAC-IA)
//!
//! Coarse registration without an initial guess: repeatedly draw a few
//! well-separated source points, pair each with the target point whose FPFH
//! descriptor is closest, fit a rigid transform to those pairs and keep the
//! transform with the lowest truncated error over the whole source cloud.

use super::{estimate_rigid_transform, evaluate_fitness};
use cv_core::{Error, Result};
use cv_point_cloud::{FeatureCloud, FpfhSignature, SpatialIndex};
use nalgebra::{Matrix4, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// SAC-IA parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacIaConfig {
    /// Minimum distance between any two sampled source points.
    pub min_sample_distance: f32,
    /// Squared distance cap for inliers and for the truncated error.
    pub max_correspondence_distance: f32,
    pub max_iterations: usize,
    /// Points drawn per iteration (at least 3).
    pub sample_count: usize,
    /// Number of nearest descriptors to choose a match from at random.
    pub correspondence_randomness: usize,
    /// Redraws allowed per iteration before the sample counts as degenerate.
    pub max_sample_attempts: usize,
    /// Seed for the random source; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SacIaConfig {
    fn default() -> Self {
        Self {
            min_sample_distance: 0.05,
            max_correspondence_distance: 1e-4,
            max_iterations: 500,
            sample_count: 3,
            correspondence_randomness: 1,
            max_sample_attempts: 100,
            seed: None,
        }
    }
}

impl SacIaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_count < 3 {
            return Err(Error::InvalidInput(format!(
                "sample_count must be at least 3, got {}",
                self.sample_count
            )));
        }
        if self.correspondence_randomness == 0 {
            return Err(Error::InvalidInput(
                "correspondence_randomness must be at least 1".to_string(),
            ));
        }
        if !(self.max_correspondence_distance > 0.0) || !(self.min_sample_distance >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "invalid distances: max_correspondence_distance {}, min_sample_distance {}",
                self.max_correspondence_distance, self.min_sample_distance
            )));
        }
        Ok(())
    }
}

/// Outcome of aligning one template to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    /// Mean squared nearest-point distance over inliers; lower is better.
    /// `f32::MAX` when no source point lands within the inlier cap.
    pub fitness_score: f32,
    /// Source-to-target rigid transform.
    pub transformation: Matrix4<f32>,
    /// Fraction of source points within the inlier cap.
    pub inlier_fraction: f32,
    /// Iterations whose sample or fit was rejected.
    pub degenerate_samples: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SampleConsensusAligner {
    config: SacIaConfig,
}

impl SampleConsensusAligner {
    pub fn new(config: SacIaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SacIaConfig {
        &self.config
    }

    /// Fresh random source for one alignment run.
    pub(crate) fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Align `source` to `target` with a random source built from
    /// [`SacIaConfig::seed`].
    pub fn align(&self, target: &FeatureCloud, source: &FeatureCloud) -> Result<AlignmentResult> {
        self.align_with_rng(target, source, &mut self.rng())
    }

    /// Align `source` to `target`, drawing samples from `rng`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidInput`] - Empty cloud, invalid config, or fewer
    ///   source points than `sample_count`
    /// * [`Error::AlignmentFailure`] - No iteration produced a valid transform
    pub fn align_with_rng<R: Rng + ?Sized>(
        &self,
        target: &FeatureCloud,
        source: &FeatureCloud,
        rng: &mut R,
    ) -> Result<AlignmentResult> {
        self.config.validate()?;
        if target.is_empty() || source.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot align empty feature clouds (target {}, source {})",
                target.len(),
                source.len()
            )));
        }
        if source.len() < self.config.sample_count {
            return Err(Error::InvalidInput(format!(
                "source has {} points, fewer than sample_count {}",
                source.len(),
                self.config.sample_count
            )));
        }

        let cap = self.config.max_correspondence_distance;
        let target_index = SpatialIndex::build(target.points());

        let mut best: Option<(f32, Matrix4<f32>)> = None;
        let mut degenerate_samples = 0;

        for _ in 0..self.config.max_iterations {
            let Some(samples) = self.select_samples(source.points(), rng) else {
                degenerate_samples += 1;
                continue;
            };

            let source_pts: Vec<Point3<f32>> = samples.iter().map(|&i| source.points()[i]).collect();
            let target_pts: Vec<Point3<f32>> = samples
                .iter()
                .map(|&i| {
                    let j = self.find_similar_feature(target.descriptors(), &source.descriptors()[i], rng);
                    target.points()[j]
                })
                .collect();

            let Some(transformation) = estimate_rigid_transform(&source_pts, &target_pts) else {
                degenerate_samples += 1;
                continue;
            };

            let score = evaluate_fitness(source.points(), &target_index, &transformation, cap);
            if best.map_or(true, |(error, _)| score.truncated_error < error) {
                best = Some((score.truncated_error, transformation));
            }
        }

        let Some((error, transformation)) = best else {
            return Err(Error::AlignmentFailure(format!(
                "no valid sample in {} iterations ({} degenerate)",
                self.config.max_iterations, degenerate_samples
            )));
        };

        let score = evaluate_fitness(source.points(), &target_index, &transformation, cap);
        tracing::debug!(
            "SAC-IA: truncated error {:.3e}, fitness {:.3e}, {} of {} points within cap, {} degenerate samples",
            error,
            score.mean_squared_error,
            score.inlier_count,
            source.len(),
            degenerate_samples
        );

        Ok(AlignmentResult {
            fitness_score: score.mean_squared_error,
            transformation,
            inlier_fraction: score.inlier_fraction(source.len()),
            degenerate_samples,
        })
    }

    /// Draw `sample_count` distinct source indices whose pairwise distances
    /// are at least `min_sample_distance`. `None` when the attempt budget
    /// runs out first.
    fn select_samples<R: Rng + ?Sized>(&self, points: &[Point3<f32>], rng: &mut R) -> Option<Vec<usize>> {
        let min_sq = self.config.min_sample_distance * self.config.min_sample_distance;
        let mut samples = Vec::with_capacity(self.config.sample_count);
        let mut attempts = 0;

        while samples.len() < self.config.sample_count {
            if attempts >= self.config.max_sample_attempts {
                return None;
            }
            attempts += 1;

            let candidate = rng.gen_range(0..points.len());
            let valid = samples.iter().all(|&s: &usize| {
                s != candidate && (points[s] - points[candidate]).norm_squared() >= min_sq
            });
            if valid {
                samples.push(candidate);
            }
        }
        Some(samples)
    }

    /// Index of a target descriptor close to `query`: the nearest one, or a
    /// uniform pick among the `correspondence_randomness` nearest.
    fn find_similar_feature<R: Rng + ?Sized>(
        &self,
        descriptors: &[FpfhSignature],
        query: &FpfhSignature,
        rng: &mut R,
    ) -> usize {
        let k = self.config.correspondence_randomness.min(descriptors.len());
        if k <= 1 {
            let mut min_dist = f32::MAX;
            let mut min_idx = 0;
            for (j, d) in descriptors.iter().enumerate() {
                let dist = query.distance_squared(d);
                if dist < min_dist {
                    min_dist = dist;
                    min_idx = j;
                }
            }
            return min_idx;
        }

        let mut ranked: Vec<(f32, usize)> = descriptors
            .iter()
            .enumerate()
            .map(|(j, d)| (query.distance_squared(d), j))
            .collect();
        ranked.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked[..k].sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked[rng.gen_range(0..k)].1
    }
}
