//! Fast Point Feature Histograms.
//!
//! Each point is described by three 11-bin histograms of the Darboux-frame
//! angles between its normal, a neighbour's normal and the line joining the
//! two points. Only angles and normalised projections enter the histogram,
//! so the signature does not change under rigid motion of the cloud.

use crate::spatial::SpatialIndex;
use cv_core::{Error, Result};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::f32::consts::PI;

pub const FPFH_BINS: usize = 33;
const SUB_BINS: usize = 11;

/// 33-bin FPFH descriptor: `[f1 (11) | f2 (11) | f3 (11)]`, each
/// sub-histogram summing to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpfhSignature {
    pub histogram: [f32; FPFH_BINS],
}

impl Default for FpfhSignature {
    fn default() -> Self {
        Self {
            histogram: [0.0; FPFH_BINS],
        }
    }
}

impl FpfhSignature {
    /// Squared L2 distance in feature space.
    pub fn distance_squared(&self, other: &FpfhSignature) -> f32 {
        self.histogram
            .iter()
            .zip(other.histogram.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    fn normalize_sub_histograms(&mut self) {
        for sub in self.histogram.chunks_exact_mut(SUB_BINS) {
            let sum: f32 = sub.iter().sum();
            if sum > 1e-6 {
                let scale = 100.0 / sum;
                for val in sub {
                    *val *= scale;
                }
            }
        }
    }
}

/// Darboux-frame pair features between an oriented point pair.
///
/// Returns `(f1, f2, f3, f4)`: the angle of the second normal around the
/// frame (`[-π, π]`), its component along `v` (`[-1, 1]`), the cosine of the
/// angle between the source normal and the joining line (`[-1, 1]`), and the
/// pair distance. The pair is ordered so the source normal makes the
/// smaller angle with the joining line. `None` when the points coincide or
/// the joining line is parallel to the source normal.
pub fn compute_pair_features(
    p1: &Point3<f32>,
    n1: &Vector3<f32>,
    p2: &Point3<f32>,
    n2: &Vector3<f32>,
) -> Option<(f32, f32, f32, f32)> {
    let mut delta = p2 - p1;
    let dist = delta.norm();
    if dist < 1e-8 {
        return None;
    }

    let angle1 = n1.dot(&delta) / dist;
    let angle2 = n2.dot(&delta) / dist;

    let (u, n_other, f3) = if angle1.abs().acos() > angle2.abs().acos() {
        delta = -delta;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = delta.cross(u);
    let v_norm = v.norm();
    if v_norm < 1e-8 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let f2 = v.dot(n_other);
    let f1 = w.dot(n_other).atan2(u.dot(n_other));

    Some((f1, f2, f3, dist))
}

fn bin(value: f32, min: f32, max: f32) -> usize {
    let scaled = (SUB_BINS as f32 * (value - min) / (max - min)).floor();
    scaled.clamp(0.0, (SUB_BINS - 1) as f32) as usize
}

/// Simplified point feature histogram of `points[index]` against all
/// neighbours within `radius`. Also returns the neighbour list (self
/// excluded) for the weighting pass, and the number of pairs binned.
fn compute_spfh(
    points: &[Point3<f32>],
    normals: &[Vector3<f32>],
    tree: &SpatialIndex,
    index: usize,
    radius: f32,
) -> (FpfhSignature, Vec<(usize, f32)>, usize) {
    let neighbors: Vec<(usize, f32)> = tree
        .search_radius(&points[index], radius)
        .into_iter()
        .filter(|n| n.index != index)
        .map(|n| (n.index, n.distance_sq))
        .collect();

    let mut signature = FpfhSignature::default();
    if neighbors.is_empty() {
        return (signature, neighbors, 0);
    }

    let increment = 100.0 / neighbors.len() as f32;
    let mut pairs = 0;
    for &(j, _) in &neighbors {
        let Some((f1, f2, f3, _)) =
            compute_pair_features(&points[index], &normals[index], &points[j], &normals[j])
        else {
            continue;
        };
        signature.histogram[bin(f1, -PI, PI)] += increment;
        signature.histogram[SUB_BINS + bin(f2, -1.0, 1.0)] += increment;
        signature.histogram[2 * SUB_BINS + bin(f3, -1.0, 1.0)] += increment;
        pairs += 1;
    }
    (signature, neighbors, pairs)
}

/// Compute FPFH descriptors for every point.
///
/// `points` and `normals` are index-aligned and `tree` indexes `points`.
/// An entry is an error when the point has no neighbour within `radius`
/// that yields a valid pair feature; `Error::FeatureComputation::index`
/// then refers to the position in `points`.
pub fn compute_fpfh(
    points: &[Point3<f32>],
    normals: &[Vector3<f32>],
    tree: &SpatialIndex,
    radius: f32,
) -> Vec<Result<FpfhSignature>> {
    // 1. SPFH per point
    let spfh: Vec<(FpfhSignature, Vec<(usize, f32)>, usize)> = (0..points.len())
        .into_par_iter()
        .map(|i| compute_spfh(points, normals, tree, i, radius))
        .collect();

    // 2. Own SPFH plus distance-weighted neighbour SPFHs
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            let (own, neighbors, pairs) = &spfh[i];
            if *pairs == 0 {
                return Err(Error::FeatureComputation {
                    index: i,
                    neighbors: neighbors.len() + 1,
                });
            }

            let mut fpfh = *own;
            let weight = 1.0 / neighbors.len() as f32;
            for &(j, distance_sq) in neighbors {
                if distance_sq < 1e-12 {
                    continue;
                }
                let w = weight / distance_sq;
                for (acc, value) in fpfh.histogram.iter_mut().zip(spfh[j].0.histogram.iter()) {
                    *acc += value * w;
                }
            }
            fpfh.normalize_sub_histograms();
            Ok(fpfh)
        })
        .collect()
}
