#![allow(dead_code)]

use cv_align::core::{axis_angle_transform, PointCloudXYZ};
use nalgebra::{Matrix4, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const NORMAL_RADIUS: f32 = 0.15;
pub const FEATURE_RADIUS: f32 = 0.25;

/// Surface samples of the unit cube `[0, 1]³`: a `per_side × per_side` grid
/// on each face, jittered in-plane and slightly off the face so no two
/// neighbourhoods are identical.
pub fn jittered_cube(per_side: usize, seed: u64) -> PointCloudXYZ {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = 1.0 / per_side as f32;
    let mut points = Vec::with_capacity(6 * per_side * per_side);

    for axis in 0..3 {
        for side in [0.0f32, 1.0] {
            for i in 0..per_side {
                for j in 0..per_side {
                    let u = (i as f32 + 0.5) * step + rng.gen_range(-0.02..0.02);
                    let v = (j as f32 + 0.5) * step + rng.gen_range(-0.02..0.02);
                    let w = side + rng.gen_range(-0.003..0.003);
                    let p = match axis {
                        0 => Point3::new(w, u, v),
                        1 => Point3::new(u, w, v),
                        _ => Point3::new(u, v, w),
                    };
                    points.push(p);
                }
            }
        }
    }
    PointCloudXYZ::from_positions(points)
}

/// 30° about Z followed by a unit step along X.
pub fn template_motion() -> Matrix4<f32> {
    axis_angle_transform(&Vector3::z(), 30f32.to_radians(), &Vector3::new(1.0, 0.0, 0.0))
}
