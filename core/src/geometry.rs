//! Rigid-transform helpers over homogeneous 4×4 matrices.
//!
//! A rigid transform is stored as a plain `Matrix4<f32>`: the upper-left
//! 3×3 block is a rotation (orthonormal, determinant +1) and rows 0-2 of the
//! last column hold the translation.

use nalgebra::{Matrix3, Matrix4, Rotation3, Unit, Vector3};

/// Assemble a homogeneous transform from its rotation and translation.
pub fn rigid_transform(rotation: &Matrix3<f32>, translation: &Vector3<f32>) -> Matrix4<f32> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

pub fn rotation_block(transform: &Matrix4<f32>) -> Matrix3<f32> {
    transform.fixed_view::<3, 3>(0, 0).into_owned()
}

pub fn translation_block(transform: &Matrix4<f32>) -> Vector3<f32> {
    transform.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Closed-form inverse of a rigid transform: `[Rᵀ | -Rᵀt]`.
pub fn invert_rigid(transform: &Matrix4<f32>) -> Matrix4<f32> {
    let r_inv = rotation_block(transform).transpose();
    let t_inv = -(r_inv * translation_block(transform));
    rigid_transform(&r_inv, &t_inv)
}

/// Rotation by `angle` radians about `axis`, followed by `translation`.
pub fn axis_angle_transform(axis: &Vector3<f32>, angle: f32, translation: &Vector3<f32>) -> Matrix4<f32> {
    let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle);
    rigid_transform(rotation.matrix(), translation)
}

fn angle_of(r: &Matrix3<f32>) -> f32 {
    // atan2 keeps full precision near identity where acos of the trace does not.
    let sin = Vector3::new(r[(2, 1)] - r[(1, 2)], r[(0, 2)] - r[(2, 0)], r[(1, 0)] - r[(0, 1)]).norm() * 0.5;
    let cos = (r.trace() - 1.0) * 0.5;
    sin.atan2(cos)
}

/// Angle in radians of the rotation block of `transform`.
pub fn rotation_angle(transform: &Matrix4<f32>) -> f32 {
    angle_of(&rotation_block(transform))
}

/// Angle in radians of the relative rotation between two transforms.
pub fn rotation_difference(a: &Matrix4<f32>, b: &Matrix4<f32>) -> f32 {
    angle_of(&(rotation_block(a).transpose() * rotation_block(b)))
}

/// Check that `transform` is rigid within `tolerance`: orthonormal rotation
/// block with determinant +1 and a `[0 0 0 1]` bottom row.
pub fn is_rigid(transform: &Matrix4<f32>, tolerance: f32) -> bool {
    let r = rotation_block(transform);
    let orthonormal = (r.transpose() * r - Matrix3::identity()).amax() <= tolerance;
    let proper = (r.determinant() - 1.0).abs() <= tolerance;
    let bottom = transform.fixed_view::<1, 4>(3, 0);
    let homogeneous = bottom[0].abs() <= tolerance
        && bottom[1].abs() <= tolerance
        && bottom[2].abs() <= tolerance
        && (bottom[3] - 1.0).abs() <= tolerance;
    orthonormal && proper && homogeneous
}
