use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// A point record with a fixed set of named scalar fields.
///
/// Every record carries a position; the remaining fields (intensity, normal,
/// ...) depend on the implementing type. Field names follow the PCD
/// convention so records can be read from and written to PCD files without
/// a per-type reader.
pub trait PointRecord: Clone + Send + Sync + std::fmt::Debug {
    /// Field names in storage order.
    const FIELDS: &'static [&'static str];

    fn position(&self) -> Point3<f32>;

    /// Build a record from named field values. `x`, `y` and `z` are
    /// required; any other field missing from the source defaults to zero.
    fn from_fields<F>(field: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<f32>;

    /// Append the field values in the order of [`PointRecord::FIELDS`].
    fn push_fields(&self, out: &mut Vec<f32>);

    /// Apply a rigid transform. Positions are moved, directions rotated.
    fn transformed(&self, transform: &Matrix4<f32>) -> Self;
}

fn required_position<F>(field: &F) -> Option<Point3<f32>>
where
    F: Fn(&str) -> Option<f32>,
{
    Some(Point3::new(field("x")?, field("y")?, field("z")?))
}

fn rotation_of(transform: &Matrix4<f32>) -> Matrix3<f32> {
    transform.fixed_view::<3, 3>(0, 0).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointXYZ {
    pub position: Point3<f32>,
}

impl PointXYZ {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
        }
    }
}

impl From<Point3<f32>> for PointXYZ {
    fn from(position: Point3<f32>) -> Self {
        Self { position }
    }
}

impl PointRecord for PointXYZ {
    const FIELDS: &'static [&'static str] = &["x", "y", "z"];

    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn from_fields<F>(field: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<f32>,
    {
        required_position(&field).map(Self::from)
    }

    fn push_fields(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(&[self.position.x, self.position.y, self.position.z]);
    }

    fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        Self {
            position: transform.transform_point(&self.position),
        }
    }
}

/// Position plus a scalar intensity, as produced by most range sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointXYZI {
    pub position: Point3<f32>,
    pub intensity: f32,
}

impl PointRecord for PointXYZI {
    const FIELDS: &'static [&'static str] = &["x", "y", "z", "intensity"];

    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn from_fields<F>(field: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<f32>,
    {
        Some(Self {
            position: required_position(&field)?,
            intensity: field("intensity").unwrap_or(0.0),
        })
    }

    fn push_fields(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(&[
            self.position.x,
            self.position.y,
            self.position.z,
            self.intensity,
        ]);
    }

    fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        Self {
            position: transform.transform_point(&self.position),
            intensity: self.intensity,
        }
    }
}

/// Position plus a surface normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointNormal {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl PointRecord for PointNormal {
    const FIELDS: &'static [&'static str] = &["x", "y", "z", "normal_x", "normal_y", "normal_z"];

    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn from_fields<F>(field: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<f32>,
    {
        let component = |long: &str, short: &str| field(long).or_else(|| field(short)).unwrap_or(0.0);
        let mut normal = Vector3::new(
            component("normal_x", "nx"),
            component("normal_y", "ny"),
            component("normal_z", "nz"),
        );
        // Averaged normals (voxel centroids) come back shorter than unit length.
        if normal.norm_squared() > 1e-12 {
            normal.normalize_mut();
        }
        Some(Self {
            position: required_position(&field)?,
            normal,
        })
    }

    fn push_fields(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(&[
            self.position.x,
            self.position.y,
            self.position.z,
            self.normal.x,
            self.normal.y,
            self.normal.z,
        ]);
    }

    fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        Self {
            position: transform.transform_point(&self.position),
            normal: rotation_of(transform) * self.normal,
        }
    }
}

/// An ordered collection of point records. The order defines the stable
/// point index used by correspondences.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud<P: PointRecord = PointXYZ> {
    pub points: Vec<P>,
}

impl<P: PointRecord> Default for PointCloud<P> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<P: PointRecord> PointCloud<P> {
    pub fn new(points: Vec<P>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn positions(&self) -> Vec<Point3<f32>> {
        self.points.iter().map(PointRecord::position).collect()
    }

    /// Mean position, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<Point3<f32>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.position().coords);
        Some(Point3::from(sum / self.points.len() as f32))
    }

    /// Copy of the cloud with `transform` applied to every record.
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        Self {
            points: self.points.iter().map(|p| p.transformed(transform)).collect(),
        }
    }

    /// Drop records whose position has a NaN or infinite coordinate.
    /// Returns the number of records removed.
    pub fn retain_finite(&mut self) -> usize {
        let before = self.points.len();
        self.points.retain(|p| {
            let q = p.position();
            q.x.is_finite() && q.y.is_finite() && q.z.is_finite()
        });
        before - self.points.len()
    }
}

impl PointCloud<PointXYZ> {
    pub fn from_positions(positions: impl IntoIterator<Item = Point3<f32>>) -> Self {
        positions.into_iter().map(PointXYZ::from).collect()
    }
}

impl PointCloud<PointNormal> {
    /// Zip positions with normals, checking that both have the same length.
    pub fn with_normals(positions: &[Point3<f32>], normals: &[Vector3<f32>]) -> crate::Result<Self> {
        if positions.len() != normals.len() {
            return Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                positions.len()
            )));
        }
        Ok(positions
            .iter()
            .zip(normals)
            .map(|(position, normal)| PointNormal {
                position: *position,
                normal: *normal,
            })
            .collect())
    }
}

impl<P: PointRecord> FromIterator<P> for PointCloud<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

pub type PointCloudXYZ = PointCloud<PointXYZ>;
pub type PointCloudXYZI = PointCloud<PointXYZI>;
pub type PointCloudNormal = PointCloud<PointNormal>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Translation3};

    #[test]
    fn test_from_fields_requires_xyz() {
        let missing_z = |name: &str| match name {
            "x" | "y" => Some(1.0),
            _ => None,
        };
        assert!(PointXYZ::from_fields(missing_z).is_none());

        let xyz_only = |name: &str| match name {
            "x" => Some(1.0),
            "y" => Some(2.0),
            "z" => Some(3.0),
            _ => None,
        };
        let p = PointXYZI::from_fields(xyz_only).unwrap();
        assert_eq!(p.position, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(p.intensity, 0.0);
    }

    #[test]
    fn test_push_fields_matches_field_names() {
        let p = PointNormal {
            position: Point3::new(1.0, 2.0, 3.0),
            normal: Vector3::z(),
        };
        let mut values = Vec::new();
        p.push_fields(&mut values);
        assert_eq!(values.len(), PointNormal::FIELDS.len());

        let lookup = |name: &str| {
            PointNormal::FIELDS
                .iter()
                .position(|f| *f == name)
                .map(|i| values[i])
        };
        assert_eq!(PointNormal::from_fields(lookup).unwrap(), p);
    }

    #[test]
    fn test_transform_rotates_normals_only() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let transform = Translation3::new(5.0, 0.0, 0.0).to_homogeneous() * rotation.to_homogeneous();

        let p = PointNormal {
            position: Point3::new(1.0, 0.0, 0.0),
            normal: Vector3::x(),
        };
        let moved = p.transformed(&transform);
        assert_relative_eq!(moved.position, Point3::new(5.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(moved.normal, Vector3::y(), epsilon = 1e-6);

        let q = PointXYZI {
            position: Point3::origin(),
            intensity: 7.0,
        };
        assert_eq!(q.transformed(&transform).intensity, 7.0);
    }

    #[test]
    fn test_with_normals_length_mismatch() {
        let positions = vec![Point3::origin(); 3];
        let normals = vec![Vector3::z(); 2];
        assert!(PointCloudNormal::with_normals(&positions, &normals).is_err());
    }

    #[test]
    fn test_retain_finite() {
        let mut cloud = PointCloudXYZ::from_positions([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f32::NAN, 0.0, 0.0),
            Point3::new(1.0, f32::INFINITY, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ]);
        assert_eq!(cloud.retain_finite(), 2);
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn test_centroid() {
        let cloud = PointCloudXYZ::from_positions([Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)]);
        assert_eq!(cloud.centroid(), Some(Point3::new(1.0, 2.0, 3.0)));
        assert!(PointCloudXYZ::default().centroid().is_none());
    }
}
