//! Voxel-grid down-sampling.

use cv_core::{PointCloud, PointRecord};
use rayon::prelude::*;

/// Downsample a point cloud with a voxel grid.
///
/// Returns one record per occupied voxel whose fields are the mean of the
/// fields of the records in that voxel. Voxels are emitted in sorted
/// (x, y, z) cell order. A non-positive `voxel_size` returns a copy.
pub fn voxel_down_sample<P: PointRecord>(cloud: &PointCloud<P>, voxel_size: f32) -> PointCloud<P> {
    if voxel_size <= 0.0 || cloud.is_empty() {
        return cloud.clone();
    }

    let n = cloud.len();
    let mut indices: Vec<(i64, i64, i64, usize)> = cloud
        .points
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let p = record.position();
            (
                (p.x / voxel_size).floor() as i64,
                (p.y / voxel_size).floor() as i64,
                (p.z / voxel_size).floor() as i64,
                i,
            )
        })
        .collect();

    // Parallel sort if large enough, otherwise sequential
    if n > 10000 {
        indices.par_sort_unstable();
    } else {
        indices.sort_unstable();
    }

    let n_fields = P::FIELDS.len();
    let mut down = Vec::new();
    let mut values = Vec::with_capacity(n_fields);

    for voxel in indices.chunk_by(|a, b| (a.0, a.1, a.2) == (b.0, b.1, b.2)) {
        let mut sum = vec![0.0f64; n_fields];
        for &(_, _, _, idx) in voxel {
            values.clear();
            cloud.points[idx].push_fields(&mut values);
            for (acc, v) in sum.iter_mut().zip(&values) {
                *acc += *v as f64;
            }
        }
        let count = voxel.len() as f64;
        let lookup = |name: &str| {
            P::FIELDS
                .iter()
                .position(|f| *f == name)
                .map(|i| (sum[i] / count) as f32)
        };
        if let Some(record) = P::from_fields(lookup) {
            down.push(record);
        }
    }

    tracing::debug!("voxel down-sampling ({voxel_size}): {} -> {} points", n, down.len());
    PointCloud::new(down)
}
