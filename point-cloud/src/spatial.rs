//! Spatial index over a fixed point set, backed by an R*-tree.
//!
//! Built once per cloud and read-only afterwards, so a single index can be
//! shared across rayon workers.

use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

// Wrapper for RTree
#[derive(Debug, Clone)]
struct PointWrapper(usize, Point3<f32>);

impl RTreeObject for PointWrapper {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.1.x, self.1.y, self.1.z])
    }
}

impl PointDistance for PointWrapper {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.1.x - point[0];
        let dy = self.1.y - point[1];
        let dz = self.1.z - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// A query hit: the index of the point in the indexed set and its squared
/// distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance_sq: f32,
}

impl PointWrapper {
    fn hit(&self, query: &[f32; 3]) -> Neighbor {
        Neighbor {
            index: self.0,
            distance_sq: self.distance_2(query),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<PointWrapper>,
}

impl SpatialIndex {
    pub fn build(points: &[Point3<f32>]) -> Self {
        let wrappers: Vec<PointWrapper> = points
            .iter()
            .enumerate()
            .map(|(i, p)| PointWrapper(i, *p))
            .collect();
        Self {
            tree: RTree::bulk_load(wrappers),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest_neighbor(&self, query: &Point3<f32>) -> Option<Neighbor> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor(&q)
            .map(|w| w.hit(&q))
    }

    /// All points within `radius` of `query` (the query point itself included
    /// when it is part of the set), ordered by index.
    pub fn search_radius(&self, query: &Point3<f32>, radius: f32) -> Vec<Neighbor> {
        let q = [query.x, query.y, query.z];
        let mut hits: Vec<Neighbor> = self
            .tree
            .locate_within_distance(q, radius * radius)
            .map(|w| w.hit(&q))
            .collect();
        hits.sort_unstable_by_key(|n| n.index);
        hits
    }

    /// The `k` nearest points ordered by increasing distance.
    pub fn k_nearest_neighbors(&self, query: &Point3<f32>, k: usize) -> Vec<Neighbor> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter(&q)
            .take(k)
            .map(|w| w.hit(&q))
            .collect()
    }
}
