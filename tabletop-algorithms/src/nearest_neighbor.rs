//! Nearest neighbor search backed by an R*-tree

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use tabletop_core::{NearestNeighborSearch, Point3f};

/// A point stored in the tree together with its index in the source slice
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedPoint {
    index: usize,
    position: [f32; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Spatial index over a fixed set of points.
///
/// Returned indices refer to positions in the slice the index was built from.
/// Non-finite points are left out of the tree and are never returned.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn new(points: &[Point3f]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.coords.iter().all(|c| c.is_finite()))
            .map(|(index, p)| IndexedPoint {
                index,
                position: [p.x, p.y, p.z],
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl NearestNeighborSearch for SpatialIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .take(k)
            .map(|(entry, distance_2)| (entry.index, distance_2.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let query = [query.x, query.y, query.z];
        self.tree
            .locate_within_distance(query, radius * radius)
            .map(|entry| (entry.index, entry.distance_2(&query).sqrt()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(n: usize, step: f32) -> Vec<Point3f> {
        (0..n).map(|i| Point3f::new(i as f32 * step, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_k_nearest_sorted_by_distance() {
        let points = line(10, 1.0);
        let index = SpatialIndex::new(&points);

        let neighbors = index.find_k_nearest(&Point3f::new(4.2, 0.0, 0.0), 3);
        let indices: Vec<usize> = neighbors.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![4, 5, 3]);
        assert_relative_eq!(neighbors[0].1, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_radius_matches_brute_force() {
        let points: Vec<Point3f> = (0..200)
            .map(|i| {
                let t = i as f32 * 0.37;
                Point3f::new(t.sin(), t.cos(), (t * 0.5).sin())
            })
            .collect();
        let index = SpatialIndex::new(&points);
        let query = Point3f::new(0.1, 0.2, 0.0);

        let mut found: Vec<usize> = index
            .find_radius_neighbors(&query, 0.5)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        found.sort_unstable();

        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - query).magnitude() <= 0.5)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let mut points = line(3, 1.0);
        points.push(Point3f::new(f32::NAN, 0.0, 0.0));
        let index = SpatialIndex::new(&points);

        assert_eq!(index.len(), 3);
        let found = index.find_radius_neighbors(&Point3f::origin(), 100.0);
        assert!(found.iter().all(|(i, _)| *i < 3));
    }
}
