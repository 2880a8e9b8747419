//! Core traits for tabletop perception

use crate::{point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Trait for point sets with an axis-aligned extent
pub trait Bounded {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the bounding box
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Length of the bounding box diagonal
    fn diagonal(&self) -> f32 {
        let (min, max) = self.bounding_box();
        (max - min).magnitude()
    }
}

impl<T> Bounded for PointCloud<T>
where
    T: Copy,
    Point3f: From<T>,
{
    fn bounding_box(&self) -> (Point3f, Point3f) {
        let mut points = self.points.iter().map(|p| Point3f::from(*p));
        let Some(first) = points.next() else {
            return (Point3f::origin(), Point3f::origin());
        };

        points.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)))
    }
}

impl Bounded for [Point3f] {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        let Some(first) = self.first() else {
            return (Point3f::origin(), Point3f::origin());
        };

        self.iter()
            .fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p)))
    }
}
