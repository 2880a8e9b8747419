//! Point cloud data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A generic, unorganized point cloud container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with 3D points
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud with colored points
pub type ColoredPointCloud3f = PointCloud<ColoredPoint3f>;

/// A point cloud with normal vectors
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }
}

impl<T: Copy> PointCloud<T> {
    /// Copy the points at `indices` (in the given order) into a new cloud.
    ///
    /// Indices out of range are skipped.
    pub fn select(&self, indices: &[usize]) -> Self {
        indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect()
    }
}

impl<T> PointCloud<T>
where
    T: Copy,
    Point3f: From<T>,
{
    /// Positions of all points, dropping any per-point attributes
    pub fn positions(&self) -> Vec<Point3f> {
        self.points.iter().map(|p| Point3f::from(*p)).collect()
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_preserves_requested_order() {
        let cloud = PointCloud::from_points(vec![
            ColoredPoint3f::new(0.0, 0.0, 0.0, [1, 0, 0]),
            ColoredPoint3f::new(1.0, 0.0, 0.0, [2, 0, 0]),
            ColoredPoint3f::new(2.0, 0.0, 0.0, [3, 0, 0]),
        ]);

        let selected = cloud.select(&[2, 0, 7]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].color, [3, 0, 0]);
        assert_eq!(selected[1].color, [1, 0, 0]);
    }

    #[test]
    fn test_positions_drop_color() {
        let cloud = PointCloud::from_points(vec![ColoredPoint3f::new(1.0, 2.0, 3.0, [9, 9, 9])]);
        assert_eq!(cloud.positions(), vec![Point3f::new(1.0, 2.0, 3.0)]);
    }
}
