//! Organized (pixel grid) point clouds

use crate::{error::*, point::*, point_cloud::*};
use serde::{Deserialize, Serialize};

/// A point cloud laid out on the sensor's `width x height` pixel grid.
///
/// Point `i` sits at row `i / width`, column `i % width`. Invalid pixels are
/// kept as non-finite points so the grid stays dense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizedCloud {
    width: usize,
    height: usize,
    cloud: ColoredPointCloud3f,
}

impl OrganizedCloud {
    /// Wrap row-major `points` as a `width x height` grid.
    pub fn new(width: usize, height: usize, points: Vec<ColoredPoint3f>) -> Result<Self> {
        if width.checked_mul(height) != Some(points.len()) {
            return Err(Error::InvalidData(format!(
                "organized cloud of {}x{} cannot hold {} points",
                width,
                height,
                points.len()
            )));
        }

        Ok(Self {
            width,
            height,
            cloud: PointCloud::from_points(points),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    /// The grid viewed as a flat cloud, in row-major order
    pub fn cloud(&self) -> &ColoredPointCloud3f {
        &self.cloud
    }

    pub fn get(&self, index: usize) -> Option<&ColoredPoint3f> {
        self.cloud.points.get(index)
    }

    /// `(row, column)` of a linear point index
    pub fn pixel_of(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.len() {
            return None;
        }
        Some((index / self.width, index % self.width))
    }

    /// Linear point index of `(row, column)`
    pub fn index_of(&self, row: usize, column: usize) -> Option<usize> {
        if row >= self.height || column >= self.width {
            return None;
        }
        Some(row * self.width + column)
    }

    /// Number of pixels holding a finite sample
    pub fn valid_count(&self) -> usize {
        self.cloud.iter().filter(|p| p.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> OrganizedCloud {
        let points = (0..width * height)
            .map(|i| ColoredPoint3f::new(i as f32, 0.0, 1.0, [0, 0, 0]))
            .collect();
        OrganizedCloud::new(width, height, points).unwrap()
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let result = OrganizedCloud::new(3, 3, vec![ColoredPoint3f::default(); 8]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_pixel_mapping() {
        let cloud = grid(4, 3);
        assert_eq!(cloud.pixel_of(0), Some((0, 0)));
        assert_eq!(cloud.pixel_of(5), Some((1, 1)));
        assert_eq!(cloud.pixel_of(11), Some((2, 3)));
        assert_eq!(cloud.pixel_of(12), None);

        for index in 0..cloud.len() {
            let (row, column) = cloud.pixel_of(index).unwrap();
            assert_eq!(cloud.index_of(row, column), Some(index));
        }
    }

    #[test]
    fn test_valid_count_ignores_nan() {
        let mut points = vec![ColoredPoint3f::default(); 4];
        points[1] = ColoredPoint3f::invalid();
        let cloud = OrganizedCloud::new(2, 2, points).unwrap();
        assert_eq!(cloud.valid_count(), 3);
    }
}
