//! Perceived objects and their image regions

use serde::{Deserialize, Serialize};
use tabletop_algorithms::HUE_BINS;
use tabletop_core::Point3f;

pub use tabletop_algorithms::Shape;

/// Axis-aligned pixel rectangle of the organized grid
///
/// `x` is the first column and `y` the first row; the rectangle covers
/// columns `x..x + width` and rows `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    /// Smallest rectangle covering the inclusive column and row ranges.
    pub fn from_bounds(columns: (usize, usize), rows: (usize, usize)) -> Self {
        let (min_col, max_col) = (columns.0.min(columns.1), columns.0.max(columns.1));
        let (min_row, max_row) = (rows.0.min(rows.1), rows.0.max(rows.1));
        Self {
            x: min_col,
            y: min_row,
            width: max_col - min_col + 1,
            height: max_row - min_row + 1,
        }
    }

    pub fn contains(&self, row: usize, column: usize) -> bool {
        column >= self.x
            && column < self.x + self.width
            && row >= self.y
            && row < self.y + self.height
    }

    pub fn intersects(&self, other: &Roi) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Feature summary of one object found on the support surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceivedObject {
    /// Process-unique, increasing with every object produced
    pub id: u64,
    pub centroid: Point3f,
    /// Convex hull volume in cubic meters
    pub volume: f32,
    /// Convex hull surface area in square meters
    pub area: f32,
    pub shape: Shape,
    pub average_rgb: [u8; 3],
    /// Hue, saturation and value, each scaled to `0..=255`
    pub average_hsv: [u8; 3],
    pub hue_histogram: [u32; HUE_BINS],
    pub histogram_quality: u8,
    pub roi: Roi,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roi_bounds_are_inclusive() {
        let roi = Roi::from_bounds((4, 9), (2, 2));
        assert_eq!(roi, Roi { x: 4, y: 2, width: 6, height: 1 });
        assert!(roi.contains(2, 4));
        assert!(roi.contains(2, 9));
        assert!(!roi.contains(2, 10));
        assert!(!roi.contains(3, 4));
        assert_eq!(roi.area(), 6);
    }

    #[test]
    fn test_roi_intersection() {
        let a = Roi { x: 0, y: 0, width: 10, height: 10 };
        let b = Roi { x: 9, y: 9, width: 5, height: 5 };
        let c = Roi { x: 10, y: 0, width: 5, height: 5 };
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_object_serializes_shape_lowercase() {
        let object = PerceivedObject {
            id: 3,
            centroid: Point3f::new(0.0, 0.1, 0.9),
            volume: 0.001,
            area: 0.06,
            shape: Shape::Cylinder,
            average_rgb: [200, 30, 30],
            average_hsv: [0, 217, 200],
            hue_histogram: [0; HUE_BINS],
            histogram_quality: 0,
            roi: Roi::default(),
        };
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["shape"], "cylinder");
        assert_eq!(json["id"], 3);
    }
}
