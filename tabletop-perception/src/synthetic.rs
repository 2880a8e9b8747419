//! Synthetic organized frames of objects standing on a table
//!
//! The camera sits at the origin looking along `+Z` at a horizontal table
//! `table_depth` meters away. Pixels of the main block sample the table top
//! on a regular grid, with the tops of objects replacing the table where
//! they occlude it. Object sides, which a real sensor would see at an angle,
//! are appended as extra rows below the main block, in the columns of the
//! object they belong to. Every block is framed by invalid pixels.

use serde::{Deserialize, Serialize};
use tabletop_core::{ColoredPoint3f, OrganizedCloud, Result};

const EDGE_SLACK: f32 = 1e-4;

/// An object standing on the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneObject {
    /// Axis-aligned box; `size` is `[x, y, height]`
    Cuboid {
        center: [f32; 2],
        size: [f32; 3],
        color: [u8; 3],
    },
    /// Upright cylinder
    Cylinder {
        center: [f32; 2],
        radius: f32,
        height: f32,
        color: [u8; 3],
    },
}

impl SceneObject {
    fn height(&self) -> f32 {
        match self {
            SceneObject::Cuboid { size, .. } => size[2],
            SceneObject::Cylinder { height, .. } => *height,
        }
    }

    fn color(&self) -> [u8; 3] {
        match self {
            SceneObject::Cuboid { color, .. } | SceneObject::Cylinder { color, .. } => *color,
        }
    }

    fn x_extent(&self) -> (f32, f32) {
        match self {
            SceneObject::Cuboid { center, size, .. } => {
                (center[0] - size[0] / 2.0, center[0] + size[0] / 2.0)
            }
            SceneObject::Cylinder { center, radius, .. } => {
                (center[0] - radius, center[0] + radius)
            }
        }
    }

    fn covers(&self, x: f32, y: f32) -> bool {
        match self {
            SceneObject::Cuboid { center, size, .. } => {
                (x - center[0]).abs() <= size[0] / 2.0 + EDGE_SLACK
                    && (y - center[1]).abs() <= size[1] / 2.0 + EDGE_SLACK
            }
            SceneObject::Cylinder { center, radius, .. } => {
                let (dx, dy) = (x - center[0], y - center[1]);
                (dx * dx + dy * dy).sqrt() <= radius + EDGE_SLACK
            }
        }
    }
}

/// Description of a synthetic tabletop frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticScene {
    pub table_depth: f32,
    /// The table spans `[-half, half]` on both axes
    pub table_half_extent: f32,
    /// Sampling step on the table and on object surfaces
    pub spacing: f32,
    pub table_color: [u8; 3],
    /// Width of the invalid border, in pixels
    pub invalid_margin: usize,
    pub objects: Vec<SceneObject>,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            table_depth: 1.0,
            table_half_extent: 0.5,
            spacing: 0.005,
            table_color: [110, 110, 110],
            invalid_margin: 2,
            objects: Vec::new(),
        }
    }
}

impl SyntheticScene {
    pub fn with_object(mut self, object: SceneObject) -> Self {
        self.objects.push(object);
        self
    }

    fn samples(&self) -> usize {
        (2.0 * self.table_half_extent / self.spacing).round() as usize + 1
    }

    fn coordinate(&self, i: usize) -> f32 {
        -self.table_half_extent + i as f32 * self.spacing
    }

    /// Build the organized frame.
    pub fn render(&self) -> Result<OrganizedCloud> {
        let n = self.samples();
        let margin = self.invalid_margin;
        let width = n + 2 * margin;
        let blank = || vec![ColoredPoint3f::invalid(); width];

        let mut rows: Vec<Vec<ColoredPoint3f>> = Vec::new();
        rows.extend((0..margin).map(|_| blank()));
        for i in 0..n {
            let y = self.coordinate(i);
            let mut row = blank();
            for j in 0..n {
                let x = self.coordinate(j);
                row[margin + j] = match self.objects.iter().find(|o| o.covers(x, y)) {
                    Some(object) => ColoredPoint3f::new(
                        x,
                        y,
                        self.table_depth - object.height(),
                        object.color(),
                    ),
                    None => ColoredPoint3f::new(x, y, self.table_depth, self.table_color),
                };
            }
            rows.push(row);
        }
        rows.extend((0..margin).map(|_| blank()));

        for object in &self.objects {
            let (columns, count) = self.column_window(object);
            if count == 0 {
                continue;
            }
            for chunk in self.side_samples(object).chunks(count) {
                let mut row = blank();
                row[margin + columns..margin + columns + chunk.len()].copy_from_slice(chunk);
                rows.push(row);
            }
            rows.extend((0..margin).map(|_| blank()));
        }

        let height = rows.len();
        OrganizedCloud::new(width, height, rows.into_iter().flatten().collect())
    }

    /// First grid column under the object and the number of columns it spans
    fn column_window(&self, object: &SceneObject) -> (usize, usize) {
        let (min_x, max_x) = object.x_extent();
        let columns: Vec<usize> = (0..self.samples())
            .filter(|&j| {
                let x = self.coordinate(j);
                x >= min_x - EDGE_SLACK && x <= max_x + EDGE_SLACK
            })
            .collect();
        match (columns.first(), columns.last()) {
            (Some(&first), Some(&last)) => (first, last - first + 1),
            _ => (0, 0),
        }
    }

    /// Points on the vertical surfaces, one ring per height level
    fn side_samples(&self, object: &SceneObject) -> Vec<ColoredPoint3f> {
        let levels = (object.height() / self.spacing).round() as usize;
        let color = object.color();
        let mut samples = Vec::new();

        for level in 1..levels {
            let z = self.table_depth - level as f32 * self.spacing;
            match object {
                SceneObject::Cuboid { center, size, .. } => {
                    let (min_x, max_x) = (center[0] - size[0] / 2.0, center[0] + size[0] / 2.0);
                    let (min_y, max_y) = (center[1] - size[1] / 2.0, center[1] + size[1] / 2.0);
                    let along = |min: f32, max: f32| -> Vec<f32> {
                        (0..self.samples())
                            .map(|i| self.coordinate(i))
                            .filter(|&c| c >= min - EDGE_SLACK && c <= max + EDGE_SLACK)
                            .collect()
                    };
                    for x in along(min_x, max_x) {
                        samples.push(ColoredPoint3f::new(x, min_y, z, color));
                        samples.push(ColoredPoint3f::new(x, max_y, z, color));
                    }
                    for y in along(min_y, max_y) {
                        samples.push(ColoredPoint3f::new(min_x, y, z, color));
                        samples.push(ColoredPoint3f::new(max_x, y, z, color));
                    }
                }
                SceneObject::Cylinder { center, radius, .. } => {
                    let steps = (std::f32::consts::TAU * radius / self.spacing).ceil().max(3.0) as usize;
                    for step in 0..steps {
                        let angle = std::f32::consts::TAU * step as f32 / steps as f32;
                        samples.push(ColoredPoint3f::new(
                            center[0] + radius * angle.cos(),
                            center[1] + radius * angle.sin(),
                            z,
                            color,
                        ));
                    }
                }
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_frame() {
        let scene = SyntheticScene {
            table_half_extent: 0.1,
            spacing: 0.01,
            ..SyntheticScene::default()
        };
        let frame = scene.render().unwrap();

        assert_eq!(frame.width(), 21 + 4);
        assert_eq!(frame.height(), 21 + 4);
        assert_eq!(frame.valid_count(), 21 * 21);
        assert!(!frame.get(0).unwrap().is_finite());

        let center = frame.index_of(2 + 10, 2 + 10).unwrap();
        let point = frame.get(center).unwrap();
        assert!(point.position.x.abs() < 1e-6 && point.position.y.abs() < 1e-6);
        assert_eq!(point.position.z, 1.0);
    }

    #[test]
    fn test_cuboid_top_and_sides() {
        let scene = SyntheticScene {
            table_half_extent: 0.1,
            spacing: 0.01,
            ..SyntheticScene::default()
        }
        .with_object(SceneObject::Cuboid {
            center: [0.0, 0.0],
            size: [0.04, 0.04, 0.03],
            color: [200, 0, 0],
        });
        let frame = scene.render().unwrap();

        let red: Vec<&ColoredPoint3f> = frame
            .cloud()
            .iter()
            .filter(|p| p.is_finite() && p.color == [200, 0, 0])
            .collect();
        // 5x5 top plus two levels of a 5 sample per side ring
        assert_eq!(red.len(), 25 + 2 * 4 * 5);
        assert!(red.iter().all(|p| p.position.z < 1.0 && p.position.z >= 0.97 - 1e-6));

        // side rows stay inside the object's columns
        for index in 0..frame.len() {
            let (row, column) = frame.pixel_of(index).unwrap();
            if row >= 25 && frame.get(index).unwrap().is_finite() {
                assert!((2 + 8..2 + 13).contains(&column));
            }
        }
    }

    #[test]
    fn test_cylinder_side_ring() {
        let scene = SyntheticScene::default().with_object(SceneObject::Cylinder {
            center: [0.1, -0.1],
            radius: 0.03,
            height: 0.05,
            color: [0, 0, 200],
        });
        let frame = scene.render().unwrap();

        let side: Vec<&ColoredPoint3f> = frame
            .cloud()
            .iter()
            .filter(|p| p.is_finite() && p.color == [0, 0, 200] && p.position.z > 0.951)
            .collect();
        assert!(!side.is_empty());
        for p in side {
            let r = ((p.position.x - 0.1).powi(2) + (p.position.y + 0.1).powi(2)).sqrt();
            assert!((r - 0.03).abs() < 1e-5);
        }
    }
}
