//! Filtering algorithms
//!
//! The filters that drop points return an [`IndexFilter`] next to their output
//! so that later stages can trace a surviving point back to its source pixel.

use std::collections::HashMap;

use tabletop_core::{
    Bounded, ColoredPoint3f, ColoredPointCloud3f, Error, IndexFilter, Point3f, Result,
};
use tracing::debug;

/// A coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Coordinate of `point` along this axis
    pub fn coordinate(&self, point: &Point3f) -> f32 {
        match self {
            Axis::X => point.x,
            Axis::Y => point.y,
            Axis::Z => point.z,
        }
    }
}

/// Remove every point with a non-finite coordinate.
///
/// Relative order is preserved. The returned filter maps each output index
/// to its index in `cloud`.
pub fn remove_invalid(cloud: &ColoredPointCloud3f) -> (ColoredPointCloud3f, IndexFilter) {
    keep_where(cloud, |p| p.is_finite())
}

/// Keep points whose coordinate on `axis` lies in `[min, max]`.
///
/// Non-finite coordinates never pass the test, so this filter can run on a
/// cloud that still holds invalid samples.
///
/// # Example
/// ```rust
/// use tabletop_core::{ColoredPoint3f, PointCloud};
/// use tabletop_algorithms::{filter_range, Axis};
///
/// fn main() -> tabletop_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         ColoredPoint3f::new(0.0, 0.0, 0.5, [0, 0, 0]),
///         ColoredPoint3f::new(0.0, 0.0, 2.5, [0, 0, 0]),
///         ColoredPoint3f::new(0.0, 0.0, 1.0, [0, 0, 0]),
///     ]);
///
///     let (filtered, kept) = filter_range(&cloud, Axis::Z, 0.0, 1.5)?;
///     assert_eq!(filtered.len(), 2);
///     assert_eq!(kept.kept(), &[0, 2]);
///     Ok(())
/// }
/// ```
pub fn filter_range(
    cloud: &ColoredPointCloud3f,
    axis: Axis,
    min: f32,
    max: f32,
) -> Result<(ColoredPointCloud3f, IndexFilter)> {
    if !min.is_finite() || !max.is_finite() {
        return Err(Error::InvalidData(format!(
            "range bounds must be finite, got [{}, {}]",
            min, max
        )));
    }
    if min > max {
        return Err(Error::InvalidData(format!(
            "range minimum {} exceeds maximum {}",
            min, max
        )));
    }

    let (filtered, kept) = keep_where(cloud, |p| {
        let value = axis.coordinate(&p.position);
        value >= min && value <= max
    });
    debug!(
        "{:?} range [{}, {}] kept {} of {} points",
        axis,
        min,
        max,
        filtered.len(),
        cloud.len()
    );
    Ok((filtered, kept))
}

fn keep_where<F>(cloud: &ColoredPointCloud3f, predicate: F) -> (ColoredPointCloud3f, IndexFilter)
where
    F: Fn(&ColoredPoint3f) -> bool,
{
    let filter = IndexFilter::from_mask(cloud.iter().map(&predicate));
    (cloud.select(filter.kept()), filter)
}

#[derive(Default)]
struct VoxelAccumulator {
    position: [f64; 3],
    color: [u64; 3],
    count: u64,
}

impl VoxelAccumulator {
    fn add(&mut self, point: &ColoredPoint3f) {
        self.position[0] += point.position.x as f64;
        self.position[1] += point.position.y as f64;
        self.position[2] += point.position.z as f64;
        for (sum, channel) in self.color.iter_mut().zip(point.color) {
            *sum += channel as u64;
        }
        self.count += 1;
    }

    fn representative(&self) -> ColoredPoint3f {
        let n = self.count as f64;
        ColoredPoint3f {
            position: Point3f::new(
                (self.position[0] / n) as f32,
                (self.position[1] / n) as f32,
                (self.position[2] / n) as f32,
            ),
            color: [
                (self.color[0] / self.count) as u8,
                (self.color[1] / self.count) as u8,
                (self.color[2] / self.count) as u8,
            ],
        }
    }
}

/// Voxel grid filtering
///
/// Space is divided into cubes of side `leaf_size`, anchored at the minimum
/// corner of the cloud's bounding box. Every occupied voxel is replaced by
/// the centroid of its points carrying their mean color. Output points are
/// ordered by the first input point that fell into each voxel. Non-finite
/// points are ignored.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `leaf_size` - Side length of each voxel
pub fn voxel_grid_filter(cloud: &ColoredPointCloud3f, leaf_size: f32) -> Result<ColoredPointCloud3f> {
    if !leaf_size.is_finite() || leaf_size <= 0.0 {
        return Err(Error::InvalidData(format!(
            "leaf size must be positive, got {}",
            leaf_size
        )));
    }

    let finite: Vec<Point3f> = cloud
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| p.position)
        .collect();
    if finite.is_empty() {
        return Ok(ColoredPointCloud3f::new());
    }
    let (min, max) = finite[..].bounding_box();

    let extent = (max - min) / leaf_size;
    if extent.iter().any(|e| *e as f64 >= i32::MAX as f64) {
        return Err(Error::InvalidData(format!(
            "leaf size {} is too small for a cloud spanning {:?}",
            leaf_size,
            max - min
        )));
    }

    let voxel_of = |p: &Point3f| -> (i32, i32, i32) {
        (
            ((p.x - min.x) / leaf_size).floor() as i32,
            ((p.y - min.y) / leaf_size).floor() as i32,
            ((p.z - min.z) / leaf_size).floor() as i32,
        )
    };

    let mut slots: HashMap<(i32, i32, i32), usize> = HashMap::new();
    let mut voxels: Vec<VoxelAccumulator> = Vec::new();
    for point in cloud.iter().filter(|p| p.is_finite()) {
        let slot = *slots.entry(voxel_of(&point.position)).or_insert_with(|| {
            voxels.push(VoxelAccumulator::default());
            voxels.len() - 1
        });
        voxels[slot].add(point);
    }

    debug!(
        "voxel grid with leaf {} reduced {} points to {}",
        leaf_size,
        cloud.len(),
        voxels.len()
    );
    Ok(voxels.iter().map(VoxelAccumulator::representative).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud(points: &[(f32, f32, f32)]) -> ColoredPointCloud3f {
        points
            .iter()
            .map(|&(x, y, z)| ColoredPoint3f::new(x, y, z, [10, 20, 30]))
            .collect()
    }

    #[test]
    fn test_remove_invalid_tracks_indices() {
        let mut input = cloud(&[(0.0, 0.0, 1.0), (1.0, 0.0, 1.0), (2.0, 0.0, 1.0)]);
        input.points.insert(1, ColoredPoint3f::invalid());
        input.points[3].position.y = f32::INFINITY;

        let (filtered, kept) = remove_invalid(&input);
        assert_eq!(filtered.len(), 2);
        assert_eq!(kept.kept(), &[0, 2]);
        assert_eq!(kept.source_len(), 4);
        for (out, &source) in filtered.iter().zip(kept.kept()) {
            assert_eq!(*out, input[source]);
        }
    }

    #[test]
    fn test_filter_range_resolves_to_points_in_range() {
        let input = cloud(&[
            (0.0, 0.0, -1.0),
            (0.0, 0.0, 0.0),
            (0.0, 0.0, 0.7),
            (0.0, 0.0, f32::NAN),
            (0.0, 0.0, 1.5),
            (0.0, 0.0, 1.6),
        ]);

        let (filtered, kept) = filter_range(&input, Axis::Z, 0.0, 1.5).unwrap();
        assert_eq!(kept.kept(), &[1, 2, 4]);
        for (position, point) in filtered.iter().enumerate() {
            let source = kept.resolve(position).unwrap();
            let z = input[source].position.z;
            assert!((0.0..=1.5).contains(&z));
            assert_eq!(*point, input[source]);
        }
    }

    #[test]
    fn test_filter_range_rejects_inverted_bounds() {
        let input = cloud(&[(0.0, 0.0, 1.0)]);
        assert!(filter_range(&input, Axis::Z, 2.0, 1.0).is_err());
        assert!(filter_range(&input, Axis::X, f32::NAN, 1.0).is_err());
    }

    #[test]
    fn test_voxel_grid_averages_voxel() {
        let mut input = cloud(&[(0.01, 0.01, 0.01), (0.03, 0.03, 0.03), (0.5, 0.5, 0.5)]);
        input.points[1].color = [30, 40, 50];

        let filtered = voxel_grid_filter(&input, 0.1).unwrap();
        assert_eq!(filtered.len(), 2);

        let first = filtered[0];
        assert_relative_eq!(first.position.x, 0.02, epsilon = 1e-6);
        assert_relative_eq!(first.position.z, 0.02, epsilon = 1e-6);
        assert_eq!(first.color, [20, 30, 40]);
        assert_relative_eq!(filtered[1].position.x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_voxel_grid_keeps_separated_points() {
        let input: ColoredPointCloud3f = (0..10)
            .map(|i| ColoredPoint3f::new(i as f32 * 0.01, 0.0, 1.0, [0, 0, 0]))
            .collect();

        let filtered = voxel_grid_filter(&input, 0.005).unwrap();
        assert_eq!(filtered.len(), input.len());
    }

    #[test]
    fn test_voxel_grid_invalid_leaf() {
        let input = cloud(&[(0.0, 0.0, 0.0)]);
        assert!(voxel_grid_filter(&input, 0.0).is_err());
        assert!(voxel_grid_filter(&input, -1.0).is_err());
        assert!(voxel_grid_filter(&ColoredPointCloud3f::new(), 0.1).unwrap().is_empty());
    }
}
