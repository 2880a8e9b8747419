//! Polygonal prism extraction and plane projection
//!
//! A prism is the volume swept by the convex hull of a planar footprint along
//! the footprint's normal, limited to a band of heights above the plane.

use rayon::prelude::*;
use tabletop_core::{ColoredPointCloud3f, Error, Point3f, Result};
use tracing::debug;

use crate::segmentation::PlaneModel;

/// Distance (in meters) by which a point may lie outside the footprint hull
/// and still count as contained.
pub const HULL_TOLERANCE: f32 = 1e-5;

/// Convex hull of 2D points, counter-clockwise, without collinear vertices.
///
/// Andrew's monotone chain. Fewer than three distinct input points yield the
/// distinct points themselves.
pub fn convex_hull_2d(points: &[[f32; 2]]) -> Vec<[f32; 2]> {
    let mut sorted: Vec<[f32; 2]> = points
        .iter()
        .copied()
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .collect();
    sorted.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let cross = |o: &[f32; 2], a: &[f32; 2], b: &[f32; 2]| -> f32 {
        (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
    };

    let mut hull: Vec<[f32; 2]> = Vec::with_capacity(sorted.len() + 1);
    for p in sorted.iter() {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull
}

/// The base of a prism: a fitted plane plus the convex outline of the
/// footprint points expressed in that plane's 2D coordinates.
#[derive(Debug, Clone)]
pub struct PrismFootprint {
    plane: PlaneModel,
    hull: Vec<[f32; 2]>,
    dropped_axis: usize,
}

impl PrismFootprint {
    /// Fit a footprint to `points`.
    ///
    /// The plane is the least-squares plane of `points`, oriented so that
    /// `viewpoint` lies on its positive side; heights are measured along
    /// that normal. Fails when the points do not span a 2D area.
    pub fn new(points: &[Point3f], viewpoint: &Point3f) -> Result<Self> {
        let plane = PlaneModel::fit_least_squares(points)
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "cannot fit a footprint plane through {} points",
                    points.len()
                ))
            })?
            .oriented_towards(viewpoint);
        Self::with_plane(points, plane)
    }

    /// Build a footprint for `points` over a known plane.
    pub fn with_plane(points: &[Point3f], plane: PlaneModel) -> Result<Self> {
        let normal = plane.normal();
        let dropped_axis = normal.iamax();

        let mut footprint = Self {
            plane,
            hull: Vec::new(),
            dropped_axis,
        };
        let projected: Vec<[f32; 2]> = points.iter().map(|p| footprint.planar(p)).collect();
        footprint.hull = convex_hull_2d(&projected);

        if footprint.hull.len() < 3 {
            return Err(Error::InvalidData(format!(
                "footprint of {} points has a degenerate outline",
                points.len()
            )));
        }
        Ok(footprint)
    }

    pub fn plane(&self) -> &PlaneModel {
        &self.plane
    }

    /// Outline vertices in the footprint's 2D coordinates, counter-clockwise
    pub fn hull(&self) -> &[[f32; 2]] {
        &self.hull
    }

    /// Signed height of `point` above the footprint plane
    pub fn height_of(&self, point: &Point3f) -> f32 {
        self.plane.signed_distance(point)
    }

    /// Whether the orthogonal projection of `point` falls inside the outline
    pub fn contains(&self, point: &Point3f) -> bool {
        let q = self.planar(point);
        let n = self.hull.len();
        (0..n).all(|i| {
            let a = self.hull[i];
            let b = self.hull[(i + 1) % n];
            let edge = [b[0] - a[0], b[1] - a[1]];
            let length = (edge[0] * edge[0] + edge[1] * edge[1]).sqrt();
            let cross = edge[0] * (q[1] - a[1]) - edge[1] * (q[0] - a[0]);
            cross >= -HULL_TOLERANCE * length
        })
    }

    /// Indices of the points of `cloud` inside the prism spanning heights
    /// `[height_min, height_max]`, ascending.
    pub fn select(&self, points: &[Point3f], height_min: f32, height_max: f32) -> Vec<usize> {
        points
            .par_iter()
            .enumerate()
            .filter(|(_, p)| {
                let height = self.height_of(p);
                height >= height_min && height <= height_max && self.contains(p)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Project onto the plane, then drop the coordinate the normal dominates.
    fn planar(&self, point: &Point3f) -> [f32; 2] {
        let projected = self.plane.project_point(point);
        let u = (self.dropped_axis + 1) % 3;
        let v = (self.dropped_axis + 2) % 3;
        [projected[u], projected[v]]
    }
}

/// Extract the points of `cloud` lying above a footprint.
///
/// Keeps the points whose projection onto the footprint's fitted plane falls
/// inside the footprint's convex outline and whose height above that plane
/// lies in `[height_min, height_max]`. Returns the matching points and their
/// indices into `cloud`.
pub fn points_above(
    cloud: &ColoredPointCloud3f,
    footprint: &[Point3f],
    height_min: f32,
    height_max: f32,
    viewpoint: &Point3f,
) -> Result<(ColoredPointCloud3f, Vec<usize>)> {
    if height_min > height_max {
        return Err(Error::InvalidData(format!(
            "prism height minimum {} exceeds maximum {}",
            height_min, height_max
        )));
    }

    let prism = PrismFootprint::new(footprint, viewpoint)?;
    let indices = prism.select(&cloud.positions(), height_min, height_max);
    debug!(
        "prism over {} footprint points holds {} of {} points",
        footprint.len(),
        indices.len(),
        cloud.len()
    );
    Ok((cloud.select(&indices), indices))
}

/// Orthogonally project the points of `cloud` at `indices` onto `plane`.
///
/// Colors are carried over; the output follows the order of `indices`.
pub fn project_onto_plane(
    cloud: &ColoredPointCloud3f,
    indices: &[usize],
    plane: &PlaneModel,
) -> ColoredPointCloud3f {
    indices
        .iter()
        .filter_map(|&i| cloud.points.get(i))
        .map(|p| {
            let mut projected = *p;
            projected.position = plane.project_point(&p.position);
            projected
        })
        .collect()
}
