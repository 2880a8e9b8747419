//! Primitive shape detection
//!
//! Box, cylinder and sphere hypotheses are fit to an object's points with
//! RANSAC, and the hypothesis explaining the largest share of the points wins.

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tabletop_core::{Bounded, Error, Point3f, Result, Vector3f};
use tracing::debug;

use crate::{normals::estimate_normals, segmentation::segment_plane};

/// Coarse geometric class of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    None,
    Box,
    Cylinder,
    Sphere,
}

/// Configuration for [`ShapeDetector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeDetectionConfig {
    /// RANSAC iterations per fitted primitive
    pub max_iterations: usize,
    /// Maximum point-to-surface distance of an inlier
    pub distance_threshold: f32,
    /// Minimum share of points a shape must explain to be reported
    pub min_inlier_ratio: f32,
    /// Maximum number of planes extracted for the box hypothesis
    pub max_box_faces: usize,
    /// Minimum share of points a single box face must hold
    pub min_face_ratio: f32,
    /// Neighborhood size for normal estimation
    pub normal_neighbors: usize,
    /// Angular slack, in degrees, for "parallel" and "perpendicular"
    pub angle_tolerance_deg: f32,
}

impl Default for ShapeDetectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            distance_threshold: 0.005,
            min_inlier_ratio: 0.75,
            max_box_faces: 6,
            min_face_ratio: 0.05,
            normal_neighbors: 10,
            angle_tolerance_deg: 10.0,
        }
    }
}

impl ShapeDetectionConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidParameters(message));

        if self.max_iterations == 0 {
            return invalid("shape detection needs at least one iteration".to_string());
        }
        if !(self.distance_threshold > 0.0) || !self.distance_threshold.is_finite() {
            return invalid(format!(
                "shape distance threshold must be positive, got {}",
                self.distance_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.min_inlier_ratio) {
            return invalid(format!(
                "minimum inlier ratio must lie in [0, 1], got {}",
                self.min_inlier_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.min_face_ratio) {
            return invalid(format!(
                "minimum face ratio must lie in [0, 1], got {}",
                self.min_face_ratio
            ));
        }
        if self.max_box_faces == 0 {
            return invalid("box detection needs at least one face".to_string());
        }
        if self.normal_neighbors < 3 {
            return invalid(format!(
                "normal estimation needs at least 3 neighbors, got {}",
                self.normal_neighbors
            ));
        }
        if !(0.0..90.0).contains(&self.angle_tolerance_deg) {
            return invalid(format!(
                "angle tolerance must lie in [0, 90) degrees, got {}",
                self.angle_tolerance_deg
            ));
        }
        Ok(())
    }
}

/// Outcome of [`ShapeDetector::detect`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShapeFit {
    pub shape: Shape,
    /// Inlier ratio of the reported shape, 0 for [`Shape::None`]
    pub inlier_ratio: f32,
    pub box_ratio: f32,
    pub cylinder_ratio: f32,
    pub sphere_ratio: f32,
}

/// A sphere surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereModel {
    pub center: Point3f,
    pub radius: f32,
}

impl SphereModel {
    /// The sphere through four points, if they are not coplanar
    pub fn from_points(points: [&Point3f; 4]) -> Option<Self> {
        let [p0, rest @ ..] = points.map(|p| p.coords.cast::<f64>());
        let mut a = Matrix3::<f64>::zeros();
        let mut b = Vector3::<f64>::zeros();
        for (row, p) in rest.iter().enumerate() {
            a.set_row(row, &(2.0 * (p - p0)).transpose());
            b[row] = p.norm_squared() - p0.norm_squared();
        }

        let center = a.lu().solve(&b)?;
        let radius = (p0 - center).norm();
        if !radius.is_finite() {
            return None;
        }
        Some(Self {
            center: Point3f::from(center.cast::<f32>()),
            radius: radius as f32,
        })
    }

    pub fn distance(&self, point: &Point3f) -> f32 {
        ((point - self.center).magnitude() - self.radius).abs()
    }
}

/// An infinite circular cylinder surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderModel {
    pub axis_point: Point3f,
    /// Unit axis direction
    pub axis: Vector3f,
    pub radius: f32,
}

impl CylinderModel {
    /// The cylinder through two surface points with their normals.
    ///
    /// The axis is perpendicular to both normals and passes through the
    /// closest points of the two normal lines. Fails for parallel normals.
    pub fn from_oriented_points(
        p1: &Point3f,
        n1: &Vector3f,
        p2: &Point3f,
        n2: &Vector3f,
    ) -> Option<Self> {
        let axis = n1.cross(n2);
        if axis.magnitude() < 1e-4 {
            return None;
        }
        let axis = axis.normalize();

        let w0 = p1 - p2;
        let (a, b, c) = (n1.dot(n1), n1.dot(n2), n2.dot(n2));
        let (d, e) = (n1.dot(&w0), n2.dot(&w0));
        let denominator = a * c - b * b;
        if denominator.abs() < 1e-8 {
            return None;
        }
        let t = (b * e - c * d) / denominator;
        let axis_point = p1 + n1 * t;

        let mut model = Self {
            axis_point,
            axis,
            radius: 0.0,
        };
        model.radius = model.radial_distance(p1);
        Some(model)
    }

    /// Distance of `point` from the axis line
    pub fn radial_distance(&self, point: &Point3f) -> f32 {
        let offset = point - self.axis_point;
        (offset - self.axis * offset.dot(&self.axis)).magnitude()
    }

    pub fn distance(&self, point: &Point3f) -> f32 {
        (self.radial_distance(point) - self.radius).abs()
    }
}

/// Classifies point clouds as box, cylinder, sphere or none
#[derive(Debug, Clone, Default)]
pub struct ShapeDetector {
    config: ShapeDetectionConfig,
}

impl ShapeDetector {
    pub fn new(config: ShapeDetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShapeDetectionConfig {
        &self.config
    }

    /// Classify `points`.
    ///
    /// The box score is the share of points covered by up to
    /// `max_box_faces` planes that are pairwise parallel or perpendicular.
    /// The cylinder score counts the lateral surface plus one cap plane
    /// perpendicular to the axis. Surfaces with radius above half the
    /// bounding box diagonal are rejected. The best score at or above
    /// `min_inlier_ratio` wins, ties going to box, then cylinder.
    pub fn detect<R: Rng + ?Sized>(&self, points: &[Point3f], rng: &mut R) -> ShapeFit {
        let n = points.len();
        if n < 4 {
            return ShapeFit::default();
        }

        let max_radius = points.diagonal() / 2.0;
        let ratio = |count: usize| count as f32 / n as f32;

        let box_ratio = ratio(self.box_support(points, rng));
        let cylinder_ratio = ratio(self.cylinder_support(points, max_radius, rng));
        let sphere_ratio = ratio(self.sphere_support(points, max_radius, rng));

        let mut best = (Shape::None, 0.0);
        for candidate in [
            (Shape::Box, box_ratio),
            (Shape::Cylinder, cylinder_ratio),
            (Shape::Sphere, sphere_ratio),
        ] {
            if candidate.1 >= self.config.min_inlier_ratio && candidate.1 > best.1 {
                best = candidate;
            }
        }

        debug!(
            "shape scores over {} points: box {:.3}, cylinder {:.3}, sphere {:.3} -> {:?}",
            n, box_ratio, cylinder_ratio, sphere_ratio, best.0
        );
        ShapeFit {
            shape: best.0,
            inlier_ratio: best.1,
            box_ratio,
            cylinder_ratio,
            sphere_ratio,
        }
    }

    fn count_within<F>(&self, points: &[Point3f], distance: F) -> usize
    where
        F: Fn(&Point3f) -> f32 + Sync,
    {
        let threshold = self.config.distance_threshold;
        points.par_iter().filter(|p| distance(*p) <= threshold).count()
    }

    fn box_support<R: Rng + ?Sized>(&self, points: &[Point3f], rng: &mut R) -> usize {
        let min_face = ((self.config.min_face_ratio * points.len() as f32).ceil() as usize).max(3);
        let tolerance = self.config.angle_tolerance_deg.to_radians();
        let (cos_tolerance, sin_tolerance) = (tolerance.cos(), tolerance.sin());

        let mut remaining: Vec<Point3f> = points.to_vec();
        let mut normals: Vec<Vector3f> = Vec::new();
        let mut covered = 0;
        while normals.len() < self.config.max_box_faces && remaining.len() >= min_face {
            let Ok(face) = segment_plane(
                &remaining,
                self.config.distance_threshold,
                self.config.max_iterations,
                rng,
            ) else {
                break;
            };
            if face.inliers.len() < min_face {
                break;
            }

            let normal = face.model.normal().normalize();
            let aligned = normals.iter().all(|other| {
                let cosine = normal.dot(other).abs();
                cosine >= cos_tolerance || cosine <= sin_tolerance
            });
            if !aligned {
                break;
            }

            normals.push(normal);
            covered += face.inliers.len();
            let mut taken = vec![false; remaining.len()];
            for &i in &face.inliers {
                taken[i] = true;
            }
            let mut taken = taken.into_iter();
            remaining.retain(|_| !taken.next().unwrap_or(false));
        }
        covered
    }

    fn cylinder_support<R: Rng + ?Sized>(
        &self,
        points: &[Point3f],
        max_radius: f32,
        rng: &mut R,
    ) -> usize {
        let k = self.config.normal_neighbors.min(points.len()).max(3);
        let Ok(oriented) = estimate_normals(points, k) else {
            return 0;
        };

        let threshold = self.config.distance_threshold;
        let best = ransac(
            points.len(),
            2,
            self.config.max_iterations,
            rng,
            |sample| {
                let (a, b) = (&oriented[sample[0]], &oriented[sample[1]]);
                CylinderModel::from_oriented_points(&a.position, &a.normal, &b.position, &b.normal)
                    .filter(|m| m.radius > threshold && m.radius <= max_radius)
            },
            |model| self.count_within(points, |p| model.distance(p)),
        );
        let Some((model, lateral)) = best else {
            return 0;
        };

        // One cap: a plane perpendicular to the axis among the leftovers
        let rest: Vec<Point3f> = points
            .iter()
            .copied()
            .filter(|p| model.distance(p) > threshold)
            .collect();
        let min_cap = ((self.config.min_face_ratio * points.len() as f32).ceil() as usize).max(3);
        if rest.len() < min_cap {
            return lateral;
        }
        let cos_tolerance = self.config.angle_tolerance_deg.to_radians().cos();
        match segment_plane(&rest, threshold, self.config.max_iterations, rng) {
            Ok(cap)
                if cap.inliers.len() >= min_cap
                    && cap.model.normal().normalize().dot(&model.axis).abs() >= cos_tolerance =>
            {
                lateral + cap.inliers.len()
            }
            _ => lateral,
        }
    }

    fn sphere_support<R: Rng + ?Sized>(
        &self,
        points: &[Point3f],
        max_radius: f32,
        rng: &mut R,
    ) -> usize {
        let threshold = self.config.distance_threshold;
        ransac(
            points.len(),
            4,
            self.config.max_iterations,
            rng,
            |sample| {
                SphereModel::from_points([
                    &points[sample[0]],
                    &points[sample[1]],
                    &points[sample[2]],
                    &points[sample[3]],
                ])
                .filter(|m| m.radius > threshold && m.radius <= max_radius)
            },
            |model| self.count_within(points, |p| model.distance(p)),
        )
        .map_or(0, |(_, count)| count)
    }
}

/// Generic RANSAC loop: the hypothesis with the highest score wins.
fn ransac<M, H, S, R>(
    len: usize,
    sample_size: usize,
    iterations: usize,
    rng: &mut R,
    hypothesize: H,
    score: S,
) -> Option<(M, usize)>
where
    H: Fn(&[usize]) -> Option<M>,
    S: Fn(&M) -> usize,
    R: Rng + ?Sized,
{
    if len < sample_size {
        return None;
    }

    let mut best: Option<(M, usize)> = None;
    for _ in 0..iterations {
        let sample = rand::seq::index::sample(rng, len, sample_size).into_vec();
        let Some(model) = hypothesize(&sample) else {
            continue;
        };
        let current = score(&model);
        if best.as_ref().map_or(true, |(_, count)| current > *count) {
            best = Some((model, current));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::f32::consts::PI;

    fn sphere(center: Point3f, radius: f32, n: usize) -> Vec<Point3f> {
        (0..n)
            .map(|i| {
                let t = i as f32 + 0.5;
                let polar = (1.0 - 2.0 * t / n as f32).acos();
                let azimuth = PI * (1.0 + 5.0_f32.sqrt()) * t;
                center
                    + Vector3f::new(
                        polar.sin() * azimuth.cos(),
                        polar.sin() * azimuth.sin(),
                        polar.cos(),
                    ) * radius
            })
            .collect()
    }

    /// Lateral surface plus top cap of an upright cylinder
    fn cylinder(radius: f32, height: f32, step: f32) -> Vec<Point3f> {
        let mut points = Vec::new();
        let around = (2.0 * PI * radius / step).round() as usize;
        let levels = (height / step).round() as usize;
        for level in 0..levels {
            for k in 0..around {
                let angle = 2.0 * PI * k as f32 / around as f32;
                points.push(Point3f::new(
                    radius * angle.cos(),
                    radius * angle.sin(),
                    level as f32 * step,
                ));
            }
        }
        let cells = (radius / step).floor() as i32;
        for i in -cells..=cells {
            for j in -cells..=cells {
                let (x, y) = (i as f32 * step, j as f32 * step);
                if x * x + y * y < (radius - step * 0.5).powi(2) {
                    points.push(Point3f::new(x, y, height));
                }
            }
        }
        points
    }

    /// Surface of an axis-aligned box sampled on a grid
    fn cuboid(size: [f32; 3], step: f32) -> Vec<Point3f> {
        let steps = size.map(|s| (s / step).round() as usize);
        let mut points = Vec::new();
        for i in 0..=steps[0] {
            for j in 0..=steps[1] {
                for k in 0..=steps[2] {
                    if i == 0 || j == 0 || k == 0 || i == steps[0] || j == steps[1] || k == steps[2] {
                        points.push(Point3f::new(i as f32 * step, j as f32 * step, k as f32 * step));
                    }
                }
            }
        }
        points
    }

    fn detector() -> ShapeDetector {
        ShapeDetector::new(ShapeDetectionConfig {
            distance_threshold: 0.002,
            max_iterations: 300,
            ..ShapeDetectionConfig::default()
        })
    }

    #[test]
    fn test_sphere_from_points() {
        let center = Point3f::new(0.1, -0.2, 1.0);
        let p = |x: f32, y: f32, z: f32| center + Vector3f::new(x, y, z) * 0.5;
        let model = SphereModel::from_points([
            &p(1.0, 0.0, 0.0),
            &p(0.0, 1.0, 0.0),
            &p(0.0, 0.0, 1.0),
            &p(-1.0, 0.0, 0.0),
        ])
        .unwrap();
        assert_relative_eq!(model.center, center, epsilon = 1e-5);
        assert_relative_eq!(model.radius, 0.5, epsilon = 1e-5);

        let flat = Point3f::new(0.0, 0.0, 0.0);
        assert!(SphereModel::from_points([
            &flat,
            &Point3f::new(1.0, 0.0, 0.0),
            &Point3f::new(0.0, 1.0, 0.0),
            &Point3f::new(1.0, 1.0, 0.0),
        ])
        .is_none());
    }

    #[test]
    fn test_cylinder_from_oriented_points() {
        let p1 = Point3f::new(0.3, 0.0, 0.5);
        let p2 = Point3f::new(0.0, 0.3, -0.2);
        let model = CylinderModel::from_oriented_points(
            &p1,
            &Vector3f::new(1.0, 0.0, 0.0),
            &p2,
            &Vector3f::new(0.0, -1.0, 0.0),
        )
        .unwrap();

        assert_relative_eq!(model.axis.z.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(model.radius, 0.3, epsilon = 1e-6);
        assert_relative_eq!(model.distance(&Point3f::new(-0.3, 0.0, 4.0)), 0.0, epsilon = 1e-6);

        let parallel = CylinderModel::from_oriented_points(
            &p1,
            &Vector3f::new(1.0, 0.0, 0.0),
            &p2,
            &Vector3f::new(-1.0, 0.0, 0.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_detects_box() {
        let points = cuboid([0.1, 0.08, 0.06], 0.005);
        let fit = detector().detect(&points, &mut StdRng::seed_from_u64(11));
        assert_eq!(fit.shape, Shape::Box);
        assert!(fit.box_ratio > 0.95);
    }

    #[test]
    fn test_detects_sphere() {
        let points = sphere(Point3f::new(0.0, 0.0, 1.0), 0.05, 600);
        let fit = detector().detect(&points, &mut StdRng::seed_from_u64(5));
        assert_eq!(fit.shape, Shape::Sphere);
        assert!(fit.sphere_ratio > 0.99);
        assert!(fit.box_ratio < fit.sphere_ratio);
    }

    #[test]
    fn test_detects_cylinder() {
        let points = cylinder(0.05, 0.12, 0.005);
        let fit = detector().detect(&points, &mut StdRng::seed_from_u64(9));
        assert_eq!(fit.shape, Shape::Cylinder);
        assert!(fit.cylinder_ratio > fit.box_ratio);
    }

    #[test]
    fn test_scattered_points_are_no_shape() {
        let mut scatter = StdRng::seed_from_u64(42);
        let points: Vec<Point3f> = (0..300)
            .map(|_| {
                Point3f::new(
                    scatter.gen_range(-0.05..0.05),
                    scatter.gen_range(-0.05..0.05),
                    scatter.gen_range(-0.05..0.05),
                )
            })
            .collect();
        let fit = detector().detect(&points, &mut StdRng::seed_from_u64(1));
        assert_eq!(fit.shape, Shape::None);
        assert_eq!(fit.inlier_ratio, 0.0);
    }

    #[test]
    fn test_too_few_points() {
        let fit = detector().detect(&[Point3f::origin(); 3], &mut StdRng::seed_from_u64(0));
        assert_eq!(fit, ShapeFit::default());
    }

    #[test]
    fn test_config_validation() {
        assert!(ShapeDetectionConfig::default().validate().is_ok());
        let bad = ShapeDetectionConfig {
            min_inlier_ratio: 1.5,
            ..ShapeDetectionConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameters(_))));
        let bad = ShapeDetectionConfig {
            distance_threshold: 0.0,
            ..ShapeDetectionConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
