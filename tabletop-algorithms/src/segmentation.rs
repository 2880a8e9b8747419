//! Segmentation algorithms

use nalgebra::{Matrix3, SymmetricEigen, Vector3, Vector4};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tabletop_core::{Error, NearestNeighborSearch, Point3f, Result, Vector3f};
use tracing::{debug, trace};

use crate::nearest_neighbor::SpatialIndex;

/// A 3D plane model defined by the equation ax + by + cz + d = 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    /// Plane coefficients [a, b, c, d] where ax + by + cz + d = 0
    pub coefficients: Vector4<f32>,
}

impl PlaneModel {
    /// Create a new plane model from coefficients
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self {
            coefficients: Vector4::new(a, b, c, d),
        }
    }

    /// Create a plane model from three points
    pub fn from_points(p1: &Point3f, p2: &Point3f, p3: &Point3f) -> Option<Self> {
        let normal = (p2 - p1).cross(&(p3 - p1));

        // Collinear samples
        if normal.magnitude() < 1e-8 {
            return None;
        }

        let normal = normal.normalize();
        let d = -normal.dot(&p1.coords);
        Some(PlaneModel::new(normal.x, normal.y, normal.z, d))
    }

    /// Least-squares plane through `points`.
    ///
    /// The normal is the eigenvector of the smallest eigenvalue of the point
    /// covariance. Returns `None` for fewer than three points or for points
    /// that are (numerically) collinear.
    pub fn fit_least_squares(points: &[Point3f]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let n = points.len() as f64;
        let centroid = points
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>())
            / n;
        let covariance = points.iter().fold(Matrix3::<f64>::zeros(), |acc, p| {
            let d = p.coords.cast::<f64>() - centroid;
            acc + d * d.transpose()
        }) / n;

        let eigen = SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let largest = eigen.eigenvalues[order[2]];
        if !(largest > 0.0) || eigen.eigenvalues[order[1]] <= largest * 1e-10 {
            return None;
        }

        let normal = eigen.eigenvectors.column(order[0]).normalize();
        let d = -normal.dot(&centroid);
        Some(PlaneModel::new(
            normal.x as f32,
            normal.y as f32,
            normal.z as f32,
            d as f32,
        ))
    }

    /// Get the normal vector of the plane
    pub fn normal(&self) -> Vector3f {
        Vector3f::new(
            self.coefficients.x,
            self.coefficients.y,
            self.coefficients.z,
        )
    }

    /// Signed distance from the plane, positive on the side the normal points to
    pub fn signed_distance(&self, point: &Point3f) -> f32 {
        let normal_magnitude = self.normal().magnitude();
        if normal_magnitude < 1e-8 {
            return f32::INFINITY;
        }

        (self.normal().dot(&point.coords) + self.coefficients.w) / normal_magnitude
    }

    /// Calculate the distance from a point to the plane
    pub fn distance_to_point(&self, point: &Point3f) -> f32 {
        self.signed_distance(point).abs()
    }

    /// The same plane with its normal flipped, if needed, so that `viewpoint`
    /// lies on the positive side.
    pub fn oriented_towards(&self, viewpoint: &Point3f) -> Self {
        if self.signed_distance(viewpoint) < 0.0 {
            Self {
                coefficients: -self.coefficients,
            }
        } else {
            *self
        }
    }

    /// Orthogonal projection of `point` onto the plane
    pub fn project_point(&self, point: &Point3f) -> Point3f {
        let normal = self.normal();
        let magnitude = normal.magnitude();
        if magnitude < 1e-8 {
            return *point;
        }
        point - normal * (self.signed_distance(point) / magnitude)
    }

    /// Count inliers within a distance threshold
    pub fn count_inliers(&self, points: &[Point3f], threshold: f32) -> usize {
        points
            .par_iter()
            .filter(|point| self.distance_to_point(point) <= threshold)
            .count()
    }

    /// Get indices of inlier points within a distance threshold
    pub fn get_inliers(&self, points: &[Point3f], threshold: f32) -> Vec<usize> {
        points
            .par_iter()
            .enumerate()
            .filter(|(_, point)| self.distance_to_point(point) <= threshold)
            .map(|(i, _)| i)
            .collect()
    }
}

/// RANSAC plane segmentation result
#[derive(Debug, Clone)]
pub struct PlaneSegmentationResult {
    /// The best plane model found
    pub model: PlaneModel,
    /// Indices of inlier points, ascending
    pub inliers: Vec<usize>,
    /// Number of RANSAC iterations performed
    pub iterations: usize,
}

/// Plane segmentation using RANSAC
///
/// Samples three distinct points per iteration and keeps the hypothesis with
/// the most points within `threshold`. Sampling stops early once, at the
/// current best inlier ratio, an all-inlier sample would have been drawn
/// with [`RANSAC_CONFIDENCE`]. The winner is then refit by least squares
/// over its inliers; the refit replaces it when it does not lose support.
/// Randomness comes from `rng` so callers control reproducibility.
///
/// # Arguments
/// * `points` - Input points
/// * `threshold` - Maximum distance for a point to be considered an inlier
/// * `max_iters` - Upper bound on RANSAC iterations
/// * `rng` - Source of randomness for sampling
pub fn segment_plane<R: Rng + ?Sized>(
    points: &[Point3f],
    threshold: f32,
    max_iters: usize,
    rng: &mut R,
) -> Result<PlaneSegmentationResult> {
    if points.len() < 3 {
        return Err(Error::InvalidData(
            "Need at least 3 points for plane segmentation".to_string(),
        ));
    }

    if !(threshold > 0.0) {
        return Err(Error::InvalidData("Threshold must be positive".to_string()));
    }

    if max_iters == 0 {
        return Err(Error::InvalidData(
            "Max iterations must be positive".to_string(),
        ));
    }

    let mut best: Option<(PlaneModel, usize)> = None;
    let mut budget = max_iters;
    let mut iteration = 0;
    while iteration < budget {
        iteration += 1;
        let sample = rand::seq::index::sample(rng, points.len(), 3);
        let Some(model) = PlaneModel::from_points(
            &points[sample.index(0)],
            &points[sample.index(1)],
            &points[sample.index(2)],
        ) else {
            continue;
        };

        let score = model.count_inliers(points, threshold);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            trace!("iteration {}: plane with {} inliers", iteration, score);
            best = Some((model, score));
            budget = budget.min(required_iterations(score as f64 / points.len() as f64, 3));
        }
    }

    let Some((model, _)) = best else {
        return Err(Error::Algorithm(
            "Failed to find valid plane model".to_string(),
        ));
    };

    let mut inliers = model.get_inliers(points, threshold);
    let mut model = model;
    let support: Vec<Point3f> = inliers.iter().map(|&i| points[i]).collect();
    if let Some(refit) = PlaneModel::fit_least_squares(&support) {
        let refit_inliers = refit.get_inliers(points, threshold);
        if refit_inliers.len() >= inliers.len() {
            model = refit;
            inliers = refit_inliers;
        }
    }

    debug!(
        "plane {:?} has {} of {} points as inliers after {} iterations",
        model.coefficients.as_slice(),
        inliers.len(),
        points.len(),
        iteration
    );
    Ok(PlaneSegmentationResult {
        model,
        inliers,
        iterations: iteration,
    })
}

/// Probability that at least one RANSAC sample is free of outliers
pub const RANSAC_CONFIDENCE: f64 = 0.99;

/// Iterations needed to draw one all-inlier sample of `sample_size` points
/// with [`RANSAC_CONFIDENCE`] when a share `inlier_ratio` of points are inliers
pub fn required_iterations(inlier_ratio: f64, sample_size: i32) -> usize {
    let clean = inlier_ratio.clamp(0.0, 1.0).powi(sample_size);
    if clean >= 1.0 {
        return 1;
    }
    let miss = (1.0 - clean).ln();
    if miss >= 0.0 {
        return usize::MAX;
    }
    ((1.0 - RANSAC_CONFIDENCE).ln() / miss).ceil() as usize
}

/// Euclidean cluster extraction
///
/// Groups points into connected components where neighbors are at most
/// `tolerance` apart. Components with fewer than `min_size` or more than
/// `max_size` points are discarded. Each cluster lists its point indices in
/// ascending order; clusters are ordered by decreasing size, ties keeping the
/// order in which they were found. Non-finite points never join a cluster.
pub fn euclidean_clusters(
    points: &[Point3f],
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<Vec<usize>>> {
    if !(tolerance > 0.0) {
        return Err(Error::InvalidData(
            "cluster tolerance must be positive".to_string(),
        ));
    }
    if min_size > max_size {
        return Err(Error::InvalidData(format!(
            "minimum cluster size {} exceeds maximum {}",
            min_size, max_size
        )));
    }

    let index = SpatialIndex::new(points);
    let mut visited: Vec<bool> = points
        .iter()
        .map(|p| !p.coords.iter().all(|c| c.is_finite()))
        .collect();
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut frontier = vec![seed];
        let mut members = Vec::new();
        while let Some(current) = frontier.pop() {
            members.push(current);
            for (neighbor, _) in index.find_radius_neighbors(&points[current], tolerance) {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    frontier.push(neighbor);
                }
            }
        }

        if (min_size..=max_size).contains(&members.len()) {
            members.sort_unstable();
            clusters.push(members);
        } else {
            trace!("dropping component of {} points", members.len());
        }
    }

    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    debug!(
        "{} clusters with tolerance {} in [{}, {}]",
        clusters.len(),
        tolerance,
        min_size,
        max_size
    );
    Ok(clusters)
}

/// Largest Euclidean cluster among a subset of points
///
/// Clusters only `points[subset]` and returns the biggest component expressed
/// as indices into `points` (ascending). Fails with
/// [`Error::DegenerateSurface`] when no component satisfies the size bounds.
pub fn largest_cluster(
    points: &[Point3f],
    subset: &[usize],
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<usize>> {
    let selected: Vec<Point3f> = subset
        .iter()
        .map(|&i| {
            points.get(i).copied().ok_or_else(|| {
                Error::InvalidData(format!(
                    "subset index {} out of range for {} points",
                    i,
                    points.len()
                ))
            })
        })
        .collect::<Result<_>>()?;

    let clusters = euclidean_clusters(&selected, tolerance, min_size, max_size)?;
    let Some(largest) = clusters.into_iter().next() else {
        return Err(Error::DegenerateSurface(format!(
            "no cluster of {} candidate points within size bounds [{}, {}]",
            subset.len(),
            min_size,
            max_size
        )));
    };

    let mut resolved: Vec<usize> = largest.into_iter().map(|i| subset[i]).collect();
    resolved.sort_unstable();
    Ok(resolved)
}
