//! Normal estimation algorithms

use rayon::prelude::*;
use tabletop_core::{
    Error, NearestNeighborSearch, NormalPoint3f, NormalPointCloud3f, Point3f, Result, Vector3f,
};

use crate::{nearest_neighbor::SpatialIndex, segmentation::PlaneModel};

/// Estimate normals from the `k` nearest neighbors of every point.
///
/// Each normal is the normal of the least-squares plane through the
/// neighborhood (the point itself included). Normals are unit length but
/// unoriented. Points whose neighborhood is collinear get `+Z`.
pub fn estimate_normals(points: &[Point3f], k: usize) -> Result<NormalPointCloud3f> {
    if k < 3 {
        return Err(Error::InvalidData(format!(
            "normal estimation needs at least 3 neighbors, got {}",
            k
        )));
    }

    let index = SpatialIndex::new(points);
    let normals = points
        .par_iter()
        .map(|point| {
            let neighborhood: Vec<Point3f> = index
                .find_k_nearest(point, k)
                .into_iter()
                .map(|(i, _)| points[i])
                .collect();
            let normal = PlaneModel::fit_least_squares(&neighborhood)
                .map(|plane| plane.normal().normalize())
                .unwrap_or_else(|| Vector3f::new(0.0, 0.0, 1.0));
            NormalPoint3f {
                position: *point,
                normal,
            }
        })
        .collect::<Vec<_>>();

    Ok(NormalPointCloud3f::from_points(normals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normals_of_plane() {
        let points: Vec<Point3f> = (0..100)
            .map(|i| Point3f::new((i % 10) as f32 * 0.1, (i / 10) as f32 * 0.1, 2.0))
            .collect();

        let normals = estimate_normals(&points, 8).unwrap();
        assert_eq!(normals.len(), points.len());
        for p in normals.iter() {
            assert_relative_eq!(p.normal.z.abs(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_normals_of_sphere_are_radial() {
        let points: Vec<Point3f> = (0..400)
            .map(|i| {
                let t = i as f32 + 0.5;
                let polar = (1.0 - 2.0 * t / 400.0).acos();
                let azimuth = std::f32::consts::PI * (1.0 + 5.0_f32.sqrt()) * t;
                Point3f::new(
                    polar.sin() * azimuth.cos(),
                    polar.sin() * azimuth.sin(),
                    polar.cos(),
                )
            })
            .collect();

        let normals = estimate_normals(&points, 10).unwrap();
        for p in normals.iter() {
            let radial = p.position.coords.normalize();
            assert!(p.normal.dot(&radial).abs() > 0.95);
        }
    }

    #[test]
    fn test_rejects_small_neighborhood() {
        assert!(estimate_normals(&[Point3f::origin()], 2).is_err());
    }
}
