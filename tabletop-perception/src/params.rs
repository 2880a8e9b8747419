//! Pipeline parameters

use serde::{Deserialize, Serialize};
use tabletop_algorithms::ShapeDetectionConfig;
use tabletop_core::{Error, Point3f, Result};

/// Parameters of one perception run
///
/// Defaults match a table-height RGB-D sensor looking down at a table
/// roughly one meter away. Deserialization fills missing keys from
/// [`Default`], so a partial JSON document only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParameters {
    /// Depth range kept by the initial Z filter
    pub z_axis_min: f32,
    pub z_axis_max: f32,
    /// Voxel side of the downsampling grid
    pub downsample_leaf_size: f32,

    /// RANSAC iterations for the support plane
    pub plane_max_iterations: usize,
    /// Inlier distance for the support plane
    pub plane_distance_threshold: f32,

    /// Euclidean clustering of the plane inliers
    pub surface_cluster_tolerance: f32,
    pub surface_cluster_min_size: usize,
    pub surface_cluster_max_size: usize,

    /// Height band above the support surface holding objects
    pub prism_z_min: f32,
    pub prism_z_max: f32,

    /// Euclidean clustering of object footprints
    pub object_cluster_tolerance: f32,
    pub object_cluster_min_size: usize,
    pub object_cluster_max_size: usize,

    /// Sensor origin; heights are measured towards it
    pub viewpoint: [f32; 3],
    /// Seed for every random choice of a run, `None` for fresh entropy
    pub random_seed: Option<u64>,
    pub shape: ShapeDetectionConfig,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            z_axis_min: 0.0,
            z_axis_max: 1.5,
            downsample_leaf_size: 0.01,
            plane_max_iterations: 1000,
            plane_distance_threshold: 0.01,
            surface_cluster_tolerance: 0.02,
            surface_cluster_min_size: 8000,
            surface_cluster_max_size: 200_000,
            prism_z_min: 0.02,
            prism_z_max: 0.50,
            object_cluster_tolerance: 0.03,
            object_cluster_min_size: 100,
            object_cluster_max_size: 25_000,
            viewpoint: [0.0, 0.0, 0.0],
            random_seed: None,
            shape: ShapeDetectionConfig::default(),
        }
    }
}

impl PipelineParameters {
    pub fn viewpoint(&self) -> Point3f {
        Point3f::from(self.viewpoint)
    }

    /// Reject parameter sets that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("z_axis_min", self.z_axis_min),
            ("z_axis_max", self.z_axis_max),
            ("downsample_leaf_size", self.downsample_leaf_size),
            ("plane_distance_threshold", self.plane_distance_threshold),
            ("surface_cluster_tolerance", self.surface_cluster_tolerance),
            ("prism_z_min", self.prism_z_min),
            ("prism_z_max", self.prism_z_max),
            ("object_cluster_tolerance", self.object_cluster_tolerance),
            ("viewpoint.x", self.viewpoint[0]),
            ("viewpoint.y", self.viewpoint[1]),
            ("viewpoint.z", self.viewpoint[2]),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidParameters(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        let positive = [
            ("downsample_leaf_size", self.downsample_leaf_size),
            ("plane_distance_threshold", self.plane_distance_threshold),
            ("surface_cluster_tolerance", self.surface_cluster_tolerance),
            ("object_cluster_tolerance", self.object_cluster_tolerance),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| *v <= 0.0) {
            return Err(Error::InvalidParameters(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }

        let ordered = [
            ("z_axis", self.z_axis_min, self.z_axis_max),
            ("prism_z", self.prism_z_min, self.prism_z_max),
            (
                "surface_cluster_size",
                self.surface_cluster_min_size as f32,
                self.surface_cluster_max_size as f32,
            ),
            (
                "object_cluster_size",
                self.object_cluster_min_size as f32,
                self.object_cluster_max_size as f32,
            ),
        ];
        if let Some((name, min, max)) = ordered.iter().find(|(_, min, max)| min > max) {
            return Err(Error::InvalidParameters(format!(
                "{} minimum {} exceeds maximum {}",
                name, min, max
            )));
        }

        if self.plane_max_iterations == 0 {
            return Err(Error::InvalidParameters(
                "plane_max_iterations must be at least 1".to_string(),
            ));
        }

        self.shape.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = PipelineParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.surface_cluster_min_size, 8000);
        assert_eq!(params.object_cluster_max_size, 25_000);
        assert_eq!(params.viewpoint(), Point3f::origin());
    }

    #[test]
    fn test_inverted_ranges_are_rejected() {
        let params = PipelineParameters {
            prism_z_min: 0.6,
            ..PipelineParameters::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidParameters(_))));

        let params = PipelineParameters {
            object_cluster_min_size: 30_000,
            ..PipelineParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_non_positive_and_non_finite_values_are_rejected() {
        let params = PipelineParameters {
            downsample_leaf_size: 0.0,
            ..PipelineParameters::default()
        };
        assert!(params.validate().is_err());

        let params = PipelineParameters {
            z_axis_max: f32::NAN,
            ..PipelineParameters::default()
        };
        assert!(params.validate().is_err());

        let params = PipelineParameters {
            plane_max_iterations: 0,
            ..PipelineParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let params: PipelineParameters =
            serde_json::from_str(r#"{ "prism_z_min": 0.01, "random_seed": 7, "shape": { "max_box_faces": 4 } }"#)
                .unwrap();

        assert_eq!(params.prism_z_min, 0.01);
        assert_eq!(params.random_seed, Some(7));
        assert_eq!(params.shape.max_box_faces, 4);
        assert_eq!(params.shape.max_iterations, ShapeDetectionConfig::default().max_iterations);
        assert_eq!(params.z_axis_max, 1.5);
    }

    #[test]
    fn test_serde_roundtrip() {
        let params = PipelineParameters {
            viewpoint: [0.1, 0.2, 0.3],
            random_seed: Some(99),
            ..PipelineParameters::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: PipelineParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
