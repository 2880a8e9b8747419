//! Per-object feature extraction

use std::sync::Arc;

use rand::Rng;
use tabletop_algorithms::{
    average_color, convex_hull, rgb_to_hsv, HistogramScorer, HueHistogram, PeakConcentration,
    ShapeDetectionConfig, ShapeDetector,
};
use tabletop_core::{unpack_rgb, ColoredPoint3f, Point3f, Vector3f};
use tracing::debug;

use crate::{footprint::ObjectCandidate, object::PerceivedObject, store::ObjectRecord};

/// Width of one bar of a rendered hue histogram, in pixels
pub const HISTOGRAM_BAR_WIDTH: u32 = 20;
/// Height of a rendered hue histogram, in pixels
pub const HISTOGRAM_HEIGHT: u32 = 100;

/// Turns recovered objects into [`PerceivedObject`] records
#[derive(Clone)]
pub struct FeatureExtractor {
    detector: ShapeDetector,
    scorer: Arc<dyn HistogramScorer>,
}

impl FeatureExtractor {
    pub fn new(shape: ShapeDetectionConfig) -> Self {
        Self {
            detector: ShapeDetector::new(shape),
            scorer: Arc::new(PeakConcentration),
        }
    }

    /// Replace the histogram quality score.
    pub fn with_scorer(mut self, scorer: Arc<dyn HistogramScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Compute the features of `candidate` and assign it `id`.
    ///
    /// The centroid is the mean of the convex hull's corner vertices, which
    /// weights the object's silhouette rather than its sampling density. For
    /// a flat or too small object it falls back to the mean of all points.
    pub fn describe<R: Rng + ?Sized>(
        &self,
        id: u64,
        candidate: ObjectCandidate,
        rng: &mut R,
    ) -> ObjectRecord {
        let points = &candidate.cloud.points;
        let positions = candidate.cloud.positions();

        let hull = convex_hull(&positions);
        let centroid = hull.centroid().unwrap_or_else(|| mean_position(points));

        let average = average_color(points);
        let histogram = HueHistogram::from_points(points);
        let quality = self.scorer.score(&histogram);
        let fit = self.detector.detect(&positions, rng);

        debug!(
            "object {} from cluster {}: {} points, volume {:.6}, {:?} ({:.2})",
            id,
            candidate.cluster,
            points.len(),
            hull.volume(),
            fit.shape,
            fit.inlier_ratio
        );

        ObjectRecord {
            object: PerceivedObject {
                id,
                centroid,
                volume: hull.volume(),
                area: hull.area(),
                shape: fit.shape,
                average_rgb: unpack_rgb(average),
                average_hsv: unpack_rgb(rgb_to_hsv(average)),
                hue_histogram: *histogram.bins(),
                histogram_quality: quality,
                roi: candidate.roi,
            },
            image: candidate.image,
            histogram_image: histogram.render(HISTOGRAM_BAR_WIDTH, HISTOGRAM_HEIGHT),
            cloud: candidate.cloud,
            source_indices: candidate.source_indices,
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ShapeDetectionConfig::default())
    }
}

fn mean_position(points: &[ColoredPoint3f]) -> Point3f {
    if points.is_empty() {
        return Point3f::origin();
    }
    let sum = points
        .iter()
        .fold(Vector3f::zeros(), |acc, p| acc + p.position.coords);
    Point3f::from(sum / points.len() as f32)
}
