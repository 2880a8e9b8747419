//! Object footprints: clustering of the flattened objects cloud and recovery
//! of each object's full-height points, pixels and image crop.

use image::{Rgb, RgbImage};
use itertools::Itertools;
use tabletop_algorithms::{euclidean_clusters, PlaneModel, PrismFootprint};
use tabletop_core::{
    ColoredPointCloud3f, Error, IndexChain, OrganizedCloud, Point3f, Result,
};
use tracing::debug;

use crate::object::Roi;

/// Split the flattened objects cloud into one cluster per object footprint.
///
/// Clusters come largest first. Touching objects end up in one cluster and a
/// sparsely sampled object may split into several; both are accepted as is.
pub fn cluster_footprints(
    footprints: &ColoredPointCloud3f,
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<Vec<usize>>> {
    euclidean_clusters(&footprints.positions(), tolerance, min_size, max_size)
}

/// One object recovered from a footprint, before feature extraction
#[derive(Debug, Clone)]
pub struct ObjectCandidate {
    /// Position of the footprint in the cluster list
    pub cluster: usize,
    /// Full-height points of the object
    pub cloud: ColoredPointCloud3f,
    /// Index of every point of `cloud` in the organized frame
    pub source_indices: Vec<usize>,
    pub roi: Roi,
    /// Colors of the object's pixels cropped to `roi`
    pub image: RgbImage,
}

/// Recovers objects above footprints from the preprocessed cloud.
///
/// `preprocessed` is the NaN-free, range-filtered cloud at full resolution
/// and `chain` maps its indices back to pixels of `frame`.
pub struct FootprintExtractor<'a> {
    frame: &'a OrganizedCloud,
    preprocessed: &'a ColoredPointCloud3f,
    positions: Vec<Point3f>,
    chain: &'a IndexChain,
    plane: PlaneModel,
    height_min: f32,
    height_max: f32,
}

impl<'a> FootprintExtractor<'a> {
    /// `plane` must be oriented so that objects lie on its positive side.
    pub fn new(
        frame: &'a OrganizedCloud,
        preprocessed: &'a ColoredPointCloud3f,
        chain: &'a IndexChain,
        plane: PlaneModel,
        height_min: f32,
        height_max: f32,
    ) -> Self {
        Self {
            frame,
            preprocessed,
            positions: preprocessed.positions(),
            chain,
            plane,
            height_min,
            height_max,
        }
    }

    /// Recover the object standing on `footprint`.
    ///
    /// Fails with [`Error::DegenerateObject`] when the footprint has no area
    /// or no point of the preprocessed cloud lies above it.
    pub fn extract(&self, cluster: usize, footprint: &[Point3f]) -> Result<ObjectCandidate> {
        let prism = PrismFootprint::with_plane(footprint, self.plane)
            .map_err(|_| Error::DegenerateObject { cluster })?;
        let selected = prism.select(&self.positions, self.height_min, self.height_max);
        if selected.is_empty() {
            return Err(Error::DegenerateObject { cluster });
        }

        let source_indices = selected
            .iter()
            .map(|&i| {
                self.chain.resolve_to_original(i).ok_or_else(|| {
                    Error::Algorithm(format!(
                        "point {} does not resolve to a pixel of the frame",
                        i
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let pixels = source_indices
            .iter()
            .map(|&i| {
                self.frame.pixel_of(i).ok_or_else(|| {
                    Error::Algorithm(format!(
                        "index {} is outside the {}x{} frame",
                        i,
                        self.frame.width(),
                        self.frame.height()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let roi = bounding_roi(&pixels).ok_or(Error::DegenerateObject { cluster })?;
        let image = crop(self.frame, &source_indices, &pixels, &roi);
        debug!(
            "cluster {} has {} points in {}x{} pixels at ({}, {})",
            cluster,
            selected.len(),
            roi.width,
            roi.height,
            roi.x,
            roi.y
        );

        Ok(ObjectCandidate {
            cluster,
            cloud: self.preprocessed.select(&selected),
            source_indices,
            roi,
            image,
        })
    }
}

/// Smallest ROI containing every `(row, column)` of `pixels`
pub fn bounding_roi(pixels: &[(usize, usize)]) -> Option<Roi> {
    let rows = pixels.iter().map(|&(row, _)| row).minmax().into_option()?;
    let columns = pixels.iter().map(|&(_, column)| column).minmax().into_option()?;
    Some(Roi::from_bounds(columns, rows))
}

fn crop(
    frame: &OrganizedCloud,
    indices: &[usize],
    pixels: &[(usize, usize)],
    roi: &Roi,
) -> RgbImage {
    let mut image = RgbImage::new(roi.width as u32, roi.height as u32);
    for (&index, &(row, column)) in indices.iter().zip(pixels) {
        if let Some(point) = frame.get(index) {
            image.put_pixel(
                (column - roi.x) as u32,
                (row - roi.y) as u32,
                Rgb(point.color),
            );
        }
    }
    image
}
