//! The perception pipeline: frame in, published snapshot out

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, SeedableRng};
use tabletop_algorithms::{
    filter_range, largest_cluster, points_above, project_onto_plane, remove_invalid,
    segment_plane, voxel_grid_filter, Axis, HistogramScorer, PeakConcentration,
};
use tabletop_core::{Error, IndexChain, OrganizedCloud, Point3f, Result};
use tracing::{debug, info, warn};

use crate::{
    features::FeatureExtractor,
    footprint::{cluster_footprints, FootprintExtractor},
    params::PipelineParameters,
    store::{PerceptionSnapshot, ResultStore},
    timing::StageTimer,
};

/// What a successful run published
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Sequence number of the published snapshot
    pub sequence: u64,
    /// Number of objects in the published snapshot
    pub objects: usize,
    /// Footprints dropped because no points were found above them
    pub skipped: usize,
    /// Points in the support surface cluster
    pub support_surface_points: usize,
    /// Points inside the height band above the support plane
    pub objects_above_points: usize,
    /// Wall time of the run, from frame to publication
    pub elapsed: Duration,
}

/// Extracts the objects standing on the dominant plane of a frame.
///
/// Runs are synchronous and exclusive: a call to [`process`] while another
/// is in flight fails with [`Error::Busy`]. Parameters are copied at the
/// start of every run, so [`set_parameters`] never affects a run already in
/// progress. Failed runs leave the [`ResultStore`] untouched.
///
/// [`process`]: PerceptionPipeline::process
/// [`set_parameters`]: PerceptionPipeline::set_parameters
pub struct PerceptionPipeline {
    params: RwLock<PipelineParameters>,
    store: Arc<ResultStore>,
    in_flight: Mutex<()>,
    next_id: AtomicU64,
    scorer: Arc<dyn HistogramScorer>,
}

impl PerceptionPipeline {
    pub fn new(params: PipelineParameters) -> Result<Self> {
        Self::with_store(params, Arc::new(ResultStore::new()))
    }

    /// Create a pipeline publishing into an existing store.
    pub fn with_store(params: PipelineParameters, store: Arc<ResultStore>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params: RwLock::new(params),
            store,
            in_flight: Mutex::new(()),
            next_id: AtomicU64::new(0),
            scorer: Arc::new(PeakConcentration),
        })
    }

    /// Use `scorer` for the histogram quality of every object.
    pub fn with_scorer(mut self, scorer: Arc<dyn HistogramScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Validate and install a new parameter set for subsequent runs.
    pub fn set_parameters(&self, params: PipelineParameters) -> Result<()> {
        params.validate()?;
        info!("pipeline parameters: {:?}", params);
        *self.params.write() = params;
        Ok(())
    }

    pub fn parameters(&self) -> PipelineParameters {
        self.params.read().clone()
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<PerceptionSnapshot> {
        self.store.snapshot()
    }

    /// Run the pipeline on `frame` and publish the result.
    ///
    /// Errors abandon the run: [`Error::EmptyInput`] when a filtering stage
    /// leaves no points, [`Error::DegenerateSurface`] when no support plane
    /// satisfies the size bounds. A frame with nothing above the support
    /// surface is not an error and publishes zero objects.
    pub fn process(&self, frame: &OrganizedCloud) -> Result<RunSummary> {
        let _running = self.in_flight.try_lock().ok_or(Error::Busy)?;
        let params = self.parameters();

        let timer = StageTimer::start("perception run");
        let (snapshot, skipped) = match self.run(frame, &params) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("perception run abandoned: {}", e);
                return Err(e);
            }
        };

        let objects = snapshot.len();
        let support_surface_points = snapshot.support_surface.len();
        let objects_above_points = snapshot.objects_above.len();
        let sequence = self.store.publish(snapshot);
        info!("published {} objects as snapshot {}", objects, sequence);

        Ok(RunSummary {
            sequence,
            objects,
            skipped,
            support_surface_points,
            objects_above_points,
            elapsed: timer.finish(),
        })
    }

    fn run(
        &self,
        frame: &OrganizedCloud,
        params: &PipelineParameters,
    ) -> Result<(PerceptionSnapshot, usize)> {
        let mut rng = match params.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let viewpoint = params.viewpoint();

        // Preprocessing keeps a full resolution copy whose indices resolve to pixels
        let timer = StageTimer::start("filtering");
        let (valid, valid_filter) = remove_invalid(frame.cloud());
        if valid.is_empty() {
            return Err(Error::empty_input("remove_invalid"));
        }
        let (filtered, range_filter) =
            filter_range(&valid, Axis::Z, params.z_axis_min, params.z_axis_max)?;
        if filtered.is_empty() {
            return Err(Error::empty_input("filter_range"));
        }
        let mut chain = IndexChain::new();
        chain.push(valid_filter)?;
        chain.push(range_filter)?;

        let downsampled = voxel_grid_filter(&filtered, params.downsample_leaf_size)?;
        if downsampled.is_empty() {
            return Err(Error::empty_input("downsample"));
        }
        debug!(
            "{} of {} pixels valid, {} in range, {} after downsampling",
            valid.len(),
            frame.len(),
            filtered.len(),
            downsampled.len()
        );
        timer.finish();

        let timer = StageTimer::start("support surface");
        let positions = downsampled.positions();
        let fit = segment_plane(
            &positions,
            params.plane_distance_threshold,
            params.plane_max_iterations,
            &mut rng,
        )
        .map_err(|e| Error::DegenerateSurface(e.to_string()))?;
        info!("plane fit has {} inliers", fit.inliers.len());

        let surface = largest_cluster(
            &positions,
            &fit.inliers,
            params.surface_cluster_tolerance,
            params.surface_cluster_min_size,
            params.surface_cluster_max_size,
        )?;
        let plane = fit.model.oriented_towards(&viewpoint);
        let support_surface = downsampled.select(&surface);
        info!("support surface has {} points", support_surface.len());
        timer.finish();

        let timer = StageTimer::start("objects above surface");
        let (objects_above, above) = points_above(
            &downsampled,
            &support_surface.positions(),
            params.prism_z_min,
            params.prism_z_max,
            &viewpoint,
        )
        .map_err(|e| Error::DegenerateSurface(e.to_string()))?;
        info!("{} points above the support surface", objects_above.len());
        timer.finish();

        let mut snapshot = PerceptionSnapshot {
            sequence: 0,
            records: Vec::new(),
            support_surface,
            objects_above,
            plane: Some(plane),
        };
        if above.is_empty() {
            return Ok((snapshot, 0));
        }

        let timer = StageTimer::start("footprint clustering");
        let flattened = project_onto_plane(&downsampled, &above, &plane);
        let clusters = cluster_footprints(
            &flattened,
            params.object_cluster_tolerance,
            params.object_cluster_min_size,
            params.object_cluster_max_size,
        )?;
        info!("Found {} clusters", clusters.len());

        let extractor = FootprintExtractor::new(
            frame,
            &filtered,
            &chain,
            plane,
            params.prism_z_min,
            params.prism_z_max,
        );
        let mut candidates = Vec::with_capacity(clusters.len());
        let mut skipped = 0;
        for (i, cluster) in clusters.iter().enumerate() {
            let footprint: Vec<Point3f> = cluster.iter().map(|&j| flattened[j].position).collect();
            match extractor.extract(i, &footprint) {
                Ok(candidate) => {
                    info!("cluster {} has {} points", i, candidate.cloud.len());
                    candidates.push(candidate);
                }
                Err(e @ Error::DegenerateObject { .. }) => {
                    warn!("skipping object: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        timer.finish();

        let timer = StageTimer::start("feature extraction");
        let features =
            FeatureExtractor::new(params.shape.clone()).with_scorer(Arc::clone(&self.scorer));
        snapshot.records = candidates
            .into_iter()
            .map(|candidate| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                features.describe(id, candidate, &mut rng)
            })
            .collect();
        timer.finish();

        Ok((snapshot, skipped))
    }
}
