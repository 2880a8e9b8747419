//! Result store shared between the pipeline and its readers

use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;
use tabletop_algorithms::PlaneModel;
use tabletop_core::ColoredPointCloud3f;

use crate::object::PerceivedObject;

/// One perceived object together with its artifacts
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub object: PerceivedObject,
    /// RGB crop of the object's ROI; pixels not belonging to the object are black
    pub image: RgbImage,
    /// Bar chart of the object's hue histogram
    pub histogram_image: RgbImage,
    /// Full-height 3D points of the object
    pub cloud: ColoredPointCloud3f,
    /// Index of every point of `cloud` in the organized frame
    pub source_indices: Vec<usize>,
}

/// Everything one completed run produced
#[derive(Debug, Clone, Default)]
pub struct PerceptionSnapshot {
    /// Number of publishes before and including this one, 0 for the initial empty snapshot
    pub sequence: u64,
    pub records: Vec<ObjectRecord>,
    pub support_surface: ColoredPointCloud3f,
    pub objects_above: ColoredPointCloud3f,
    pub plane: Option<PlaneModel>,
}

impl PerceptionSnapshot {
    pub fn objects(&self) -> impl Iterator<Item = &PerceivedObject> + '_ {
        self.records.iter().map(|r| &r.object)
    }

    pub fn images(&self) -> impl Iterator<Item = &RgbImage> + '_ {
        self.records.iter().map(|r| &r.image)
    }

    pub fn histograms(&self) -> impl Iterator<Item = &RgbImage> + '_ {
        self.records.iter().map(|r| &r.histogram_image)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Holds the last completed [`PerceptionSnapshot`].
///
/// Snapshots are immutable once published. `publish` swaps in a new one and
/// `snapshot` hands out a shared reference, so the lock is only held for a
/// pointer swap or clone.
#[derive(Debug, Default)]
pub struct ResultStore {
    slot: Mutex<Arc<PerceptionSnapshot>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot, stamping it with the next sequence number.
    ///
    /// Returns the sequence number assigned.
    pub fn publish(&self, mut snapshot: PerceptionSnapshot) -> u64 {
        let mut slot = self.slot.lock();
        snapshot.sequence = slot.sequence + 1;
        let sequence = snapshot.sequence;
        *slot = Arc::new(snapshot);
        sequence
    }

    pub fn snapshot(&self) -> Arc<PerceptionSnapshot> {
        self.slot.lock().clone()
    }

    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }
}
