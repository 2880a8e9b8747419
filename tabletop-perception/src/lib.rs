//! # Tabletop Perception
//!
//! Finds the objects resting on the dominant plane of a single organized
//! RGB-D frame and describes each of them: centroid, hull volume, coarse
//! shape, average color, hue histogram and image region.
//!
//! A [`PerceptionPipeline`] runs the stages in order (filtering, support
//! surface fitting, prism extraction, footprint clustering, feature
//! extraction) and publishes the outcome into a [`ResultStore`], from which
//! any number of readers take consistent snapshots.
//!
//! ```rust,no_run
//! use tabletop_perception::{PerceptionPipeline, PipelineParameters, SyntheticScene};
//!
//! fn main() -> tabletop_core::Result<()> {
//!     let frame = SyntheticScene::default().render()?;
//!     let pipeline = PerceptionPipeline::new(PipelineParameters::default())?;
//!     pipeline.process(&frame)?;
//!     for object in pipeline.snapshot().objects() {
//!         println!("object {} at {:?}", object.id, object.centroid);
//!     }
//!     Ok(())
//! }
//! ```

pub mod params;
pub mod object;
pub mod footprint;
pub mod features;
pub mod store;
pub mod timing;
pub mod pipeline;
pub mod synthetic;

pub use params::*;
pub use object::*;
pub use footprint::*;
pub use features::*;
pub use store::*;
pub use timing::*;
pub use pipeline::*;
pub use synthetic::*;
