//! Core data structures and traits for tabletop perception
//!
//! This crate provides the fundamental types shared by the segmentation
//! algorithms and the perception pipeline: points with color, generic point
//! clouds, organized (pixel grid) clouds and the index provenance records that
//! map filtered points back to their source pixels.

pub mod point;
pub mod point_cloud;
pub mod organized;
pub mod index_filter;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use organized::*;
pub use index_filter::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Vector4, Matrix3};

// Type aliases for easier imports
pub type Point = Point3f;
