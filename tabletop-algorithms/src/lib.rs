//! # Tabletop Algorithms
//!
//! Geometry algorithms used to pull objects off a support surface in a single
//! organized RGB-D frame.
//!
//! This crate provides point filtering with index provenance, RANSAC plane
//! fitting and Euclidean clustering, polygonal prism extraction and plane
//! projection, 3D convex hulls, normal estimation, primitive shape detection
//! and color analysis.

pub mod filtering;
pub mod nearest_neighbor;
pub mod segmentation;
pub mod prism;
pub mod hull;
pub mod normals;
pub mod shape;
pub mod color;

// Re-export commonly used items
pub use filtering::*;
pub use nearest_neighbor::*;
pub use segmentation::*;
pub use prism::*;
pub use hull::*;
pub use normals::*;
pub use shape::*;
pub use color::*;
