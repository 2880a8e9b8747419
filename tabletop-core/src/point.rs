//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A point with color information
///
/// Depth sensors report invalid samples as non-finite coordinates, so a
/// `ColoredPoint3f` may legitimately hold `NaN` positions until it has been
/// through [`is_finite`](Self::is_finite) based filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct ColoredPoint3f {
    pub position: Point3f,
    pub color: [u8; 3],
}

/// A point with normal vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct NormalPoint3f {
    pub position: Point3f,
    pub normal: Vector3f,
}

impl ColoredPoint3f {
    pub fn new(x: f32, y: f32, z: f32, color: [u8; 3]) -> Self {
        Self {
            position: Point3f::new(x, y, z),
            color,
        }
    }

    /// An invalid (NaN) sample, as produced by a depth camera for pixels
    /// without a depth reading.
    pub fn invalid() -> Self {
        Self {
            position: Point3f::new(f32::NAN, f32::NAN, f32::NAN),
            color: [0, 0, 0],
        }
    }

    /// Whether all three coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.position.x.is_finite() && self.position.y.is_finite() && self.position.z.is_finite()
    }

    /// Color packed as `0x00RRGGBB`
    pub fn packed_rgb(&self) -> u32 {
        pack_rgb(self.color[0], self.color[1], self.color[2])
    }
}

/// Pack three 8 bit channels into `0x00AABBCC`.
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Unpack a `0x00AABBCC` value into its three 8 bit channels.
pub fn unpack_rgb(packed: u32) -> [u8; 3] {
    [
        ((packed >> 16) & 0xff) as u8,
        ((packed >> 8) & 0xff) as u8,
        (packed & 0xff) as u8,
    ]
}

impl Default for ColoredPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            color: [255, 255, 255],
        }
    }
}

impl Default for NormalPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: Vector3f::new(0.0, 0.0, 1.0),
        }
    }
}

impl From<ColoredPoint3f> for Point3f {
    fn from(point: ColoredPoint3f) -> Self {
        point.position
    }
}

impl From<NormalPoint3f> for Point3f {
    fn from(point: NormalPoint3f) -> Self {
        point.position
    }
}
