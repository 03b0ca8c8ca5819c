//! Common types and traits for cuboid geometry.
//!
//! Items and box types share the same notion of a width × length × depth extent.
//! The traits here let the packing code treat both uniformly.

use std::cmp::Ordering;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for dimension, gap and weight comparisons throughout the packer.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Extent of a cuboid.
///
/// `width` and `length` span the horizontal plane, `depth` is the vertical axis
/// along which layers are stacked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dims {
    pub width: f64,
    pub length: f64,
    pub depth: f64,
}

impl Dims {
    #[inline]
    pub const fn new(width: f64, length: f64, depth: f64) -> Self {
        Self {
            width,
            length,
            depth,
        }
    }

    /// Creates from tuple format `(width, length, depth)`.
    #[inline]
    pub const fn from_tuple(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.width, self.length, self.depth)
    }

    /// Product of all three extents.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.width * self.length * self.depth
    }

    /// Horizontal extents ordered so that the first value is the smaller one.
    #[inline]
    pub fn normalized_footprint(&self) -> (f64, f64) {
        if self.width <= self.length {
            (self.width, self.length)
        } else {
            (self.length, self.width)
        }
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        [self.width, self.length, self.depth]
            .iter()
            .all(|v| *v > 0.0 && v.is_finite())
    }
}

impl From<(f64, f64, f64)> for Dims {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::from_tuple(tuple)
    }
}

impl From<Dims> for (f64, f64, f64) {
    #[inline]
    fn from(dims: Dims) -> Self {
        dims.as_tuple()
    }
}

/// Trait for objects with 3D dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Dims;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight.
    fn weight(&self) -> f64;
}

/// Compares two values with a tolerance.
pub fn compare_with_epsilon(a: f64, b: f64, eps: f64) -> Ordering {
    if (a - b).abs() <= eps {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
