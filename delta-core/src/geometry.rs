//! 2-D geometry primitives.
//!
//! Cartesian points are plain [`glam::DVec2`] values (aliased as [`Point`]).
//! [`Polar`] is the radius/angle form used for growth steps, and
//! [`PointExt`] adds the fallible operations (normalization, angles) whose
//! zero-length case must surface as an error instead of a NaN.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{DeltaError, DeltaResult};

/// Cartesian 2-D point or vector.
pub type Point = DVec2;

/// Absolute tolerance for point equality and zero-norm detection.
pub const EPS: f64 = 1e-10;

/// A vector in polar form: radius `r` and angle `phi` (radians, CCW from +x).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub r: f64,
    pub phi: f64,
}

impl Polar {
    pub fn new(r: f64, phi: f64) -> Self {
        Self { r, phi }
    }

    /// Converts a Cartesian vector to polar form.
    ///
    /// ### Errors
    /// [`DeltaError::ZeroLength`] if `p` has (near) zero norm, since its
    /// angle is undefined.
    pub fn from_point(p: Point) -> DeltaResult<Self> {
        Ok(Self {
            r: p.length(),
            phi: p.heading()?,
        })
    }

    /// Cartesian form `(r cos phi, r sin phi)`.
    #[inline]
    pub fn to_point(self) -> Point {
        Point::new(self.r * self.phi.cos(), self.r * self.phi.sin())
    }
}

impl From<Polar> for Point {
    fn from(p: Polar) -> Self {
        p.to_point()
    }
}

/// Fallible vector operations on [`Point`].
pub trait PointExt: Sized {
    /// Returns the vector rotated counter-clockwise by `phi` radians.
    fn rotated(self, phi: f64) -> Self;

    /// Returns the unit vector in the same direction.
    fn unit(self) -> DeltaResult<Self>;

    /// Angle of the vector in `(-pi, pi]`.
    fn heading(self) -> DeltaResult<f64>;

    /// Signed angle from `self` to `other` in `(-pi, pi]`. Positive means
    /// `other` lies counter-clockwise of `self`.
    fn turn_to(self, other: Self) -> DeltaResult<f64>;

    /// Component-wise equality within [`EPS`].
    fn approx_eq(self, other: Self) -> bool;
}

impl PointExt for Point {
    #[inline]
    fn rotated(self, phi: f64) -> Self {
        let (s, c) = phi.sin_cos();
        Point::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    fn unit(self) -> DeltaResult<Self> {
        let n = self.length();
        if n < EPS {
            return Err(DeltaError::ZeroLength("normalize"));
        }
        Ok(self / n)
    }

    fn heading(self) -> DeltaResult<f64> {
        if self.length() < EPS {
            return Err(DeltaError::ZeroLength("angle"));
        }
        Ok(self.y.atan2(self.x))
    }

    fn turn_to(self, other: Self) -> DeltaResult<f64> {
        if self.length() < EPS || other.length() < EPS {
            return Err(DeltaError::ZeroLength("angle between"));
        }
        Ok(self.perp_dot(other).atan2(self.dot(other)))
    }

    #[inline]
    fn approx_eq(self, other: Self) -> bool {
        self.abs_diff_eq(other, EPS)
    }
}
