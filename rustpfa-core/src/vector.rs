//! Three-vector type used for positions and directions.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cartesian three-vector (mm for positions, unitless for directions).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CartesianVector {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl CartesianVector {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared magnitude.
    #[inline]
    #[must_use]
    pub fn magnitude_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Magnitude.
    #[inline]
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.magnitude_squared().sqrt()
    }

    /// Dot product.
    #[inline]
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[inline]
    #[must_use]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in the same direction, or `None` for the zero vector.
    #[must_use]
    pub fn try_unit(&self) -> Option<Self> {
        let magnitude = self.magnitude();
        if magnitude > f32::EPSILON {
            Some(*self * (1.0 / magnitude))
        } else {
            None
        }
    }

    /// Unit vector in the same direction; the zero vector maps to itself.
    #[must_use]
    pub fn unit(&self) -> Self {
        self.try_unit().unwrap_or(Self::ZERO)
    }

    /// Cosine of the opening angle between two vectors (0 if either is zero).
    #[must_use]
    pub fn cos_opening_angle(&self, other: &Self) -> f32 {
        let denominator = (self.magnitude_squared() * other.magnitude_squared()).sqrt();
        if denominator > f32::EPSILON {
            (self.dot(other) / denominator).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Add for CartesianVector {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for CartesianVector {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for CartesianVector {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for CartesianVector {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for CartesianVector {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::iter::Sum for CartesianVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_products() {
        let a = CartesianVector::new(1.0, 0.0, 0.0);
        let b = CartesianVector::new(0.0, 1.0, 0.0);
        assert_relative_eq!(a.dot(&b), 0.0);
        assert_eq!(a.cross(&b), CartesianVector::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_unit_vector() {
        let v = CartesianVector::new(3.0, 4.0, 0.0);
        let unit = v.unit();
        assert_relative_eq!(unit.magnitude(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(unit.x, 0.6, epsilon = 1e-6);
        assert!(CartesianVector::ZERO.try_unit().is_none());
        assert_eq!(CartesianVector::ZERO.unit(), CartesianVector::ZERO);
    }

    #[test]
    fn test_cos_opening_angle() {
        let a = CartesianVector::new(1.0, 1.0, 0.0);
        let b = CartesianVector::new(2.0, 0.0, 0.0);
        assert_relative_eq!(a.cos_opening_angle(&b), std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_relative_eq!(a.cos_opening_angle(&CartesianVector::ZERO), 0.0);
    }
}
