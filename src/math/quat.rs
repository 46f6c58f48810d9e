//! Quaternion algebra for rotation channels
//!
//! Rotations are unit quaternions `(w, x, y, z)`. The additive operations
//! (`add`, `sub`, `scale`) produce non-unit intermediates for blending and
//! must be normalized before the result is used as a rigid rotation.

use glam::{Mat3, Vec3};

use crate::error::{Error, Result};

/// Angle below which slerp falls back to normalized linear interpolation
const SLERP_EPSILON: f32 = 1.0e-4;

/// Tolerance for unit-magnitude and pure-quaternion domain checks
const DOMAIN_TOLERANCE: f32 = 1.0e-3;

/// Quaternion representation for rotations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new quaternion. Does not normalize.
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Create a unit quaternion rotating by `angle` radians around `axis`
    ///
    /// `axis` does not need to be normalized.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.length();
        if len < f32::EPSILON {
            return Self::IDENTITY;
        }
        let (s, c) = (angle * 0.5).sin_cos();
        let v = axis * (s / len);
        Self::new(c, v.x, v.y, v.z)
    }

    /// Extract the rotation axis and angle
    ///
    /// Returns `None` for the no-rotation quaternion, where the axis is
    /// undefined.
    pub fn to_axis_angle(&self) -> Option<(Vec3, f32)> {
        let v = Vec3::new(self.x, self.y, self.z);
        let s = v.length();
        if s < f32::EPSILON {
            return None;
        }
        let angle = 2.0 * s.atan2(self.w);
        Some((v / s, angle))
    }

    /// Check that no component is NaN
    pub fn is_valid(&self) -> bool {
        !(self.w.is_nan() || self.x.is_nan() || self.y.is_nan() || self.z.is_nan())
    }

    /// Dot product with another quaternion
    pub fn dot(&self, other: &Self) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Magnitude of the quaternion
    pub fn magnitude(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Check whether this is a unit quaternion
    pub fn is_unit(&self) -> bool {
        (self.dot(self) - 1.0).abs() < DOMAIN_TOLERANCE
    }

    /// Normalize to a unit quaternion, returning it with the original
    /// magnitude. A zero quaternion normalizes to identity.
    pub fn normalize(&self) -> (Self, f32) {
        let len = self.magnitude();
        if len <= f32::EPSILON {
            return (Self::IDENTITY, len);
        }
        let inv = 1.0 / len;
        (
            Self::new(self.w * inv, self.x * inv, self.y * inv, self.z * inv),
            len,
        )
    }

    /// Conjugate (negated vector part)
    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Multiplicative inverse. Equals the conjugate for unit quaternions.
    pub fn inverse(&self) -> Self {
        let mag2 = self.dot(self);
        if mag2 <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let inv = 1.0 / mag2;
        Self::new(
            self.w * inv,
            -self.x * inv,
            -self.y * inv,
            -self.z * inv,
        )
    }

    /// Hamilton product `self * other`
    ///
    /// Compound rotations apply right to left: `q2.mul(&q1)` rotates by
    /// `q1` first, then `q2`. Not commutative; renormalization is not
    /// automatic.
    pub fn mul(&self, other: &Self) -> Self {
        let (w1, x1, y1, z1) = (self.w, self.x, self.y, self.z);
        let (w2, x2, y2, z2) = (other.w, other.x, other.y, other.z);
        Self::new(
            w1 * w2 - x1 * x2 - y1 * y2 - z1 * z2,
            w1 * x2 + x1 * w2 + y1 * z2 - z1 * y2,
            w1 * y2 - x1 * z2 + y1 * w2 + z1 * x2,
            w1 * z2 + x1 * y2 - y1 * x2 + z1 * w2,
        )
    }

    /// Componentwise sum. Result is not generally a unit quaternion.
    pub fn add(&self, other: &Self) -> Self {
        Self::new(
            self.w + other.w,
            self.x + other.x,
            self.y + other.y,
            self.z + other.z,
        )
    }

    /// Componentwise difference. Result is not generally a unit quaternion.
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(
            self.w - other.w,
            self.x - other.x,
            self.y - other.y,
            self.z - other.z,
        )
    }

    /// Componentwise scale. Result is not generally a unit quaternion.
    pub fn scale(&self, s: f32) -> Self {
        Self::new(self.w * s, self.x * s, self.y * s, self.z * s)
    }

    /// Rotate a vector by this quaternion
    pub fn rotate_vec(&self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let uv = u.cross(v);
        v + (uv * self.w + u.cross(uv)) * 2.0
    }

    /// Build a unit quaternion from the rotation part of a matrix
    ///
    /// Round-trips with [`Quat::to_matrix`] within float tolerance for
    /// orthonormal inputs.
    pub fn from_matrix(m: &Mat3) -> Self {
        let m00 = m.x_axis.x;
        let m10 = m.x_axis.y;
        let m20 = m.x_axis.z;
        let m01 = m.y_axis.x;
        let m11 = m.y_axis.y;
        let m21 = m.y_axis.z;
        let m02 = m.z_axis.x;
        let m12 = m.z_axis.y;
        let m22 = m.z_axis.z;

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (m21 - m12) / s,
                (m02 - m20) / s,
                (m10 - m01) / s,
            )
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(
                (m21 - m12) / s,
                0.25 * s,
                (m01 + m10) / s,
                (m02 + m20) / s,
            )
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new(
                (m02 - m20) / s,
                (m01 + m10) / s,
                0.25 * s,
                (m12 + m21) / s,
            )
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new(
                (m10 - m01) / s,
                (m02 + m20) / s,
                (m12 + m21) / s,
                0.25 * s,
            )
        };
        q.normalize().0
    }

    /// Convert to an equivalent rotation matrix
    ///
    /// The quaternion is normalized first so non-unit blend intermediates
    /// never leak shear into a pose.
    pub fn to_matrix(&self) -> Mat3 {
        let (q, _) = self.normalize();
        let (w, x, y, z) = (q.w, q.x, q.y, q.z);

        let x2 = x + x;
        let y2 = y + y;
        let z2 = z + z;
        let xx = x * x2;
        let xy = x * y2;
        let xz = x * z2;
        let yy = y * y2;
        let yz = y * z2;
        let zz = z * z2;
        let wx = w * x2;
        let wy = w * y2;
        let wz = w * z2;

        Mat3::from_cols(
            Vec3::new(1.0 - (yy + zz), xy + wz, xz - wy),
            Vec3::new(xy - wz, 1.0 - (xx + zz), yz + wx),
            Vec3::new(xz + wy, yz - wx, 1.0 - (xx + yy)),
        )
    }

    /// Normalized linear interpolation, taking the shorter arc
    pub fn nlerp(&self, other: &Self, t: f32) -> Self {
        let other = if self.dot(other) < 0.0 {
            other.scale(-1.0)
        } else {
            *other
        };
        self.add(&other.sub(self).scale(t)).normalize().0
    }

    /// Spherical linear interpolation from `self` (t = 0) to `other` (t = 1)
    ///
    /// Always takes the shorter arc and always returns a quaternion with a
    /// non-negative scalar part. Falls back to normalized linear
    /// interpolation when the arc angle is below epsilon.
    pub fn slerp(&self, other: &Self, t: f32) -> Self {
        let mut dot = self.dot(other);
        let other = if dot < 0.0 {
            dot = -dot;
            other.scale(-1.0)
        } else {
            *other
        };

        let q = Self::slerp_aligned(self, &other, dot, t);
        if q.w < 0.0 { q.scale(-1.0) } else { q }
    }

    /// Spherical linear interpolation without the shortest-arc correction
    ///
    /// Used when continuity through the longer arc is intentional, e.g.
    /// multi-turn rotations authored as successive keys.
    pub fn slerp_not_shortest(&self, other: &Self, t: f32) -> Self {
        Self::slerp_aligned(self, other, self.dot(other), t)
    }

    fn slerp_aligned(q0: &Self, q1: &Self, dot: f32, t: f32) -> Self {
        let dot = dot.clamp(-1.0, 1.0);
        let theta = dot.acos();
        if theta.abs() < SLERP_EPSILON || theta.sin().abs() < SLERP_EPSILON {
            return q0.add(&q1.sub(q0).scale(t)).normalize().0;
        }
        let inv_sin = 1.0 / theta.sin();
        let s0 = ((1.0 - t) * theta).sin() * inv_sin;
        let s1 = (t * theta).sin() * inv_sin;
        q0.scale(s0).add(&q1.scale(s1))
    }

    /// Natural logarithm. Defined for unit quaternions only; the result is
    /// a pure quaternion (zero scalar part).
    pub fn ln(&self) -> Result<Self> {
        if !self.is_valid() || !self.is_unit() {
            return Err(Error::QuatDomain("ln requires a unit quaternion"));
        }
        Ok(self.ln_unit())
    }

    /// Exponential. Defined for pure quaternions only (zero scalar part);
    /// the result is a unit quaternion.
    pub fn exp(&self) -> Result<Self> {
        if !self.is_valid() || self.w.abs() >= DOMAIN_TOLERANCE {
            return Err(Error::QuatDomain("exp requires a pure quaternion"));
        }
        Ok(self.exp_pure())
    }

    fn ln_unit(&self) -> Self {
        let v = Vec3::new(self.x, self.y, self.z);
        let s = v.length();
        if s < f32::EPSILON {
            return Self::new(0.0, 0.0, 0.0, 0.0);
        }
        let theta = s.atan2(self.w);
        let v = v * (theta / s);
        Self::new(0.0, v.x, v.y, v.z)
    }

    fn exp_pure(&self) -> Self {
        let v = Vec3::new(self.x, self.y, self.z);
        let theta = v.length();
        if theta < f32::EPSILON {
            return Self::IDENTITY;
        }
        let v = v * (theta.sin() / theta);
        Self::new(theta.cos(), v.x, v.y, v.z)
    }

    /// Inner control point for spherical cubic interpolation
    ///
    /// For key `cur` flanked by `prev` and `next`:
    /// `a = cur * exp(-(ln(cur⁻¹·next) + ln(cur⁻¹·prev)) / 4)`.
    /// Inputs are normalized before use.
    pub fn squad_control(prev: &Self, cur: &Self, next: &Self) -> Self {
        let prev = prev.normalize().0;
        let cur = cur.normalize().0;
        let next = next.normalize().0;

        let inv = cur.conjugate();
        let ln_next = inv.mul(&next).normalize().0.ln_unit();
        let ln_prev = inv.mul(&prev).normalize().0.ln_unit();
        let arg = ln_next.add(&ln_prev).scale(-0.25);
        cur.mul(&arg.exp_pure())
    }

    /// Spherical cubic interpolation between `q0` and `q1` with inner
    /// control points `a0` and `a1` (see [`Quat::squad_control`])
    pub fn squad(q0: &Self, a0: &Self, a1: &Self, q1: &Self, t: f32) -> Self {
        let outer = q0.slerp_not_shortest(q1, t);
        let inner = a0.slerp_not_shortest(a1, t);
        outer.slerp_not_shortest(&inner, 2.0 * t * (1.0 - t))
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Self) -> Self::Output {
        Quat::mul(&self, &rhs)
    }
}
