//! 3x4 affine transform: a 3x3 rotation sub-matrix plus a translation
//!
//! The bottom row of the equivalent 4x4 matrix is always `0 0 0 1`. The
//! rotation part is nominally orthonormal; blend intermediates may
//! transiently violate that and are renormalized before use as a rigid
//! pose (see [`Transform::orthonormalize`] and [`crate::math::Quat`]).

use glam::{Mat3, Vec3};

use super::quat::Quat;

/// Tolerance for the orthonormality check
const ORTHONORMAL_TOLERANCE: f32 = 1.0e-3;

/// Rigid (rotation + translation) affine transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation sub-matrix, nominally orthonormal
    pub rotation: Mat3,
    /// Translation vector
    pub translation: Vec3,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        rotation: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Build from a rotation quaternion and a translation
    ///
    /// The quaternion is normalized during conversion, so non-unit blend
    /// intermediates are safe to pass here.
    pub fn from_rotation_translation(rotation: &Quat, translation: Vec3) -> Self {
        Self {
            rotation: rotation.to_matrix(),
            translation,
        }
    }

    /// Pure translation transform
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            translation,
        }
    }

    /// Rotation by `angle` radians around the X axis
    pub fn from_rotation_x(angle: f32) -> Self {
        Self {
            rotation: Mat3::from_rotation_x(angle),
            translation: Vec3::ZERO,
        }
    }

    /// Rotation by `angle` radians around the Y axis
    pub fn from_rotation_y(angle: f32) -> Self {
        Self {
            rotation: Mat3::from_rotation_y(angle),
            translation: Vec3::ZERO,
        }
    }

    /// Rotation by `angle` radians around the Z axis
    pub fn from_rotation_z(angle: f32) -> Self {
        Self {
            rotation: Mat3::from_rotation_z(angle),
            translation: Vec3::ZERO,
        }
    }

    /// Split into a rotation quaternion and a translation
    ///
    /// The extracted quaternion is unit-length even if the rotation part
    /// carries slight numeric drift.
    pub fn decompose(&self) -> (Quat, Vec3) {
        (Quat::from_matrix(&self.rotation), self.translation)
    }

    /// Check that no component is NaN
    pub fn is_valid(&self) -> bool {
        let m = &self.rotation;
        !(m.x_axis.is_nan() || m.y_axis.is_nan() || m.z_axis.is_nan() || self.translation.is_nan())
    }

    /// Check that the rotation part is orthonormal within tolerance
    ///
    /// Does not check for right-handed convention.
    pub fn is_orthonormal(&self) -> bool {
        let x = self.rotation.x_axis;
        let y = self.rotation.y_axis;
        let z = self.rotation.z_axis;
        (x.length_squared() - 1.0).abs() < ORTHONORMAL_TOLERANCE
            && (y.length_squared() - 1.0).abs() < ORTHONORMAL_TOLERANCE
            && (z.length_squared() - 1.0).abs() < ORTHONORMAL_TOLERANCE
            && x.dot(y).abs() < ORTHONORMAL_TOLERANCE
            && y.dot(z).abs() < ORTHONORMAL_TOLERANCE
            && z.dot(x).abs() < ORTHONORMAL_TOLERANCE
    }

    /// Remove scaling and shear from a nearly-orthogonal rotation part,
    /// producing a right-handed orthonormal basis
    pub fn orthonormalize(&mut self) {
        let x = self.rotation.x_axis.normalize_or(Vec3::X);
        let z = x.cross(self.rotation.y_axis).normalize_or(Vec3::Z);
        let y = z.cross(x);
        self.rotation = Mat3::from_cols(x, y, z);
    }

    /// Composition `self ∘ other`: apply `other` first, then `self`
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a point (rotation plus translation)
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    /// Rotate a direction vector (no translation)
    pub fn rotate_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    /// Invert by transposing the rotation part
    ///
    /// Valid only when the rotation part is orthonormal, where the
    /// transpose equals the inverse.
    pub fn inverse_orthonormal(&self) -> Self {
        let rt = self.rotation.transpose();
        Self {
            rotation: rt,
            translation: -(rt * self.translation),
        }
    }

    /// Build a rotation from Euler angles: rotate by `angles.z` around Z,
    /// then by `angles.y` around the new Y, then by `angles.x` around the
    /// newest X
    pub fn from_euler_angles(angles: Vec3) -> Self {
        Self {
            rotation: Mat3::from_rotation_z(angles.z)
                * Mat3::from_rotation_y(angles.y)
                * Mat3::from_rotation_x(angles.x),
            translation: Vec3::ZERO,
        }
    }

    /// Extract Euler angles in the convention of
    /// [`Transform::from_euler_angles`]
    pub fn euler_angles(&self) -> Vec3 {
        let m = &self.rotation;
        let sy = -m.x_axis.z;
        let y = sy.clamp(-1.0, 1.0).asin();
        if sy.abs() < 0.99999 {
            Vec3::new(
                m.y_axis.z.atan2(m.z_axis.z),
                y,
                m.x_axis.y.atan2(m.x_axis.x),
            )
        } else {
            // Gimbal lock: fold the Z rotation into X
            Vec3::new((-m.z_axis.y).atan2(m.y_axis.y), y, 0.0)
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Self) -> Self::Output {
        Transform::mul(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform_point() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Transform::IDENTITY.transform_point(p), p);
    }

    #[test]
    fn test_translation_composition() {
        let a = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let c = a.mul(&b);
        let p = c.transform_point(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1.0e-6);
    }

    #[test]
    fn test_rotation_then_translation_order() {
        // self ∘ other applies other first
        let rot = Transform::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let trans = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let m = trans.mul(&rot);
        // X rotated to Y, then shifted by (1,0,0)
        let p = m.transform_point(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_inverse_orthonormal_round_trip() {
        let q = Quat::from_axis_angle(Vec3::new(0.3, 1.0, -0.4), 0.9);
        let t = Transform::from_rotation_translation(&q, Vec3::new(5.0, -2.0, 1.0));
        let p = Vec3::new(3.0, 4.0, 5.0);
        let back = t.inverse_orthonormal().transform_point(t.transform_point(p));
        assert!((back - p).length() < 1.0e-4);
    }

    #[test]
    fn test_is_orthonormal() {
        assert!(Transform::IDENTITY.is_orthonormal());
        let mut scaled = Transform::IDENTITY;
        scaled.rotation.x_axis *= 2.0;
        assert!(!scaled.is_orthonormal());
    }

    #[test]
    fn test_orthonormalize_restores_basis() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.7);
        let mut t = Transform::from_rotation_translation(&q, Vec3::ZERO);
        t.rotation.x_axis *= 1.5;
        t.rotation.y_axis *= 0.5;
        assert!(!t.is_orthonormal());
        t.orthonormalize();
        assert!(t.is_orthonormal());
    }

    #[test]
    fn test_euler_round_trip() {
        let angles = Vec3::new(0.3, -0.6, 1.1);
        let t = Transform::from_euler_angles(angles);
        let back = t.euler_angles();
        assert!((back - angles).length() < 1.0e-4);
    }

    #[test]
    fn test_decompose_recompose() {
        let q = Quat::from_axis_angle(Vec3::Z, 1.3);
        let t = Transform::from_rotation_translation(&q, Vec3::new(1.0, 2.0, 3.0));
        let (dq, dt) = t.decompose();
        let rebuilt = Transform::from_rotation_translation(&dq, dt);
        let p = Vec3::new(-2.0, 0.5, 4.0);
        assert!((rebuilt.transform_point(p) - t.transform_point(p)).length() < 1.0e-4);
    }
}
