//! Vector, quaternion, and affine transform math

pub mod quat;
pub mod transform;

pub use quat::Quat;
pub use transform::Transform;
