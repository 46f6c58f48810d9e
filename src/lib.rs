//! Skeletal animation runtime: keyframe paths, motions, and posable actors
//!
//! The building blocks, bottom up:
//!
//! - [`math::Quat`] and [`math::Transform`] carry rotations and rigid
//!   transforms, with the spherical interpolation (slerp, squad) the
//!   samplers are built on
//! - [`Path`] is one bone's keyframe track, sampled at arbitrary times
//! - [`Motion`] names a set of paths after bones and adds an event
//!   timeline
//! - [`Skeleton`] describes the bone hierarchy (an external system owns
//!   geometry and skinning)
//! - [`Actor`] binds motions to a skeleton and produces world-space bone
//!   transforms, either directly (`set_pose`/`blend_pose`) or through
//!   the cue scheduler (`animation_cue`/`animation_step`)
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use marionette::{
//!     Actor, ActorDef, ChannelMask, Interpolation, Motion, Path, Skeleton, Transform,
//! };
//!
//! # fn main() -> marionette::Result<()> {
//! let mut skeleton = Skeleton::new();
//! skeleton.add_bone(None, "root", Transform::IDENTITY)?;
//!
//! let mut path = Path::new(Interpolation::Linear, Interpolation::Linear, false)?;
//! path.insert_keyframe(ChannelMask::ALL, 0.0, &Transform::IDENTITY)?;
//! path.insert_keyframe(
//!     ChannelMask::ALL,
//!     1.0,
//!     &Transform::from_translation(Vec3::new(4.0, 0.0, 0.0)),
//! )?;
//! let mut motion = Motion::new();
//! motion.add_path("root", path)?;
//!
//! let def = Arc::new(ActorDef::new(skeleton)?);
//! let mut actor = Actor::new(&def);
//! actor.animation_cue(Arc::new(motion), 1.0, 0.0, 0.0, 0.0, 1.0, None)?;
//! actor.animation_step(0.5)?;
//!
//! let root = actor.bone_transform(Some("root"))?;
//! assert!((root.transform_point(Vec3::ZERO).x - 2.0).abs() < 1e-4);
//! # Ok(())
//! # }
//! ```

pub mod actor;
mod cue;
pub mod error;
pub(crate) mod io_ext;
pub mod math;
pub mod motion;
pub mod path;
pub mod skeleton;

pub use actor::{Actor, ActorDef, BlendingType};
pub use error::{Error, Result};
pub use math::{Quat, Transform};
pub use motion::{Motion, MotionId};
pub use path::{Channel, ChannelMask, Interpolation, Path, SampleCursor, TIME_TOLERANCE};
pub use skeleton::{Bone, Skeleton};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
