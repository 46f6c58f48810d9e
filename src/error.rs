use std::io;
use thiserror::Error;

/// Error types for animation data construction, sampling, and serialization
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic tag at the start of a serialized object
    #[error("Invalid magic: expected '{expected}', got '{actual}'")]
    InvalidMagic { expected: String, actual: String },

    /// Serialized object carries a version this build cannot read
    #[error("Unsupported version {actual} (expected {expected})")]
    UnsupportedVersion { expected: u16, actual: u16 },

    /// Malformed serialized data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Interpolation mode not valid for the channel it was assigned to
    #[error("Interpolation {mode:?} is not valid for the {channel} channel")]
    InvalidInterpolation {
        mode: crate::path::Interpolation,
        channel: &'static str,
    },

    /// Index past the end of a keyframe, bone, or motion collection
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A path for this bone name already exists in the motion
    #[error("Motion already contains a path for bone '{0}'")]
    DuplicatePath(String),

    /// An event already exists at this time key
    #[error("Motion already contains an event at time {0}")]
    DuplicateEvent(f32),

    /// No event exists at the requested time key
    #[error("No event at time {0}")]
    NoSuchEvent(f32),

    /// A bone with this name already exists in the skeleton
    #[error("Skeleton already contains a bone named '{0}'")]
    DuplicateBone(String),

    /// The named bone does not exist in the skeleton
    #[error("No bone named '{0}' in skeleton")]
    NoSuchBone(String),

    /// Bone parent links form a cycle
    #[error("Bone hierarchy contains a cycle involving bone {0}")]
    CyclicHierarchy(usize),

    /// Quaternion operation called outside its domain
    #[error("Quaternion domain error: {0}")]
    QuatDomain(&'static str),

    /// Keyframe time offset would break channel time ordering
    #[error("Time offset would reorder keyframes at index {0}")]
    TimeOrdering(usize),

    /// Actor operation that requires a bound skeleton
    #[error("Actor has no skeleton bound")]
    NoSkeleton,
}

/// Result type using the crate error
pub type Result<T> = std::result::Result<T, Error>;
