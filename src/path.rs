//! Time-indexed keyframe creation, maintenance, and sampling
//!
//! A [`Path`] is one bone's animation track: an ordered rotation channel
//! and an ordered translation channel, each with its own interpolation
//! mode, sharing a loop flag. Sampling at an arbitrary time produces a
//! single [`Transform`].

use std::io::{Read, Write};

use bitflags::bitflags;
use glam::Vec3;

use crate::error::{Error, Result};
use crate::io_ext::{ReadExt, WriteExt};
use crate::math::{Quat, Transform};

/// Keyframes closer together than this are considered the same time;
/// inserting at an existing time replaces the key in place
pub const TIME_TOLERANCE: f32 = 1.0e-4;

const PATH_MAGIC: &[u8; 4] = b"MPTH";
const PATH_VERSION: u16 = 1;

/// Sanity cap on per-channel key counts read from an image, so a
/// garbled count fails as a parse error instead of a huge allocation
const MAX_KEY_COUNT: usize = 1 << 20;

bitflags! {
    /// Selects which channels of a path an operation applies to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelMask: u8 {
        const ROTATION = 0b01;
        const TRANSLATION = 0b10;
        const ALL = 0b11;
    }
}

/// A single channel of a path, for single-channel queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Rotation,
    Translation,
}

/// Interpolation policy for one channel
///
/// `Slerp` and `Squad` apply to the rotation channel only; `Hermite` and
/// `HermiteZeroDeriv` to the translation channel only. `Linear` is valid
/// for both (normalized linear interpolation on rotations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Linear blend (normalized linear for rotations)
    Linear,
    /// Hermite cubic spline with finite-difference tangents
    Hermite,
    /// Spherical linear blend
    Slerp,
    /// Spherical cubic blend with G1 continuity across keys
    Squad,
    /// Hermite cubic with zero derivative at keyframes (easing curve)
    HermiteZeroDeriv,
}

impl Interpolation {
    fn valid_for_rotation(self) -> bool {
        matches!(self, Self::Linear | Self::Slerp | Self::Squad)
    }

    fn valid_for_translation(self) -> bool {
        matches!(self, Self::Linear | Self::Hermite | Self::HermiteZeroDeriv)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Linear => 0,
            Self::Hermite => 1,
            Self::Slerp => 2,
            Self::Squad => 3,
            Self::HermiteZeroDeriv => 7,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Linear),
            1 => Some(Self::Hermite),
            2 => Some(Self::Slerp),
            3 => Some(Self::Squad),
            7 => Some(Self::HermiteZeroDeriv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RotationKey {
    time: f32,
    rotation: Quat,
}

#[derive(Debug, Clone, Copy)]
struct TranslationKey {
    time: f32,
    translation: Vec3,
}

/// Caller-owned sampling hint for a single path
///
/// Sampling is usually called with monotonically increasing time; the
/// cursor remembers the last bracket per channel so the common case is a
/// constant-time neighbor check instead of a full search. The cursor
/// lives with the caller rather than inside the shared `Path`, so many
/// actors can sample one path concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCursor {
    rotation_hint: usize,
    translation_hint: usize,
}

/// One bone's time-keyed animation track (rotation + translation channels)
#[derive(Debug, Clone)]
pub struct Path {
    translation_interpolation: Interpolation,
    rotation_interpolation: Interpolation,
    looped: bool,
    rotation_keys: Vec<RotationKey>,
    translation_keys: Vec<TranslationKey>,
}

impl Path {
    /// Create an empty path
    ///
    /// A looping path should have the same first and last key values; a
    /// sample exactly at the loop boundary may resolve to either key.
    /// Fails when an interpolation mode is assigned to a channel it does
    /// not support.
    pub fn new(
        translation_interpolation: Interpolation,
        rotation_interpolation: Interpolation,
        looped: bool,
    ) -> Result<Self> {
        if !translation_interpolation.valid_for_translation() {
            return Err(Error::InvalidInterpolation {
                mode: translation_interpolation,
                channel: "translation",
            });
        }
        if !rotation_interpolation.valid_for_rotation() {
            return Err(Error::InvalidInterpolation {
                mode: rotation_interpolation,
                channel: "rotation",
            });
        }
        Ok(Self {
            translation_interpolation,
            rotation_interpolation,
            looped,
            rotation_keys: Vec::new(),
            translation_keys: Vec::new(),
        })
    }

    /// Interpolation mode of the translation channel
    pub fn translation_interpolation(&self) -> Interpolation {
        self.translation_interpolation
    }

    /// Interpolation mode of the rotation channel
    pub fn rotation_interpolation(&self) -> Interpolation {
        self.rotation_interpolation
    }

    /// Whether the end of the path connects back to its head
    pub fn is_looped(&self) -> bool {
        self.looped
    }

    /// Insert a keyframe at `time` into the selected channels
    ///
    /// The transform is decomposed into a rotation and a translation. A
    /// key within [`TIME_TOLERANCE`] of an existing key replaces it.
    pub fn insert_keyframe(
        &mut self,
        channels: ChannelMask,
        time: f32,
        transform: &Transform,
    ) -> Result<()> {
        let (rotation, translation) = transform.decompose();
        if channels.contains(ChannelMask::ROTATION) {
            match search_key_time(&self.rotation_keys, |k| k.time, time) {
                Ok(i) => self.rotation_keys[i] = RotationKey { time, rotation },
                Err(i) => self.rotation_keys.insert(i, RotationKey { time, rotation }),
            }
        }
        if channels.contains(ChannelMask::TRANSLATION) {
            match search_key_time(&self.translation_keys, |k| k.time, time) {
                Ok(i) => self.translation_keys[i] = TranslationKey { time, translation },
                Err(i) => self
                    .translation_keys
                    .insert(i, TranslationKey { time, translation }),
            }
        }
        Ok(())
    }

    /// Delete the nth keyframe of the selected channels
    pub fn delete_keyframe(&mut self, index: usize, channels: ChannelMask) -> Result<()> {
        if channels.contains(ChannelMask::ROTATION) && index >= self.rotation_keys.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.rotation_keys.len(),
            });
        }
        if channels.contains(ChannelMask::TRANSLATION) && index >= self.translation_keys.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.translation_keys.len(),
            });
        }
        if channels.contains(ChannelMask::ROTATION) {
            self.rotation_keys.remove(index);
        }
        if channels.contains(ChannelMask::TRANSLATION) {
            self.translation_keys.remove(index);
        }
        Ok(())
    }

    /// Number of keyframes in one channel
    pub fn keyframe_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Rotation => self.rotation_keys.len(),
            Channel::Translation => self.translation_keys.len(),
        }
    }

    /// Retrieve keyframe `index` of one channel as (time, transform)
    ///
    /// A rotation key yields a transform with zero translation; a
    /// translation key yields one with identity rotation.
    pub fn keyframe(&self, index: usize, channel: Channel) -> Result<(f32, Transform)> {
        match channel {
            Channel::Rotation => {
                let key = self.rotation_keys.get(index).ok_or(Error::IndexOutOfRange {
                    index,
                    len: self.rotation_keys.len(),
                })?;
                Ok((
                    key.time,
                    Transform::from_rotation_translation(&key.rotation, Vec3::ZERO),
                ))
            }
            Channel::Translation => {
                let key = self
                    .translation_keys
                    .get(index)
                    .ok_or(Error::IndexOutOfRange {
                        index,
                        len: self.translation_keys.len(),
                    })?;
                Ok((key.time, Transform::from_translation(key.translation)))
            }
        }
    }

    /// Index of the keyframe at `time` in one channel, if any
    pub fn keyframe_index(&self, channel: Channel, time: f32) -> Option<usize> {
        let result = match channel {
            Channel::Rotation => search_key_time(&self.rotation_keys, |k| k.time, time),
            Channel::Translation => search_key_time(&self.translation_keys, |k| k.time, time),
        };
        result.ok()
    }

    /// Slide all keyframes from `starting_index` onward by `offset`
    ///
    /// Fails without modifying the path when the slide would break the
    /// channel's time ordering.
    pub fn offset_times(
        &mut self,
        starting_index: usize,
        channels: ChannelMask,
        offset: f32,
    ) -> Result<()> {
        if channels.contains(ChannelMask::ROTATION) {
            check_offset(&self.rotation_keys, |k| k.time, starting_index, offset)?;
        }
        if channels.contains(ChannelMask::TRANSLATION) {
            check_offset(&self.translation_keys, |k| k.time, starting_index, offset)?;
        }
        if channels.contains(ChannelMask::ROTATION) {
            for key in self.rotation_keys.iter_mut().skip(starting_index) {
                key.time += offset;
            }
        }
        if channels.contains(ChannelMask::TRANSLATION) {
            for key in self.translation_keys.iter_mut().skip(starting_index) {
                key.time += offset;
            }
        }
        Ok(())
    }

    /// Times of the first and last keys across both channels, ignoring
    /// looping. `None` when the path has no keys at all.
    pub fn time_extents(&self) -> Option<(f32, f32)> {
        let rot = self
            .rotation_keys
            .first()
            .map(|k| (k.time, self.rotation_keys[self.rotation_keys.len() - 1].time));
        let trans = self.translation_keys.first().map(|k| {
            (
                k.time,
                self.translation_keys[self.translation_keys.len() - 1].time,
            )
        });
        match (rot, trans) {
            (Some((s0, e0)), Some((s1, e1))) => Some((s0.min(s1), e0.max(e1))),
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => None,
        }
    }

    /// Sample the path at `time` with a throwaway cursor
    pub fn sample(&self, time: f32) -> Transform {
        let mut cursor = SampleCursor::default();
        self.sample_with_cursor(time, &mut cursor)
    }

    /// Sample the path at `time`, producing a transform
    ///
    /// The cursor caches each channel's last bracket so monotonic
    /// sampling is amortized constant time. An empty channel contributes
    /// identity rotation or zero translation; a single-key channel always
    /// returns that key's value.
    pub fn sample_with_cursor(&self, time: f32, cursor: &mut SampleCursor) -> Transform {
        let (rotation, translation) = self.sample_channels(time, cursor);
        Transform::from_rotation_translation(&rotation, translation)
    }

    /// Sample the rotation and translation channels independently
    pub fn sample_channels(&self, time: f32, cursor: &mut SampleCursor) -> (Quat, Vec3) {
        (
            self.sample_rotation(time, &mut cursor.rotation_hint),
            self.sample_translation(time, &mut cursor.translation_hint),
        )
    }

    fn sample_rotation(&self, time: f32, hint: &mut usize) -> Quat {
        let keys = &self.rotation_keys;
        match keys.len() {
            0 => return Quat::IDENTITY,
            1 => return keys[0].rotation,
            _ => {}
        }
        let first = keys[0].time;
        let last = keys[keys.len() - 1].time;
        let time = wrap_time(time, first, last, self.looped);
        if time <= first {
            return keys[0].rotation;
        }
        if time >= last {
            return keys[keys.len() - 1].rotation;
        }

        let i = bracket_index(keys.len(), |j| keys[j].time, time, hint);
        let k0 = &keys[i];
        let k1 = &keys[i + 1];
        let t = bracket_param(k0.time, k1.time, time);

        match self.rotation_interpolation {
            Interpolation::Linear => k0.rotation.nlerp(&k1.rotation, t),
            Interpolation::Slerp => k0.rotation.slerp(&k1.rotation, t),
            Interpolation::Squad => {
                let prev = self.rotation_neighbor(i, -1);
                let next = self.rotation_neighbor(i + 1, 1);
                let a0 = Quat::squad_control(&prev, &k0.rotation, &k1.rotation);
                let a1 = Quat::squad_control(&k0.rotation, &k1.rotation, &next);
                Quat::squad(&k0.rotation, &a0, &a1, &k1.rotation, t)
            }
            // Constructor rejects translation-only modes for this channel
            _ => k0.rotation.slerp(&k1.rotation, t),
        }
    }

    /// Neighboring rotation key for spline continuity, loop-aware
    ///
    /// For looped paths the last key and first key are coincident, so the
    /// wrap skips over the duplicated endpoint.
    fn rotation_neighbor(&self, index: usize, step: isize) -> Quat {
        let keys = &self.rotation_keys;
        let len = keys.len() as isize;
        let i = index as isize + step;
        let i = if self.looped && len > 2 {
            i.rem_euclid(len - 1)
        } else {
            i.clamp(0, len - 1)
        };
        keys[i as usize].rotation
    }

    fn sample_translation(&self, time: f32, hint: &mut usize) -> Vec3 {
        let keys = &self.translation_keys;
        match keys.len() {
            0 => return Vec3::ZERO,
            1 => return keys[0].translation,
            _ => {}
        }
        let first = keys[0].time;
        let last = keys[keys.len() - 1].time;
        let time = wrap_time(time, first, last, self.looped);
        if time <= first {
            return keys[0].translation;
        }
        if time >= last {
            return keys[keys.len() - 1].translation;
        }

        let i = bracket_index(keys.len(), |j| keys[j].time, time, hint);
        let k0 = &keys[i];
        let k1 = &keys[i + 1];
        let t = bracket_param(k0.time, k1.time, time);

        match self.translation_interpolation {
            Interpolation::Linear => k0.translation.lerp(k1.translation, t),
            Interpolation::Hermite => {
                let (m0, m1) = self.translation_tangents(i);
                hermite(k0.translation, m0, k1.translation, m1, k1.time - k0.time, t)
            }
            Interpolation::HermiteZeroDeriv => {
                // Zero tangents reduce the cubic to a smoothstep blend
                let s = t * t * (3.0 - 2.0 * t);
                k0.translation.lerp(k1.translation, s)
            }
            // Constructor rejects rotation-only modes for this channel
            _ => k0.translation.lerp(k1.translation, t),
        }
    }

    /// Finite-difference tangents for the bracket starting at `i`,
    /// loop-aware like [`Path::rotation_neighbor`]
    fn translation_tangents(&self, i: usize) -> (Vec3, Vec3) {
        let keys = &self.translation_keys;
        let len = keys.len() as isize;
        let at = |j: isize| -> (f32, Vec3) {
            let wrapped = if self.looped && len > 2 {
                j.rem_euclid(len - 1)
            } else {
                j.clamp(0, len - 1)
            } as usize;
            // Unwrap time so a wrapped neighbor keeps a sensible delta
            let duration = keys[len as usize - 1].time - keys[0].time;
            let mut time = keys[wrapped].time;
            if self.looped && len > 2 {
                if j < 0 {
                    time -= duration;
                } else if j > len - 1 {
                    time += duration;
                }
            }
            (time, keys[wrapped].translation)
        };

        let tangent = |j: isize| -> Vec3 {
            let (t_prev, p_prev) = at(j - 1);
            let (t_next, p_next) = at(j + 1);
            let dt = t_next - t_prev;
            if dt.abs() < f32::EPSILON {
                Vec3::ZERO
            } else {
                (p_next - p_prev) / dt
            }
        };
        (tangent(i as isize), tangent(i as isize + 1))
    }

    /// Write a binary image of this path
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(PATH_MAGIC)?;
        writer.write_u16_le(PATH_VERSION)?;
        writer.write_u8(u8::from(self.looped))?;
        writer.write_u8(self.rotation_interpolation.to_u8())?;
        writer.write_u8(self.translation_interpolation.to_u8())?;
        writer.write_u32_le(self.rotation_keys.len() as u32)?;
        for key in &self.rotation_keys {
            writer.write_f32_le(key.time)?;
            writer.write_f32_le(key.rotation.w)?;
            writer.write_f32_le(key.rotation.x)?;
            writer.write_f32_le(key.rotation.y)?;
            writer.write_f32_le(key.rotation.z)?;
        }
        writer.write_u32_le(self.translation_keys.len() as u32)?;
        for key in &self.translation_keys {
            writer.write_f32_le(key.time)?;
            writer.write_f32_le(key.translation.x)?;
            writer.write_f32_le(key.translation.y)?;
            writer.write_f32_le(key.translation.z)?;
        }
        Ok(())
    }

    /// Read a binary image written by [`Path::write_to`]
    ///
    /// A wrong magic tag or version is fatal for this object only.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != PATH_MAGIC {
            return Err(Error::InvalidMagic {
                expected: String::from_utf8_lossy(PATH_MAGIC).into_owned(),
                actual: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let version = reader.read_u16_le()?;
        if version != PATH_VERSION {
            return Err(Error::UnsupportedVersion {
                expected: PATH_VERSION,
                actual: version,
            });
        }
        let looped = reader.read_u8()? != 0;
        let rotation_interpolation = Interpolation::from_u8(reader.read_u8()?)
            .ok_or_else(|| Error::Parse("unknown rotation interpolation mode".into()))?;
        let translation_interpolation = Interpolation::from_u8(reader.read_u8()?)
            .ok_or_else(|| Error::Parse("unknown translation interpolation mode".into()))?;
        let mut path = Self::new(translation_interpolation, rotation_interpolation, looped)?;

        let rotation_count = reader.read_u32_le()? as usize;
        if rotation_count > MAX_KEY_COUNT {
            return Err(Error::Parse(format!(
                "rotation key count {rotation_count} out of range"
            )));
        }
        path.rotation_keys.reserve(rotation_count);
        for _ in 0..rotation_count {
            let time = reader.read_f32_le()?;
            let w = reader.read_f32_le()?;
            let x = reader.read_f32_le()?;
            let y = reader.read_f32_le()?;
            let z = reader.read_f32_le()?;
            if let Some(prev) = path.rotation_keys.last() {
                if time < prev.time {
                    return Err(Error::Parse("rotation keys out of time order".into()));
                }
            }
            path.rotation_keys.push(RotationKey {
                time,
                rotation: Quat::new(w, x, y, z),
            });
        }

        let translation_count = reader.read_u32_le()? as usize;
        if translation_count > MAX_KEY_COUNT {
            return Err(Error::Parse(format!(
                "translation key count {translation_count} out of range"
            )));
        }
        path.translation_keys.reserve(translation_count);
        for _ in 0..translation_count {
            let time = reader.read_f32_le()?;
            let x = reader.read_f32_le()?;
            let y = reader.read_f32_le()?;
            let z = reader.read_f32_le()?;
            if let Some(prev) = path.translation_keys.last() {
                if time < prev.time {
                    return Err(Error::Parse("translation keys out of time order".into()));
                }
            }
            path.translation_keys.push(TranslationKey {
                time,
                translation: Vec3::new(x, y, z),
            });
        }
        Ok(path)
    }
}

/// Find a key with a matching time (within tolerance) or the sorted
/// insertion point: `Ok(index)` on a match, `Err(index)` otherwise
fn search_key_time<K>(keys: &[K], time_of: impl Fn(&K) -> f32, time: f32) -> std::result::Result<usize, usize> {
    let mut low = 0;
    let mut high = keys.len();
    while low < high {
        let mid = (low + high) / 2;
        let t = time_of(&keys[mid]);
        if (t - time).abs() < TIME_TOLERANCE {
            return Ok(mid);
        }
        if t < time {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    Err(low)
}

fn check_offset<K>(
    keys: &[K],
    time_of: impl Fn(&K) -> f32,
    starting_index: usize,
    offset: f32,
) -> Result<()> {
    if starting_index > 0 && starting_index < keys.len() && offset < 0.0 {
        let prev = time_of(&keys[starting_index - 1]);
        let moved = time_of(&keys[starting_index]) + offset;
        if moved < prev {
            return Err(Error::TimeOrdering(starting_index));
        }
    }
    Ok(())
}

/// Wrap `time` into the track's span for looped paths
fn wrap_time(time: f32, first: f32, last: f32, looped: bool) -> f32 {
    let duration = last - first;
    if !looped || duration <= 0.0 {
        return time;
    }
    first + (time - first).rem_euclid(duration)
}

/// Interpolation parameter within a bracket, guarded against zero width
fn bracket_param(t0: f32, t1: f32, time: f32) -> f32 {
    let dt = t1 - t0;
    if dt <= f32::EPSILON {
        0.0
    } else {
        ((time - t0) / dt).clamp(0.0, 1.0)
    }
}

/// Find `i` such that `time_of(i) <= time < time_of(i + 1)`
///
/// Checks the hinted bracket and its neighbors first, then falls back to
/// binary search. The caller guarantees `len >= 2` and `time` strictly
/// inside the track span.
fn bracket_index(len: usize, time_of: impl Fn(usize) -> f32, time: f32, hint: &mut usize) -> usize {
    let max = len - 2;
    let h = (*hint).min(max);
    for candidate in [h, h + 1, h.saturating_sub(1)] {
        if candidate <= max && time_of(candidate) <= time && time < time_of(candidate + 1) {
            *hint = candidate;
            return candidate;
        }
    }

    // Binary search: largest i with time_of(i) <= time
    let mut low = 0;
    let mut high = max;
    while low < high {
        let mid = (low + high).div_ceil(2);
        if time_of(mid) <= time {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    *hint = low;
    low
}

/// Cubic Hermite over a bracket of width `dt` at parameter `t`
fn hermite(p0: Vec3, m0: Vec3, p1: Vec3, m1: Vec3, dt: f32, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    p0 * h00 + m0 * (h10 * dt) + p1 * h01 + m1 * (h11 * dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation_path(interp: Interpolation, looped: bool, keys: &[(f32, Vec3)]) -> Path {
        let mut path = Path::new(interp, Interpolation::Linear, looped).unwrap();
        for (time, v) in keys {
            path.insert_keyframe(
                ChannelMask::TRANSLATION,
                *time,
                &Transform::from_translation(*v),
            )
            .unwrap();
        }
        path
    }

    fn rotation_path(interp: Interpolation, looped: bool, keys: &[(f32, Quat)]) -> Path {
        let mut path = Path::new(Interpolation::Linear, interp, looped).unwrap();
        for (time, q) in keys {
            path.insert_keyframe(
                ChannelMask::ROTATION,
                *time,
                &Transform::from_rotation_translation(q, Vec3::ZERO),
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn test_new_rejects_channel_mismatch() {
        assert!(Path::new(Interpolation::Slerp, Interpolation::Linear, false).is_err());
        assert!(Path::new(Interpolation::Linear, Interpolation::Hermite, false).is_err());
        assert!(Path::new(Interpolation::Hermite, Interpolation::Squad, false).is_ok());
    }

    #[test]
    fn test_empty_path_samples_identity() {
        let path = Path::new(Interpolation::Linear, Interpolation::Linear, false).unwrap();
        let t = path.sample(3.0);
        assert!((t.transform_point(Vec3::ZERO)).length() < 1.0e-6);
        assert!(t.is_orthonormal());
    }

    #[test]
    fn test_single_key_always_returned() {
        let path = translation_path(
            Interpolation::Linear,
            false,
            &[(1.0, Vec3::new(2.0, 0.0, 0.0))],
        );
        for time in [-5.0, 0.0, 1.0, 99.0] {
            let p = path.sample(time).transform_point(Vec3::ZERO);
            assert!((p.x - 2.0).abs() < 1.0e-6);
        }
    }

    #[test]
    fn test_linear_translation_sampling() {
        let path = translation_path(
            Interpolation::Linear,
            false,
            &[(0.0, Vec3::ZERO), (1.0, Vec3::new(10.0, 0.0, 0.0))],
        );
        let p = path.sample(0.5).transform_point(Vec3::ZERO);
        assert!((p.x - 5.0).abs() < 1.0e-5);

        // Clamp on both ends
        assert!(path.sample(-1.0).transform_point(Vec3::ZERO).x.abs() < 1.0e-6);
        assert!((path.sample(2.0).transform_point(Vec3::ZERO).x - 10.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_exact_keyframe_times() {
        let keys = [
            (0.0, Vec3::new(0.0, 0.0, 0.0)),
            (1.0, Vec3::new(3.0, 1.0, 0.0)),
            (2.5, Vec3::new(-2.0, 4.0, 1.0)),
        ];
        let path = translation_path(Interpolation::Hermite, false, &keys);
        for (time, v) in keys {
            let p = path.sample(time).transform_point(Vec3::ZERO);
            assert!((p - v).length() < 1.0e-5, "mismatch at t={time}");
        }
    }

    #[test]
    fn test_replace_at_same_time() {
        let mut path = translation_path(
            Interpolation::Linear,
            false,
            &[(0.0, Vec3::ZERO), (1.0, Vec3::X)],
        );
        path.insert_keyframe(
            ChannelMask::TRANSLATION,
            1.0,
            &Transform::from_translation(Vec3::new(7.0, 0.0, 0.0)),
        )
        .unwrap();
        assert_eq!(path.keyframe_count(Channel::Translation), 2);
        let p = path.sample(1.0).transform_point(Vec3::ZERO);
        assert!((p.x - 7.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_delete_keyframe_out_of_range() {
        let mut path = translation_path(Interpolation::Linear, false, &[(0.0, Vec3::ZERO)]);
        assert!(path.delete_keyframe(3, ChannelMask::TRANSLATION).is_err());
        assert!(path.delete_keyframe(0, ChannelMask::TRANSLATION).is_ok());
        assert_eq!(path.keyframe_count(Channel::Translation), 0);
    }

    #[test]
    fn test_time_extents() {
        let mut path = Path::new(Interpolation::Linear, Interpolation::Linear, false).unwrap();
        assert!(path.time_extents().is_none());

        path.insert_keyframe(ChannelMask::TRANSLATION, 1.0, &Transform::IDENTITY)
            .unwrap();
        path.insert_keyframe(ChannelMask::ROTATION, 0.5, &Transform::IDENTITY)
            .unwrap();
        path.insert_keyframe(ChannelMask::ALL, 3.0, &Transform::IDENTITY)
            .unwrap();
        let (start, end) = path.time_extents().unwrap();
        assert!((start - 0.5).abs() < 1.0e-6);
        assert!((end - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_loop_wrap_continuity() {
        let path = translation_path(
            Interpolation::Linear,
            true,
            &[
                (0.0, Vec3::ZERO),
                (1.0, Vec3::new(4.0, 0.0, 0.0)),
                (2.0, Vec3::ZERO),
            ],
        );
        let a = path.sample(0.0).transform_point(Vec3::ZERO);
        let b = path.sample(2.0).transform_point(Vec3::ZERO);
        assert!((a - b).length() < 1.0e-5);

        let eps = 0.01;
        let wrapped = path.sample(2.0 + eps).transform_point(Vec3::ZERO);
        let unwrapped = path.sample(eps).transform_point(Vec3::ZERO);
        assert!((wrapped - unwrapped).length() < 1.0e-4);

        // Negative times wrap too
        let negative = path.sample(-0.5).transform_point(Vec3::ZERO);
        let positive = path.sample(1.5).transform_point(Vec3::ZERO);
        assert!((negative - positive).length() < 1.0e-4);
    }

    #[test]
    fn test_hermite_is_continuous_at_keys() {
        let path = translation_path(
            Interpolation::Hermite,
            false,
            &[
                (0.0, Vec3::ZERO),
                (1.0, Vec3::new(2.0, 5.0, 0.0)),
                (2.0, Vec3::new(4.0, 0.0, 0.0)),
            ],
        );
        let eps = 1.0e-3;
        let before = path.sample(1.0 - eps).transform_point(Vec3::ZERO);
        let at = path.sample(1.0).transform_point(Vec3::ZERO);
        let after = path.sample(1.0 + eps).transform_point(Vec3::ZERO);
        assert!((before - at).length() < 0.05);
        assert!((after - at).length() < 0.05);
    }

    #[test]
    fn test_hermite_zero_deriv_flat_at_keys() {
        let path = translation_path(
            Interpolation::HermiteZeroDeriv,
            false,
            &[(0.0, Vec3::ZERO), (1.0, Vec3::new(10.0, 0.0, 0.0))],
        );
        // Near the keys the easing curve barely moves
        let near_start = path.sample(0.05).transform_point(Vec3::ZERO);
        assert!(near_start.x < 0.2);
        let near_end = path.sample(0.95).transform_point(Vec3::ZERO);
        assert!(near_end.x > 9.8);
        // Midpoint is exact
        let mid = path.sample(0.5).transform_point(Vec3::ZERO);
        assert!((mid.x - 5.0).abs() < 1.0e-4);
    }

    #[test]
    fn test_slerp_rotation_sampling() {
        let q0 = Quat::IDENTITY;
        let q1 = Quat::from_axis_angle(Vec3::Y, 1.0);
        let path = rotation_path(Interpolation::Slerp, false, &[(0.0, q0), (1.0, q1)]);
        let (q, _) = path.sample(0.5).decompose();
        let (_, angle) = q.to_axis_angle().unwrap();
        assert!((angle - 0.5).abs() < 1.0e-3);
    }

    #[test]
    fn test_squad_passes_through_keys() {
        let keys: Vec<(f32, Quat)> = (0..4)
            .map(|i| (i as f32, Quat::from_axis_angle(Vec3::Z, i as f32 * 0.4)))
            .collect();
        let path = rotation_path(Interpolation::Squad, false, &keys);
        for (time, expected) in &keys {
            let (q, _) = path.sample(*time).decompose();
            assert!(
                q.dot(expected).abs() > 1.0 - 1.0e-3,
                "squad missed key at t={time}"
            );
        }
    }

    #[test]
    fn test_cursor_monotonic_sampling_matches_fresh() {
        let keys: Vec<(f32, Vec3)> = (0..20)
            .map(|i| (i as f32 * 0.25, Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        let path = translation_path(Interpolation::Linear, false, &keys);
        let mut cursor = SampleCursor::default();
        for i in 0..100 {
            let time = i as f32 * 0.05;
            let with_cursor = path
                .sample_with_cursor(time, &mut cursor)
                .transform_point(Vec3::ZERO);
            let fresh = path.sample(time).transform_point(Vec3::ZERO);
            assert!((with_cursor - fresh).length() < 1.0e-6);
        }
        // Backwards jump still resolves correctly
        let back = path
            .sample_with_cursor(0.3, &mut cursor)
            .transform_point(Vec3::ZERO);
        assert!((back - path.sample(0.3).transform_point(Vec3::ZERO)).length() < 1.0e-6);
    }

    #[test]
    fn test_offset_times() {
        let mut path = translation_path(
            Interpolation::Linear,
            false,
            &[(0.0, Vec3::ZERO), (1.0, Vec3::X), (2.0, Vec3::Y)],
        );
        path.offset_times(1, ChannelMask::TRANSLATION, 0.5).unwrap();
        let (_, end) = path.time_extents().unwrap();
        assert!((end - 2.5).abs() < 1.0e-6);

        // Sliding key 1 before key 0 must fail and not modify the path
        assert!(path
            .offset_times(1, ChannelMask::TRANSLATION, -2.0)
            .is_err());
        let (_, end) = path.time_extents().unwrap();
        assert!((end - 2.5).abs() < 1.0e-6);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut path = Path::new(Interpolation::Hermite, Interpolation::Squad, true).unwrap();
        for i in 0..5 {
            let q = Quat::from_axis_angle(Vec3::Y, i as f32 * 0.3);
            let t = Transform::from_rotation_translation(&q, Vec3::new(i as f32, 0.0, 1.0));
            path.insert_keyframe(ChannelMask::ALL, i as f32, &t).unwrap();
        }

        let mut buf = Vec::new();
        path.write_to(&mut buf).unwrap();
        let restored = Path::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.is_looped(), true);
        assert_eq!(restored.rotation_interpolation(), Interpolation::Squad);
        assert_eq!(restored.translation_interpolation(), Interpolation::Hermite);
        assert_eq!(restored.keyframe_count(Channel::Rotation), 5);
        for time in [0.0, 0.7, 2.2, 3.9] {
            let a = path.sample(time).transform_point(Vec3::ZERO);
            let b = restored.sample(time).transform_point(Vec3::ZERO);
            assert!((a - b).length() < 1.0e-5);
        }
    }

    #[test]
    fn test_serialization_rejects_bad_magic_and_version() {
        let path = Path::new(Interpolation::Linear, Interpolation::Linear, false).unwrap();
        let mut buf = Vec::new();
        path.write_to(&mut buf).unwrap();

        let mut garbled = buf.clone();
        garbled[0] = b'X';
        assert!(matches!(
            Path::read_from(&mut garbled.as_slice()),
            Err(Error::InvalidMagic { .. })
        ));

        let mut future = buf.clone();
        future[4] = 0xff;
        assert!(matches!(
            Path::read_from(&mut future.as_slice()),
            Err(Error::UnsupportedVersion { .. })
        ));

        let truncated = &buf[..buf.len() - 2];
        assert!(Path::read_from(&mut &truncated[..]).is_err());
    }

    #[test]
    fn test_read_rejects_absurd_key_count() {
        // Valid header followed by a garbled rotation key count; must
        // fail as a parse error, not attempt the allocation
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MPTH");
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.push(0); // not looped
        buf.push(0); // linear rotation
        buf.push(0); // linear translation
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Path::read_from(&mut buf.as_slice()),
            Err(Error::Parse(_))
        ));
    }
}
