//! A motion: a named collection of bone paths plus an event timeline
//!
//! Paths are keyed by bone name and sampled by whoever binds the motion
//! to a skeleton. Events are (time, string) markers with at most one
//! event per time key.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::error::{Error, Result};
use crate::io_ext::{read_string, write_string, ReadExt, WriteExt};
use crate::path::{Path, TIME_TOLERANCE};

const MOTION_MAGIC: &[u8; 4] = b"MMOT";
const MOTION_VERSION: u16 = 1;

/// Sanity cap on path and event counts read from an image
const MAX_ITEM_COUNT: usize = 1 << 20;

static NEXT_MOTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique motion identity
///
/// Lets an actor cache its name-to-bone binding per motion and reuse it
/// across samples. Ids are not stable across processes and are not
/// serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionId(u64);

impl MotionId {
    fn next() -> Self {
        Self(NEXT_MOTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
struct Event {
    time: f32,
    message: String,
}

/// A named set of per-bone paths with an event timeline
#[derive(Debug)]
pub struct Motion {
    id: MotionId,
    name: Option<String>,
    /// Paths in insertion order, each tagged with its target bone name
    paths: Vec<(String, Path)>,
    path_index: HashMap<String, usize>,
    /// Events ordered by time, unique within [`TIME_TOLERANCE`]
    events: Vec<Event>,
    /// Cursor for the two-call event iteration protocol:
    /// (next index, exclusive end time)
    event_cursor: Option<(usize, f32)>,
}

impl Default for Motion {
    fn default() -> Self {
        Self::new()
    }
}

impl Motion {
    /// Create an empty, unnamed motion
    pub fn new() -> Self {
        Self {
            id: MotionId::next(),
            name: None,
            paths: Vec::new(),
            path_index: HashMap::new(),
            events: Vec::new(),
            event_cursor: None,
        }
    }

    /// Process-unique identity of this motion
    pub fn id(&self) -> MotionId {
        self.id
    }

    /// Display name, if one was assigned
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Add a path targeting `bone_name`, returning its index
    ///
    /// Each bone name may carry at most one path.
    pub fn add_path(&mut self, bone_name: impl Into<String>, path: Path) -> Result<usize> {
        let bone_name = bone_name.into();
        if self.path_index.contains_key(&bone_name) {
            return Err(Error::DuplicatePath(bone_name));
        }
        let index = self.paths.len();
        self.path_index.insert(bone_name.clone(), index);
        self.paths.push((bone_name, path));
        Ok(index)
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(|(_, p)| p)
    }

    /// Target bone name of the path at `index`
    pub fn path_name(&self, index: usize) -> Option<&str> {
        self.paths.get(index).map(|(n, _)| n.as_str())
    }

    pub fn path_by_name(&self, bone_name: &str) -> Option<&Path> {
        self.path_index
            .get(bone_name)
            .map(|&i| &self.paths[i].1)
    }

    /// Earliest start and latest end across all paths' key times
    pub fn time_extents(&self) -> Option<(f32, f32)> {
        let mut extents: Option<(f32, f32)> = None;
        for (_, path) in &self.paths {
            if let Some((s, e)) = path.time_extents() {
                extents = Some(match extents {
                    Some((cs, ce)) => (cs.min(s), ce.max(e)),
                    None => (s, e),
                });
            }
        }
        extents
    }

    /// Whether any path loops (the motion never runs out)
    pub fn is_looped(&self) -> bool {
        self.paths.iter().any(|(_, p)| p.is_looped())
    }

    /// Insert an event marker at `time`
    ///
    /// At most one event per time key; a second insert within
    /// [`TIME_TOLERANCE`] of an existing event fails rather than
    /// overwriting.
    pub fn insert_event(&mut self, time: f32, message: impl Into<String>) -> Result<()> {
        match self.find_event(time) {
            Ok(_) => Err(Error::DuplicateEvent(time)),
            Err(i) => {
                self.events.insert(
                    i,
                    Event {
                        time,
                        message: message.into(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Delete the event at `time` (within [`TIME_TOLERANCE`])
    pub fn delete_event(&mut self, time: f32) -> Result<()> {
        match self.find_event(time) {
            Ok(i) => {
                self.events.remove(i);
                Ok(())
            }
            Err(_) => Err(Error::NoSuchEvent(time)),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Times of the first and last events
    pub fn event_extents(&self) -> Option<(f32, f32)> {
        let first = self.events.first()?;
        let last = &self.events[self.events.len() - 1];
        Some((first.time, last.time))
    }

    /// Begin iterating events in the half-open window `[start, end)`
    ///
    /// One cursor per motion; a new setup discards a previous iteration
    /// in progress.
    pub fn setup_event_iterator(&mut self, start: f32, end: f32) {
        let lo = self.events.partition_point(|e| e.time < start);
        self.event_cursor = Some((lo, end));
    }

    /// Yield the next event of the window established by
    /// [`Motion::setup_event_iterator`], in time order
    pub fn next_event(&mut self) -> Option<(f32, &str)> {
        let (index, end) = self.event_cursor?;
        let time = match self.events.get(index) {
            Some(event) if event.time < end => event.time,
            _ => {
                self.event_cursor = None;
                return None;
            }
        };
        self.event_cursor = Some((index + 1, end));
        Some((time, self.events[index].message.as_str()))
    }

    /// Borrowing iterator over events in `[start, end)`, in time order
    ///
    /// Unlike the cursor protocol this does not touch motion state, so
    /// it works through a shared reference.
    pub fn events_between(&self, start: f32, end: f32) -> impl Iterator<Item = (f32, &str)> {
        let lo = self.events.partition_point(|e| e.time < start);
        self.events[lo..]
            .iter()
            .take_while(move |e| e.time < end)
            .map(|e| (e.time, e.message.as_str()))
    }

    fn find_event(&self, time: f32) -> std::result::Result<usize, usize> {
        let i = self.events.partition_point(|e| e.time < time);
        if i < self.events.len() && (self.events[i].time - time).abs() < TIME_TOLERANCE {
            return Ok(i);
        }
        if i > 0 && (self.events[i - 1].time - time).abs() < TIME_TOLERANCE {
            return Ok(i - 1);
        }
        Err(i)
    }

    /// Write a binary image of this motion
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MOTION_MAGIC)?;
        writer.write_u16_le(MOTION_VERSION)?;
        match &self.name {
            Some(name) => {
                writer.write_u8(1)?;
                write_string(writer, name)?;
            }
            None => writer.write_u8(0)?,
        }
        writer.write_u32_le(self.paths.len() as u32)?;
        for (bone_name, path) in &self.paths {
            write_string(writer, bone_name)?;
            path.write_to(writer)?;
        }
        writer.write_u32_le(self.events.len() as u32)?;
        for event in &self.events {
            writer.write_f32_le(event.time)?;
            write_string(writer, &event.message)?;
        }
        Ok(())
    }

    /// Read a binary image written by [`Motion::write_to`]
    ///
    /// The restored motion gets a fresh id; ids are process-local.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MOTION_MAGIC {
            return Err(Error::InvalidMagic {
                expected: String::from_utf8_lossy(MOTION_MAGIC).into_owned(),
                actual: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let version = reader.read_u16_le()?;
        if version != MOTION_VERSION {
            return Err(Error::UnsupportedVersion {
                expected: MOTION_VERSION,
                actual: version,
            });
        }

        let mut motion = Self::new();
        if reader.read_u8()? != 0 {
            motion.name = Some(read_string(reader)?);
        }
        let path_count = reader.read_u32_le()? as usize;
        if path_count > MAX_ITEM_COUNT {
            return Err(Error::Parse(format!("path count {path_count} out of range")));
        }
        for _ in 0..path_count {
            let bone_name = read_string(reader)?;
            let path = Path::read_from(reader)?;
            motion.add_path(bone_name, path)?;
        }
        let event_count = reader.read_u32_le()? as usize;
        if event_count > MAX_ITEM_COUNT {
            return Err(Error::Parse(format!(
                "event count {event_count} out of range"
            )));
        }
        for _ in 0..event_count {
            let time = reader.read_f32_le()?;
            let message = read_string(reader)?;
            if let Some(prev) = motion.events.last() {
                if time < prev.time {
                    return Err(Error::Parse("events out of time order".into()));
                }
            }
            motion.events.push(Event { time, message });
        }
        debug!(
            "read motion {:?}: {} paths, {} events",
            motion.name,
            motion.paths.len(),
            motion.events.len()
        );
        Ok(motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::path::{ChannelMask, Interpolation};
    use glam::Vec3;

    fn simple_path(start: f32, end: f32) -> Path {
        let mut path = Path::new(Interpolation::Linear, Interpolation::Linear, false).unwrap();
        path.insert_keyframe(ChannelMask::ALL, start, &Transform::IDENTITY)
            .unwrap();
        path.insert_keyframe(
            ChannelMask::ALL,
            end,
            &Transform::from_translation(Vec3::X),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Motion::new().id(), Motion::new().id());
    }

    #[test]
    fn test_add_path_rejects_duplicate_bone() {
        let mut motion = Motion::new();
        motion.add_path("root", simple_path(0.0, 1.0)).unwrap();
        assert!(matches!(
            motion.add_path("root", simple_path(0.0, 1.0)),
            Err(Error::DuplicatePath(_))
        ));
        assert_eq!(motion.path_count(), 1);
    }

    #[test]
    fn test_path_lookup_preserves_insertion_order() {
        let mut motion = Motion::new();
        motion.add_path("hip", simple_path(0.0, 1.0)).unwrap();
        motion.add_path("knee", simple_path(0.0, 2.0)).unwrap();
        assert_eq!(motion.path_name(0), Some("hip"));
        assert_eq!(motion.path_name(1), Some("knee"));
        assert!(motion.path_by_name("knee").is_some());
        assert!(motion.path_by_name("ankle").is_none());
    }

    #[test]
    fn test_time_extents_union() {
        let mut motion = Motion::new();
        assert!(motion.time_extents().is_none());
        motion.add_path("a", simple_path(1.0, 2.0)).unwrap();
        motion.add_path("b", simple_path(0.5, 3.0)).unwrap();
        let (s, e) = motion.time_extents().unwrap();
        assert!((s - 0.5).abs() < 1.0e-6);
        assert!((e - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_event_uniqueness() {
        let mut motion = Motion::new();
        motion.insert_event(1.0, "footstep").unwrap();
        assert!(matches!(
            motion.insert_event(1.0 + 0.5e-4, "clank"),
            Err(Error::DuplicateEvent(_))
        ));
        motion.insert_event(2.0, "clank").unwrap();
        assert_eq!(motion.event_count(), 2);

        motion.delete_event(1.0).unwrap();
        assert!(matches!(
            motion.delete_event(5.0),
            Err(Error::NoSuchEvent(_))
        ));
        assert_eq!(motion.event_count(), 1);
    }

    #[test]
    fn test_event_iterator_half_open_window() {
        let mut motion = Motion::new();
        motion.insert_event(0.0, "a").unwrap();
        motion.insert_event(1.0, "b").unwrap();
        motion.insert_event(2.0, "c").unwrap();

        motion.setup_event_iterator(0.5, 2.0);
        assert_eq!(motion.next_event(), Some((1.0, "b")));
        assert_eq!(motion.next_event(), None);
        // Exhausted cursor stays exhausted
        assert_eq!(motion.next_event(), None);

        // Start is inclusive
        motion.setup_event_iterator(1.0, 3.0);
        assert_eq!(motion.next_event(), Some((1.0, "b")));
        assert_eq!(motion.next_event(), Some((2.0, "c")));
        assert_eq!(motion.next_event(), None);
    }

    #[test]
    fn test_events_between_matches_cursor_protocol() {
        let mut motion = Motion::new();
        for i in 0..5 {
            motion.insert_event(i as f32, format!("e{i}")).unwrap();
        }
        let borrowed: Vec<(f32, String)> = motion
            .events_between(1.0, 4.0)
            .map(|(t, m)| (t, m.to_string()))
            .collect();

        motion.setup_event_iterator(1.0, 4.0);
        let mut via_cursor = Vec::new();
        while let Some((t, m)) = motion.next_event() {
            via_cursor.push((t, m.to_string()));
        }
        assert_eq!(borrowed, via_cursor);
        assert_eq!(borrowed.len(), 3);
    }

    #[test]
    fn test_event_extents() {
        let mut motion = Motion::new();
        assert!(motion.event_extents().is_none());
        motion.insert_event(2.0, "late").unwrap();
        motion.insert_event(0.5, "early").unwrap();
        assert_eq!(motion.event_extents(), Some((0.5, 2.0)));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut motion = Motion::new();
        motion.set_name("walk");
        motion.add_path("root", simple_path(0.0, 2.0)).unwrap();
        motion.add_path("arm", simple_path(0.0, 1.5)).unwrap();
        motion.insert_event(0.5, "plant").unwrap();
        motion.insert_event(1.5, "lift").unwrap();

        let mut buf = Vec::new();
        motion.write_to(&mut buf).unwrap();
        let restored = Motion::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.name(), Some("walk"));
        assert_eq!(restored.path_count(), 2);
        assert_eq!(restored.path_name(1), Some("arm"));
        assert_eq!(restored.event_count(), 2);
        assert_eq!(restored.time_extents(), motion.time_extents());
        // Identity is fresh, not serialized
        assert_ne!(restored.id(), motion.id());
    }

    #[test]
    fn test_read_rejects_absurd_path_count() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MMOT");
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.push(0); // no name
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Motion::read_from(&mut buf.as_slice()),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_serialization_rejects_wrong_magic() {
        let motion = Motion::new();
        let mut buf = Vec::new();
        motion.write_to(&mut buf).unwrap();
        buf[2] = b'?';
        assert!(matches!(
            Motion::read_from(&mut buf.as_slice()),
            Err(Error::InvalidMagic { .. })
        ));
    }
}
