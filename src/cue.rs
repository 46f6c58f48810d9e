//! Scheduled motion playback entries
//!
//! A cue anchors a motion to the actor clock with a time warp and a
//! blend envelope. Cues live in a growable arena: appended at the end,
//! removed last-in-first-out, and pruned by predicate once expired. The
//! scheduling itself is driven by the actor's `animation_*` methods.

use std::sync::Arc;

use log::debug;

use crate::math::Transform;
use crate::motion::Motion;

/// One scheduled playback of a motion
#[derive(Debug, Clone)]
pub(crate) struct AnimationCue {
    pub(crate) motion: Arc<Motion>,
    /// Actor seconds to motion seconds
    pub(crate) time_scale: f32,
    /// Motion time at the anchor point
    pub(crate) time_offset: f32,
    /// Envelope ramp length in actor seconds, unscaled
    pub(crate) blend_time: f32,
    pub(crate) blend_from: f32,
    pub(crate) blend_to: f32,
    /// Placement adjustment composed onto this cue's root-level bone
    /// samples; the actor root is never touched
    pub(crate) motion_transform: Option<Transform>,
    /// Actor clock value the cue was anchored at
    pub(crate) start_time: f32,
}

impl AnimationCue {
    /// Motion-local time at actor clock `now`
    pub(crate) fn local_time(&self, now: f32) -> f32 {
        (now - self.start_time) * self.time_scale + self.time_offset
    }

    /// Blend envelope at actor clock `now`
    ///
    /// The ramp runs on unscaled actor time; `blend_time <= 0` means the
    /// envelope sits at `blend_to` immediately.
    pub(crate) fn blend_amount(&self, now: f32) -> f32 {
        if self.blend_time <= 0.0 {
            return self.blend_to;
        }
        let s = ((now - self.start_time) / self.blend_time).clamp(0.0, 1.0);
        self.blend_from + (self.blend_to - self.blend_from) * s
    }

    /// Whether the envelope has reached its final value
    fn envelope_settled(&self, now: f32) -> bool {
        self.blend_time <= 0.0 || now - self.start_time >= self.blend_time
    }

    /// Whether the motion has run past its keys with no loop to return
    fn exhausted(&self, now: f32) -> bool {
        if self.motion.is_looped() {
            return false;
        }
        let Some((start, end)) = self.motion.time_extents() else {
            return true;
        };
        let local = self.local_time(now);
        if self.time_scale >= 0.0 {
            local > end
        } else {
            local < start
        }
    }

    /// A cue is dropped once its envelope has settled and it no longer
    /// contributes: blended out to zero, or playing a finished motion
    pub(crate) fn expired(&self, now: f32) -> bool {
        self.envelope_settled(now) && (self.blend_to <= 0.0 || self.exhausted(now))
    }
}

/// Cue arena: append, LIFO removal, expiry pruning
#[derive(Debug, Default)]
pub(crate) struct CueList {
    cues: Vec<AnimationCue>,
}

impl CueList {
    pub(crate) fn push(&mut self, cue: AnimationCue) {
        self.cues.push(cue);
    }

    /// Remove the most recently added cue
    pub(crate) fn pop(&mut self) -> bool {
        self.cues.pop().is_some()
    }

    /// Drop cues expired at actor clock `now`
    pub(crate) fn prune(&mut self, now: f32) {
        let before = self.cues.len();
        self.cues.retain(|cue| !cue.expired(now));
        if self.cues.len() != before {
            debug!("pruned {} expired cues", before - self.cues.len());
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &AnimationCue> {
        self.cues.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cues.len()
    }
}
