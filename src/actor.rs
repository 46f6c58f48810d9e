//! Actor definition and per-instance pose engine
//!
//! An [`ActorDef`] pairs a skeleton with a motion library and is shared
//! between instances. Each [`Actor`] owns its pose: per-bone local
//! rotation/translation (defaulting to the bind attachment), derived
//! world transforms, a root transform, and a cue list driving scheduled
//! playback. Pose output is pulled through [`Actor::bone_transform`];
//! nothing is pushed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use glam::Vec3;
use log::debug;

use crate::cue::{AnimationCue, CueList};
use crate::error::{Error, Result};
use crate::math::{Quat, Transform};
use crate::motion::{Motion, MotionId};
use crate::path::SampleCursor;
use crate::skeleton::Skeleton;

/// How [`Actor::blend_pose`] shapes its blend amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendingType {
    /// Use the amount as-is
    #[default]
    Linear,
    /// Smoothstep remap of the scalar amount (ease in and out)
    Hermite,
}

/// Shared actor definition: a skeleton plus a motion library
#[derive(Debug, Default)]
pub struct ActorDef {
    skeleton: Skeleton,
    eval_order: Vec<usize>,
    motions: Vec<Arc<Motion>>,
    motions_by_name: HashMap<String, usize>,
}

impl ActorDef {
    /// Wrap a skeleton, validating its hierarchy once
    pub fn new(skeleton: Skeleton) -> Result<Self> {
        let eval_order = skeleton.evaluation_order()?;
        Ok(Self {
            skeleton,
            eval_order,
            motions: Vec::new(),
            motions_by_name: HashMap::new(),
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn has_bone_named(&self, name: &str) -> bool {
        self.skeleton.has_bone_named(name)
    }

    /// Add a motion to the library, returning its index
    ///
    /// Named motions are also reachable through
    /// [`ActorDef::motion_by_name`]; a repeated name shadows the earlier
    /// entry in the name lookup only.
    pub fn add_motion(&mut self, motion: Motion) -> usize {
        let index = self.motions.len();
        if let Some(name) = motion.name() {
            self.motions_by_name.insert(name.to_string(), index);
        }
        self.motions.push(Arc::new(motion));
        index
    }

    pub fn motion_count(&self) -> usize {
        self.motions.len()
    }

    pub fn motion(&self, index: usize) -> Option<&Arc<Motion>> {
        self.motions.get(index)
    }

    pub fn motion_by_name(&self, name: &str) -> Option<&Arc<Motion>> {
        self.motions_by_name.get(name).map(|&i| &self.motions[i])
    }

    pub fn motion_name(&self, index: usize) -> Option<&str> {
        self.motions.get(index).and_then(|m| m.name())
    }

    fn evaluation_order(&self) -> &[usize] {
        &self.eval_order
    }
}

/// One-time name resolution of a motion's paths against the skeleton,
/// plus per-path sampling cursors
#[derive(Debug)]
struct MotionBinding {
    /// Bone index per path, `None` for paths naming no bone here
    targets: Vec<Option<usize>>,
    cursors: Vec<SampleCursor>,
}

/// A posable instance of an [`ActorDef`]
#[derive(Debug)]
pub struct Actor {
    def: Arc<ActorDef>,
    /// Per-bone bind attachments, instance-local so they can be edited
    attachments: Vec<Transform>,
    /// Local pose each bone returns to when no motion covers it
    defaults: Vec<(Quat, Vec3)>,
    /// Current parent-relative pose per bone
    locals: Vec<(Quat, Vec3)>,
    /// Derived world transform per bone
    worlds: Vec<Transform>,
    root: Transform,
    blending: BlendingType,
    now: f32,
    cues: CueList,
    pending_events: VecDeque<(f32, String)>,
    bindings: HashMap<MotionId, MotionBinding>,
    /// Set by bone-optimized stepping: world transforms outside the
    /// requested chain are out of date until the next full pose
    stale: bool,
}

impl Actor {
    pub fn new(def: &Arc<ActorDef>) -> Self {
        let skeleton = def.skeleton();
        let count = skeleton.bone_count();
        let mut attachments = Vec::with_capacity(count);
        let mut defaults = Vec::with_capacity(count);
        for i in 0..count {
            // Index is in range by construction
            if let Some(bone) = skeleton.bone(i) {
                attachments.push(bone.attachment);
                defaults.push(bone.attachment.decompose());
            }
        }
        let mut actor = Self {
            def: Arc::clone(def),
            attachments,
            locals: defaults.clone(),
            defaults,
            worlds: vec![Transform::IDENTITY; count],
            root: Transform::IDENTITY,
            blending: BlendingType::Linear,
            now: 0.0,
            cues: CueList::default(),
            pending_events: VecDeque::new(),
            bindings: HashMap::new(),
            stale: false,
        };
        actor.recompute_worlds();
        actor
    }

    pub fn definition(&self) -> &Arc<ActorDef> {
        &self.def
    }

    pub fn set_blending_type(&mut self, blending: BlendingType) {
        self.blending = blending;
    }

    /// Actor clock, advanced by [`Actor::animation_step`]
    pub fn now(&self) -> f32 {
        self.now
    }

    /// Reset every bone to its bind-derived default pose
    ///
    /// `root` replaces the actor root transform; `None` keeps it.
    pub fn clear_pose(&mut self, root: Option<&Transform>) {
        self.locals.copy_from_slice(&self.defaults);
        if let Some(r) = root {
            self.root = *r;
        }
        self.recompute_worlds();
        self.stale = false;
    }

    /// Pose the skeleton from a motion sampled at `time`
    ///
    /// Matched bones take the sampled value as their local transform;
    /// bones the motion does not cover return to their defaults. Motion
    /// paths naming no bone here are ignored.
    pub fn set_pose(&mut self, motion: &Motion, time: f32, root: Option<&Transform>) {
        if let Some(r) = root {
            self.root = *r;
        }
        self.locals.copy_from_slice(&self.defaults);
        self.apply_sampled(motion, time, None);
        self.recompute_worlds();
        self.stale = false;
    }

    /// Blend a motion into the current pose
    ///
    /// `amount` is clamped to [0, 1] and shaped by the blending type;
    /// 0 leaves the pose untouched, 1 matches [`Actor::set_pose`] for
    /// the bones this motion covers. Bones the motion does not cover
    /// keep their prior pose bit for bit.
    pub fn blend_pose(&mut self, motion: &Motion, time: f32, root: Option<&Transform>, amount: f32) {
        let amount = self.shaped_amount(amount);
        if amount <= 0.0 {
            return;
        }
        if let Some(r) = root {
            self.root = *r;
        }
        self.apply_blended(motion, time, None, amount);
        self.recompute_worlds();
        self.stale = false;
    }

    /// World-space transform of a bone; `None` names the actor root
    pub fn bone_transform(&self, bone: Option<&str>) -> Result<Transform> {
        match bone {
            None => Ok(self.root),
            Some(name) => {
                let index = self.bone_index(name)?;
                Ok(self.worlds[index])
            }
        }
    }

    /// Bind attachment of a bone (instance-local copy)
    pub fn bone_attachment(&self, name: &str) -> Result<Transform> {
        let index = self.bone_index(name)?;
        Ok(self.attachments[index])
    }

    /// Replace a bone's bind attachment
    ///
    /// Takes effect on the next pose computation; the currently posed
    /// transforms are left as they are.
    pub fn set_bone_attachment(&mut self, name: &str, attachment: &Transform) -> Result<()> {
        let index = self.bone_index(name)?;
        self.attachments[index] = *attachment;
        self.defaults[index] = attachment.decompose();
        Ok(())
    }

    fn bone_index(&self, name: &str) -> Result<usize> {
        self.def
            .skeleton()
            .bone_by_name(name)
            .ok_or_else(|| Error::NoSuchBone(name.to_string()))
    }

    fn shaped_amount(&self, amount: f32) -> f32 {
        let amount = amount.clamp(0.0, 1.0);
        match self.blending {
            BlendingType::Linear => amount,
            BlendingType::Hermite => amount * amount * (3.0 - 2.0 * amount),
        }
    }

    /// Resolve (or reuse) the name binding of `motion` to this skeleton
    fn resolve_binding(&mut self, motion: &Motion) {
        if self.bindings.contains_key(&motion.id()) {
            return;
        }
        let skeleton = self.def.skeleton();
        let targets: Vec<Option<usize>> = (0..motion.path_count())
            .map(|i| motion.path_name(i).and_then(|n| skeleton.bone_by_name(n)))
            .collect();
        let matched = targets.iter().flatten().count();
        debug!(
            "bound motion {:?}: {matched}/{} paths matched",
            motion.name(),
            targets.len()
        );
        self.bindings.insert(
            motion.id(),
            MotionBinding {
                cursors: vec![SampleCursor::default(); motion.path_count()],
                targets,
            },
        );
    }

    /// Sample `motion` and write matched bones' locals (replace)
    ///
    /// `cue_transform` is composed onto root-level bones' samples; it
    /// adjusts that motion's placement without touching the actor root.
    fn apply_sampled(&mut self, motion: &Motion, time: f32, cue_transform: Option<&Transform>) {
        self.resolve_binding(motion);
        if let Some(binding) = self.bindings.get_mut(&motion.id()) {
            for (i, target) in binding.targets.iter().enumerate() {
                let (Some(bone), Some(path)) = (target, motion.path(i)) else {
                    continue;
                };
                let sample = path.sample_channels(time, &mut binding.cursors[i]);
                self.locals[*bone] =
                    Self::placed_sample(&self.def, *bone, cue_transform, sample);
            }
        }
    }

    /// Sample `motion` and blend matched bones' locals toward it
    fn apply_blended(
        &mut self,
        motion: &Motion,
        time: f32,
        cue_transform: Option<&Transform>,
        amount: f32,
    ) {
        self.resolve_binding(motion);
        if let Some(binding) = self.bindings.get_mut(&motion.id()) {
            for (i, target) in binding.targets.iter().enumerate() {
                let (Some(bone), Some(path)) = (target, motion.path(i)) else {
                    continue;
                };
                let sample = path.sample_channels(time, &mut binding.cursors[i]);
                let (q, v) = Self::placed_sample(&self.def, *bone, cue_transform, sample);
                let (cq, cv) = self.locals[*bone];
                self.locals[*bone] = (cq.slerp(&q, amount), cv.lerp(v, amount));
            }
        }
    }

    /// Compose a per-motion placement transform onto a root-level bone's
    /// sampled local; non-root bones pass through
    fn placed_sample(
        def: &ActorDef,
        bone: usize,
        cue_transform: Option<&Transform>,
        sample: (Quat, Vec3),
    ) -> (Quat, Vec3) {
        let Some(mt) = cue_transform else {
            return sample;
        };
        let is_root = def
            .skeleton()
            .bone(bone)
            .is_some_and(|b| b.parent.is_none());
        if !is_root {
            return sample;
        }
        mt.mul(&Transform::from_rotation_translation(&sample.0, sample.1))
            .decompose()
    }

    /// Rebuild world transforms in evaluation order
    fn recompute_worlds(&mut self) {
        let def = Arc::clone(&self.def);
        for &i in def.evaluation_order() {
            self.recompute_world_of(&def, i);
        }
    }

    /// Rebuild world transforms of `chain` only (parents-first)
    fn recompute_worlds_subset(&mut self, chain: &[usize]) {
        let def = Arc::clone(&self.def);
        for &i in chain {
            self.recompute_world_of(&def, i);
        }
    }

    fn recompute_world_of(&mut self, def: &ActorDef, i: usize) {
        let Some(bone) = def.skeleton().bone(i) else {
            return;
        };
        let (q, v) = &self.locals[i];
        let local = Transform::from_rotation_translation(q, *v);
        self.worlds[i] = match bone.parent {
            Some(p) => self.worlds[p].mul(&local),
            None => self.root.mul(&local),
        };
    }

    /// The named bone and its ancestors, ordered parents-first;
    /// `None` selects no bones (root only)
    fn ancestor_chain(&self, bone: Option<&str>) -> Result<Vec<usize>> {
        let Some(name) = bone else {
            return Ok(Vec::new());
        };
        let mut chain = Vec::new();
        let mut cursor = Some(self.bone_index(name)?);
        while let Some(i) = cursor {
            chain.push(i);
            cursor = self.def.skeleton().bone(i).and_then(|b| b.parent);
        }
        chain.reverse();
        Ok(chain)
    }
}

/// Cue scheduling
impl Actor {
    fn ensure_bones(&self) -> Result<()> {
        if self.def.skeleton().bone_count() == 0 {
            return Err(Error::NoSkeleton);
        }
        Ok(())
    }

    /// Schedule a motion, anchored at the actor's current clock
    ///
    /// `time_into_motion` is where in the motion playback starts;
    /// `time_scale` maps actor seconds to motion seconds. The blend
    /// envelope ramps from `blend_from` to `blend_to` over `blend_time`
    /// actor seconds (unscaled). `motion_transform` adjusts this cue's
    /// placement: it is composed onto the motion's root-level bone
    /// samples and leaves the actor root alone.
    #[allow(clippy::too_many_arguments)]
    pub fn animation_cue(
        &mut self,
        motion: Arc<Motion>,
        time_scale: f32,
        time_into_motion: f32,
        blend_time: f32,
        blend_from: f32,
        blend_to: f32,
        motion_transform: Option<Transform>,
    ) -> Result<()> {
        self.ensure_bones()?;
        self.cues.push(AnimationCue {
            motion,
            time_scale,
            time_offset: time_into_motion,
            blend_time,
            blend_from,
            blend_to,
            motion_transform,
            start_time: self.now,
        });
        Ok(())
    }

    /// Remove the most recently scheduled cue; false when none remain
    pub fn animation_remove_last_cue(&mut self) -> bool {
        self.cues.pop()
    }

    /// Advance the actor clock by `dt` and repose from the cue list
    ///
    /// Expired cues are dropped, surviving cues are folded into the
    /// pose, and motion events crossed by each cue's local-time window
    /// are queued for [`Actor::next_animation_event`].
    pub fn animation_step(&mut self, dt: f32) -> Result<()> {
        self.ensure_bones()?;
        let prev = self.now;
        self.now += dt;
        self.queue_events(prev, self.now);
        self.cues.prune(self.now);
        self.fold_cues(self.now, None);
        self.stale = false;
        Ok(())
    }

    /// Pose as [`Actor::animation_step`] would at `now + dt`, without
    /// committing the clock, pruning cues, or queuing events
    pub fn animation_test_step(&mut self, dt: f32) -> Result<()> {
        self.ensure_bones()?;
        self.fold_cues(self.now + dt, None);
        Ok(())
    }

    /// Step, recomputing world transforms only for `bone` and its
    /// ancestors (root only for `None`)
    ///
    /// Every other bone's world transform goes stale until the next
    /// full pose computation. Cheap when only one attachment point
    /// matters this frame.
    pub fn animation_step_bone_optimized(&mut self, dt: f32, bone: Option<&str>) -> Result<()> {
        self.ensure_bones()?;
        let chain = self.ancestor_chain(bone)?;
        let prev = self.now;
        self.now += dt;
        self.queue_events(prev, self.now);
        self.cues.prune(self.now);
        self.fold_cues(self.now, Some(&chain));
        self.stale = true;
        Ok(())
    }

    /// Bone-optimized variant of [`Actor::animation_test_step`]
    pub fn animation_test_step_bone_optimized(
        &mut self,
        dt: f32,
        bone: Option<&str>,
    ) -> Result<()> {
        self.ensure_bones()?;
        let chain = self.ancestor_chain(bone)?;
        self.fold_cues(self.now + dt, Some(&chain));
        Ok(())
    }

    /// Immediately offset the actor root (offset composed on the left)
    pub fn animation_nudge(&mut self, offset: &Transform) -> Result<()> {
        self.ensure_bones()?;
        self.root = offset.mul(&self.root);
        self.recompute_worlds();
        Ok(())
    }

    /// Drain the next event queued by committed steps, in time order
    pub fn next_animation_event(&mut self) -> Option<(f32, String)> {
        self.pending_events.pop_front()
    }

    /// Collect motion events each cue crossed between the two clock
    /// values, into the pending queue in time order
    fn queue_events(&mut self, prev_now: f32, new_now: f32) {
        let mut batch: Vec<(f32, String)> = Vec::new();
        for cue in self.cues.iter() {
            let a = cue.local_time(prev_now);
            let b = cue.local_time(new_now);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for (time, message) in cue.motion.events_between(lo, hi) {
                batch.push((time, message.to_string()));
            }
        }
        batch.sort_by(|x, y| x.0.total_cmp(&y.0));
        self.pending_events.extend(batch);
    }

    /// Repose from the cue list at clock value `at`
    ///
    /// First live cue replaces the cleared pose, the rest blend in at
    /// their envelope amounts. Cues already expired at `at` are skipped
    /// without being removed, so a speculative fold matches what a
    /// committed step (which prunes first) would produce.
    fn fold_cues(&mut self, at: f32, subset: Option<&[usize]>) {
        let snapshot: Vec<(Arc<Motion>, f32, f32, Option<Transform>)> = self
            .cues
            .iter()
            .filter(|c| !c.expired(at))
            .map(|c| {
                (
                    Arc::clone(&c.motion),
                    c.local_time(at),
                    c.blend_amount(at),
                    c.motion_transform,
                )
            })
            .collect();

        self.locals.copy_from_slice(&self.defaults);
        let mut first = true;
        for (motion, local_time, amount, motion_transform) in &snapshot {
            if first {
                self.apply_sampled(motion, *local_time, motion_transform.as_ref());
                first = false;
            } else {
                let amount = self.shaped_amount(*amount);
                if amount > 0.0 {
                    self.apply_blended(motion, *local_time, motion_transform.as_ref(), amount);
                }
            }
        }
        match subset {
            None => self.recompute_worlds(),
            Some(chain) => self.recompute_worlds_subset(chain),
        }
    }

    /// Whether any cues are currently scheduled
    pub fn has_cues(&self) -> bool {
        !self.cues.is_empty()
    }

    /// Whether bone-optimized stepping left world transforms stale
    pub fn is_pose_stale(&self) -> bool {
        self.stale
    }
}
