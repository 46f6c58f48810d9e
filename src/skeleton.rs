//! Bone hierarchy description
//!
//! The skeleton is collaborator data: some external system defines the
//! bones, their parents, and their bind attachments; this crate binds
//! motions against it and poses it. Geometry and skinning live outside.

use std::collections::HashMap;
use std::io::{Read, Write};

use glam::Vec3;

use crate::error::{Error, Result};
use crate::io_ext::{read_string, write_string, ReadExt, WriteExt};
use crate::math::Transform;

const SKELETON_MAGIC: &[u8; 4] = b"MSKL";
const SKELETON_VERSION: u16 = 1;
const NO_PARENT: u32 = u32::MAX;

/// Sanity cap on the bone count read from an image
const MAX_BONE_COUNT: usize = 1 << 16;

/// One bone: a name, an optional parent, and a bind attachment
/// (parent-relative rest transform)
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub attachment: Transform,
}

/// An ordered, named bone hierarchy
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    by_name: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bone, returning its index
    ///
    /// The parent must name an already-added bone; bone names are unique.
    pub fn add_bone(
        &mut self,
        parent: Option<usize>,
        name: impl Into<String>,
        attachment: Transform,
    ) -> Result<usize> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateBone(name));
        }
        if let Some(p) = parent {
            if p >= self.bones.len() {
                return Err(Error::IndexOutOfRange {
                    index: p,
                    len: self.bones.len(),
                });
            }
        }
        let index = self.bones.len();
        self.by_name.insert(name.clone(), index);
        self.bones.push(Bone {
            name,
            parent,
            attachment,
        });
        Ok(index)
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bone_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn has_bone_named(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Bone indices ordered parents-before-children
    ///
    /// Hierarchies built through [`Skeleton::add_bone`] are cycle-free by
    /// construction; a deserialized skeleton with a parent cycle is
    /// rejected here.
    pub fn evaluation_order(&self) -> Result<Vec<usize>> {
        // 0 unvisited, 1 on the current ancestor chain, 2 placed
        let mut state = vec![0u8; self.bones.len()];
        let mut order = Vec::with_capacity(self.bones.len());
        let mut chain = Vec::new();
        for start in 0..self.bones.len() {
            chain.clear();
            let mut cursor = Some(start);
            while let Some(i) = cursor {
                match state[i] {
                    2 => break,
                    1 => return Err(Error::CyclicHierarchy(i)),
                    _ => {
                        state[i] = 1;
                        chain.push(i);
                        cursor = self.bones[i].parent;
                    }
                }
            }
            for &i in chain.iter().rev() {
                state[i] = 2;
                order.push(i);
            }
        }
        Ok(order)
    }

    /// Write a binary image of this skeleton
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(SKELETON_MAGIC)?;
        writer.write_u16_le(SKELETON_VERSION)?;
        writer.write_u32_le(self.bones.len() as u32)?;
        for bone in &self.bones {
            write_string(writer, &bone.name)?;
            let parent = match bone.parent {
                Some(p) => p as u32,
                None => NO_PARENT,
            };
            writer.write_u32_le(parent)?;
            let (rotation, translation) = bone.attachment.decompose();
            writer.write_f32_le(rotation.w)?;
            writer.write_f32_le(rotation.x)?;
            writer.write_f32_le(rotation.y)?;
            writer.write_f32_le(rotation.z)?;
            writer.write_f32_le(translation.x)?;
            writer.write_f32_le(translation.y)?;
            writer.write_f32_le(translation.z)?;
        }
        Ok(())
    }

    /// Read a binary image written by [`Skeleton::write_to`]
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != SKELETON_MAGIC {
            return Err(Error::InvalidMagic {
                expected: String::from_utf8_lossy(SKELETON_MAGIC).into_owned(),
                actual: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let version = reader.read_u16_le()?;
        if version != SKELETON_VERSION {
            return Err(Error::UnsupportedVersion {
                expected: SKELETON_VERSION,
                actual: version,
            });
        }

        let count = reader.read_u32_le()? as usize;
        if count > MAX_BONE_COUNT {
            return Err(Error::Parse(format!("bone count {count} out of range")));
        }
        let mut skeleton = Self::new();
        for index in 0..count {
            let name = read_string(reader)?;
            let parent_raw = reader.read_u32_le()?;
            let parent = if parent_raw == NO_PARENT {
                None
            } else {
                let p = parent_raw as usize;
                if p >= count {
                    return Err(Error::IndexOutOfRange { index: p, len: count });
                }
                Some(p)
            };
            let w = reader.read_f32_le()?;
            let x = reader.read_f32_le()?;
            let y = reader.read_f32_le()?;
            let z = reader.read_f32_le()?;
            let tx = reader.read_f32_le()?;
            let ty = reader.read_f32_le()?;
            let tz = reader.read_f32_le()?;
            let attachment = Transform::from_rotation_translation(
                &crate::math::Quat::new(w, x, y, z),
                Vec3::new(tx, ty, tz),
            );
            if skeleton.by_name.contains_key(&name) {
                return Err(Error::DuplicateBone(name));
            }
            skeleton.by_name.insert(name.clone(), index);
            skeleton.bones.push(Bone {
                name,
                parent,
                attachment,
            });
        }
        // Forward parent references are representable in the image;
        // reject cycles up front
        skeleton.evaluation_order()?;
        Ok(skeleton)
    }
}
