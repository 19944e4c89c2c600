//! Reference-counted texture storage
//!
//! Textures live in a [`TextureArena`] slot holding the descriptor, the device
//! handle, the device generation the handle was created under and an
//! attachment count. Render targets attach (+1) the textures they use and
//! detach (-1) them when destroyed; the backend texture is released the
//! moment the count drops to zero.
//!
//! After device loss every slot whose generation is stale is recreated from
//! its descriptor, either lazily on the next [`TextureArena::handle`] call or
//! eagerly through [`TextureArena::rebuild`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};

/// Identifier of an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug)]
struct TextureSlot {
    desc: TextureDescriptor,
    handle: TextureHandle,
    generation: u64,
    ref_count: u32,
}

#[derive(Debug, Default)]
struct ArenaInner {
    next_id: u64,
    slots: HashMap<TextureId, TextureSlot>,
}

impl ArenaInner {
    fn slot_mut(&mut self, id: TextureId) -> RenderResult<&mut TextureSlot> {
        self.slots
            .get_mut(&id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("{:?} is not in the arena", id)))
    }
}

/// Shared texture arena
#[derive(Debug, Clone, Default)]
pub struct TextureArena {
    inner: Arc<Mutex<ArenaInner>>,
}

impl TextureArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a texture.
    ///
    /// Fails on formats the device cannot create and on non-square cube
    /// textures. Anisotropy above the device maximum is clamped.
    pub fn create_texture(
        &self,
        device: &mut dyn GraphicsDevice,
        desc: &TextureDescriptor,
    ) -> RenderResult<TextureId> {
        let caps = device.capabilities();
        if !caps.supports_format(desc.format) {
            return Err(RenderError::UnsupportedFormat(desc.format));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(RenderError::CubeDimensionMismatch {
                width: desc.width,
                height: desc.height,
            });
        }

        let mut desc = desc.clone();
        if desc.anisotropy > caps.max_anisotropy {
            log::warn!(
                "Texture {:?}: anisotropy {} exceeds device maximum {}, clamping",
                desc.label,
                desc.anisotropy,
                caps.max_anisotropy
            );
            desc.anisotropy = caps.max_anisotropy;
        }

        let handle = device.create_texture(&desc)?;
        let generation = device.generation();

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = TextureId(inner.next_id);
        inner.slots.insert(
            id,
            TextureSlot {
                desc,
                handle,
                generation,
                ref_count: 0,
            },
        );
        Ok(id)
    }

    /// Increment the attachment count, returning the new count.
    pub fn attach(&self, id: TextureId) -> RenderResult<u32> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(id)?;
        slot.ref_count += 1;
        Ok(slot.ref_count)
    }

    /// Attach every texture in `ids`, or none of them when one is missing.
    pub fn attach_all(&self, ids: &[TextureId]) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        if let Some(missing) = ids.iter().find(|id| !inner.slots.contains_key(id)) {
            return Err(RenderError::InvalidHandle(format!(
                "{:?} is not in the arena",
                missing
            )));
        }
        for id in ids {
            if let Some(slot) = inner.slots.get_mut(id) {
                slot.ref_count += 1;
            }
        }
        Ok(())
    }

    /// Take back attachments made by [`TextureArena::attach_all`] without
    /// releasing anything.
    pub(crate) fn unwind_attach(&self, ids: &[TextureId]) {
        let mut inner = self.inner.lock();
        for id in ids {
            if let Some(slot) = inner.slots.get_mut(id) {
                slot.ref_count = slot.ref_count.saturating_sub(1);
            }
        }
    }

    /// Decrement the attachment count, returning the new count.
    ///
    /// At zero the backend texture is destroyed and the slot removed.
    pub fn detach(&self, device: &mut dyn GraphicsDevice, id: TextureId) -> RenderResult<u32> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(id)?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        let count = slot.ref_count;
        if count == 0 {
            if let Some(slot) = inner.slots.remove(&id) {
                Self::destroy_slot(device, id, &slot);
            }
        }
        Ok(count)
    }

    /// Release a texture nobody is attached to.
    ///
    /// Returns `false` (and keeps the texture) while attachments remain; the
    /// last detach releases it instead.
    pub fn release(&self, device: &mut dyn GraphicsDevice, id: TextureId) -> bool {
        let mut inner = self.inner.lock();
        let unattached = inner.slots.get(&id).is_some_and(|s| s.ref_count == 0);
        if !unattached {
            return false;
        }
        if let Some(slot) = inner.slots.remove(&id) {
            Self::destroy_slot(device, id, &slot);
        }
        true
    }

    fn destroy_slot(device: &mut dyn GraphicsDevice, id: TextureId, slot: &TextureSlot) {
        log::debug!("Releasing texture {:?} {:?}", id, slot.desc.label);
        // Handles from an older generation died with the device.
        if slot.generation == device.generation() {
            device.destroy_texture(slot.handle);
        }
    }

    pub fn ref_count(&self, id: TextureId) -> Option<u32> {
        self.inner.lock().slots.get(&id).map(|s| s.ref_count)
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.inner.lock().slots.contains_key(&id)
    }

    pub fn descriptor(&self, id: TextureId) -> Option<TextureDescriptor> {
        self.inner.lock().slots.get(&id).map(|s| s.desc.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device handle of a texture, recreated first if the device was lost.
    pub fn handle(&self, device: &mut dyn GraphicsDevice, id: TextureId) -> RenderResult<TextureHandle> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(id)?;
        Self::ensure_resident(device, slot)?;
        Ok(slot.handle)
    }

    /// Recreate every texture whose handle predates the current device generation.
    pub fn rebuild(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        for slot in inner.slots.values_mut() {
            Self::ensure_resident(device, slot)?;
        }
        Ok(())
    }

    fn ensure_resident(device: &mut dyn GraphicsDevice, slot: &mut TextureSlot) -> RenderResult<()> {
        let generation = device.generation();
        if slot.generation != generation {
            log::debug!("Recreating texture {:?} after device loss", slot.desc.label);
            slot.handle = device.create_texture(&slot.desc)?;
            slot.generation = generation;
        }
        Ok(())
    }

    /// Read back texels of a texture.
    pub fn read_pixels(
        &self,
        device: &mut dyn GraphicsDevice,
        id: TextureId,
        rect: ScissorRect,
    ) -> RenderResult<Vec<u8>> {
        let format = self
            .descriptor(id)
            .map(|d| d.format)
            .ok_or_else(|| RenderError::InvalidHandle(format!("{:?} is not in the arena", id)))?;
        if format.is_compressed() {
            return Err(RenderError::CompressedReadback(format));
        }
        let handle = self.handle(device, id)?;
        device.read_texture(handle, rect)
    }
}
