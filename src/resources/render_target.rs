//! Offscreen render targets
//!
//! A [`RenderTarget`] groups color attachments and an optional depth
//! attachment under one device render-target object. Attachments are arena
//! textures: construction attaches them (+1), [`RenderTarget::destroy`]
//! detaches them (-1), so a texture shared by several targets outlives all
//! but the last of them.

use parking_lot::Mutex;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::{TextureArena, TextureId};

/// Source of a color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorAttachment {
    /// An existing arena texture
    Existing(TextureId),
    /// A texture created with the target
    Create(TextureFormat),
}

/// Source of the depth attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthAttachment {
    /// An existing depth texture
    Texture(TextureId),
    /// A sampleable depth texture created with the target
    CreateTexture(TextureFormat),
    /// A non-sampleable device render buffer
    RenderBuffer(TextureFormat),
}

/// Render target configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub color: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
    pub samples: u32,
    pub auto_mipmaps: bool,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            label: None,
            width,
            height,
            dimension: TextureDimension::D2,
            color: Vec::new(),
            depth: None,
            samples: 1,
            auto_mipmaps: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, color: ColorAttachment) -> Self {
        self.color.push(color);
        self
    }

    pub fn with_depth(mut self, depth: DepthAttachment) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_auto_mipmaps(mut self, auto_mipmaps: bool) -> Self {
        self.auto_mipmaps = auto_mipmaps;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedDepth {
    Texture(TextureId),
    RenderBuffer(TextureFormat),
}

#[derive(Debug)]
struct TargetState {
    handle: Option<RenderTargetHandle>,
    generation: u64,
    destroyed: bool,
}

/// A render target over arena textures
#[derive(Debug)]
pub struct RenderTarget {
    label: Option<String>,
    width: u32,
    height: u32,
    dimension: TextureDimension,
    samples: u32,
    auto_mipmaps: bool,
    color: Vec<TextureId>,
    depth: Option<ResolvedDepth>,
    arena: TextureArena,
    state: Mutex<TargetState>,
}

impl RenderTarget {
    /// Validate the configuration, create the owned attachments and the device object.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        arena: &TextureArena,
        desc: RenderTargetDesc,
    ) -> RenderResult<Self> {
        Self::validate(device.capabilities(), arena, &desc)?;

        let max_samples = device.capabilities().max_msaa_samples.max(1);
        let mut samples = desc.samples.max(1);
        if samples > max_samples {
            log::warn!(
                "Render target {:?}: {} MSAA samples requested, device supports {}, clamping",
                desc.label,
                samples,
                max_samples
            );
            samples = max_samples;
        }

        let mip_levels = if desc.auto_mipmaps {
            32 - desc.width.max(desc.height).leading_zeros()
        } else {
            1
        };
        let mut created = Vec::new();
        let (color, depth) = match Self::create_attachments(
            device,
            arena,
            &desc,
            mip_levels,
            &mut created,
        ) {
            Ok(resolved) => resolved,
            Err(err) => {
                Self::release_created(device, arena, &created);
                return Err(err);
            }
        };
        let attached: Vec<TextureId> = color
            .iter()
            .copied()
            .chain(match depth {
                Some(ResolvedDepth::Texture(id)) => Some(id),
                _ => None,
            })
            .collect();
        if let Err(err) = arena.attach_all(&attached) {
            Self::release_created(device, arena, &created);
            return Err(err);
        }

        let target = Self {
            label: desc.label,
            width: desc.width,
            height: desc.height,
            dimension: desc.dimension,
            samples,
            auto_mipmaps: desc.auto_mipmaps,
            color,
            depth,
            arena: arena.clone(),
            state: Mutex::new(TargetState {
                handle: None,
                generation: device.generation(),
                destroyed: false,
            }),
        };
        if let Err(err) = target.rebuild(device) {
            target.state.lock().destroyed = true;
            arena.unwind_attach(&attached);
            Self::release_created(device, arena, &created);
            return Err(err);
        }
        Ok(target)
    }

    /// Resolve the attachments, creating the owned ones. Created ids are
    /// pushed to `created` as they appear so a failure can release them.
    fn create_attachments(
        device: &mut dyn GraphicsDevice,
        arena: &TextureArena,
        desc: &RenderTargetDesc,
        mip_levels: u32,
        created: &mut Vec<TextureId>,
    ) -> RenderResult<(Vec<TextureId>, Option<ResolvedDepth>)> {
        let texture_desc = |format: TextureFormat, mip_levels: u32| {
            let mut texture = TextureDescriptor::attachment(desc.width, desc.height, format)
                .with_dimension(desc.dimension)
                .with_mip_levels(mip_levels);
            texture.label = desc.label.clone();
            texture
        };

        let mut color = Vec::with_capacity(desc.color.len());
        for attachment in &desc.color {
            let id = match *attachment {
                ColorAttachment::Existing(id) => id,
                ColorAttachment::Create(format) => {
                    let id = arena.create_texture(device, &texture_desc(format, mip_levels))?;
                    created.push(id);
                    id
                }
            };
            color.push(id);
        }

        let depth = match desc.depth {
            None => None,
            Some(DepthAttachment::Texture(id)) => Some(ResolvedDepth::Texture(id)),
            Some(DepthAttachment::CreateTexture(format)) => {
                let id = arena.create_texture(device, &texture_desc(format, 1))?;
                created.push(id);
                Some(ResolvedDepth::Texture(id))
            }
            Some(DepthAttachment::RenderBuffer(format)) => Some(ResolvedDepth::RenderBuffer(format)),
        };
        Ok((color, depth))
    }

    fn release_created(device: &mut dyn GraphicsDevice, arena: &TextureArena, created: &[TextureId]) {
        for &id in created {
            arena.release(device, id);
        }
    }

    fn validate(
        caps: &DeviceCapabilities,
        arena: &TextureArena,
        desc: &RenderTargetDesc,
    ) -> RenderResult<()> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::InvalidConfiguration(format!(
                "render target {:?} has zero size",
                desc.label
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(RenderError::CubeDimensionMismatch {
                width: desc.width,
                height: desc.height,
            });
        }

        for attachment in &desc.color {
            let format = match *attachment {
                ColorAttachment::Existing(id) => {
                    let existing = arena.descriptor(id).ok_or_else(|| {
                        RenderError::InvalidHandle(format!("color attachment {:?}", id))
                    })?;
                    if existing.width != desc.width || existing.height != desc.height {
                        return Err(RenderError::InvalidConfiguration(format!(
                            "color attachment {:?} is {}x{}, target is {}x{}",
                            id, existing.width, existing.height, desc.width, desc.height
                        )));
                    }
                    existing.format
                }
                ColorAttachment::Create(format) => {
                    if !format.is_depth() && !caps.supports_format(format) {
                        return Err(RenderError::UnsupportedFormat(format));
                    }
                    format
                }
            };
            if format.is_depth() {
                return Err(RenderError::AttachmentConflict(format!(
                    "depth format {:?} used as a color attachment",
                    format
                )));
            }
        }

        let depth_format = match desc.depth {
            None => return Ok(()),
            Some(DepthAttachment::Texture(id)) => {
                if desc.color.contains(&ColorAttachment::Existing(id)) {
                    return Err(RenderError::AttachmentConflict(format!(
                        "{:?} is both a color and the depth attachment",
                        id
                    )));
                }
                let existing = arena
                    .descriptor(id)
                    .ok_or_else(|| RenderError::InvalidHandle(format!("depth attachment {:?}", id)))?;
                if existing.width != desc.width || existing.height != desc.height {
                    return Err(RenderError::InvalidConfiguration(format!(
                        "depth attachment {:?} is {}x{}, target is {}x{}",
                        id, existing.width, existing.height, desc.width, desc.height
                    )));
                }
                existing.format
            }
            Some(DepthAttachment::CreateTexture(format)) => {
                if format.is_depth() && !caps.supports_format(format) {
                    return Err(RenderError::UnsupportedFormat(format));
                }
                format
            }
            Some(DepthAttachment::RenderBuffer(format)) => {
                if format.is_depth() && !caps.supports_render_buffer(format) {
                    return Err(RenderError::UnsupportedFormat(format));
                }
                format
            }
        };
        if !depth_format.is_depth() {
            return Err(RenderError::AttachmentConflict(format!(
                "color format {:?} used as the depth attachment",
                depth_format
            )));
        }
        Ok(())
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimension(&self) -> TextureDimension {
        self.dimension
    }

    /// MSAA sample count after clamping
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn auto_mipmaps(&self) -> bool {
        self.auto_mipmaps
    }

    pub fn color_texture_count(&self) -> usize {
        self.color.len()
    }

    pub fn color_texture(&self, index: usize) -> Option<TextureId> {
        self.color.get(index).copied()
    }

    /// The depth texture, `None` without depth or with a render-buffer depth.
    pub fn depth_texture(&self) -> Option<TextureId> {
        match self.depth {
            Some(ResolvedDepth::Texture(id)) => Some(id),
            _ => None,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Device handle, rebuilt first if the device was lost since it was created.
    pub fn handle(&self, device: &mut dyn GraphicsDevice) -> RenderResult<RenderTargetHandle> {
        {
            let state = self.state.lock();
            if state.destroyed {
                return Err(RenderError::TargetDestroyed(self.label.clone()));
            }
            if let Some(handle) = state.handle {
                if state.generation == device.generation() {
                    return Ok(handle);
                }
            }
        }
        self.rebuild(device)
    }

    /// Recreate the device object with the same logical configuration.
    ///
    /// Attachments are recreated first when their handles are stale. Calling
    /// it again within one device generation only replaces the device object.
    pub fn rebuild(&self, device: &mut dyn GraphicsDevice) -> RenderResult<RenderTargetHandle> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(RenderError::TargetDestroyed(self.label.clone()));
        }

        let color_attachments = self
            .color
            .iter()
            .map(|&id| self.arena.handle(device, id))
            .collect::<RenderResult<Vec<_>>>()?;
        let depth_attachment = match self.depth {
            None => None,
            Some(ResolvedDepth::Texture(id)) => {
                Some(DeviceDepthAttachment::Texture(self.arena.handle(device, id)?))
            }
            Some(ResolvedDepth::RenderBuffer(format)) => {
                Some(DeviceDepthAttachment::RenderBuffer(format))
            }
        };

        let generation = device.generation();
        if let Some(old) = state.handle.take() {
            if state.generation == generation {
                device.destroy_render_target(old);
            }
        }

        let handle = device.create_render_target(&RenderTargetDescriptor {
            label: self.label.clone(),
            width: self.width,
            height: self.height,
            dimension: self.dimension,
            color_attachments,
            depth_attachment,
            samples: self.samples,
        })?;
        log::debug!("Built render target {:?} as {:?}", self.label, handle);
        state.handle = Some(handle);
        state.generation = generation;
        Ok(handle)
    }

    /// Resolve MSAA and regenerate mipmaps after rendering into the target.
    pub fn finish_rendering(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        let handle = self.handle(device)?;
        if self.samples > 1 {
            device.resolve_render_target(handle);
        }
        if self.auto_mipmaps {
            for &id in &self.color {
                let texture = self.arena.handle(device, id)?;
                device.generate_mipmaps(texture);
            }
        }
        Ok(())
    }

    /// Read back pixels of a color attachment.
    pub fn read_pixels(
        &self,
        device: &mut dyn GraphicsDevice,
        index: usize,
        rect: ScissorRect,
    ) -> RenderResult<Vec<u8>> {
        if self.is_destroyed() {
            return Err(RenderError::TargetDestroyed(self.label.clone()));
        }
        let id = self.color_texture(index).ok_or_else(|| {
            RenderError::InvalidHandle(format!("color attachment {} of {:?}", index, self.label))
        })?;
        self.arena.read_pixels(device, id, rect)
    }

    /// Release the device object and detach every attachment.
    ///
    /// Destroying twice is a no-op.
    pub fn destroy(&self, device: &mut dyn GraphicsDevice) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;

        if let Some(handle) = state.handle.take() {
            if state.generation == device.generation() {
                device.destroy_render_target(handle);
            }
        }

        let depth = self.depth_texture();
        for id in self.color.iter().chain(depth.iter()) {
            if let Err(err) = self.arena.detach(device, *id) {
                log::warn!("Render target {:?}: failed to detach {:?}: {}", self.label, id, err);
            }
        }
        log::debug!("Destroyed render target {:?}", self.label);
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if !self.state.get_mut().destroyed {
            log::warn!(
                "Render target {:?} dropped without destroy(), its attachments stay referenced",
                self.label
            );
        }
    }
}
