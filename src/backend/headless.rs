//! Headless recording device.
//!
//! This device doesn't perform actual GPU operations. It validates handles,
//! records every command it receives, and can simulate device loss, which
//! makes it the device of choice for tests and for offscreen tooling that
//! only needs the command stream.

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};

/// A command received by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    CreateRenderTarget(RenderTargetHandle),
    DestroyRenderTarget(RenderTargetHandle),
    ActivateRenderTarget(Option<RenderTargetHandle>),
    Clear { flags: ClearFlags, color: Vec4 },
    Viewport(Viewport),
    Scissor(Option<ScissorRect>),
    Draw(DrawCall),
    Resolve(RenderTargetHandle),
    GenerateMipmaps(TextureHandle),
}

/// Headless device
#[derive(Debug)]
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    surface_size: Option<(u32, u32)>,
    generation: u64,
    next_handle: u64,
    texture_limit: Option<usize>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    render_targets: HashSet<RenderTargetHandle>,
    commands: Vec<DeviceCommand>,
}

impl HeadlessDevice {
    /// Create a device with a screen surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: DeviceCapabilities::default(),
            surface_size: Some((width, height)),
            generation: 0,
            next_handle: 1,
            texture_limit: None,
            textures: HashMap::new(),
            render_targets: HashSet::new(),
            commands: Vec::new(),
        }
    }

    /// Create a device without a screen surface.
    pub fn offscreen() -> Self {
        Self {
            surface_size: None,
            ..Self::new(0, 0)
        }
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail texture creation once `limit` textures are live, like a device
    /// running out of memory.
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.texture_limit = Some(limit);
        self
    }

    pub fn set_surface_size(&mut self, size: Option<(u32, u32)>) {
        self.surface_size = size;
    }

    /// Simulate a device-loss event.
    ///
    /// Every handle handed out so far becomes invalid.
    pub fn lose_device(&mut self) {
        log::debug!(
            "HeadlessDevice: device lost ({} textures, {} render targets invalidated)",
            self.textures.len(),
            self.render_targets.len()
        );
        self.generation += 1;
        self.textures.clear();
        self.render_targets.clear();
    }

    /// All recorded commands, oldest first.
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draws, oldest first.
    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            DeviceCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draw_calls().count()
    }

    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn is_render_target_live(&self, target: RenderTargetHandle) -> bool {
        self.render_targets.contains(&target)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface_size
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle> {
        if !self.capabilities.supports_format(desc.format) {
            return Err(RenderError::UnsupportedFormat(desc.format));
        }
        if let Some(limit) = self.texture_limit {
            if self.textures.len() >= limit {
                return Err(RenderError::Backend(format!(
                    "out of texture memory ({} live textures)",
                    limit
                )));
            }
        }
        let handle = TextureHandle(self.next_handle());
        log::trace!(
            "HeadlessDevice: creating texture {:?} {:?} ({}x{})",
            handle,
            desc.label,
            desc.width,
            desc.height
        );
        self.textures.insert(handle, desc.clone());
        self.commands.push(DeviceCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("HeadlessDevice: destroying texture {:?}", texture);
        self.textures.remove(&texture);
        self.commands.push(DeviceCommand::DestroyTexture(texture));
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> RenderResult<RenderTargetHandle> {
        let depth_texture = match desc.depth_attachment {
            Some(DeviceDepthAttachment::Texture(handle)) => Some(handle),
            _ => None,
        };
        for handle in desc.color_attachments.iter().chain(depth_texture.iter()) {
            if !self.textures.contains_key(handle) {
                return Err(RenderError::InvalidHandle(format!(
                    "attachment {:?} of {:?} is not a live texture",
                    handle, desc.label
                )));
            }
        }
        let handle = RenderTargetHandle(self.next_handle());
        log::trace!(
            "HeadlessDevice: creating render target {:?} {:?} ({}x{}, {} samples)",
            handle,
            desc.label,
            desc.width,
            desc.height,
            desc.samples
        );
        self.render_targets.insert(handle);
        self.commands.push(DeviceCommand::CreateRenderTarget(handle));
        Ok(handle)
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        log::trace!("HeadlessDevice: destroying render target {:?}", target);
        self.render_targets.remove(&target);
        self.commands.push(DeviceCommand::DestroyRenderTarget(target));
    }

    fn read_texture(&mut self, texture: TextureHandle, rect: ScissorRect) -> RenderResult<Vec<u8>> {
        let desc = self
            .textures
            .get(&texture)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", texture)))?;
        let bytes_per_pixel = desc
            .format
            .bytes_per_pixel()
            .ok_or(RenderError::CompressedReadback(desc.format))?;
        Ok(vec![0u8; (rect.width * rect.height * bytes_per_pixel) as usize])
    }

    fn activate_render_target(&mut self, target: Option<RenderTargetHandle>) {
        log::trace!("HeadlessDevice: activate render target {:?}", target);
        self.commands.push(DeviceCommand::ActivateRenderTarget(target));
    }

    fn clear_render_target(&mut self, flags: ClearFlags, color: Vec4) {
        self.commands.push(DeviceCommand::Clear { flags, color });
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.commands.push(DeviceCommand::Viewport(viewport));
    }

    fn scissor(&mut self, rect: Option<ScissorRect>) {
        self.commands.push(DeviceCommand::Scissor(rect));
    }

    fn draw_primitive(&mut self, draw: &DrawCall) {
        log::trace!(
            "HeadlessDevice: draw {:?} with {:?} ({} instances, {} bytes)",
            draw.primitive,
            draw.material,
            draw.instance_count(),
            draw.instance_bytes().len()
        );
        self.commands.push(DeviceCommand::Draw(draw.clone()));
    }

    fn resolve_render_target(&mut self, target: RenderTargetHandle) {
        self.commands.push(DeviceCommand::Resolve(target));
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.commands.push(DeviceCommand::GenerateMipmaps(texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_loss_invalidates_handles() {
        let mut device = HeadlessDevice::new(640, 480);
        let texture = device
            .create_texture(&TextureDescriptor::attachment(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        assert!(device.is_texture_live(texture));
        assert_eq!(device.generation(), 0);

        device.lose_device();

        assert!(!device.is_texture_live(texture));
        assert_eq!(device.generation(), 1);
    }

    #[test]
    fn test_render_target_requires_live_attachments() {
        let mut device = HeadlessDevice::offscreen();
        let desc = RenderTargetDescriptor {
            label: Some("broken".into()),
            width: 16,
            height: 16,
            dimension: TextureDimension::D2,
            color_attachments: vec![TextureHandle(999)],
            depth_attachment: None,
            samples: 1,
        };
        assert!(matches!(
            device.create_render_target(&desc),
            Err(RenderError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_compressed_readback_fails() {
        let mut device = HeadlessDevice::offscreen();
        let texture = device
            .create_texture(&TextureDescriptor {
                format: TextureFormat::Bc1RgbaUnorm,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            device.read_texture(texture, ScissorRect::new(0, 0, 1, 1)),
            Err(RenderError::CompressedReadback(TextureFormat::Bc1RgbaUnorm))
        );
    }
}
