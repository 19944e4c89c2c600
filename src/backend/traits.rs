//! Graphics device abstraction
//!
//! The render core never talks to a GPU API directly. Everything it needs from
//! the hardware goes through [`GraphicsDevice`]; handles returned by the device
//! are opaque and only meaningful to the device that produced them.

use crate::backend::types::*;
use crate::error::RenderResult;
use glam::Vec4;

/// Handle to a device texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a device render target object (framebuffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub u64);

/// Main graphics device trait
///
/// All calls are issued from the render thread. State-setting calls are
/// idempotent: repeating one with the same arguments has no further effect.
/// Submission is fire-and-forget.
pub trait GraphicsDevice {
    /// Capabilities used for format validation and capability clamping
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Size of the screen surface, `None` for an offscreen-only device
    fn surface_size(&self) -> Option<(u32, u32)>;

    /// Device-loss epoch
    ///
    /// Incremented every time the device is lost. Handles created under an
    /// older generation are invalid.
    fn generation(&self) -> u64;

    // Resource creation

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> RenderResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create a render target object over existing attachments
    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> RenderResult<RenderTargetHandle>;

    /// Destroy a render target object (attachments are untouched)
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Read back texels of a 2D texture
    fn read_texture(
        &mut self,
        texture: TextureHandle,
        rect: ScissorRect,
    ) -> RenderResult<Vec<u8>>;

    // Command recording

    /// Bind a render target, `None` binds the screen surface
    fn activate_render_target(&mut self, target: Option<RenderTargetHandle>);

    /// Clear the bound target
    fn clear_render_target(&mut self, flags: ClearFlags, color: Vec4);

    /// Set the viewport
    fn viewport(&mut self, viewport: Viewport);

    /// Set the scissor rect, `None` disables scissoring
    fn scissor(&mut self, rect: Option<ScissorRect>);

    /// Submit one draw
    fn draw_primitive(&mut self, draw: &DrawCall);

    /// Resolve a multisampled target into its attachments
    fn resolve_render_target(&mut self, target: RenderTargetHandle);

    /// Regenerate the mip chain of a texture
    fn generate_mipmaps(&mut self, texture: TextureHandle);
}
