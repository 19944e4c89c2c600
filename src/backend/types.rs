//! Common types shared between the render core and device implementations

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::resources::{MaterialId, PrimitiveId, SubMesh};
use crate::scene::RendererId;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth16Unorm,
    Depth24Plus,
    Depth24PlusStencil8,
    Depth32Float,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
    Etc2Rgb8Unorm,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24Plus
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32Float
        )
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            TextureFormat::Bc1RgbaUnorm | TextureFormat::Bc3RgbaUnorm | TextureFormat::Etc2Rgb8Unorm
        )
    }

    /// Bytes per texel, `None` for block-compressed formats.
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            TextureFormat::Depth16Unorm => Some(2),
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::R32Float
            | TextureFormat::Depth24Plus
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => Some(4),
            TextureFormat::Rgba16Float => Some(8),
            TextureFormat::Rgba32Float => Some(16),
            TextureFormat::Bc1RgbaUnorm
            | TextureFormat::Bc3RgbaUnorm
            | TextureFormat::Etc2Rgb8Unorm => None,
        }
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    Cube,
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// Requested anisotropic filtering level, clamped to the device maximum.
    pub anisotropy: f32,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            anisotropy: 1.0,
        }
    }
}

impl TextureDescriptor {
    /// Descriptor for a 2D texture usable as a render attachment.
    pub fn attachment(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
}

/// Depth attachment as seen by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDepthAttachment {
    /// A sampleable depth texture.
    Texture(super::TextureHandle),
    /// A device-internal render buffer of the given format.
    RenderBuffer(TextureFormat),
}

/// Render target object descriptor handed to the device
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub color_attachments: Vec<super::TextureHandle>,
    pub depth_attachment: Option<DeviceDepthAttachment>,
    pub samples: u32,
}

/// Viewport in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Resolve a normalized `(x, y, width, height)` rect against a surface size.
    pub fn from_normalized(rect: Vec4, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(rect.x * w, rect.y * h, rect.z * w, rect.w * h)
    }
}

/// Scissor rect in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

bitflags! {
    /// Which buffers of the bound target are cleared
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
        const DEPTH_COLOR = Self::DEPTH.bits() | Self::COLOR.bits();
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Device capabilities used for validation and clamping
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub max_msaa_samples: u32,
    pub max_anisotropy: f32,
    /// Whether depth formats can be sampled as textures.
    pub depth_texture: bool,
    pub unsupported_formats: Vec<TextureFormat>,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_msaa_samples: 4,
            max_anisotropy: 16.0,
            depth_texture: true,
            unsupported_formats: Vec::new(),
        }
    }
}

impl DeviceCapabilities {
    /// Whether a texture of this format can be created.
    pub fn supports_format(&self, format: TextureFormat) -> bool {
        if format.is_depth() && !self.depth_texture {
            return false;
        }
        !self.unsupported_formats.contains(&format)
    }

    /// Whether a device-internal render buffer of this format can be created.
    pub fn supports_render_buffer(&self, format: TextureFormat) -> bool {
        !format.is_compressed() && !self.unsupported_formats.contains(&format)
    }
}

/// Compare function for depth/stencil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend component state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }
    }
}

/// Fixed-function state a material draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub blend: Option<BlendState>,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub cull_mode: CullMode,
    /// Color writes disabled (depth-only rendering).
    pub color_write: bool,
}

impl RenderState {
    pub fn opaque() -> Self {
        Self {
            blend: None,
            depth_write: true,
            depth_compare: CompareFunction::LessEqual,
            cull_mode: CullMode::Back,
            color_write: true,
        }
    }

    pub fn transparent() -> Self {
        Self {
            blend: Some(BlendState::alpha_blending()),
            depth_write: false,
            ..Self::opaque()
        }
    }

    pub fn depth_only() -> Self {
        Self {
            color_write: false,
            ..Self::opaque()
        }
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::opaque()
    }
}

/// Camera uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub position: Vec4, // w unused
}

/// Per-draw uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub normal_matrix: Mat4,
}

impl ObjectUniform {
    pub fn from_model(model: Mat4) -> Self {
        Self {
            model,
            normal_matrix: crate::math::safe_inverse(model).transpose(),
        }
    }
}

/// One draw submission
///
/// `instances` holds one entry per coalesced render element; a draw is never
/// empty.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub renderers: Vec<RendererId>,
    pub primitive: PrimitiveId,
    pub sub_mesh: Option<SubMesh>,
    pub material: MaterialId,
    pub shader: String,
    pub render_state: RenderState,
    pub macros: Vec<String>,
    pub camera: CameraUniform,
    pub instances: Vec<ObjectUniform>,
}

impl DrawCall {
    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    /// Raw bytes of the per-draw uniform upload.
    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_classification() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Rgba8Unorm.is_depth());
        assert!(TextureFormat::Etc2Rgb8Unorm.is_compressed());
        assert_eq!(TextureFormat::Bc1RgbaUnorm.bytes_per_pixel(), None);
        assert_eq!(TextureFormat::Rgba16Float.bytes_per_pixel(), Some(8));
    }

    #[test]
    fn test_capabilities_without_depth_texture() {
        let caps = DeviceCapabilities {
            depth_texture: false,
            ..Default::default()
        };
        assert!(!caps.supports_format(TextureFormat::Depth32Float));
        assert!(caps.supports_render_buffer(TextureFormat::Depth24PlusStencil8));
        assert!(caps.supports_format(TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn test_viewport_from_normalized() {
        let vp = Viewport::from_normalized(Vec4::new(0.5, 0.0, 0.5, 1.0), 800, 600);
        assert_eq!(vp.x, 400.0);
        assert_eq!(vp.width, 400.0);
        assert_eq!(vp.height, 600.0);
    }
}
