//! Render error types

use crate::backend::TextureFormat;
use thiserror::Error;

/// Errors surfaced by the render core.
///
/// Capability shortfalls (MSAA or anisotropy above the device maximum) are not
/// errors: they are clamped where they are detected and only logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    // Configuration errors, raised at construction time.
    #[error("Unsupported texture format: {0:?}")]
    UnsupportedFormat(TextureFormat),
    #[error("Cube render target must be square, got {width}x{height}")]
    CubeDimensionMismatch { width: u32, height: u32 },
    #[error("Attachment conflict: {0}")]
    AttachmentConflict(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Runtime state errors, raised at the call site.
    #[error("No render target bound and the device has no screen surface")]
    NoRenderTarget,
    #[error("Cannot read pixels from compressed texture format {0:?}")]
    CompressedReadback(TextureFormat),
    #[error("Render target {0:?} was destroyed")]
    TargetDestroyed(Option<String>),
    #[error("Invalid resource handle: {0}")]
    InvalidHandle(String),

    // Backend failures.
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Device lost")]
    DeviceLost,
}

pub type RenderResult<T> = Result<T, RenderError>;
