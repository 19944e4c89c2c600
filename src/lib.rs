//! Lilium Render - render orchestration core of a 3D engine
//!
//! Decides every frame what gets drawn, in what order, into which target and
//! with what shadow information. The GPU itself sits behind
//! [`backend::GraphicsDevice`]; a recording [`backend::HeadlessDevice`] is
//! included.
//!
//! # Features
//! - Cameras with lazily recomputed matrices and coordinate conversions
//! - Render pipeline of prioritized passes over sorted render queues
//! - Cascaded shadow maps packed into one atlas
//! - Reference-counted render targets rebuilt after device loss

pub mod backend;
pub mod cached;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod shader_data;
pub mod shadow;

pub use backend::{GraphicsDevice, HeadlessDevice};
pub use error::{RenderError, RenderResult};
pub use pipeline::{FrameStats, RenderPass, RenderPipeline};
pub use resources::{RenderTarget, TextureArena};
pub use scene::{Camera, Scene};
pub use shadow::{CascadedShadowCaster, ShadowSettings};

/// Configuration of a render pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Merge adjacent elements sharing primitive, sub-mesh and material into
    /// one instanced draw
    pub batching: bool,
    /// Cascaded shadow settings for the sun light
    pub shadow: ShadowSettings,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            batching: true,
            shadow: ShadowSettings::default(),
        }
    }
}
