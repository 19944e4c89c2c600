//! Render pass definitions

use std::fmt;
use std::sync::Arc;

use glam::Vec4;

use crate::backend::traits::GraphicsDevice;
use crate::backend::types::ClearFlags;
use crate::error::RenderResult;
use crate::pipeline::{CullingResults, RenderContext};
use crate::resources::{Material, RenderTarget};
use crate::scene::Layer;

/// User-defined pass behavior
pub trait CustomPass {
    /// Called before the pass target is bound
    fn pre_render(
        &mut self,
        _device: &mut dyn GraphicsDevice,
        _context: &RenderContext,
        _results: &CullingResults,
    ) {
    }

    /// Record draws into the bound target, returning the number of draw calls.
    fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        context: &RenderContext,
        results: &CullingResults,
    ) -> RenderResult<usize>;

    /// Called after rendering, before the target is resolved
    fn post_render(
        &mut self,
        _device: &mut dyn GraphicsDevice,
        _context: &RenderContext,
        _results: &CullingResults,
    ) {
    }
}

/// What a pass does when it runs
pub enum PassKind {
    /// Render the opaque, alpha-test and transparent queues
    Standard,
    Custom(Box<dyn CustomPass>),
}

impl fmt::Debug for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Standard => write!(f, "Standard"),
            PassKind::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One step of the pipeline
#[derive(Debug)]
pub struct RenderPass {
    pub name: String,
    /// Passes run in ascending priority; the default pass sits at 0
    pub priority: i32,
    /// Target to render into, `None` uses the camera's
    pub render_target: Option<Arc<RenderTarget>>,
    pub replace_material: Option<Arc<Material>>,
    pub mask: Layer,
    /// Clear mode, `None` uses the camera's
    pub clear_flags: Option<ClearFlags>,
    /// Clear color, `None` uses the camera background
    pub clear_color: Option<Vec4>,
    pub enabled: bool,
    pub kind: PassKind,
}

impl RenderPass {
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            render_target: None,
            replace_material: None,
            mask: Layer::EVERYTHING,
            clear_flags: None,
            clear_color: None,
            enabled: true,
            kind: PassKind::Standard,
        }
    }

    pub fn custom(name: &str, priority: i32, pass: Box<dyn CustomPass>) -> Self {
        Self {
            kind: PassKind::Custom(pass),
            ..Self::new(name, priority)
        }
    }

    pub fn with_render_target(mut self, target: Arc<RenderTarget>) -> Self {
        self.render_target = Some(target);
        self
    }

    pub fn with_replace_material(mut self, material: Arc<Material>) -> Self {
        self.replace_material = Some(material);
        self
    }

    pub fn with_mask(mut self, mask: Layer) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_clear_flags(mut self, flags: ClearFlags) -> Self {
        self.clear_flags = Some(flags);
        self
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub(crate) fn pre_render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        context: &RenderContext,
        results: &CullingResults,
    ) {
        if let PassKind::Custom(pass) = &mut self.kind {
            pass.pre_render(device, context, results);
        }
    }

    pub(crate) fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        context: &RenderContext,
        results: &CullingResults,
    ) -> RenderResult<usize> {
        match &mut self.kind {
            PassKind::Standard => {
                let replace = self.replace_material.as_ref();
                let mut draws = results.opaque.render(device, context, replace, self.mask);
                draws += results.alpha_test.render(device, context, replace, self.mask);
                draws += results.transparent.render(device, context, replace, self.mask);
                Ok(draws)
            }
            PassKind::Custom(pass) => pass.render(device, context, results),
        }
    }

    pub(crate) fn post_render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        context: &RenderContext,
        results: &CullingResults,
    ) {
        if let PassKind::Custom(pass) = &mut self.kind {
            pass.post_render(device, context, results);
        }
    }
}
