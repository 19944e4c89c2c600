//! Shared fixtures for the integration tests.
//!
//! Everything renders through [`HeadlessDevice`], so tests inspect the
//! recorded command stream instead of pixels.

#![allow(dead_code)]

use std::sync::Arc;

use glam::Vec3;
use lilium_render::backend::HeadlessDevice;
use lilium_render::resources::{Material, Primitive};
use lilium_render::scene::{Camera, Renderer, RendererId, Scene, Transform};
use lilium_render::{FrameStats, RenderConfig, RenderPipeline, RenderResult, TextureArena};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device, pipeline, scene and a camera at the origin looking down -Z.
pub struct TestContext {
    pub device: HeadlessDevice,
    pub arena: TextureArena,
    pub pipeline: RenderPipeline,
    pub scene: Scene,
    pub camera: Camera,
    pub cube: Arc<Primitive>,
}

impl TestContext {
    /// Context with a screen surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_device(HeadlessDevice::new(width, height), RenderConfig::default())
    }

    /// Context without a screen surface.
    pub fn offscreen() -> Self {
        Self::with_device(HeadlessDevice::offscreen(), RenderConfig::default())
    }

    pub fn with_device(device: HeadlessDevice, config: RenderConfig) -> Self {
        init_logging();
        let arena = TextureArena::new();
        Self {
            device,
            pipeline: RenderPipeline::new(config, arena.clone()),
            arena,
            scene: Scene::new(),
            camera: Camera::new(Transform::new()),
            cube: Arc::new(Primitive::cube()),
        }
    }

    /// Add a cube renderer at `position`.
    pub fn add_cube(&mut self, position: Vec3, material: &Arc<Material>) -> RendererId {
        self.add_renderer(Renderer::with_primitive(
            Transform::from_position(position),
            self.cube.clone(),
            material.clone(),
        ))
    }

    pub fn add_renderer(&mut self, renderer: Renderer) -> RendererId {
        self.scene.add_renderer(renderer)
    }

    pub fn render(&mut self) -> RenderResult<FrameStats> {
        self.pipeline
            .render(&mut self.device, &mut self.scene, &mut self.camera)
    }

    /// Renderer ids of every recorded draw, in submission order.
    pub fn drawn_renderers(&self) -> Vec<RendererId> {
        self.device
            .draw_calls()
            .flat_map(|draw| draw.renderers.iter().copied())
            .collect()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.pipeline.destroy(&mut self.device);
    }
}
