//! Forward render pipeline
//!
//! Per frame the pipeline:
//! 1. Renders the cascaded shadow atlas for the sun light
//! 2. Uploads lights and camera matrices into the scene shader data
//! 3. Clears the culling results, lets the scene push what the camera sees, sorts
//! 4. Runs every enabled render pass in ascending priority

mod context;
mod culling;
mod pass;
mod queue;

pub use context::*;
pub use culling::*;
pub use pass::*;
pub use queue::*;

use std::sync::Arc;

use crate::backend::traits::GraphicsDevice;
use crate::backend::types::Viewport;
use crate::error::{RenderError, RenderResult};
use crate::resources::{RenderTarget, TextureArena};
use crate::scene::{Camera, Scene};
use crate::shader_data::ShaderProperty;
use crate::shadow::CascadedShadowCaster;
use crate::RenderConfig;

pub const VIEW_MATRIX: ShaderProperty = ShaderProperty::new("u_viewMat");
pub const PROJECTION_MATRIX: ShaderProperty = ShaderProperty::new("u_projMat");
pub const VIEW_PROJECTION_MATRIX: ShaderProperty = ShaderProperty::new("u_VPMat");
pub const CAMERA_POSITION: ShaderProperty = ShaderProperty::new("u_cameraPos");

/// Name of the pass every pipeline starts with
pub const DEFAULT_PASS: &str = "default";

/// What one frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls submitted by the render passes
    pub draw_calls: usize,
    pub opaque_elements: usize,
    pub alpha_test_elements: usize,
    pub transparent_elements: usize,
    pub visible_renderers: usize,
    pub culled_renderers: usize,
    pub shadow_cascades: usize,
    pub shadow_casters: usize,
    pub shadow_draw_calls: usize,
    pub passes: usize,
}

/// Ordered list of render passes driven once per camera per frame
#[derive(Debug)]
pub struct RenderPipeline {
    passes: Vec<RenderPass>,
    culling_results: CullingResults,
    shadow_caster: CascadedShadowCaster,
    config: RenderConfig,
    arena: TextureArena,
}

impl RenderPipeline {
    /// Pipeline with the default pass; render targets it creates live in `arena`.
    pub fn new(config: RenderConfig, arena: TextureArena) -> Self {
        Self {
            passes: vec![RenderPass::new(DEFAULT_PASS, 0)],
            culling_results: CullingResults::new(),
            shadow_caster: CascadedShadowCaster::new(),
            config,
            arena,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderConfig {
        &mut self.config
    }

    pub fn arena(&self) -> &TextureArena {
        &self.arena
    }

    /// Visible elements of the last rendered frame
    pub fn culling_results(&self) -> &CullingResults {
        &self.culling_results
    }

    pub fn shadow_caster(&self) -> &CascadedShadowCaster {
        &self.shadow_caster
    }

    /// Add a pass; the list is re-sorted by priority afterwards.
    ///
    /// Pass names are unique within a pipeline.
    pub fn add_render_pass(&mut self, pass: RenderPass) -> RenderResult<()> {
        if self.passes.iter().any(|p| p.name == pass.name) {
            return Err(RenderError::InvalidConfiguration(format!(
                "render pass '{}' already exists",
                pass.name
            )));
        }
        log::debug!("Adding render pass '{}' at priority {}", pass.name, pass.priority);
        self.passes.push(pass);
        self.passes.sort_by_key(|p| p.priority);
        Ok(())
    }

    pub fn remove_render_pass(&mut self, name: &str) -> Option<RenderPass> {
        let index = self.passes.iter().position(|p| p.name == name)?;
        log::debug!("Removing render pass '{}'", name);
        Some(self.passes.remove(index))
    }

    /// First pass named `name`
    pub fn get_render_pass(&self, name: &str) -> Option<&RenderPass> {
        self.passes.iter().find(|p| p.name == name)
    }

    pub fn get_render_pass_mut(&mut self, name: &str) -> Option<&mut RenderPass> {
        self.passes.iter_mut().find(|p| p.name == name)
    }

    /// Passes in execution order
    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    /// Render one frame of `scene` as seen by `camera`.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &mut Scene,
        camera: &mut Camera,
    ) -> RenderResult<FrameStats> {
        scene.update_camera_priority(camera.id(), camera.priority);

        let surface = match camera.render_target() {
            Some(target) => Some((target.width(), target.height())),
            None => device.surface_size(),
        };
        match surface {
            Some((width, height)) => camera.update_surface_size(width, height),
            None => {
                // Every enabled pass must bring its own target; the first one sizes the camera.
                let mut first_target = None;
                for pass in self.passes.iter().filter(|p| p.enabled) {
                    match &pass.render_target {
                        Some(target) => {
                            first_target.get_or_insert((target.width(), target.height()));
                        }
                        None => return Err(RenderError::NoRenderTarget),
                    }
                }
                if let Some((width, height)) = first_target {
                    camera.update_surface_size(width, height);
                }
            }
        }

        let mut stats = FrameStats::default();

        let shadow = self.shadow_caster.render(
            device,
            &self.arena,
            scene,
            camera,
            &self.config.shadow,
            self.config.batching,
        )?;
        stats.shadow_cascades = shadow.cascades;
        stats.shadow_casters = shadow.casters;
        stats.shadow_draw_calls = shadow.draw_calls;

        scene.upload_lights();
        let view = RenderView::from_camera(camera);
        scene.shader_data.set_mat4(VIEW_MATRIX, view.view);
        scene.shader_data.set_mat4(PROJECTION_MATRIX, view.projection);
        scene
            .shader_data
            .set_mat4(VIEW_PROJECTION_MATRIX, view.view_projection);
        scene.shader_data.set_vec3(CAMERA_POSITION, view.position);

        self.culling_results.reset();
        let cull = scene.call_render(camera, &mut self.culling_results);
        self.culling_results.sort();
        stats.visible_renderers = cull.visible;
        stats.culled_renderers = cull.culled;
        stats.opaque_elements = self.culling_results.opaque.len();
        stats.alpha_test_elements = self.culling_results.alpha_test.len();
        stats.transparent_elements = self.culling_results.transparent.len();

        let context = RenderContext::new(view, &scene.shader_data, self.config.batching);
        for pass in self.passes.iter_mut().filter(|p| p.enabled) {
            pass.pre_render(device, &context, &self.culling_results);

            let target: Option<Arc<RenderTarget>> = pass
                .render_target
                .clone()
                .or_else(|| camera.render_target().cloned());
            let (width, height) = match &target {
                Some(target) => {
                    let handle = target.handle(device)?;
                    device.activate_render_target(Some(handle));
                    (target.width(), target.height())
                }
                None => {
                    let size = device.surface_size().ok_or(RenderError::NoRenderTarget)?;
                    device.activate_render_target(None);
                    size
                }
            };
            device.viewport(Viewport::from_normalized(camera.viewport(), width, height));

            let flags = pass.clear_flags.unwrap_or(camera.clear_flags);
            if !flags.is_empty() {
                let color = pass
                    .clear_color
                    .or(camera.background)
                    .unwrap_or(scene.background);
                device.clear_render_target(flags, color);
            }

            let draws = pass.render(device, &context, &self.culling_results)?;
            pass.post_render(device, &context, &self.culling_results);
            if let Some(target) = &target {
                target.finish_rendering(device)?;
            }

            log::trace!("Pass '{}': {} draws", pass.name, draws);
            stats.draw_calls += draws;
            stats.passes += 1;
        }

        Ok(stats)
    }

    /// Recreate device objects after device loss.
    ///
    /// Arena textures and pass targets are rebuilt too; calling this more than
    /// once per loss only replaces the render-target objects again.
    pub fn rebuild(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        self.arena.rebuild(device)?;
        for target in self.passes.iter().filter_map(|p| p.render_target.as_ref()) {
            target.rebuild(device)?;
        }
        self.shadow_caster.rebuild(device)
    }

    /// Release the shadow atlas. Pass targets belong to the caller.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.shadow_caster.destroy(device);
        self.culling_results.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClearFlags, DeviceCommand, HeadlessDevice};
    use crate::resources::{Material, Primitive};
    use crate::scene::{Renderer, Transform};
    use glam::{Vec3, Vec4};

    struct Counter {
        calls: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl CustomPass for Counter {
        fn pre_render(
            &mut self,
            _device: &mut dyn GraphicsDevice,
            _context: &RenderContext,
            _results: &CullingResults,
        ) {
            self.calls.lock().push("pre");
        }

        fn render(
            &mut self,
            _device: &mut dyn GraphicsDevice,
            _context: &RenderContext,
            results: &CullingResults,
        ) -> RenderResult<usize> {
            self.calls.lock().push("render");
            assert_eq!(results.len(), 1);
            Ok(0)
        }

        fn post_render(
            &mut self,
            _device: &mut dyn GraphicsDevice,
            _context: &RenderContext,
            _results: &CullingResults,
        ) {
            self.calls.lock().push("post");
        }
    }

    fn scene_with_cube() -> Scene {
        let mut scene = Scene::new();
        scene.add_renderer(Renderer::with_primitive(
            Transform::from_position(Vec3::new(0.0, 0.0, -5.0)),
            Arc::new(Primitive::cube()),
            Arc::new(Material::opaque("cube")),
        ));
        scene
    }

    #[test]
    fn test_passes_sorted_by_priority() {
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        pipeline.add_render_pass(RenderPass::new("post", 10)).unwrap();
        pipeline.add_render_pass(RenderPass::new("pre", -5)).unwrap();
        pipeline.add_render_pass(RenderPass::new("late", 10)).unwrap();

        let names: Vec<_> = pipeline.passes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pre", DEFAULT_PASS, "post", "late"]);

        assert!(pipeline.add_render_pass(RenderPass::new("pre", 3)).is_err());
        assert!(pipeline.get_render_pass("post").is_some());
        assert!(pipeline.remove_render_pass("post").is_some());
        assert!(pipeline.get_render_pass("post").is_none());
        assert!(pipeline.remove_render_pass("post").is_none());
    }

    #[test]
    fn test_no_target_without_surface_fails() {
        let mut device = HeadlessDevice::offscreen();
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        let mut scene = scene_with_cube();
        let mut camera = Camera::new(Transform::new());

        let result = pipeline.render(&mut device, &mut scene, &mut camera);
        assert_eq!(result, Err(RenderError::NoRenderTarget));
        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn test_custom_pass_hooks_run_in_order() {
        let mut device = HeadlessDevice::new(640, 480);
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        pipeline
            .add_render_pass(RenderPass::custom(
                "custom",
                1,
                Box::new(Counter {
                    calls: calls.clone(),
                }),
            ))
            .unwrap();
        let mut scene = scene_with_cube();
        let mut camera = Camera::new(Transform::new());

        let stats = pipeline.render(&mut device, &mut scene, &mut camera).unwrap();

        assert_eq!(*calls.lock(), vec!["pre", "render", "post"]);
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(camera.surface_size(), (640, 480));
    }

    #[test]
    fn test_disabled_pass_is_skipped() {
        let mut device = HeadlessDevice::new(640, 480);
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        pipeline.get_render_pass_mut(DEFAULT_PASS).unwrap().enabled = false;
        let mut scene = scene_with_cube();
        let mut camera = Camera::new(Transform::new());

        let stats = pipeline.render(&mut device, &mut scene, &mut camera).unwrap();

        assert_eq!(stats.passes, 0);
        assert_eq!(device.draw_count(), 0);
        assert_eq!(stats.opaque_elements, 1);
    }

    #[test]
    fn test_clear_color_falls_back_to_scene_background() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        let mut scene = scene_with_cube();
        scene.background = Vec4::new(0.1, 0.2, 0.3, 1.0);
        let mut camera = Camera::new(Transform::new());

        pipeline.render(&mut device, &mut scene, &mut camera).unwrap();
        assert!(device.commands().contains(&DeviceCommand::Clear {
            flags: ClearFlags::DEPTH_COLOR,
            color: scene.background,
        }));

        camera.background = Some(Vec4::ONE);
        pipeline
            .get_render_pass_mut(DEFAULT_PASS)
            .unwrap()
            .clear_flags = Some(ClearFlags::COLOR);
        device.take_commands();
        pipeline.render(&mut device, &mut scene, &mut camera).unwrap();
        assert!(device.commands().contains(&DeviceCommand::Clear {
            flags: ClearFlags::COLOR,
            color: Vec4::ONE,
        }));
    }

    #[test]
    fn test_camera_uniforms_uploaded() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut pipeline = RenderPipeline::new(RenderConfig::default(), TextureArena::new());
        let mut scene = scene_with_cube();
        let mut camera = Camera::new(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));

        pipeline.render(&mut device, &mut scene, &mut camera).unwrap();

        assert_eq!(scene.shader_data.mat4(VIEW_MATRIX), Some(camera.view_matrix()));
        assert_eq!(
            scene.shader_data.mat4(PROJECTION_MATRIX),
            Some(camera.projection_matrix())
        );
        let position = scene.shader_data.get(CAMERA_POSITION);
        assert_eq!(
            position,
            Some(&crate::shader_data::ShaderValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
        );
    }
}
