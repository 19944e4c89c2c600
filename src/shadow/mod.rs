//! Cascaded shadow maps
//!
//! The sun light renders every shadow caster into one depth atlas, one tile
//! per cascade. Receivers find the atlas, the per-cascade matrices and the
//! cascade count in the scene shader data after [`CascadedShadowCaster::render`].

mod settings;
mod slice;
pub mod utils;

pub use settings::*;
pub use slice::*;

use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::backend::traits::GraphicsDevice;
use crate::backend::types::{ClearFlags, ScissorRect, TextureFormat, Viewport};
use crate::error::{RenderError, RenderResult};
use crate::math::box_intersects_planes;
use crate::pipeline::{CullingResults, RenderContext, RenderElement, RenderView};
use crate::resources::{
    ColorAttachment, DepthAttachment, Material, RenderTarget, RenderTargetDesc, TextureArena,
    TextureId,
};
use crate::scene::{Camera, DirectionalLight, Layer, Scene, ShadowType};
use crate::shader_data::{ShaderProperty, ShaderValue};
use utils::{
    light_cull_planes, light_matrices, slice_bounding_sphere, slice_corners, split_distances,
    AtlasLayout, SHADOW_COORDINATE_MATRIX,
};

/// Macro carrying the number of rendered cascades, absent when no map was rendered
pub const SHADOW_MAP_COUNT_MACRO: &str = "CASCADED_SHADOW_MAP_COUNT";
/// Macro carrying the filter mode: 1 hard, 2 soft low, 3 soft high
pub const SHADOW_TYPE_MACRO: &str = "CASCADED_SHADOW_TYPE";
/// Set when depth is packed into an RGBA8 color attachment
pub const PACKED_DEPTH_MACRO: &str = "SHADOW_PACKED_DEPTH";

/// Lights producing a shadow map per frame
pub const MAX_SHADOW: usize = 1;
pub const MAX_CASCADES: usize = 4;

pub const VIEW_PROJ_FROM_LIGHT: ShaderProperty = ShaderProperty::new("u_viewProjMatFromLight");
/// Atlas matrices, one per cascade plus a trailing zero matrix
pub const SHADOW_MATRICES: ShaderProperty = ShaderProperty::new("u_shadowMatrices");
/// xyz = center, w = squared radius
pub const SHADOW_SPLIT_SPHERES: ShaderProperty = ShaderProperty::new("u_shadowSplitSpheres");
/// x = strength, y = tile size, z = near plane, w = cascade count
pub const SHADOW_INFO: ShaderProperty = ShaderProperty::new("u_shadowInfo");
/// (1 / width, 1 / height, width, height)
pub const SHADOW_MAP_SIZE: ShaderProperty = ShaderProperty::new("u_shadowMapSize");
/// x = depth bias, y = normal bias, both in world units
pub const SHADOW_BIAS: ShaderProperty = ShaderProperty::new("u_shadowBias");
pub const LIGHT_DIRECTION: ShaderProperty = ShaderProperty::new("u_lightDirection");
pub const SHADOW_MAP: ShaderProperty = ShaderProperty::new("u_shadowMap");

/// What a shadow pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowStats {
    pub cascades: usize,
    /// Caster renderers drawn, summed over cascades
    pub casters: usize,
    pub draw_calls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AtlasKey {
    resolution: u32,
    cascades: usize,
    packed: bool,
}

#[derive(Debug)]
struct Atlas {
    target: RenderTarget,
    key: AtlasKey,
    layout: AtlasLayout,
    shadow_map: TextureId,
}

/// Renders the sun's cascaded shadow atlas
#[derive(Debug)]
pub struct CascadedShadowCaster {
    atlas: Option<Atlas>,
    results: CullingResults,
    packed_material: Arc<Material>,
    slices: Vec<ShadowSliceData>,
}

impl CascadedShadowCaster {
    pub fn new() -> Self {
        let mut packed = Material::new("shadow-caster-packed", "shadow-map");
        packed.shader_data.enable_macro(PACKED_DEPTH_MACRO, None);
        Self {
            atlas: None,
            results: CullingResults::new(),
            packed_material: Arc::new(packed),
            slices: Vec::new(),
        }
    }

    /// Atlas texture receivers sample, once a shadow pass has run
    pub fn shadow_map(&self) -> Option<TextureId> {
        self.atlas.as_ref().map(|atlas| atlas.shadow_map)
    }

    pub fn atlas_size(&self) -> Option<(u32, u32)> {
        self.atlas
            .as_ref()
            .map(|atlas| (atlas.layout.width, atlas.layout.height))
    }

    /// Cascades rendered by the last shadow pass
    pub fn slices(&self) -> &[ShadowSliceData] {
        &self.slices
    }

    /// Render the shadow atlas for `camera` and publish receiver data into the scene.
    ///
    /// Without a shadow-casting sun the cascade macro is removed and nothing
    /// is rendered.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        arena: &TextureArena,
        scene: &mut Scene,
        camera: &Camera,
        settings: &ShadowSettings,
        batching: bool,
    ) -> RenderResult<ShadowStats> {
        self.slices.clear();
        if !settings.enabled {
            clear_receivers(scene);
            return Ok(ShadowStats::default());
        }
        settings.validate()?;

        let casting = scene.shadow_lights(usize::MAX).len();
        if casting > MAX_SHADOW {
            log::trace!(
                "{} shadow casting lights, only {} get a shadow map",
                casting,
                MAX_SHADOW
            );
        }
        let sun = scene.shadow_lights(MAX_SHADOW).first().map(|&light| light.clone());
        let light = match sun {
            Some(light) => light,
            None => {
                log::trace!("No shadow casting light, skipping shadow pass");
                clear_receivers(scene);
                return Ok(ShadowStats::default());
            }
        };

        let near = camera.near_clip_plane();
        let far = settings.distance.min(camera.far_clip_plane());
        if far <= near {
            log::debug!("Shadow distance {} is inside the near plane {}", far, near);
            clear_receivers(scene);
            return Ok(ShadowStats::default());
        }

        let cascades = settings.cascades.count();
        let splits = split_distances(near, far, cascades, settings.splits);
        log::trace!("Cascade splits {:?}", splits);

        self.ensure_atlas(device, arena, settings.resolution.pixels(), cascades)?;
        let Some(atlas) = self.atlas.as_ref() else {
            return Err(RenderError::InvalidHandle("shadow atlas".to_string()));
        };
        let layout = atlas.layout;
        let material = if atlas.key.packed {
            self.packed_material.clone()
        } else {
            Material::shadow_caster()
        };

        let handle = atlas.target.handle(device)?;
        device.activate_render_target(Some(handle));
        let clear = if atlas.key.packed {
            ClearFlags::DEPTH_COLOR
        } else {
            ClearFlags::DEPTH
        };
        device.clear_render_target(clear, Vec4::ONE);

        let mut stats = ShadowStats {
            cascades,
            ..Default::default()
        };
        for index in 0..cascades {
            let (slice_near, slice_far) = (splits[index], splits[index + 1]);
            let sphere = slice_bounding_sphere(camera, slice_near, slice_far);
            let corners = slice_corners(camera, slice_near, slice_far);
            let cull_planes = light_cull_planes(&corners, light.direction);
            let (view, projection, texel_size) =
                light_matrices(&sphere, light.direction, layout.tile, light.shadow_near_plane);
            let offset = layout.tile_offset(index);

            device.viewport(Viewport::new(
                offset.x as f32,
                offset.y as f32,
                layout.tile as f32,
                layout.tile as f32,
            ));
            if cascades > 1 {
                // One texel stays untouched around each tile so filtering never bleeds.
                let inner = layout.tile.saturating_sub(2);
                device.scissor(Some(ScissorRect::new(offset.x + 1, offset.y + 1, inner, inner)));
            }

            self.results.reset();
            let mut casters = 0;
            for renderer in scene.renderers() {
                if !renderer.enabled || !renderer.cast_shadows || renderer.elements.is_empty() {
                    continue;
                }
                let bounds = renderer.world_bounds();
                if !box_intersects_planes(&cull_planes, &bounds) {
                    continue;
                }
                let distance = (bounds.center() - sphere.center).dot(light.direction);
                let world_matrix = renderer.transform.world_matrix();
                for element in &renderer.elements {
                    self.results
                        .push(RenderElement::new(renderer, element, world_matrix, distance));
                }
                casters += 1;
            }
            self.results.sort();

            let context = RenderContext::new(
                RenderView::new(view, projection),
                &scene.shader_data,
                batching,
            );
            let mut draws = self
                .results
                .opaque
                .render(device, &context, Some(&material), Layer::EVERYTHING);
            draws += self
                .results
                .alpha_test
                .render(device, &context, Some(&material), Layer::EVERYTHING);
            log::trace!(
                "Cascade {} [{:.2}, {:.2}]: {} casters, {} draws",
                index,
                slice_near,
                slice_far,
                casters,
                draws
            );
            stats.casters += casters;
            stats.draw_calls += draws;

            self.slices.push(ShadowSliceData::new(
                view,
                projection,
                texel_size,
                sphere,
                cull_planes,
                layout.tile,
                offset,
            ));
        }

        if cascades > 1 {
            device.scissor(None);
        }
        atlas.target.finish_rendering(device)?;
        self.results.reset();

        upload_receivers(scene, &light, atlas, &self.slices);
        Ok(stats)
    }

    /// Release the atlas.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(atlas) = self.atlas.take() {
            atlas.target.destroy(device);
        }
        self.slices.clear();
    }

    /// Recreate the atlas device object after device loss.
    pub fn rebuild(&self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        if let Some(atlas) = &self.atlas {
            atlas.target.rebuild(device)?;
        }
        Ok(())
    }

    fn ensure_atlas(
        &mut self,
        device: &mut dyn GraphicsDevice,
        arena: &TextureArena,
        resolution: u32,
        cascades: usize,
    ) -> RenderResult<()> {
        let packed = !device
            .capabilities()
            .supports_format(TextureFormat::Depth32Float);
        let key = AtlasKey {
            resolution,
            cascades,
            packed,
        };
        if let Some(atlas) = &self.atlas {
            if atlas.key == key && !atlas.target.is_destroyed() {
                return Ok(());
            }
        }
        if let Some(old) = self.atlas.take() {
            old.target.destroy(device);
        }

        let layout = AtlasLayout::new(resolution, cascades);
        let desc = RenderTargetDesc::new(layout.width, layout.height).with_label("shadow-atlas");
        let desc = if packed {
            desc.with_color(ColorAttachment::Create(TextureFormat::Rgba8Unorm))
                .with_depth(DepthAttachment::RenderBuffer(TextureFormat::Depth24Plus))
        } else {
            desc.with_depth(DepthAttachment::CreateTexture(TextureFormat::Depth32Float))
        };
        let target = RenderTarget::new(device, arena, desc)?;
        let Some(shadow_map) = target.depth_texture().or_else(|| target.color_texture(0)) else {
            target.destroy(device);
            return Err(RenderError::InvalidHandle("shadow atlas texture".to_string()));
        };

        log::debug!(
            "Shadow atlas {}x{}: {} cascades of {} texels{}",
            layout.width,
            layout.height,
            cascades,
            layout.tile,
            if packed { ", packed depth" } else { "" }
        );
        self.atlas = Some(Atlas {
            target,
            key,
            layout,
            shadow_map,
        });
        Ok(())
    }
}

impl Default for CascadedShadowCaster {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_receivers(scene: &mut Scene) {
    scene.shader_data.disable_macro(SHADOW_MAP_COUNT_MACRO);
    scene.shader_data.disable_macro(SHADOW_TYPE_MACRO);
    scene.shader_data.disable_macro(PACKED_DEPTH_MACRO);
}

fn upload_receivers(
    scene: &mut Scene,
    light: &DirectionalLight,
    atlas: &Atlas,
    slices: &[ShadowSliceData],
) {
    let layout = atlas.layout;

    let mut shadow_matrices: Vec<Mat4> = slices
        .iter()
        .enumerate()
        .map(|(i, slice)| layout.slice_transform(i) * SHADOW_COORDINATE_MATRIX * slice.view_projection)
        .collect();
    // Fragments beyond the last cascade select the zero matrix.
    shadow_matrices.resize(MAX_CASCADES + 1, Mat4::ZERO);

    let mut spheres: Vec<Vec4> = slices
        .iter()
        .map(|slice| slice.sphere.center.extend(slice.sphere.radius * slice.sphere.radius))
        .collect();
    spheres.resize(MAX_CASCADES, Vec4::ZERO);

    let bias: Vec<Vec4> = slices
        .iter()
        .map(|slice| {
            Vec4::new(
                light.shadow_bias * slice.texel_size,
                light.shadow_normal_bias * slice.texel_size,
                0.0,
                0.0,
            )
        })
        .collect();

    let (width, height) = (layout.width as f32, layout.height as f32);
    let shadow_type = match light.shadow_type {
        ShadowType::None => 0,
        ShadowType::Hard => 1,
        ShadowType::SoftLow => 2,
        ShadowType::SoftHigh => 3,
    };

    let data = &mut scene.shader_data;
    data.set(
        VIEW_PROJ_FROM_LIGHT,
        ShaderValue::Mat4Array(slices.iter().map(|slice| slice.view_projection).collect()),
    );
    data.set(SHADOW_MATRICES, ShaderValue::Mat4Array(shadow_matrices));
    data.set(SHADOW_SPLIT_SPHERES, ShaderValue::Vec4Array(spheres));
    data.set(SHADOW_BIAS, ShaderValue::Vec4Array(bias));
    data.set_vec4(
        SHADOW_INFO,
        Vec4::new(
            light.shadow_strength,
            layout.tile as f32,
            light.shadow_near_plane,
            slices.len() as f32,
        ),
    );
    data.set_vec4(SHADOW_MAP_SIZE, Vec4::new(1.0 / width, 1.0 / height, width, height));
    data.set_vec3(LIGHT_DIRECTION, light.direction);
    data.set_texture(SHADOW_MAP, atlas.shadow_map);

    data.enable_macro(SHADOW_MAP_COUNT_MACRO, Some(slices.len().to_string()));
    data.enable_macro(SHADOW_TYPE_MACRO, Some(shadow_type.to_string()));
    if atlas.key.packed {
        data.enable_macro(PACKED_DEPTH_MACRO, None);
    } else {
        data.disable_macro(PACKED_DEPTH_MACRO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCapabilities, DeviceCommand, HeadlessDevice};
    use crate::resources::Primitive;
    use crate::scene::{Renderer, Transform};
    use glam::Vec3;

    fn shadow_scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_directional_light(
            DirectionalLight::new(Vec3::new(0.3, -1.0, 0.2), Vec3::ONE, 1.0)
                .with_shadows(ShadowType::SoftLow),
        );
        let caster = Renderer::with_primitive(
            Transform::from_position(Vec3::new(0.0, 0.0, -5.0)),
            Arc::new(Primitive::cube()),
            Arc::new(Material::opaque("caster")),
        )
        .with_cast_shadows(true);
        scene.add_renderer(caster);
        scene
    }

    fn camera() -> Camera {
        let mut camera = Camera::new(Transform::new());
        camera.update_surface_size(1280, 720);
        camera
    }

    #[test]
    fn test_renders_cascades_and_publishes_receiver_data() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let mut caster = CascadedShadowCaster::new();

        let stats = caster
            .render(&mut device, &arena, &mut scene, &camera(), &ShadowSettings::default(), true)
            .unwrap();

        assert_eq!(stats.cascades, 2);
        assert!(stats.casters >= 1);
        assert_eq!(stats.draw_calls, stats.casters);
        assert_eq!(caster.slices().len(), 2);
        assert_eq!(caster.atlas_size(), Some((1024, 512)));

        let data = &scene.shader_data;
        assert_eq!(data.macro_value(SHADOW_MAP_COUNT_MACRO), Some("2"));
        assert_eq!(data.macro_value(SHADOW_TYPE_MACRO), Some("2"));
        assert!(!data.has_macro(PACKED_DEPTH_MACRO));

        let matrices = data.mat4_array(SHADOW_MATRICES).unwrap();
        assert_eq!(matrices.len(), MAX_CASCADES + 1);
        assert_eq!(matrices[4], Mat4::ZERO);
        assert_eq!(data.mat4_array(VIEW_PROJ_FROM_LIGHT).unwrap().len(), 2);
        assert_eq!(data.vec4_array(SHADOW_SPLIT_SPHERES).unwrap().len(), MAX_CASCADES);
        assert_eq!(data.vec4(SHADOW_INFO).unwrap().w, 2.0);
        assert_eq!(data.texture(SHADOW_MAP), caster.shadow_map());

        let shadow_caster = Material::shadow_caster();
        assert!(device.draw_calls().all(|draw| draw.material == shadow_caster.id()));
        assert!(device
            .commands()
            .iter()
            .any(|c| matches!(c, DeviceCommand::Scissor(Some(_)))));
        assert_eq!(device.commands().last(), Some(&DeviceCommand::Scissor(None)));

        caster.destroy(&mut device);
        assert_eq!(device.live_render_target_count(), 0);
    }

    #[test]
    fn test_without_shadow_light_macro_is_cleared() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let mut caster = CascadedShadowCaster::new();
        let settings = ShadowSettings::default();

        caster
            .render(&mut device, &arena, &mut scene, &camera(), &settings, true)
            .unwrap();
        assert!(scene.shader_data.has_macro(SHADOW_MAP_COUNT_MACRO));

        if let Some(crate::scene::Light::Directional(light)) = scene.light_mut(0) {
            light.shadow_type = ShadowType::None;
        }
        let stats = caster
            .render(&mut device, &arena, &mut scene, &camera(), &settings, true)
            .unwrap();

        assert_eq!(stats, ShadowStats::default());
        assert!(!scene.shader_data.has_macro(SHADOW_MAP_COUNT_MACRO));
        assert!(caster.slices().is_empty());
        caster.destroy(&mut device);
    }

    #[test]
    fn test_atlas_rebuilt_only_on_settings_change() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let mut caster = CascadedShadowCaster::new();
        let mut settings = ShadowSettings::default();
        let created = |device: &HeadlessDevice| {
            device
                .commands()
                .iter()
                .filter(|c| matches!(c, DeviceCommand::CreateRenderTarget(_)))
                .count()
        };

        for _ in 0..3 {
            caster
                .render(&mut device, &arena, &mut scene, &camera(), &settings, true)
                .unwrap();
        }
        assert_eq!(created(&device), 1);

        settings.cascades = ShadowCascades::Four;
        settings.resolution = ShadowResolution::High;
        caster
            .render(&mut device, &arena, &mut scene, &camera(), &settings, true)
            .unwrap();
        assert_eq!(created(&device), 2);
        assert_eq!(caster.atlas_size(), Some((2048, 2048)));
        assert_eq!(device.live_render_target_count(), 1);
        assert_eq!(scene.shader_data.macro_value(SHADOW_MAP_COUNT_MACRO), Some("4"));

        caster.destroy(&mut device);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_single_cascade_uses_no_scissor() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let mut caster = CascadedShadowCaster::new();
        let settings = ShadowSettings {
            cascades: ShadowCascades::One,
            ..Default::default()
        };

        caster
            .render(&mut device, &arena, &mut scene, &camera(), &settings, true)
            .unwrap();

        assert!(!device
            .commands()
            .iter()
            .any(|c| matches!(c, DeviceCommand::Scissor(_))));
        assert_eq!(caster.atlas_size(), Some((1024, 1024)));
        caster.destroy(&mut device);
    }

    #[test]
    fn test_packed_depth_fallback() {
        let mut device = HeadlessDevice::offscreen().with_capabilities(DeviceCapabilities {
            depth_texture: false,
            ..Default::default()
        });
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let mut caster = CascadedShadowCaster::new();

        caster
            .render(&mut device, &arena, &mut scene, &camera(), &ShadowSettings::default(), true)
            .unwrap();

        let map = caster.shadow_map().unwrap();
        assert_eq!(arena.descriptor(map).unwrap().format, TextureFormat::Rgba8Unorm);
        assert!(scene.shader_data.has_macro(PACKED_DEPTH_MACRO));
        assert!(device.draw_calls().all(|draw| draw.macros.iter().any(|m| m == PACKED_DEPTH_MACRO)));
        assert!(device.commands().iter().any(|c| matches!(
            c,
            DeviceCommand::Clear { flags, .. } if *flags == ClearFlags::DEPTH_COLOR
        )));
        caster.destroy(&mut device);
    }

    #[test]
    fn test_non_casters_are_skipped() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let id = scene.renderers()[0].id();
        scene.renderer_mut(id).unwrap().cast_shadows = false;
        let mut caster = CascadedShadowCaster::new();

        let stats = caster
            .render(&mut device, &arena, &mut scene, &camera(), &ShadowSettings::default(), true)
            .unwrap();

        assert_eq!(stats.casters, 0);
        assert_eq!(device.draw_count(), 0);
        assert!(scene.shader_data.has_macro(SHADOW_MAP_COUNT_MACRO));
        caster.destroy(&mut device);
    }

    #[test]
    fn test_only_one_light_gets_a_shadow_map() {
        let mut device = HeadlessDevice::offscreen();
        let arena = TextureArena::new();
        let mut scene = shadow_scene();
        let sun = scene.add_directional_light(
            DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0).with_shadows(ShadowType::Hard),
        );
        scene.add_directional_light(
            DirectionalLight::new(Vec3::NEG_X, Vec3::ONE, 1.0).with_shadows(ShadowType::Hard),
        );
        scene.set_sun(Some(sun));
        let mut caster = CascadedShadowCaster::new();

        let stats = caster
            .render(&mut device, &arena, &mut scene, &camera(), &ShadowSettings::default(), true)
            .unwrap();

        assert_eq!(MAX_SHADOW, 1);
        assert_eq!(stats.cascades, 2);
        assert_eq!(caster.slices().len(), 2);
        assert_eq!(device.live_render_target_count(), 1);
        assert_eq!(
            scene.shader_data.get(LIGHT_DIRECTION),
            Some(&ShaderValue::Vec3(Vec3::NEG_Y))
        );
        assert_eq!(scene.shader_data.macro_value(SHADOW_TYPE_MACRO), Some("1"));
        caster.destroy(&mut device);
    }
}
