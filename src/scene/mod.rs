//! Scene management
//!
//! The scene is the collaborator the pipeline asks for visible content: it
//! owns renderers and lights, the scene-global shader data and the list of
//! active cameras.

mod camera;
mod light;
mod renderer;
mod transform;

pub use camera::*;
pub use light::*;
pub use renderer::*;
pub use transform::*;

use glam::{Vec3, Vec4};

use crate::pipeline::{CullingResults, RenderElement};
use crate::shader_data::{ShaderData, ShaderProperty, ShaderValue};

pub const LIGHT_DATA: ShaderProperty = ShaderProperty::new("u_lights");
pub const LIGHT_COUNT: ShaderProperty = ShaderProperty::new("u_lightCount");
pub const AMBIENT_LIGHT: ShaderProperty = ShaderProperty::new("u_ambientLight");

/// Outcome of a visibility pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    /// Renderers that pushed at least one element
    pub visible: usize,
    /// Renderers rejected by the camera frustum
    pub culled: usize,
}

/// The scene containing all renderable content
#[derive(Debug)]
pub struct Scene {
    renderers: Vec<Renderer>,
    lights: Vec<Light>,
    sun: Option<usize>,
    active_cameras: Vec<(CameraId, i32)>,
    pub shader_data: ShaderData,
    pub background: Vec4,
    pub ambient_light: Vec3,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            renderers: Vec::new(),
            lights: Vec::new(),
            sun: None,
            active_cameras: Vec::new(),
            shader_data: ShaderData::new(),
            background: Vec4::new(0.25, 0.25, 0.25, 1.0),
            ambient_light: Vec3::new(0.03, 0.03, 0.03),
        }
    }

    /// Add a renderer to the scene
    pub fn add_renderer(&mut self, renderer: Renderer) -> RendererId {
        let id = renderer.id();
        self.renderers.push(renderer);
        id
    }

    pub fn remove_renderer(&mut self, id: RendererId) -> Option<Renderer> {
        let index = self.renderers.iter().position(|r| r.id() == id)?;
        Some(self.renderers.remove(index))
    }

    pub fn renderer(&self, id: RendererId) -> Option<&Renderer> {
        self.renderers.iter().find(|r| r.id() == id)
    }

    pub fn renderer_mut(&mut self, id: RendererId) -> Option<&mut Renderer> {
        self.renderers.iter_mut().find(|r| r.id() == id)
    }

    pub fn renderers(&self) -> &[Renderer] {
        &self.renderers
    }

    /// Add a light, returning its index
    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn add_directional_light(&mut self, light: DirectionalLight) -> usize {
        self.add_light(Light::Directional(light))
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    /// Use the directional light at `index` as the sun; `None` picks one automatically.
    pub fn set_sun(&mut self, index: Option<usize>) {
        self.sun = index;
    }

    fn directional(&self, index: usize) -> Option<&DirectionalLight> {
        match self.lights.get(index) {
            Some(Light::Directional(light)) => Some(light),
            _ => None,
        }
    }

    fn sun_index(&self) -> Option<usize> {
        let enabled = |i: &usize| self.directional(*i).is_some_and(|l| l.enabled);
        if let Some(index) = self.sun.filter(enabled) {
            return Some(index);
        }
        let casting = (0..self.lights.len())
            .find(|&i| self.directional(i).is_some_and(|l| l.casts_shadows()));
        casting.or_else(|| (0..self.lights.len()).find(enabled))
    }

    /// The sun: the explicit choice while it is enabled, otherwise the first
    /// shadow-casting directional light, otherwise the first enabled one.
    pub fn sun_light(&self) -> Option<&DirectionalLight> {
        self.directional(self.sun_index()?)
    }

    /// Up to `limit` shadow-casting directional lights, the sun first.
    pub fn shadow_lights(&self, limit: usize) -> Vec<&DirectionalLight> {
        let sun = self.sun_index();
        sun.into_iter()
            .chain((0..self.lights.len()).filter(|&i| Some(i) != sun))
            .filter_map(|i| self.directional(i))
            .filter(|light| light.casts_shadows())
            .take(limit)
            .collect()
    }

    /// Refresh the render order of an active camera after its priority changed.
    pub(crate) fn update_camera_priority(&mut self, id: CameraId, priority: i32) {
        let Some(entry) = self.active_cameras.iter_mut().find(|(c, _)| *c == id) else {
            return;
        };
        if entry.1 != priority {
            entry.1 = priority;
            self.active_cameras.sort_by_key(|(_, priority)| *priority);
        }
    }

    pub(crate) fn attach_camera(&mut self, id: CameraId, priority: i32) {
        if self.active_cameras.iter().any(|(c, _)| *c == id) {
            return;
        }
        self.active_cameras.push((id, priority));
        self.active_cameras.sort_by_key(|(_, priority)| *priority);
    }

    pub(crate) fn detach_camera(&mut self, id: CameraId) {
        self.active_cameras.retain(|(c, _)| *c != id);
    }

    /// Active cameras in render order (ascending priority)
    pub fn active_cameras(&self) -> Vec<CameraId> {
        self.active_cameras.iter().map(|(id, _)| *id).collect()
    }

    /// Upload enabled lights and the ambient term into the scene shader data.
    pub fn upload_lights(&mut self) {
        let lights: Vec<Vec4> = self
            .lights
            .iter()
            .filter(|l| l.is_enabled())
            .flat_map(|l| l.to_gpu_data().to_vec4s())
            .collect();
        let count = (lights.len() / 4) as i32;
        self.shader_data.set(LIGHT_DATA, ShaderValue::Vec4Array(lights));
        self.shader_data.set_int(LIGHT_COUNT, count);
        self.shader_data.set_vec3(AMBIENT_LIGHT, self.ambient_light);
    }

    /// Push the elements of every renderer `camera` can see into `results`.
    pub fn call_render(&self, camera: &Camera, results: &mut CullingResults) -> CullStats {
        let mut stats = CullStats::default();
        let frustum = camera.enable_frustum_culling.then(|| camera.frustum());
        let position = camera.position();
        let forward = camera.forward();

        for renderer in &self.renderers {
            if !renderer.enabled || renderer.elements.is_empty() {
                continue;
            }
            if !renderer.layer.intersects(camera.culling_mask) {
                continue;
            }
            let bounds = renderer.world_bounds();
            if let Some(frustum) = &frustum {
                if !frustum.intersects_box(&bounds) {
                    stats.culled += 1;
                    continue;
                }
            }

            let distance = if camera.is_orthographic() {
                (bounds.center() - position).dot(forward)
            } else {
                bounds.center().distance(position)
            };
            let world_matrix = renderer.transform.world_matrix();
            for element in &renderer.elements {
                results.push(RenderElement::new(renderer, element, world_matrix, distance));
            }
            stats.visible += 1;
        }
        stats
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
