//! Render elements and render queues

use std::cmp::Ordering;
use std::sync::Arc;

use glam::Mat4;

use crate::backend::traits::GraphicsDevice;
use crate::backend::types::{DrawCall, ObjectUniform};
use crate::pipeline::RenderContext;
use crate::resources::{Material, Primitive, SubMesh};
use crate::scene::{Layer, Renderer, RendererElement, RendererId};

/// One draw candidate produced by a visibility pass
#[derive(Debug, Clone)]
pub struct RenderElement {
    pub renderer: RendererId,
    pub layer: Layer,
    pub priority: i32,
    /// Distance to the viewer, used for sorting
    pub distance: f32,
    pub receive_shadows: bool,
    pub world_matrix: Mat4,
    pub primitive: Arc<Primitive>,
    pub sub_mesh: Option<SubMesh>,
    pub material: Arc<Material>,
}

impl RenderElement {
    pub fn new(renderer: &Renderer, element: &RendererElement, world_matrix: Mat4, distance: f32) -> Self {
        Self {
            renderer: renderer.id(),
            layer: renderer.layer,
            priority: renderer.priority,
            distance,
            receive_shadows: renderer.receive_shadows,
            world_matrix,
            primitive: element.primitive.clone(),
            sub_mesh: element.sub_mesh,
            material: element.material.clone(),
        }
    }
}

/// Ordered list of render elements
///
/// The queue is mask-agnostic: layer masks are applied when it is rendered,
/// never by removing elements.
#[derive(Debug, Default)]
pub struct RenderQueue {
    elements: Vec<RenderElement>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn push(&mut self, element: RenderElement) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[RenderElement] {
        &self.elements
    }

    /// Stable sort with the given comparator.
    pub fn sort(&mut self, compare: fn(&RenderElement, &RenderElement) -> Ordering) {
        self.elements.sort_by(compare);
    }

    /// Priority ascending, then front to back.
    pub fn compare_for_opaque(a: &RenderElement, b: &RenderElement) -> Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.distance.total_cmp(&b.distance))
    }

    /// Priority ascending, then back to front.
    pub fn compare_for_transparent(a: &RenderElement, b: &RenderElement) -> Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.distance.total_cmp(&a.distance))
    }

    /// Submit every element whose layer intersects `mask`, in queue order.
    ///
    /// With a replacement material every element draws with it instead of its
    /// own. Returns the number of draw calls submitted.
    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        context: &RenderContext,
        replace_material: Option<&Arc<Material>>,
        mask: Layer,
    ) -> usize {
        let camera = context.view.uniform();
        let mut draws = 0;
        let mut pending: Option<(DrawCall, bool)> = None;

        for element in &self.elements {
            if !element.layer.intersects(mask) {
                continue;
            }
            let material = replace_material.unwrap_or(&element.material);
            let instance = ObjectUniform::from_model(element.world_matrix);

            if let Some((draw, receive_shadows)) = pending.as_mut() {
                let compatible = context.batching
                    && draw.material == material.id()
                    && draw.primitive == element.primitive.id()
                    && draw.sub_mesh == element.sub_mesh
                    && *receive_shadows == element.receive_shadows;
                if compatible {
                    draw.renderers.push(element.renderer);
                    draw.instances.push(instance);
                    continue;
                }
            }
            if let Some((draw, _)) = pending.take() {
                device.draw_primitive(&draw);
                draws += 1;
            }

            let prepared = material.prepare_drawing(context, element);
            pending = Some((
                DrawCall {
                    renderers: vec![element.renderer],
                    primitive: element.primitive.id(),
                    sub_mesh: element.sub_mesh,
                    material: material.id(),
                    shader: prepared.shader,
                    render_state: prepared.render_state,
                    macros: prepared.macros,
                    camera,
                    instances: vec![instance],
                },
                element.receive_shadows,
            ));
        }

        if let Some((draw, _)) = pending {
            device.draw_primitive(&draw);
            draws += 1;
        }
        draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use crate::pipeline::RenderView;
    use crate::scene::Transform;
    use crate::shader_data::ShaderData;

    fn element(priority: i32, distance: f32, material: &Arc<Material>, primitive: &Arc<Primitive>) -> RenderElement {
        let renderer = Renderer::with_primitive(Transform::new(), primitive.clone(), material.clone())
            .with_priority(priority);
        RenderElement::new(&renderer, &renderer.elements[0], Mat4::IDENTITY, distance)
    }

    fn context(shader_data: &ShaderData, batching: bool) -> RenderContext<'_> {
        RenderContext::new(RenderView::new(Mat4::IDENTITY, Mat4::IDENTITY), shader_data, batching)
    }

    #[test]
    fn test_opaque_sort_order() {
        let material = Arc::new(Material::opaque("m"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        queue.push(element(1, 1.0, &material, &primitive));
        queue.push(element(0, 9.0, &material, &primitive));
        queue.push(element(0, 2.0, &material, &primitive));
        queue.sort(RenderQueue::compare_for_opaque);

        let order: Vec<_> = queue.elements().iter().map(|e| (e.priority, e.distance)).collect();
        assert_eq!(order, vec![(0, 2.0), (0, 9.0), (1, 1.0)]);
    }

    #[test]
    fn test_transparent_sort_order() {
        let material = Arc::new(Material::transparent("m"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        queue.push(element(0, 2.0, &material, &primitive));
        queue.push(element(-1, 1.0, &material, &primitive));
        queue.push(element(0, 9.0, &material, &primitive));
        queue.sort(RenderQueue::compare_for_transparent);

        let order: Vec<_> = queue.elements().iter().map(|e| (e.priority, e.distance)).collect();
        assert_eq!(order, vec![(-1, 1.0), (0, 9.0), (0, 2.0)]);
    }

    #[test]
    fn test_sort_is_stable() {
        let material = Arc::new(Material::opaque("m"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        for _ in 0..8 {
            queue.push(element(0, 3.0, &material, &primitive));
        }
        let before: Vec<_> = queue.elements().iter().map(|e| e.renderer).collect();
        queue.sort(RenderQueue::compare_for_opaque);
        let after: Vec<_> = queue.elements().iter().map(|e| e.renderer).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_masked_elements_are_skipped() {
        let material = Arc::new(Material::opaque("m"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        queue.push(element(0, 1.0, &material, &primitive));
        queue.push(element(0, 2.0, &material, &primitive));

        let shader_data = ShaderData::new();
        let mut device = HeadlessDevice::offscreen();
        let draws = queue.render(&mut device, &context(&shader_data, true), None, Layer::LAYER5);

        assert_eq!(draws, 0);
        assert_eq!(device.draw_count(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_batching_coalesces_adjacent_elements() {
        let material = Arc::new(Material::opaque("m"));
        let other = Arc::new(Material::opaque("n"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        queue.push(element(0, 1.0, &material, &primitive));
        queue.push(element(0, 2.0, &material, &primitive));
        queue.push(element(0, 3.0, &other, &primitive));
        queue.push(element(0, 4.0, &material, &primitive));

        let shader_data = ShaderData::new();
        let mut device = HeadlessDevice::offscreen();
        assert_eq!(queue.render(&mut device, &context(&shader_data, true), None, Layer::EVERYTHING), 3);
        let instances: Vec<_> = device.draw_calls().map(|d| d.instance_count()).collect();
        assert_eq!(instances, vec![2, 1, 1]);

        let mut device = HeadlessDevice::offscreen();
        assert_eq!(queue.render(&mut device, &context(&shader_data, false), None, Layer::EVERYTHING), 4);
    }

    #[test]
    fn test_replacement_material() {
        let material = Arc::new(Material::opaque("m"));
        let other = Arc::new(Material::opaque("n"));
        let primitive = Arc::new(Primitive::cube());
        let mut queue = RenderQueue::new();
        queue.push(element(0, 1.0, &material, &primitive));
        queue.push(element(0, 2.0, &other, &primitive));

        let replacement = Material::shadow_caster();
        let shader_data = ShaderData::new();
        let mut device = HeadlessDevice::offscreen();
        let draws = queue.render(
            &mut device,
            &context(&shader_data, true),
            Some(&replacement),
            Layer::EVERYTHING,
        );

        assert_eq!(draws, 1);
        let draw = device.draw_calls().next().unwrap();
        assert_eq!(draw.material, replacement.id());
        assert_eq!(draw.instance_count(), 2);
    }
}
