//! Visibility pass output

use crate::pipeline::{RenderElement, RenderQueue};
use crate::resources::RenderQueueType;

/// Visible elements split by queue type
#[derive(Debug, Default)]
pub struct CullingResults {
    pub opaque: RenderQueue,
    pub alpha_test: RenderQueue,
    pub transparent: RenderQueue,
}

impl CullingResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.opaque.clear();
        self.alpha_test.clear();
        self.transparent.clear();
    }

    /// Dispatch an element to the queue its material belongs to.
    pub fn push(&mut self, element: RenderElement) {
        match element.material.queue_type {
            RenderQueueType::Opaque => self.opaque.push(element),
            RenderQueueType::AlphaTest => self.alpha_test.push(element),
            RenderQueueType::Transparent => self.transparent.push(element),
        }
    }

    pub fn sort(&mut self) {
        self.opaque.sort(RenderQueue::compare_for_opaque);
        self.alpha_test.sort(RenderQueue::compare_for_opaque);
        self.transparent.sort(RenderQueue::compare_for_transparent);
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.alpha_test.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Primitive};
    use crate::scene::{Renderer, Transform};
    use glam::Mat4;
    use std::sync::Arc;

    #[test]
    fn test_push_dispatches_by_queue_type() {
        let primitive = Arc::new(Primitive::cube());
        let mut results = CullingResults::new();
        for material in [
            Material::opaque("a"),
            Material::alpha_test("b", 0.5),
            Material::transparent("c"),
            Material::transparent("d"),
        ] {
            let renderer = Renderer::with_primitive(Transform::new(), primitive.clone(), Arc::new(material));
            results.push(RenderElement::new(&renderer, &renderer.elements[0], Mat4::IDENTITY, 1.0));
        }

        assert_eq!(results.opaque.len(), 1);
        assert_eq!(results.alpha_test.len(), 1);
        assert_eq!(results.transparent.len(), 2);

        results.reset();
        assert!(results.is_empty());
    }
}
