//! Named shader-global values and macros
//!
//! The render core does not compile shaders. It publishes values (matrices,
//! light data, shadow atlas information) and macros under well-known names;
//! the material system resolves them when it binds a shader variant.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::resources::TextureId;

/// Name of a shader property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderProperty(&'static str);

impl ShaderProperty {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// A shader property value
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
    Texture(TextureId),
}

/// Property map plus enabled macros
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderData {
    values: HashMap<ShaderProperty, ShaderValue>,
    macros: BTreeMap<String, Option<String>>,
}

impl ShaderData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: ShaderProperty, value: ShaderValue) {
        self.values.insert(property, value);
    }

    pub fn get(&self, property: ShaderProperty) -> Option<&ShaderValue> {
        self.values.get(&property)
    }

    pub fn remove(&mut self, property: ShaderProperty) -> Option<ShaderValue> {
        self.values.remove(&property)
    }

    pub fn set_float(&mut self, property: ShaderProperty, value: f32) {
        self.set(property, ShaderValue::Float(value));
    }

    pub fn set_int(&mut self, property: ShaderProperty, value: i32) {
        self.set(property, ShaderValue::Int(value));
    }

    pub fn set_vec2(&mut self, property: ShaderProperty, value: Vec2) {
        self.set(property, ShaderValue::Vec2(value));
    }

    pub fn set_vec3(&mut self, property: ShaderProperty, value: Vec3) {
        self.set(property, ShaderValue::Vec3(value));
    }

    pub fn set_vec4(&mut self, property: ShaderProperty, value: Vec4) {
        self.set(property, ShaderValue::Vec4(value));
    }

    pub fn set_mat4(&mut self, property: ShaderProperty, value: Mat4) {
        self.set(property, ShaderValue::Mat4(value));
    }

    pub fn set_texture(&mut self, property: ShaderProperty, value: TextureId) {
        self.set(property, ShaderValue::Texture(value));
    }

    pub fn float(&self, property: ShaderProperty) -> Option<f32> {
        match self.get(property) {
            Some(ShaderValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn int(&self, property: ShaderProperty) -> Option<i32> {
        match self.get(property) {
            Some(ShaderValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vec4(&self, property: ShaderProperty) -> Option<Vec4> {
        match self.get(property) {
            Some(ShaderValue::Vec4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn mat4(&self, property: ShaderProperty) -> Option<Mat4> {
        match self.get(property) {
            Some(ShaderValue::Mat4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vec4_array(&self, property: ShaderProperty) -> Option<&[Vec4]> {
        match self.get(property) {
            Some(ShaderValue::Vec4Array(v)) => Some(v),
            _ => None,
        }
    }

    pub fn mat4_array(&self, property: ShaderProperty) -> Option<&[Mat4]> {
        match self.get(property) {
            Some(ShaderValue::Mat4Array(v)) => Some(v),
            _ => None,
        }
    }

    pub fn texture(&self, property: ShaderProperty) -> Option<TextureId> {
        match self.get(property) {
            Some(ShaderValue::Texture(v)) => Some(*v),
            _ => None,
        }
    }

    /// Enable a macro, optionally with a value (`NAME` or `NAME value`).
    pub fn enable_macro(&mut self, name: &str, value: Option<String>) {
        self.macros.insert(name.to_string(), value);
    }

    pub fn disable_macro(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros.get(name).and_then(|v| v.as_deref())
    }

    /// Enabled macros rendered as `NAME` or `NAME value`, sorted by name.
    pub fn macro_list(&self) -> impl Iterator<Item = String> + '_ {
        self.macros.iter().map(|(name, value)| match value {
            Some(value) => format!("{name} {value}"),
            None => name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRENGTH: ShaderProperty = ShaderProperty::new("u_strength");

    #[test]
    fn test_typed_access() {
        let mut data = ShaderData::new();
        data.set_float(STRENGTH, 0.5);
        assert_eq!(data.float(STRENGTH), Some(0.5));
        assert_eq!(data.vec4(STRENGTH), None);
    }

    #[test]
    fn test_macros() {
        let mut data = ShaderData::new();
        data.enable_macro("B_FLAG", None);
        data.enable_macro("A_COUNT", Some("4".into()));
        assert_eq!(data.macro_value("A_COUNT"), Some("4"));
        assert_eq!(
            data.macro_list().collect::<Vec<_>>(),
            vec!["A_COUNT 4".to_string(), "B_FLAG".to_string()]
        );

        data.disable_macro("A_COUNT");
        assert!(!data.has_macro("A_COUNT"));
    }
}
