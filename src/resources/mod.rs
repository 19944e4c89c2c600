//! Resource management
//!
//! Drawable primitives, materials, reference-counted textures and the render
//! targets built on top of them.

mod material;
mod mesh;
mod render_target;
mod texture;

pub use material::*;
pub use mesh::*;
pub use render_target::*;
pub use texture::*;
