//! Backend abstraction layer
//!
//! Provides the device trait the render core drives, the types shared with
//! device implementations, and a headless recording device.

pub mod headless;
pub mod traits;
pub mod types;

pub use headless::*;
pub use traits::*;
pub use types::*;
