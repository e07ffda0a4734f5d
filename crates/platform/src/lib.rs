//! Platform layer for the engine.
//!
//! Window management via winit, plus Vulkan surface creation. The frame
//! driver consumes this crate only through the small contract on
//! [`Window`]: framebuffer size, the resized flag, and the zero-size
//! event stall.

mod window;

pub use window::{Surface, Window, required_extensions};
