//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash`
//! crate. It handles:
//! - Instance and device creation
//! - Swapchain and render target management
//! - Render pass and framebuffer creation
//! - Pipeline, shader, buffer, and descriptor management
//! - Frame synchronization primitives

mod error;

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod render_target;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
