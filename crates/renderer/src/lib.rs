//! Frame lifecycle and presentation chain management.
//!
//! This crate turns the raw device abstraction in `lumen-rhi` into a
//! running renderer: the [`FrameDriver`] owns the presentation stack,
//! ticks frames, and rebuilds the swap resource chain when the surface
//! changes, while application content plugs in through the
//! [`RenderPayload`] trait.

pub mod config;
pub mod driver;
pub mod payload;
pub mod rebuild;

pub use config::RendererConfig;
pub use driver::FrameDriver;
pub use payload::{PipelineSpec, RenderPayload};
pub use rebuild::{CHAIN_BUILD_ORDER, CHAIN_TEARDOWN_ORDER, ChainResource};

pub use lumen_rhi::sync::MAX_FRAMES_IN_FLIGHT;
