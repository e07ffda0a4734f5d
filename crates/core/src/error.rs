//! Error taxonomy shared across the engine.
//!
//! Fatal conditions (device setup, resource creation, unrecoverable
//! acquire/present results) travel upward as [`Error`] values until the
//! application unwinds through teardown. Recoverable presentation
//! conditions (out-of-date surface, suboptimal present, zero-size
//! framebuffer) never appear here; they are handled in-band by the
//! frame driver. Lower-layer detail (invariant violations, shader and
//! allocator failures) stays in `RhiError` and arrives here through its
//! `From` conversion.

use thiserror::Error;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan object creation or submission failures
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or surface binding errors
    #[error("Window error: {0}")]
    Window(String),
}

/// Result type alias using the engine's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
