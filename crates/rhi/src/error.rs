//! RHI-specific error types.
//!
//! Everything here is fatal: a failed object creation or an
//! unrecoverable submission result propagates upward and ends the run.
//! Recoverable presentation outcomes (out-of-date, suboptimal) are
//! surfaced as raw `vk::Result` values by the swapchain calls and
//! matched by the frame driver before they could become an `RhiError`.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No candidate format satisfies a required feature set
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Shader module loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface binding error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

impl From<RhiError> for lumen_core::Error {
    fn from(err: RhiError) -> Self {
        lumen_core::Error::Vulkan(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations_surface_through_the_top_level_error() {
        // Invalid-argument checks (zero-size buffers, zero-extent
        // targets, a payload spec with no descriptor layout) all raise
        // InvalidHandle; the conversion must keep the message visible.
        let err: lumen_core::Error =
            RhiError::InvalidHandle("Buffer size must be greater than 0".to_string()).into();
        assert!(err.to_string().contains("Invalid handle"));
        assert!(err.to_string().contains("Buffer size"));
    }
}
