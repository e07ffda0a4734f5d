//! Chain rebuild ordering.
//!
//! Everything that bakes in the swapchain's format, extent, or image
//! count is a chain dependent and is destroyed and recreated as a unit
//! when the chain is rebuilt. The legal orders are encoded as constants
//! so they can be asserted directly instead of living implicitly in a
//! sequence of destructor calls.

/// A resource torn down and rebuilt with the swap resource chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainResource {
    /// MSAA color and depth target images.
    RenderTargets,
    /// Per-image framebuffers.
    Framebuffers,
    /// The graphics pipeline.
    Pipeline,
    /// The pipeline layout.
    PipelineLayout,
    /// The render pass.
    RenderPass,
    /// The chain's per-image views.
    ChainImageViews,
    /// The VkSwapchainKHR object itself.
    ChainObject,
}

/// Teardown order during a rebuild. Dependents go before the things
/// they reference: framebuffers before the pass and views they bind,
/// the pipeline before its layout and pass, views before the chain
/// object.
pub const CHAIN_TEARDOWN_ORDER: [ChainResource; 7] = [
    ChainResource::RenderTargets,
    ChainResource::Framebuffers,
    ChainResource::Pipeline,
    ChainResource::PipelineLayout,
    ChainResource::RenderPass,
    ChainResource::ChainImageViews,
    ChainResource::ChainObject,
];

/// Build order during a rebuild, dependencies first. The pipeline step
/// covers its layout; the chain step covers its image views.
pub const CHAIN_BUILD_ORDER: [ChainResource; 5] = [
    ChainResource::ChainObject,
    ChainResource::RenderPass,
    ChainResource::Pipeline,
    ChainResource::RenderTargets,
    ChainResource::Framebuffers,
];

/// Blocks until the surface reports a nonzero extent.
///
/// A minimized window reports (0, 0), which no chain can be built for;
/// the driver stalls here, pumping platform events, until the window
/// becomes drawable again.
pub fn wait_for_valid_extent(
    mut query_size: impl FnMut() -> (u32, u32),
    mut pump_events: impl FnMut(),
) -> (u32, u32) {
    loop {
        let (width, height) = query_size();
        if width != 0 && height != 0 {
            return (width, height);
        }
        pump_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_destroys_dependents_before_dependencies() {
        let position = |r: ChainResource| {
            CHAIN_TEARDOWN_ORDER
                .iter()
                .position(|&x| x == r)
                .expect("resource missing from teardown order")
        };

        // Framebuffers bind the pass, the views, and the targets
        assert!(position(ChainResource::Framebuffers) < position(ChainResource::RenderPass));
        assert!(position(ChainResource::Framebuffers) < position(ChainResource::ChainImageViews));
        // The pipeline bakes in its layout and the pass
        assert!(position(ChainResource::Pipeline) < position(ChainResource::PipelineLayout));
        assert!(position(ChainResource::Pipeline) < position(ChainResource::RenderPass));
        // Views go before the chain object that owns their images
        assert!(position(ChainResource::ChainImageViews) < position(ChainResource::ChainObject));
    }

    #[test]
    fn teardown_order_is_exact() {
        assert_eq!(
            CHAIN_TEARDOWN_ORDER,
            [
                ChainResource::RenderTargets,
                ChainResource::Framebuffers,
                ChainResource::Pipeline,
                ChainResource::PipelineLayout,
                ChainResource::RenderPass,
                ChainResource::ChainImageViews,
                ChainResource::ChainObject,
            ]
        );
    }

    #[test]
    fn build_order_is_exact() {
        assert_eq!(
            CHAIN_BUILD_ORDER,
            [
                ChainResource::ChainObject,
                ChainResource::RenderPass,
                ChainResource::Pipeline,
                ChainResource::RenderTargets,
                ChainResource::Framebuffers,
            ]
        );
    }

    #[test]
    fn build_starts_from_the_chain_and_ends_with_framebuffers() {
        assert_eq!(CHAIN_BUILD_ORDER[0], ChainResource::ChainObject);
        assert_eq!(
            CHAIN_BUILD_ORDER[CHAIN_BUILD_ORDER.len() - 1],
            ChainResource::Framebuffers
        );
    }

    #[test]
    fn valid_extent_returns_immediately_when_nonzero() {
        let mut waits = 0;
        let size = wait_for_valid_extent(|| (800, 600), || waits += 1);
        assert_eq!(size, (800, 600));
        assert_eq!(waits, 0);
    }

    #[test]
    fn zero_extent_stalls_until_nonzero() {
        let reports = [(0, 0), (0, 0), (800, 600)];
        let mut index = 0;
        let mut waits = 0;

        let size = wait_for_valid_extent(
            || {
                let report = reports[index];
                if index + 1 < reports.len() {
                    index += 1;
                }
                report
            },
            || waits += 1,
        );

        assert_eq!(size, (800, 600));
        assert_eq!(waits, 2);
    }

    #[test]
    fn half_zero_extent_still_stalls() {
        let reports = [(800, 0), (800, 600)];
        let mut index = 0;
        let mut waits = 0;

        let size = wait_for_valid_extent(
            || {
                let report = reports[index];
                if index + 1 < reports.len() {
                    index += 1;
                }
                report
            },
            || waits += 1,
        );

        assert_eq!(size, (800, 600));
        assert_eq!(waits, 1);
    }
}
