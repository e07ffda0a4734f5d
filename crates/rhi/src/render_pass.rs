//! Render pass and framebuffer management.
//!
//! # Overview
//!
//! One forward pass drawing into a multisampled color target and a
//! depth target, resolving into the acquired swapchain image at the
//! end. With multisampling enabled the pass carries three attachments:
//!
//! 0. MSAA color (cleared, contents discarded after resolve)
//! 1. Depth (cleared, discarded)
//! 2. Resolve target, the swapchain image, left in PRESENT_SRC_KHR
//!
//! At a sample count of one there is nothing to resolve, so the pass
//! degrades to two attachments and the color attachment itself ends in
//! PRESENT_SRC_KHR.
//!
//! The pass depends on the swapchain and depth formats, so it is
//! destroyed and rebuilt together with the chain. Framebuffers bind
//! one swapchain image view each and are rebuilt alongside.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_target::RenderTargetSet;
use crate::swapchain::Swapchain;

/// RAII wrapper for the forward render pass.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    samples: vk::SampleCountFlags,
}

impl RenderPass {
    /// Creates the forward pass for the given formats and sample count.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `color_format` - Swapchain image format
    /// * `depth_format` - Depth target format
    /// * `samples` - Sample count shared by the color and depth targets
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_final_layout = if multisampled {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        };

        let color_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if multisampled {
                // Resolved before the pass ends, contents never stored
                vk::AttachmentStoreOp::DONT_CARE
            } else {
                vk::AttachmentStoreOp::STORE
            })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(color_final_layout);

        let depth_attachment = vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let resolve_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let resolve_ref = vk::AttachmentReference::default()
            .attachment(2)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let color_refs = [color_ref];
        let resolve_refs = [resolve_ref];

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);

        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let attachments_msaa = [color_attachment, depth_attachment, resolve_attachment];
        let attachments_single = [color_attachment, depth_attachment];
        let attachments: &[vk::AttachmentDescription] = if multisampled {
            &attachments_msaa
        } else {
            &attachments_single
        };

        let subpasses = [subpass];
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: color {:?}, depth {:?}, {:?} ({} attachments)",
            color_format,
            depth_format,
            samples,
            attachments.len()
        );

        Ok(Self {
            device,
            render_pass,
            samples,
        })
    }

    /// Returns the render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the sample count the pass was built for.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// One framebuffer per swapchain image, binding the shared color and
/// depth targets plus that image's view.
pub struct Framebuffers {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl Framebuffers {
    /// Creates a framebuffer for every swapchain image.
    ///
    /// Attachment order matches the render pass: with multisampling,
    /// `[msaa color, depth, swapchain image i]`; without,
    /// `[swapchain image i, depth]`.
    ///
    /// # Errors
    ///
    /// Returns an error if any framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        targets: &RenderTargetSet,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();
        let multisampled = render_pass.samples() != vk::SampleCountFlags::TYPE_1;

        // A multisampled pass requires the offscreen color target the
        // target set only builds for MSAA sample counts
        let msaa_color_view = match (multisampled, targets.color()) {
            (true, Some(color)) => Some(color.image_view()),
            (true, None) => {
                return Err(RhiError::InvalidHandle(
                    "Multisampled render pass without an MSAA color target".to_string(),
                ));
            }
            (false, _) => None,
        };

        let mut framebuffers = Vec::with_capacity(swapchain.image_count());

        for &chain_view in swapchain.image_views() {
            let attachments_msaa;
            let attachments_single;
            let attachments: &[vk::ImageView] = match msaa_color_view {
                Some(color_view) => {
                    attachments_msaa = [color_view, targets.depth().image_view(), chain_view];
                    &attachments_msaa
                }
                None => {
                    attachments_single = [chain_view, targets.depth().image_view()];
                    &attachments_single
                }
            };

            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
            framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffer(s) at {}x{}",
            framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            device,
            framebuffers,
            extent,
        })
    }

    /// Returns the framebuffer for a swapchain image index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    /// Returns the number of framebuffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Returns true if there are no framebuffers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Returns the extent the framebuffers were built for.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        debug!("Destroyed {} framebuffer(s)", self.framebuffers.len());
    }
}
