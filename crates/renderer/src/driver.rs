//! The frame driver.
//!
//! This module owns the whole presentation stack and runs the per-frame
//! lifecycle. One [`FrameDriver`] coordinates:
//!
//! - Instance, surface, device, and swap resource chain
//! - The forward render pass, pipeline, render targets, and
//!   framebuffers (the chain dependents, rebuilt on resize)
//! - Frame slot synchronization and command buffers
//! - The [`RenderPayload`] providing the actual content
//!
//! # Frame tick
//!
//! Each [`FrameDriver::draw_frame`] call runs a fixed sequence: wait on
//! the slot's fence, acquire an image, wait for any earlier slot still
//! rendering into that image, update the payload's uniforms for it,
//! reset the fence, record and submit, present, advance the slot. A
//! failed acquire or present with an out-of-date result triggers a
//! chain rebuild instead of propagating as an error.
//!
//! # Resource Destruction Order
//!
//! Chain dependents are destroyed and rebuilt in the orders encoded in
//! [`crate::rebuild`]. Final teardown in `Drop` follows the same
//! ordering, with the device and instance going last via field order.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use lumen_core::Timer;
use lumen_platform::{Surface, Window};
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::select_physical_device;
use lumen_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use lumen_rhi::render_pass::{Framebuffers, RenderPass};
use lumen_rhi::render_target::{RenderTargetSet, find_depth_format};
use lumen_rhi::shader::{Shader, ShaderStage};
use lumen_rhi::swapchain::Swapchain;
use lumen_rhi::sync::{FrameSyncSet, MAX_FRAMES_IN_FLIGHT};
use lumen_rhi::{RhiError, RhiResult};

use crate::config::RendererConfig;
use crate::payload::RenderPayload;
use crate::rebuild::{
    CHAIN_BUILD_ORDER, CHAIN_TEARDOWN_ORDER, ChainResource, wait_for_valid_extent,
};

/// Owns the presentation stack and drives the frame lifecycle.
///
/// Fields wrapped in `ManuallyDrop` are destroyed explicitly, both
/// during chain rebuilds and in `Drop`; the device and instance are
/// plain fields so they drop last, in declaration order.
pub struct FrameDriver<P: RenderPayload> {
    /// The rendered content.
    payload: ManuallyDrop<P>,
    /// Frame slot synchronization and the image fence binding table.
    sync: ManuallyDrop<FrameSyncSet>,
    /// Per-image framebuffers (chain dependent).
    framebuffers: ManuallyDrop<Framebuffers>,
    /// MSAA color and depth targets (chain dependent).
    render_targets: ManuallyDrop<RenderTargetSet>,
    /// The graphics pipeline (chain dependent).
    pipeline: ManuallyDrop<Pipeline>,
    /// The pipeline layout (chain dependent).
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// The forward render pass (chain dependent).
    render_pass: ManuallyDrop<RenderPass>,
    /// The swap resource chain.
    swapchain: ManuallyDrop<Swapchain>,
    /// The window surface.
    surface: ManuallyDrop<Surface>,
    /// The logical device; drops before the instance.
    device: Arc<Device>,
    /// The Vulkan instance; drops last.
    instance: Instance,
    /// One primary command buffer per frame slot, re-recorded per tick.
    command_buffers: Vec<vk::CommandBuffer>,
    /// Depth format selected at startup; stable across rebuilds.
    depth_format: vk::Format,
    /// Clear color for the color attachment.
    clear_color: [f32; 4],
    /// Current frame slot, cycling modulo [`MAX_FRAMES_IN_FLIGHT`].
    current_slot: usize,
    /// Drives time-based payload animation.
    timer: Timer,
}

impl<P: RenderPayload> FrameDriver<P> {
    /// Builds the full presentation stack for a window.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to present to
    /// * `config` - Startup configuration
    /// * `payload` - The content to render
    ///
    /// # Errors
    ///
    /// Returns an error if any stage of initialization fails,
    /// including [`RhiError::NoSuitableGpu`] when no device satisfies
    /// the requirements.
    pub fn new(window: &Window, config: &RendererConfig, mut payload: P) -> RhiResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing frame driver ({}x{})", width, height);

        let instance = Instance::new(config.enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let depth_format = find_depth_format(&instance, device.physical_device())?;

        payload.prepare(&device, swapchain.image_count())?;

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.format(),
            depth_format,
            device.sample_count(),
        )?;

        let (pipeline_layout, pipeline) = Self::create_pipeline(&device, &payload, &render_pass)?;

        let render_targets = RenderTargetSet::new(
            device.clone(),
            swapchain.extent(),
            swapchain.format(),
            depth_format,
            device.sample_count(),
        )?;

        let framebuffers =
            Framebuffers::new(device.clone(), &render_pass, &swapchain, &render_targets)?;

        let sync = FrameSyncSet::new(device.clone(), swapchain.image_count())?;

        let command_buffers = device.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        info!(
            "Frame driver ready: {} chain images, {} frame slots, {:?} samples",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT,
            device.sample_count()
        );

        Ok(Self {
            payload: ManuallyDrop::new(payload),
            sync: ManuallyDrop::new(sync),
            framebuffers: ManuallyDrop::new(framebuffers),
            render_targets: ManuallyDrop::new(render_targets),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            render_pass: ManuallyDrop::new(render_pass),
            swapchain: ManuallyDrop::new(swapchain),
            surface: ManuallyDrop::new(surface),
            device,
            instance,
            command_buffers,
            depth_format,
            clear_color: config.clear_color,
            current_slot: 0,
            timer: Timer::new(),
        })
    }

    /// Loads the payload's shaders and builds the pipeline layout and
    /// graphics pipeline against the current render pass.
    fn create_pipeline(
        device: &Arc<Device>,
        payload: &P,
        render_pass: &RenderPass,
    ) -> RhiResult<(PipelineLayout, Pipeline)> {
        let spec = payload.pipeline_spec();

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &spec.vertex_shader,
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &spec.fragment_shader,
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &spec.descriptor_set_layouts, &[])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_bindings(&spec.vertex_bindings)
            .vertex_attributes(&spec.vertex_attributes)
            .cull_mode(spec.cull_mode)
            .front_face(spec.front_face)
            .rasterization_samples(render_pass.samples())
            .render_pass(render_pass.handle(), 0)
            .build(device.clone(), &pipeline_layout)?;

        Ok((pipeline_layout, pipeline))
    }

    /// Runs one frame tick.
    ///
    /// Recoverable presentation outcomes (out-of-date chain, suboptimal
    /// chain, a pending resize flag) trigger a chain rebuild and return
    /// `Ok`; every other failure is propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if a fence wait, submission, or an
    /// unrecoverable acquire/present result occurs.
    pub fn draw_frame(&mut self, window: &mut Window) -> RhiResult<()> {
        let slot = self.current_slot;

        // 1. Wait for this slot's previous submission to retire
        self.sync.in_flight(slot).wait(u64::MAX)?;

        // 2. Acquire an image, rebuilding on an out-of-date chain
        let acquire_semaphore = self.sync.image_available(slot).handle();
        let (image_index, _suboptimal) = match self.swapchain.acquire_next_image(acquire_semaphore)
        {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire returned ERROR_OUT_OF_DATE_KHR, rebuilding chain");
                self.rebuild_chain(window)?;
                return Ok(());
            }
            Err(e) => return Err(RhiError::VulkanError(e)),
        };
        let image_index = image_index as usize;

        // 3. Wait for any earlier slot still rendering into this image,
        //    then bind it to this slot
        self.sync.claim_image(image_index, slot)?;

        // 4. Let the payload write this image's uniforms
        let elapsed = self.timer.elapsed_secs();
        self.payload
            .update(image_index, self.swapchain.extent(), elapsed)?;

        // 5. Reset the slot fence only once submission is certain
        self.sync.in_flight(slot).reset()?;

        // 6. Record and submit
        self.record_commands(slot, image_index)?;

        let wait_semaphores = [acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished(slot).handle()];
        let command_buffers = [self.command_buffers[slot]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], self.sync.in_flight(slot).handle())?;
        }

        // 7. Present, rebuilding on any recoverable outcome
        let present_result = self.swapchain.present(
            self.device.present_queue(),
            image_index as u32,
            signal_semaphores[0],
        );

        // 8. Advance the slot before any rebuild so a rebuild does not
        //    repeat this slot
        self.current_slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        let chain_stale = match present_result {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Present returned suboptimal");
                }
                suboptimal
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Present returned ERROR_OUT_OF_DATE_KHR");
                true
            }
            Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Present returned SUBOPTIMAL_KHR");
                true
            }
            Err(e) => return Err(RhiError::VulkanError(e)),
        };

        // The resized flag is read and cleared exactly once per tick
        if window.take_resized() || chain_stale {
            self.rebuild_chain(window)?;
        }

        Ok(())
    }

    /// Rebuilds the swap resource chain and everything depending on it.
    ///
    /// Stalls while the framebuffer has zero area, waits for the device
    /// to go idle, then destroys and recreates the chain dependents in
    /// the orders fixed by [`CHAIN_TEARDOWN_ORDER`] and
    /// [`CHAIN_BUILD_ORDER`]. Frame slot primitives are never
    /// recreated; only the image fence binding table is resized.
    ///
    /// # Errors
    ///
    /// Returns an error if the idle wait or any recreation step fails.
    pub fn rebuild_chain(&mut self, window: &mut Window) -> RhiResult<()> {
        let (width, height) =
            wait_for_valid_extent(|| window.framebuffer_size(), || window.wait_events());

        info!("Rebuilding presentation chain for {}x{}", width, height);

        self.device.wait_idle()?;

        let old_image_count = self.swapchain.image_count();

        for resource in CHAIN_TEARDOWN_ORDER {
            match resource {
                ChainResource::RenderTargets => unsafe {
                    ManuallyDrop::drop(&mut self.render_targets);
                },
                ChainResource::Framebuffers => unsafe {
                    ManuallyDrop::drop(&mut self.framebuffers);
                },
                ChainResource::Pipeline => unsafe {
                    ManuallyDrop::drop(&mut self.pipeline);
                },
                ChainResource::PipelineLayout => unsafe {
                    ManuallyDrop::drop(&mut self.pipeline_layout);
                },
                ChainResource::RenderPass => unsafe {
                    ManuallyDrop::drop(&mut self.render_pass);
                },
                // Views and chain object are replaced together by
                // Swapchain::recreate in the build phase, views first
                ChainResource::ChainImageViews | ChainResource::ChainObject => {}
            }
        }

        for resource in CHAIN_BUILD_ORDER {
            match resource {
                ChainResource::ChainObject => {
                    self.swapchain.recreate(
                        &self.instance,
                        self.surface.handle(),
                        width,
                        height,
                    )?;

                    // Per-image payload resources must exist before the
                    // pipeline step reads the descriptor layouts
                    let new_image_count = self.swapchain.image_count();
                    if new_image_count != old_image_count {
                        debug!(
                            "Chain image count changed: {} -> {}",
                            old_image_count, new_image_count
                        );
                        self.payload.prepare(&self.device, new_image_count)?;
                    }
                }
                ChainResource::RenderPass => {
                    self.render_pass = ManuallyDrop::new(RenderPass::new(
                        self.device.clone(),
                        self.swapchain.format(),
                        self.depth_format,
                        self.device.sample_count(),
                    )?);
                }
                ChainResource::Pipeline => {
                    let (pipeline_layout, pipeline) =
                        Self::create_pipeline(&self.device, &self.payload, &self.render_pass)?;
                    self.pipeline_layout = ManuallyDrop::new(pipeline_layout);
                    self.pipeline = ManuallyDrop::new(pipeline);
                }
                ChainResource::RenderTargets => {
                    self.render_targets = ManuallyDrop::new(RenderTargetSet::new(
                        self.device.clone(),
                        self.swapchain.extent(),
                        self.swapchain.format(),
                        self.depth_format,
                        self.device.sample_count(),
                    )?);
                }
                ChainResource::Framebuffers => {
                    self.framebuffers = ManuallyDrop::new(Framebuffers::new(
                        self.device.clone(),
                        &self.render_pass,
                        &self.swapchain,
                        &self.render_targets,
                    )?);
                }
                ChainResource::PipelineLayout | ChainResource::ChainImageViews => {}
            }
        }

        // Old images are gone, stale slot bindings must not wait for
        // the new ones
        self.sync.reset_image_bindings(self.swapchain.image_count());

        // A resize observed before this rebuild is satisfied by it
        window.take_resized();

        Ok(())
    }

    /// Records the frame's commands into the slot's command buffer.
    fn record_commands(&mut self, slot: usize, image_index: usize) -> RhiResult<()> {
        let cmd = self.command_buffers[slot];
        let extent = self.swapchain.extent();

        unsafe {
            self.device
                .handle()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::empty());
            self.device.handle().begin_command_buffer(cmd, &begin_info)?;
        }

        // Clear values are indexed by attachment; the resolve target
        // (present only with multisampling) loads DONT_CARE but still
        // needs a slot
        let mut clear_values = vec![
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        if self.render_pass.samples() != vk::SampleCountFlags::TYPE_1 {
            clear_values.push(vk::ClearValue::default());
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers.get(image_index))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .handle()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.device.handle().cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.device.handle().cmd_set_scissor(cmd, 0, &[scissor]);

            self.device.handle().cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
        }

        self.payload
            .record(&self.device, cmd, self.pipeline_layout.handle(), image_index);

        unsafe {
            self.device.handle().cmd_end_render_pass(cmd);
            self.device.handle().end_command_buffer(cmd)?;
        }

        Ok(())
    }

    /// Returns the current chain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the chain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Returns the selected depth format.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl<P: RenderPayload> Drop for FrameDriver<P> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }

        // Payload and sync first, then the chain dependents in teardown
        // order, then the chain and surface. The device and instance
        // follow via field order.
        unsafe {
            ManuallyDrop::drop(&mut self.payload);
            ManuallyDrop::drop(&mut self.sync);
            ManuallyDrop::drop(&mut self.render_targets);
            ManuallyDrop::drop(&mut self.framebuffers);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
        }

        info!("Frame driver destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_advances_modulo_slot_count() {
        let mut slot = 0usize;
        let visited: Vec<usize> = (0..5)
            .map(|_| {
                let current = slot;
                slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
                current
            })
            .collect();
        assert_eq!(visited, vec![0, 1, 0, 1, 0]);
    }
}
