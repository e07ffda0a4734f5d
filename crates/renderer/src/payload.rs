//! The render payload contract.
//!
//! A payload is the swappable content of a frame: it owns its geometry,
//! per-image uniform buffers, and descriptor sets, and declares the
//! pipeline it needs. The frame driver owns everything else (chain,
//! render pass, pipeline objects, synchronization) and calls into the
//! payload at fixed points of the tick.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;

use lumen_rhi::RhiResult;
use lumen_rhi::device::Device;

/// Everything the driver needs to build a graphics pipeline for a
/// payload.
pub struct PipelineSpec {
    /// Path to the vertex shader SPIR-V binary.
    pub vertex_shader: PathBuf,
    /// Path to the fragment shader SPIR-V binary.
    pub fragment_shader: PathBuf,
    /// Vertex input binding descriptions.
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex input attribute descriptions.
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Descriptor set layouts the payload binds at draw time. The
    /// payload keeps the layouts alive; these are borrowed handles.
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Face culling mode.
    pub cull_mode: vk::CullModeFlags,
    /// Front face winding order.
    pub front_face: vk::FrontFace,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::new(),
            fragment_shader: PathBuf::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            descriptor_set_layouts: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Content rendered by the frame driver.
///
/// Call order per driver lifecycle:
/// 1. [`RenderPayload::prepare`] once at startup, and again after a
///    chain rebuild that changed the image count
/// 2. [`RenderPayload::pipeline_spec`] whenever the pipeline is
///    (re)built
/// 3. Per tick: [`RenderPayload::update`] for the acquired image, then
///    [`RenderPayload::record`] into that tick's command buffer
pub trait RenderPayload {
    /// Creates GPU resources sized for `image_count` swapchain images:
    /// one uniform buffer and descriptor set per image, so updating the
    /// buffer for the acquired image never races a frame still reading
    /// another image's buffer.
    ///
    /// Must tolerate being called again with a different count after
    /// the device has gone idle.
    fn prepare(&mut self, device: &Arc<Device>, image_count: usize) -> RhiResult<()>;

    /// Describes the pipeline this payload draws with.
    fn pipeline_spec(&self) -> PipelineSpec;

    /// Writes this tick's uniform data for the acquired image.
    ///
    /// `elapsed_secs` is the time since the driver started; `extent`
    /// is the current chain extent for aspect-ratio math.
    fn update(
        &mut self,
        image_index: usize,
        extent: vk::Extent2D,
        elapsed_secs: f32,
    ) -> RhiResult<()>;

    /// Records draw commands into `cmd`. The driver has already begun
    /// the render pass, bound the pipeline, and set viewport and
    /// scissor.
    fn record(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        image_index: usize,
    );
}
