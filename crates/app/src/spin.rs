//! Spinning cube payload.
//!
//! A vertex-colored cube rotating around two axes, with one uniform
//! buffer and descriptor set per swapchain image.

use std::mem::size_of;
use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::debug;

use lumen_renderer::{PipelineSpec, RenderPayload};
use lumen_rhi::{RhiError, RhiResult};
use lumen_rhi::buffer::{Buffer, BufferUsage};
use lumen_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, buffer_info, uniform_buffer_binding,
    update_descriptor_sets,
};
use lumen_rhi::device::Device;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransformUbo {
    mvp: [f32; 16],
}

const VERTICES: [Vertex; 8] = [
    Vertex { position: [-0.5, -0.5, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { position: [0.5, -0.5, -0.5], color: [0.0, 1.0, 0.0] },
    Vertex { position: [0.5, 0.5, -0.5], color: [0.0, 0.0, 1.0] },
    Vertex { position: [-0.5, 0.5, -0.5], color: [1.0, 1.0, 0.0] },
    Vertex { position: [-0.5, -0.5, 0.5], color: [1.0, 0.0, 1.0] },
    Vertex { position: [0.5, -0.5, 0.5], color: [0.0, 1.0, 1.0] },
    Vertex { position: [0.5, 0.5, 0.5], color: [1.0, 1.0, 1.0] },
    Vertex { position: [-0.5, 0.5, 0.5], color: [0.2, 0.2, 0.2] },
];

#[rustfmt::skip]
const INDICES: [u16; 36] = [
    0, 1, 2, 2, 3, 0, // back
    4, 6, 5, 6, 4, 7, // front
    0, 3, 7, 7, 4, 0, // left
    1, 5, 6, 6, 2, 1, // right
    3, 2, 6, 6, 7, 3, // top
    0, 4, 5, 5, 1, 0, // bottom
];

/// Computes the model-view-projection matrix for a frame.
///
/// The projection Y axis is flipped for Vulkan's downward clip space.
fn spin_mvp(elapsed_secs: f32, aspect: f32) -> Mat4 {
    let model = Mat4::from_rotation_y(elapsed_secs) * Mat4::from_rotation_x(elapsed_secs * 0.6);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 1.2, 2.5), Vec3::ZERO, Vec3::Y);
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
    proj.y_axis.y *= -1.0;
    proj * view * model
}

/// Rotating cube content for the frame driver.
pub struct SpinPayload {
    vertex_buffer: Option<Buffer>,
    index_buffer: Option<Buffer>,
    uniform_buffers: Vec<Buffer>,
    descriptor_set_layout: Option<DescriptorSetLayout>,
    descriptor_pool: Option<DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl SpinPayload {
    pub fn new() -> Self {
        Self {
            vertex_buffer: None,
            index_buffer: None,
            uniform_buffers: Vec::new(),
            descriptor_set_layout: None,
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
        }
    }
}

impl Default for SpinPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPayload for SpinPayload {
    fn prepare(&mut self, device: &Arc<Device>, image_count: usize) -> RhiResult<()> {
        debug!("Preparing spin payload for {} chain images", image_count);

        // Geometry is image-count independent; create it once
        if self.vertex_buffer.is_none() {
            self.vertex_buffer = Some(Buffer::new_with_data(
                device.clone(),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&VERTICES),
            )?);
            self.index_buffer = Some(Buffer::new_with_data(
                device.clone(),
                BufferUsage::Index,
                bytemuck::cast_slice(&INDICES),
            )?);
            self.descriptor_set_layout = Some(DescriptorSetLayout::new(
                device.clone(),
                &[uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX)],
            )?);
        }

        // Per-image resources are rebuilt whenever the count changes.
        // Old sets are returned with their pool.
        self.descriptor_sets.clear();
        self.descriptor_pool = None;
        self.uniform_buffers.clear();

        for _ in 0..image_count {
            self.uniform_buffers.push(Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                size_of::<TransformUbo>() as vk::DeviceSize,
            )?);
        }

        let layout_handle = self
            .descriptor_set_layout
            .as_ref()
            .map(|layout| layout.handle())
            .ok_or_else(|| RhiError::InvalidHandle("Descriptor set layout missing".to_string()))?;

        let pool = DescriptorPool::new(
            device.clone(),
            image_count as u32,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: image_count as u32,
            }],
        )?;

        let layouts = vec![layout_handle; image_count];
        self.descriptor_sets = pool.allocate(&layouts)?;

        for (set, buffer) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            let infos = [buffer_info(
                buffer.handle(),
                0,
                size_of::<TransformUbo>() as vk::DeviceSize,
            )];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&infos);
            update_descriptor_sets(device, &[write]);
        }

        self.descriptor_pool = Some(pool);
        Ok(())
    }

    fn pipeline_spec(&self) -> PipelineSpec {
        let descriptor_set_layouts = self
            .descriptor_set_layout
            .as_ref()
            .map(|layout| vec![layout.handle()])
            .unwrap_or_default();

        PipelineSpec {
            vertex_shader: PathBuf::from("shaders/spin.vert.spv"),
            fragment_shader: PathBuf::from("shaders/spin.frag.spv"),
            vertex_bindings: vec![
                vk::VertexInputBindingDescription::default()
                    .binding(0)
                    .stride(size_of::<Vertex>() as u32)
                    .input_rate(vk::VertexInputRate::VERTEX),
            ],
            vertex_attributes: vec![
                vk::VertexInputAttributeDescription::default()
                    .location(0)
                    .binding(0)
                    .format(vk::Format::R32G32B32_SFLOAT)
                    .offset(0),
                vk::VertexInputAttributeDescription::default()
                    .location(1)
                    .binding(0)
                    .format(vk::Format::R32G32B32_SFLOAT)
                    .offset(12),
            ],
            descriptor_set_layouts,
            ..Default::default()
        }
    }

    fn update(
        &mut self,
        image_index: usize,
        extent: vk::Extent2D,
        elapsed_secs: f32,
    ) -> RhiResult<()> {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = TransformUbo {
            mvp: spin_mvp(elapsed_secs, aspect).to_cols_array(),
        };
        self.uniform_buffers[image_index].write_data(0, bytemuck::bytes_of(&ubo))
    }

    fn record(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        image_index: usize,
    ) {
        let (vertex_buffer, index_buffer) = match (&self.vertex_buffer, &self.index_buffer) {
            (Some(v), Some(i)) => (v, i),
            _ => return,
        };

        unsafe {
            device
                .handle()
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.handle()], &[0]);
            device
                .handle()
                .cmd_bind_index_buffer(cmd, index_buffer.handle(), 0, vk::IndexType::UINT16);
            device.handle().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &[self.descriptor_sets[image_index]],
                &[],
            );
            device
                .handle()
                .cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn cube_indices_stay_in_range() {
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
        assert_eq!(INDICES.len() % 3, 0);
    }

    #[test]
    fn vertex_layout_matches_attributes() {
        assert_eq!(size_of::<Vertex>(), 24);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
    }

    #[test]
    fn mvp_flips_projection_y() {
        let flipped = spin_mvp(0.0, 16.0 / 9.0);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 10.0);
        proj.y_axis.y *= -1.0;
        // The Y flip is baked in; projecting straight up must come out
        // with the sign the flipped projection gives it.
        let up = flipped * glam::Vec4::new(0.0, 1.0, 0.0, 0.0);
        let reference = proj
            * Mat4::look_at_rh(Vec3::new(0.0, 1.2, 2.5), Vec3::ZERO, Vec3::Y)
            * glam::Vec4::new(0.0, 1.0, 0.0, 0.0);
        assert!((up.y - reference.y).abs() < 1e-5);
    }

    #[test]
    fn shader_paths_match_compiled_sources() {
        // The build script compiles each GLSL source to a sibling .spv;
        // every path the spec hands the driver must have its source in
        // the tree.
        let spec = SpinPayload::new().pipeline_spec();
        let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");

        for path in [&spec.vertex_shader, &spec.fragment_shader] {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("spv"));
            let source = path.with_extension("");
            assert!(
                repo_root.join(&source).is_file(),
                "missing GLSL source {:?}",
                source
            );
        }
    }

    #[test]
    fn aspect_ratio_guards_zero_height() {
        // update() divides by max(height, 1); mirror that math here
        let extent = vk::Extent2D { width: 800, height: 0 };
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        assert_eq!(aspect, 800.0);
    }
}
