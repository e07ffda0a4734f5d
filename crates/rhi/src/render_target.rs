//! Offscreen render target images.
//!
//! # Overview
//!
//! The render target set carries the two device-local images the render
//! pass draws into before resolving to a swapchain image:
//!
//! - A multisampled color target in the swapchain format, created
//!   TRANSIENT because its contents never leave tile memory
//! - A depth target in the best available depth format
//!
//! Both match the swapchain extent and sample count, so the whole set
//! is destroyed and rebuilt together with the chain on every resize.
//! Memory comes from gpu-allocator as GpuOnly allocations.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Depth format candidates in descending precision order.
pub const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// A single device-local attachment image with its view.
///
/// # Resource Destruction
///
/// Destroyed in order: image view, image, allocation.
pub struct RenderTarget {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Vulkan image view handle.
    image_view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image dimensions.
    extent: vk::Extent2D,
}

impl RenderTarget {
    /// Creates a device-local 2D attachment image and its view.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `extent` - Image dimensions (must be nonzero)
    /// * `format` - Image format
    /// * `samples` - Sample count for the image
    /// * `usage` - Attachment usage flags
    /// * `aspect` - View aspect mask (COLOR or DEPTH)
    /// * `name` - Allocation name for allocator diagnostics
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero or if image, allocation,
    /// or view creation fails.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &'static str,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Render target dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false, // Optimal tiling is not linear
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} target: {}x{} ({:?}, {:?})",
            name, extent.width, extent.height, format, samples
        );

        Ok(Self {
            device,
            image,
            image_view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Returns the Vulkan image view handle.
    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_image_view(self.image_view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free render target allocation: {:?}", e);
            }
        }
    }
}

/// Returns true when the sample count requires a dedicated
/// multisampled color target. At one sample the render pass draws
/// straight into the swapchain image and no offscreen color image is
/// needed.
#[inline]
pub fn needs_msaa_color(samples: vk::SampleCountFlags) -> bool {
    samples != vk::SampleCountFlags::TYPE_1
}

/// The attachments backing the render pass: a depth target, plus a
/// multisampled color target when the device renders with MSAA.
///
/// Rebuilt as a unit whenever the swapchain is rebuilt.
pub struct RenderTargetSet {
    /// Multisampled color target in the swapchain format; `None` at
    /// one sample.
    color: Option<RenderTarget>,
    /// Depth target.
    depth: RenderTarget,
}

impl RenderTargetSet {
    /// Creates the targets for the current chain.
    ///
    /// The color target is transient: it only exists between the clear
    /// at the start of the pass and the resolve at the end. It is
    /// skipped entirely when [`needs_msaa_color`] is false.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `extent` - Swapchain extent
    /// * `color_format` - Swapchain image format
    /// * `depth_format` - Format from [`find_depth_format`]
    /// * `samples` - Device sample count
    ///
    /// # Errors
    ///
    /// Returns an error if any target fails to build.
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let color = if needs_msaa_color(samples) {
            Some(RenderTarget::new(
                device.clone(),
                extent,
                color_format,
                samples,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                "msaa_color",
            )?)
        } else {
            None
        };

        let depth = RenderTarget::new(
            device,
            extent,
            depth_format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth",
        )?;

        info!(
            "Render targets created: {}x{}, color {:?} ({}), depth {:?}, {:?}",
            extent.width,
            extent.height,
            color_format,
            if color.is_some() { "msaa" } else { "direct" },
            depth_format,
            samples
        );

        Ok(Self { color, depth })
    }

    /// Returns the multisampled color target, if one exists.
    #[inline]
    pub fn color(&self) -> Option<&RenderTarget> {
        self.color.as_ref()
    }

    /// Returns the depth target.
    #[inline]
    pub fn depth(&self) -> &RenderTarget {
        &self.depth
    }
}

/// Finds the best supported depth format for optimal-tiling
/// depth/stencil attachments.
///
/// Queries the physical device for each candidate in
/// [`DEPTH_FORMAT_CANDIDATES`] order and returns the first whose
/// optimal tiling features include DEPTH_STENCIL_ATTACHMENT.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if no candidate qualifies.
pub fn find_depth_format(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    let format = select_depth_format(DEPTH_FORMAT_CANDIDATES, |format| unsafe {
        instance
            .handle()
            .get_physical_device_format_properties(physical_device, format)
            .optimal_tiling_features
    })?;

    debug!("Selected depth format: {:?}", format);
    Ok(format)
}

/// Returns the first candidate whose optimal tiling features include
/// DEPTH_STENCIL_ATTACHMENT, per the given feature query.
fn select_depth_format(
    candidates: &[vk::Format],
    query_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            query_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| {
            RhiError::UnsupportedFormat(
                "No depth format supports DEPTH_STENCIL_ATTACHMENT with optimal tiling".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_candidates_are_descending_precision() {
        assert_eq!(
            DEPTH_FORMAT_CANDIDATES,
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ]
        );
    }

    #[test]
    fn selects_highest_precision_when_all_supported() {
        let format = select_depth_format(DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        });
        assert_eq!(format.unwrap(), vk::Format::D32_SFLOAT);
    }

    #[test]
    fn skips_unsupported_candidates() {
        let format = select_depth_format(DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            }
        });
        assert_eq!(format.unwrap(), vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn errors_when_no_candidate_qualifies() {
        let result =
            select_depth_format(DEPTH_FORMAT_CANDIDATES, |_| vk::FormatFeatureFlags::empty());
        assert!(matches!(result, Err(RhiError::UnsupportedFormat(_))));
    }

    #[test]
    fn msaa_color_target_only_exists_when_multisampled() {
        assert!(!needs_msaa_color(vk::SampleCountFlags::TYPE_1));
        assert!(needs_msaa_color(vk::SampleCountFlags::TYPE_2));
        assert!(needs_msaa_color(vk::SampleCountFlags::TYPE_4));
        assert!(needs_msaa_color(vk::SampleCountFlags::TYPE_8));
    }

    #[test]
    fn ignores_formats_with_only_sampling_support() {
        let result = select_depth_format(DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        });
        assert!(result.is_err());
    }
}
