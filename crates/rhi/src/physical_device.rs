//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! Selection enumerates all GPUs and takes the FIRST one that meets the
//! requirements:
//! 1. Graphics-capable and presentation-capable queue families (may coincide)
//! 2. The required device extensions (swapchain)
//! 3. At least one surface format and one present mode for the target surface
//! 4. Sampler anisotropy support
//!
//! The maximum usable multisample count is derived from the device limits
//! at selection time so every chain rebuild can reuse it.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! // Assume surface is created from a window
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DEVICE_EXTENSIONS;
use crate::error::RhiError;

/// Queue family indices for the two roles the engine needs.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both required queue families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices.
    ///
    /// Used when creating the logical device to avoid requesting
    /// duplicate queues for the same family.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family {
            if !families.contains(&present) {
                families.push(present);
            }
        }

        families
    }
}

/// Information about a selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue family indices.
    pub queue_families: QueueFamilyIndices,
    /// Maximum usable multisample count for framebuffer attachments.
    pub sample_count: vk::SampleCountFlags,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .field("sample_count", &self.sample_count)
            .finish()
    }
}

/// Selects a physical device for rendering.
///
/// Enumerates available GPUs and returns the first one that satisfies
/// the requirements listed in the module docs. There is no scoring or
/// ranking between suitable devices.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPUs exist or none qualify.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, surface, surface_loader) {
            let (major, minor, patch) = info.api_version();
            info!(
                "Selected GPU: '{}' - Vulkan {}.{}.{}, {:?} samples",
                info.device_name(),
                major,
                minor,
                patch,
                info.sample_count
            );
            return Ok(info);
        }
    }

    warn!("No suitable GPU found with required capabilities");
    Err(RhiError::NoSuitableGpu)
}

/// Checks if a physical device meets all requirements.
///
/// Returns `Some(PhysicalDeviceInfo)` if suitable, `None` otherwise.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    if !supports_device_extensions(instance, device) {
        debug!(
            "GPU '{}' skipped: missing required device extensions",
            device_name
        );
        return None;
    }

    // Extension support alone is not enough: the surface must actually
    // offer at least one format and one present mode.
    let format_count = unsafe {
        surface_loader
            .get_physical_device_surface_formats(device, surface)
            .map(|f| f.len())
            .unwrap_or(0)
    };
    let present_mode_count = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .map(|m| m.len())
            .unwrap_or(0)
    };
    if format_count == 0 || present_mode_count == 0 {
        debug!(
            "GPU '{}' skipped: inadequate surface support ({} formats, {} present modes)",
            device_name, format_count, present_mode_count
        );
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!(
            "GPU '{}' skipped: sampler anisotropy not supported",
            device_name
        );
        return None;
    }

    let sample_count = max_usable_sample_count(
        properties.limits.framebuffer_color_sample_counts,
        properties.limits.framebuffer_depth_sample_counts,
    );

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        queue_families,
        sample_count,
    })
}

/// Checks that every required device extension is available.
fn supports_device_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let available = match unsafe { instance.enumerate_device_extension_properties(device) } {
        Ok(props) => props,
        Err(_) => return false,
    };

    DEVICE_EXTENSIONS.iter().all(|&required| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == required
        })
    })
}

/// Finds graphics and present queue family indices.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Derives the maximum usable multisample count for framebuffers.
///
/// Takes the intersection of the color and depth sample-count support
/// masks and returns the highest power-of-two count in it, from 64
/// down to 2. Returns `TYPE_1` (no multisampling) when only single
/// sampling is common to both.
pub fn max_usable_sample_count(
    color_counts: vk::SampleCountFlags,
    depth_counts: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color_counts & depth_counts;

    for candidate in [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ] {
        if counts.contains(candidate) {
            return candidate;
        }
    }

    vk::SampleCountFlags::TYPE_1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_family_indices_default_incomplete() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn queue_family_indices_complete() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
    }

    #[test]
    fn queue_family_indices_incomplete_either_way() {
        let only_graphics = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!only_graphics.is_complete());

        let only_present = QueueFamilyIndices {
            graphics_family: None,
            present_family: Some(0),
        };
        assert!(!only_present.is_complete());
    }

    #[test]
    fn unique_families_deduplicates() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let distinct = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(distinct.unique_families(), vec![0, 1]);
    }

    #[test]
    fn sample_count_picks_highest_common() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;

        assert_eq!(
            max_usable_sample_count(color, depth),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn sample_count_defaults_to_single() {
        let color = vk::SampleCountFlags::TYPE_1;
        let depth = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;

        assert_eq!(
            max_usable_sample_count(color, depth),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn sample_count_caps_at_api_maximum() {
        let all = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8
            | vk::SampleCountFlags::TYPE_16
            | vk::SampleCountFlags::TYPE_32
            | vk::SampleCountFlags::TYPE_64;

        assert_eq!(
            max_usable_sample_count(all, all),
            vk::SampleCountFlags::TYPE_64
        );
    }
}
