//! What the selected device can do, reduced to the limits and optional
//! features the renderer looks at.

use ash::vk;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Map a PCI vendor id.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,

    /// Dynamic uniform offsets must be multiples of this.
    pub min_uniform_buffer_offset_alignment: u64,
    /// `None` when the device has no anisotropic filtering.
    pub max_sampler_anisotropy: Option<f32>,
    pub supports_geometry_shader: bool,
    /// `PolygonMode::LINE` is allowed.
    pub supports_wireframe: bool,
    pub max_push_constants_size: u32,

    pub device_local_memory_mb: u64,
}

/// Push constant space every conforming device guarantees.
const MIN_PUSH_CONSTANTS_SIZE: u32 = 128;

impl GpuCapabilities {
    /// # Safety
    /// `physical_device` must come from `instance`.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory = instance.get_physical_device_memory_properties(physical_device);

        let device_local_bytes: u64 = memory
            .memory_heaps_as_slice()
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        Self::from_properties(&properties, &features, device_local_bytes)
    }

    /// Build from already queried device data.
    pub fn from_properties(
        properties: &vk::PhysicalDeviceProperties,
        features: &vk::PhysicalDeviceFeatures,
        device_local_bytes: u64,
    ) -> Self {
        let limits = &properties.limits;
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_sampler_anisotropy: (features.sampler_anisotropy == vk::TRUE)
                .then_some(limits.max_sampler_anisotropy),
            supports_geometry_shader: features.geometry_shader == vk::TRUE,
            supports_wireframe: features.fill_mode_non_solid == vk::TRUE,
            max_push_constants_size: limits.max_push_constants_size,
            device_local_memory_mb: device_local_bytes >> 20,
        }
    }

    /// Vulkan 1.1 or newer with the guaranteed push constant space.
    pub fn meets_requirements(&self) -> bool {
        let version = (
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
        );
        version >= (1, 1) && self.max_push_constants_size >= MIN_PUSH_CONSTANTS_SIZE
    }

    pub fn align_uniform_size(&self, size: u64) -> u64 {
        align_up(size, self.min_uniform_buffer_offset_alignment)
    }

    /// One line suitable for the startup log.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GpuCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}), Vulkan {}.{}.{}, {} MB device local",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Round `size` up to a multiple of `alignment`. Alignments of 0 and 1 are
/// no-ops.
pub const fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(api_version: u32, push_constants: u32) -> GpuCapabilities {
        let properties = vk::PhysicalDeviceProperties {
            api_version,
            vendor_id: 0x1002,
            limits: vk::PhysicalDeviceLimits {
                max_push_constants_size: push_constants,
                min_uniform_buffer_offset_alignment: 256,
                max_sampler_anisotropy: 16.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        GpuCapabilities::from_properties(&properties, &features, 8 << 30)
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn properties_are_reduced() {
        let caps = capabilities(vk::API_VERSION_1_2, 256);
        assert_eq!(caps.vendor, GpuVendor::Amd);
        assert_eq!(caps.max_sampler_anisotropy, Some(16.0));
        assert!(!caps.supports_wireframe);
        assert_eq!(caps.device_local_memory_mb, 8192);
        assert_eq!(caps.align_uniform_size(80), 256);
    }

    #[test]
    fn requirements_need_1_1_and_push_constants() {
        assert!(capabilities(vk::API_VERSION_1_1, 128).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_0, 256).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_2, 64).meets_requirements());
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(140, 64), 192);
        assert_eq!(align_up(17, 0), 17);
    }
}
