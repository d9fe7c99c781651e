//! Instance creation and choice of the physical device.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Surface extensions for every windowing system this platform may use.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    let mut extensions = vec![ash::khr::surface::NAME];

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME);

    #[cfg(target_os = "linux")]
    extensions.extend([
        ash::khr::xlib_surface::NAME,
        ash::khr::xcb_surface::NAME,
        ash::khr::wayland_surface::NAME,
    ]);

    #[cfg(target_os = "macos")]
    extensions.extend([
        ash::ext::metal_surface::NAME,
        ash::khr::portability_enumeration::NAME,
    ]);

    extensions
}

/// Create the instance, targeting Vulkan 1.2.
///
/// # Safety
/// `entry` must hold a loaded Vulkan library.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Application name: {e}")))?;
    let version = vk::make_api_version(0, 0, 1, 0);

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(version)
        .engine_name(c"vkgfx")
        .engine_version(version)
        .api_version(vk::API_VERSION_1_2);

    let extensions: Vec<*const c_char> = required_instance_extensions()
        .into_iter()
        .map(CStr::as_ptr)
        .collect();
    let layers = validation_layers(entry, enable_validation)?;

    let flags = if cfg!(target_os = "macos") {
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::empty()
    };

    let info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers)
        .flags(flags);

    Ok(entry.create_instance(&info, None)?)
}

/// The Khronos validation layer when requested and installed. A missing
/// layer only produces a warning.
unsafe fn validation_layers(entry: &ash::Entry, enable: bool) -> Result<Vec<*const c_char>> {
    if !enable {
        return Ok(Vec::new());
    }

    let installed = entry
        .enumerate_instance_layer_properties()?
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER));

    if installed {
        tracing::debug!("Enabling {:?}", VALIDATION_LAYER);
        Ok(vec![VALIDATION_LAYER.as_ptr()])
    } else {
        tracing::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        Ok(Vec::new())
    }
}

/// A usable physical device and the queue family the renderer submits to.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue_family: u32,
    score: u32,
}

/// Pick the highest scoring device that has a graphics queue.
///
/// # Safety
/// `instance` must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<DeviceCandidate> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .filter_map(|device| inspect_device(instance, device))
        .max_by_key(|candidate| candidate.score)
        .ok_or(GpuError::NoSuitableDevice)
}

unsafe fn inspect_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<DeviceCandidate> {
    let properties = instance.get_physical_device_properties(physical_device);
    let features = instance.get_physical_device_features(physical_device);

    let graphics_queue_family = instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;

    let score = device_score(
        properties.device_type,
        properties.api_version,
        features.sampler_anisotropy == vk::TRUE,
        features.fill_mode_non_solid == vk::TRUE,
    )?;

    Some(DeviceCandidate {
        physical_device,
        graphics_queue_family: u32::try_from(graphics_queue_family).ok()?,
        score,
    })
}

/// Rank a device. `None` rules it out.
fn device_score(
    device_type: vk::PhysicalDeviceType,
    api_version: u32,
    anisotropy: bool,
    wireframe: bool,
) -> Option<u32> {
    if vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) == 0 {
        return None;
    }

    let base = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };
    let optional = u32::from(anisotropy) * 10 + u32::from(wireframe) * 10;

    Some(base + optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_2: u32 = vk::API_VERSION_1_2;

    #[test]
    fn discrete_beats_integrated() {
        let discrete = device_score(vk::PhysicalDeviceType::DISCRETE_GPU, V1_2, false, false);
        let integrated = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, V1_2, true, true);
        assert!(discrete > integrated);
    }

    #[test]
    fn optional_features_break_ties() {
        let plain = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, V1_2, false, false);
        let wireframe = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, V1_2, false, true);
        assert_eq!(plain, Some(100));
        assert_eq!(wireframe, Some(110));
    }

    #[test]
    fn vulkan_1_0_is_rejected() {
        let score = device_score(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::API_VERSION_1_0,
            true,
            true,
        );
        assert_eq!(score, None);
    }
}
