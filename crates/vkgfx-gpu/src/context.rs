//! The device every other wrapper is created from.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, DeviceCandidate};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Instance, logical device, allocator and the single graphics queue, which
/// also presents.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

impl GpuContext {
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Buffer and image memory. Held only for the duration of one call.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            tracing::warn!("Device not idle at teardown: {e}");
        }

        let mut allocator = self.allocator.lock();
        tracing::debug!(stats = ?allocator.stats(), "Destroying GPU context");
        // Allocations reference device memory.
        allocator.shutdown();
        drop(allocator);

        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Configures and creates a [`GpuContext`].
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "vkgfx".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Request the Khronos validation layer. Ignored when not installed.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Load Vulkan, pick a device and open it.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation)? };

        match unsafe { open_device(&instance) } {
            Ok((candidate, capabilities, device, allocator)) => {
                let graphics_queue =
                    unsafe { device.get_device_queue(candidate.graphics_queue_family, 0) };
                Ok(GpuContext {
                    entry,
                    instance,
                    physical_device: candidate.physical_device,
                    device,
                    capabilities,
                    allocator: Mutex::new(allocator),
                    graphics_queue_family: candidate.graphics_queue_family,
                    graphics_queue,
                })
            }
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }
}

type OpenedDevice = (DeviceCandidate, GpuCapabilities, Arc<ash::Device>, GpuAllocator);

/// Everything below the instance. Cleans up after itself on failure, so the
/// caller only owns the instance.
unsafe fn open_device(instance: &ash::Instance) -> Result<OpenedDevice> {
    let candidate = select_physical_device(instance)?;
    let capabilities = GpuCapabilities::query(instance, candidate.physical_device);
    if !capabilities.meets_requirements() {
        return Err(GpuError::NoSuitableDevice);
    }
    tracing::info!("Selected GPU: {}", capabilities.summary());

    let device = Arc::new(create_device(instance, &candidate, &capabilities)?);

    match GpuAllocator::new(instance, device.clone(), candidate.physical_device) {
        Ok(allocator) => Ok((candidate, capabilities, device, allocator)),
        Err(e) => {
            device.destroy_device(None);
            Err(e)
        }
    }
}

/// One graphics queue, the swapchain extension and whichever optional
/// features the device reported.
unsafe fn create_device(
    instance: &ash::Instance,
    candidate: &DeviceCandidate,
    capabilities: &GpuCapabilities,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queues = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(candidate.graphics_queue_family)
        .queue_priorities(&priorities)];

    let extensions = [ash::khr::swapchain::NAME.as_ptr()];

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: capabilities.max_sampler_anisotropy.is_some().into(),
        fill_mode_non_solid: capabilities.supports_wireframe.into(),
        geometry_shader: capabilities.supports_geometry_shader.into(),
        ..Default::default()
    };

    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queues)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    Ok(instance.create_device(candidate.physical_device, &info, None)?)
}
