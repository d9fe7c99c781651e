//! Window surface and the extension loaders that go with it.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{Swapchain, SwapchainConfig};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A presentable surface plus the surface and swapchain loaders.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Create a surface for `window`. Fails unless the graphics queue can
    /// present to it.
    ///
    /// # Safety
    /// The window must outlive the surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let handle_error = |what: &str, e: raw_window_handle::HandleError| {
            GpuError::SurfaceCreation(format!("{what} handle unavailable: {e}"))
        };
        let display = window.display_handle().map_err(|e| handle_error("display", e))?;
        let window = window.window_handle().map_err(|e| handle_error("window", e))?;

        let (entry, instance) = (gpu.entry(), gpu.instance());
        let surface =
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        let presentable = surface_loader
            .get_physical_device_surface_support(
                gpu.physical_device(),
                gpu.graphics_queue_family(),
                surface,
            )
            .unwrap_or(false);
        if !presentable {
            surface_loader.destroy_surface(surface, None);
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader: ash::khr::swapchain::Device::new(instance, gpu.device()),
        })
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Current surface limits, formats and present modes.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        let (loader, device, surface) = (&self.surface_loader, gpu.physical_device(), self.surface);
        let capabilities = unsafe { loader.get_physical_device_surface_capabilities(device, surface)? };
        let formats = unsafe { loader.get_physical_device_surface_formats(device, surface)? };
        let present_modes =
            unsafe { loader.get_physical_device_surface_present_modes(device, surface)? };

        Ok(SurfaceCapabilities {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Create a swapchain sized to the window, handing `old` to the driver
    /// for resource reuse. The caller still destroys `old`.
    ///
    /// # Safety
    /// `old`, when given, must belong to this surface.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        let support = self.capabilities(gpu)?;
        let config = SwapchainConfig::choose(
            &support.capabilities,
            &support.formats,
            &support.present_modes,
            width,
            height,
            vsync,
        )?;

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &config,
            old.map(Swapchain::handle),
        )
    }

    /// # Safety
    /// Every swapchain created from this surface must be destroyed first.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// What a surface supported when it was last queried.
pub struct SurfaceCapabilities {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// A minimized window reports a zero maximum extent. No swapchain can
    /// be built until it comes back.
    pub fn is_zero_sized(&self) -> bool {
        let max = self.capabilities.max_image_extent;
        max.width == 0 || max.height == 0
    }
}
