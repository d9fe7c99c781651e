//! Swapchain setup choices, image acquisition and presentation.

use crate::error::{GpuError, Result};
use crate::memory::create_image_view;
use ash::vk;

/// Swapchain images and their color views.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

/// Everything the surface decided about the next swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Pick format, present mode, extent and image count from what the
    /// surface supports.
    pub fn choose(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        Ok(Self {
            surface_format: choose_surface_format(formats)?,
            present_mode: choose_present_mode(present_modes, vsync),
            extent: choose_extent(capabilities, width, height),
            image_count: choose_image_count(capabilities),
            transform: capabilities.current_transform,
        })
    }
}

impl Swapchain {
    /// Create the swapchain and a color view per image. `old` is retired by
    /// the driver but still has to be destroyed by the caller.
    ///
    /// # Safety
    /// `surface` and `old` must belong to the device behind `loader`.
    pub unsafe fn new(
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        config: &SwapchainConfig,
        old: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let format = config.surface_format.format;
        let info = vk::SwapchainCreateInfoKHR {
            surface,
            min_image_count: config.image_count,
            image_format: format,
            image_color_space: config.surface_format.color_space,
            image_extent: config.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: config.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: config.present_mode,
            clipped: vk::TRUE,
            old_swapchain: old.unwrap_or_default(),
            ..Default::default()
        };

        let swapchain = loader
            .create_swapchain(&info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let views = loader
            .get_swapchain_images(swapchain)
            .map_err(GpuError::from)
            .and_then(|images| {
                let views = color_views(device, &images, format)?;
                Ok((images, views))
            });
        let (images, image_views) = match views {
            Ok(created) => created,
            Err(e) => {
                loader.destroy_swapchain(swapchain, None);
                return Err(e);
            }
        };

        tracing::info!(
            width = config.extent.width,
            height = config.extent.height,
            images = images.len(),
            present_mode = ?config.present_mode,
            "Swapchain created"
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            format,
            extent: config.extent,
            present_mode: config.present_mode,
        })
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Acquire the next image, returning its index and whether the swapchain
    /// is suboptimal. An out-of-date swapchain yields
    /// [`GpuError::SwapchainOutOfDate`] and no image.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        match swapchain_loader.acquire_next_image(
            self.swapchain,
            u64::MAX,
            signal,
            vk::Fence::null(),
        ) {
            Ok(acquired) => Ok(acquired),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SwapchainOutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue `image_index` for presentation. Returns `true` when the
    /// swapchain should be recreated.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// # Safety
    /// No image of the swapchain may be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// A view per image. Already created views are destroyed on failure.
unsafe fn color_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        match create_image_view(device, image, format, vk::ImageAspectFlags::COLOR) {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    device.destroy_image_view(view, None);
                }
                return Err(e);
            }
        }
    }
    Ok(views)
}

/// One image more than the minimum, capped by the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count == 0 {
        desired
    } else {
        desired.min(capabilities.max_image_count)
    }
}

/// Prefer `B8G8R8A8_SRGB` with a nonlinear sRGB color space.
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".to_string()))
}

/// FIFO with vsync. Without it, mailbox, then immediate, then FIFO.
pub fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's current extent unless the window system leaves it to us.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_srgb_format() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&available).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );

        let available = [format(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            choose_surface_format(&available).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );

        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(choose_present_mode(&[], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_is_clamped_when_surface_leaves_it_open() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 1920, 600);
        assert_eq!((extent.width, extent.height), (1024, 600));

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..capabilities
        };
        let extent = choose_extent(&fixed, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn config_combines_choices() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        let config = SwapchainConfig::choose(
            &capabilities,
            &[format(vk::Format::B8G8R8A8_SRGB)],
            &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            1280,
            720,
            false,
        )
        .unwrap();

        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((config.extent.width, config.extent.height), (640, 480));
        assert_eq!(config.image_count, 3);
        assert_eq!(config.transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn image_count_respects_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 3);
    }
}
