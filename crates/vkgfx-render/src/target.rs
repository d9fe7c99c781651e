//! Swapchain plus the attachments and pass that render into it.

use crate::error::Result;
use ash::vk;
use gpu_allocator::MemoryLocation;
use vkgfx_gpu::memory::GpuImage;
use vkgfx_gpu::sync::create_semaphore;
use vkgfx_gpu::{Framebuffer, GpuContext, RenderPass, SurfaceContext, Swapchain};

/// Everything tied to the current swapchain. Rebuilt as a whole when the
/// surface changes.
pub struct RenderTarget {
    swapchain: Swapchain,
    attachments: Attachments,
}

/// Depth buffer, render pass, framebuffers and present semaphores, one
/// framebuffer and semaphore per swapchain image.
struct Attachments {
    depth_image: GpuImage,
    depth_view: vk::ImageView,
    render_pass: RenderPass,
    framebuffers: Vec<Framebuffer>,
    render_finished: Vec<vk::Semaphore>,
}

impl RenderTarget {
    /// Build a swapchain for `surface` and everything that renders into it.
    /// `old` is handed to the driver for reuse; the caller still destroys it.
    ///
    /// # Safety
    /// `old` must belong to `surface`, and the surface's window must be alive.
    pub unsafe fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        depth_format: vk::Format,
        width: u32,
        height: u32,
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let swapchain = surface.create_swapchain(gpu, width, height, vsync, old)?;

        match Attachments::new(gpu, &swapchain, depth_format) {
            Ok(attachments) => Ok(Self {
                swapchain,
                attachments,
            }),
            Err(e) => {
                swapchain.destroy(gpu.device(), surface.swapchain_loader());
                Err(e)
            }
        }
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.attachments.render_pass.handle()
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.attachments.framebuffers[image_index as usize].handle()
    }

    /// Semaphore signaled when rendering to `image_index` is done. Owned by
    /// the image, since presentation may hold it past the next frame.
    pub fn render_finished(&self, image_index: u32) -> vk::Semaphore {
        self.attachments.render_finished[image_index as usize]
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext, surface: &SurfaceContext) {
        self.attachments.destroy(gpu);
        self.swapchain.destroy(gpu.device(), surface.swapchain_loader());
    }
}

impl Attachments {
    unsafe fn new(gpu: &GpuContext, swapchain: &Swapchain, depth_format: vk::Format) -> Result<Self> {
        let device = gpu.device();
        let extent = swapchain.extent();

        let depth_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(depth_format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut depth_image =
            gpu.allocator()
                .lock()
                .create_image(&depth_info, MemoryLocation::GpuOnly, "depth")?;

        let render_pass = match RenderPass::new(device, swapchain.format(), depth_format) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                if let Err(free_error) = gpu.allocator().lock().free_image(&mut depth_image) {
                    tracing::warn!("Failed to free depth image: {free_error}");
                }
                return Err(e.into());
            }
        };

        let mut attachments = Self {
            depth_image,
            depth_view: vk::ImageView::null(),
            render_pass,
            framebuffers: Vec::with_capacity(swapchain.image_count()),
            render_finished: Vec::with_capacity(swapchain.image_count()),
        };

        if let Err(e) = attachments.populate(device, swapchain) {
            attachments.destroy(gpu);
            return Err(e);
        }

        Ok(attachments)
    }

    unsafe fn populate(&mut self, device: &ash::Device, swapchain: &Swapchain) -> Result<()> {
        self.depth_view = self
            .depth_image
            .create_view(device, depth_aspect(self.depth_image.format))?;

        for &color_view in swapchain.image_views() {
            self.framebuffers.push(Framebuffer::new(
                device,
                &self.render_pass,
                color_view,
                self.depth_view,
                swapchain.extent(),
            )?);
            self.render_finished.push(create_semaphore(device)?);
        }

        Ok(())
    }

    unsafe fn destroy(&mut self, gpu: &GpuContext) {
        let device = gpu.device();

        for semaphore in self.render_finished.drain(..) {
            device.destroy_semaphore(semaphore, None);
        }
        for framebuffer in self.framebuffers.drain(..) {
            framebuffer.destroy(device);
        }
        self.render_pass.destroy(device);

        if self.depth_view != vk::ImageView::null() {
            device.destroy_image_view(self.depth_view, None);
        }
        if let Err(e) = gpu.allocator().lock().free_image(&mut self.depth_image) {
            tracing::warn!("Failed to free depth image: {e}");
        }
    }
}

/// Attachment views of combined formats must cover both aspects.
fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}
