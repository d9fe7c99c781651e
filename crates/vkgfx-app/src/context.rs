//! State handed to every [`RenderApp`](crate::RenderApp) hook.

use std::sync::Arc;

use ash::vk;
use vkgfx_gpu::GpuContext;
use vkgfx_render::{Renderer, ResourceManager};
use winit::window::Window;

use crate::config::AppConfig;

pub struct AppContext {
    pub window: Arc<Window>,
    pub gpu: Arc<GpuContext>,
    /// Presents to `window`.
    pub renderer: Renderer,
    pub config: AppConfig,
    /// Frames presented so far.
    pub frame_count: u64,
}

impl AppContext {
    /// # Safety
    /// [`cleanup`](Self::cleanup) has to run before `window` is dropped.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: Arc<GpuContext>,
        config: AppConfig,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // SAFETY: `window` is stored next to the renderer and outlives it
        let renderer = unsafe {
            Renderer::new(gpu.clone(), window.as_ref(), size.width, size.height, config.vsync)?
        };

        Ok(Self {
            window,
            gpu,
            renderer,
            config,
            frame_count: 0,
        })
    }

    pub fn resources(&mut self) -> &mut ResourceManager {
        self.renderer.resources_mut()
    }

    /// Swapchain extent. Zero while minimized.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.extent()
    }

    /// Width over height of the window, 1 for a degenerate window.
    pub fn aspect_ratio(&self) -> f32 {
        let size = self.window.inner_size();
        aspect_ratio(size.width, size.height)
    }

    /// # Safety
    /// Once only, while the window is alive.
    pub(crate) unsafe fn cleanup(&mut self) {
        // SAFETY: forwarded from the caller
        unsafe { self.renderer.destroy() };
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        return 1.0;
    }
    width as f32 / height as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aspect_ratio_of_window() {
        assert_relative_eq!(aspect_ratio(1920, 1080), 16.0 / 9.0);
        assert_relative_eq!(aspect_ratio(0, 0), 1.0);
    }
}
