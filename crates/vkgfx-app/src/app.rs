//! The hooks an application implements.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// An application run by [`run_app`](crate::run_app).
///
/// Hooks are called from the event loop thread in this order each frame:
/// [`update`](Self::update), then [`render`](Self::render). The renderer
/// acquires, records, submits and presents after `render` returns.
pub trait RenderApp: Sized {
    /// Build the application once the window and renderer exist. Resources
    /// are registered through [`AppContext::resources`].
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance by `dt` seconds. The frame slot has already retired, so
    /// mutable buffers can be rewritten here.
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Push this frame's [`DrawItem`](vkgfx_render::DrawItem)s.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// The window changed size. Also fires with zero sizes when minimized.
    /// The swapchain follows on the next frame.
    fn on_resize(&mut self, _ctx: &mut AppContext, _width: u32, _height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns `true` to stop the runner from handling `event` itself.
    fn on_event(&mut self, _event: &WindowEvent) -> bool {
        false
    }

    fn on_device_event(&mut self, _device_id: DeviceId, _event: &DeviceEvent) {}

    /// Called with the GPU idle, before the renderer releases whatever is
    /// still registered.
    fn cleanup(&mut self, _ctx: &mut AppContext) {}
}
