//! The winit event loop that drives a [`RenderApp`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vkgfx_gpu::GpuContextBuilder;
use vkgfx_render::FrameOutcome;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::RenderApp;
use crate::clock::FrameClock;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Back-off between frames while the window has no drawable area.
const MINIMIZED_SLEEP: Duration = Duration::from_millis(16);

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `info`. A subscriber installed earlier wins.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Open a window, bring up the GPU and run `A` until the window closes.
///
/// Errors from [`RenderApp::init`] end the loop and are returned here.
/// Per-frame errors are logged and the loop keeps going.
pub fn run_app<A: RenderApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_tracing();
    info!(title = %config.title, "Starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A>::new(config);
    event_loop.run_app(&mut runner)?;

    runner.init_error.map_or(Ok(()), Err)
}

struct AppRunner<A: RenderApp> {
    config: AppConfig,
    state: Option<Running<A>>,
    init_error: Option<anyhow::Error>,
}

/// Everything that exists between `resumed` and shutdown.
struct Running<A: RenderApp> {
    ctx: AppContext,
    app: A,
    clock: FrameClock,
}

impl<A: RenderApp> AppRunner<A> {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            state: None,
            init_error: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Running<A>> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = GpuContextBuilder::new()
            .app_name(self.config.title.as_str())
            .validation(self.config.validation)
            .build()?;

        // SAFETY: the context keeps the window and tears the renderer down in `shutdown`
        let mut ctx = unsafe { AppContext::new(window, Arc::new(gpu), self.config.clone())? };

        let app = A::init(&mut ctx).inspect_err(|_| {
            // SAFETY: the renderer has no other users yet
            unsafe { ctx.cleanup() }
        })?;

        Ok(Running {
            ctx,
            app,
            clock: FrameClock::new(self.config.min_frame_time()),
        })
    }

    fn stop(&mut self) {
        if let Some(mut running) = self.state.take() {
            running.shutdown();
        }
    }
}

impl<A: RenderApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.init_error.is_some() {
            return;
        }

        match self.start(event_loop) {
            Ok(running) => {
                info!("Initialized");
                self.state = Some(running);
            }
            Err(e) => {
                error!("Initialization failed: {e:#}");
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(running) = self.state.as_mut() else {
            return;
        };
        if running.app.on_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => running.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(e) = running.frame() {
                    error!("Frame failed: {e:#}");
                }
                running.ctx.window.request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, device_id: DeviceId, event: DeviceEvent) {
        if let Some(running) = self.state.as_mut() {
            running.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.state {
            running.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.stop();
    }
}

impl<A: RenderApp> Running<A> {
    /// Wait for the frame slot, let the app update and collect draws, then
    /// hand them to the renderer.
    fn frame(&mut self) -> anyhow::Result<()> {
        let started = Instant::now();
        let dt = self.clock.tick(started);

        // Per-frame buffers may only be written once the slot has retired.
        self.ctx.renderer.begin_frame()?;
        self.app.update(&mut self.ctx, dt);

        let mut frame = FrameContext::new(dt, self.ctx.frame_count);
        self.app.render(&self.ctx, &mut frame)?;

        let outcome = self.ctx.renderer.draw_frame(&frame.draws)?;
        match outcome {
            FrameOutcome::Presented => self.ctx.frame_count += 1,
            FrameOutcome::Skipped if self.ctx.extent().width == 0 => thread::sleep(MINIMIZED_SLEEP),
            FrameOutcome::Skipped => {}
        }

        if let Some(left) = self.clock.remaining(started, Instant::now()) {
            thread::sleep(left);
        }
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.ctx.renderer.resize(size.width, size.height);
        if let Err(e) = self.app.on_resize(&mut self.ctx, size.width, size.height) {
            error!("Resize handler failed: {e:#}");
        }
        tracing::debug!(width = size.width, height = size.height, "Resized");
    }

    fn shutdown(&mut self) {
        if let Some((min, max, avg)) = self.clock.stats().summary() {
            info!(
                frames = self.ctx.frame_count,
                "FPS min {min:.1}, max {max:.1}, avg {avg:.1}"
            );
        }

        if let Err(e) = self.ctx.renderer.wait_idle() {
            warn!("Device did not go idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);

        // SAFETY: runs once, right before the state is dropped, with the window alive
        unsafe { self.ctx.cleanup() };
        info!("Shut down");
    }
}
