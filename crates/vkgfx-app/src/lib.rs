//! Windowed applications on top of the vkgfx [`Renderer`].
//!
//! [`run_app`] opens a winit window, creates the [`GpuContext`] and the
//! renderer, then drives a [`RenderApp`] until the window closes. The app
//! registers resources in [`RenderApp::init`] and pushes [`DrawItem`]s from
//! [`RenderApp::render`]. Frame pacing, resizes and teardown are handled
//! here.
//!
//! # Example
//!
//! ```no_run
//! use vkgfx_app::{run_app, AppConfig, AppContext, FrameContext, RenderApp};
//!
//! struct Empty;
//!
//! impl RenderApp for Empty {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Empty)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Empty>(AppConfig::new("empty"))
//! }
//! ```

mod app;
mod clock;
mod config;
mod context;
mod frame;
mod runner;

pub use app::RenderApp;
pub use config::AppConfig;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{init_tracing, run_app};

pub use vkgfx_gpu::{GpuContext, GpuContextBuilder};
pub use vkgfx_render::{Camera, DrawItem, FrameOutcome, Light, Renderer, ResourceManager};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
