//! Owning wrappers around the Vulkan objects vkgfx renders with.
//!
//! [`GpuContext`] picks and opens a device; [`GpuAllocator`] hands out
//! buffer and image memory; the remaining modules wrap shader modules,
//! samplers, descriptor layouts, render passes, pipelines, swapchains and
//! frame synchronization.
//!
//! Wrappers are move-only. Each one is released by an explicit
//! `unsafe fn destroy` once the GPU no longer uses it, usually through a
//! [`DeferredDeletionQueue`].

pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use deferred::DeferredDeletionQueue;
pub use descriptors::{DescriptorCapabilities, DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage, MemoryStats};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineDesc, PipelineLayout};
pub use render_pass::{Framebuffer, RenderPass};
pub use sampler::{Sampler, SamplerDesc, SamplerFilter, SamplerWrapMode};
pub use shader::{ShaderModule, ShaderModuleType};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{Swapchain, SwapchainConfig};
pub use sync::FrameSync;
