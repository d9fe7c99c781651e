//! Render error types.

use ash::vk;
use thiserror::Error;
use vkgfx_core::CoreError;
use vkgfx_gpu::GpuError;

/// Errors raised while managing resources or rendering a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Error from the Vulkan wrapper layer.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Resource storage error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Raw Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A handle did not resolve to a live resource.
    #[error("Missing {0}")]
    MissingResource(&'static str),

    /// Write outside a resource's bounds.
    #[error("Write of {len} bytes at {offset} overflows {size}-byte {resource}")]
    OutOfBounds {
        resource: &'static str,
        offset: u64,
        len: usize,
        size: u64,
    },

    /// Upload data that does not match the resource it targets.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Push constant block larger than the renderer allows.
    #[error("Push constants of {0} bytes exceed the 64-byte limit")]
    PushConstantsTooLarge(usize),

    /// Request the renderer cannot express.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
