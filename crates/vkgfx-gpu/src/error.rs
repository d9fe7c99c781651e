//! Errors raised by the Vulkan wrapper layer.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan call returned an error code.
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Could not load the Vulkan library: {0}")]
    Loading(String),

    /// No physical device passed selection.
    #[error("No usable GPU")]
    NoSuitableDevice,

    #[error("Device memory allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Cannot create window surface: {0}")]
    SurfaceCreation(String),

    #[error("Cannot create swapchain: {0}")]
    SwapchainCreation(String),

    /// The surface changed and the swapchain has to be rebuilt before the
    /// next acquire.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("Rejected SPIR-V: {0}")]
    InvalidShader(String),

    #[error("Cannot create pipeline: {0}")]
    PipelineCreation(String),

    /// None of the candidate depth formats supports attachment use.
    #[error("No depth attachment format available")]
    NoDepthFormat,

    /// An object was used in a state that does not allow the operation.
    #[error("{0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
