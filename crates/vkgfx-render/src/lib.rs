//! Rendering layer for vkgfx.
//!
//! This crate provides:
//! - Structural pipeline keys and a get-or-create `PipelineCache`
//! - `ResourceManager`, handle-based ownership of buffers, images, shaders,
//!   samplers, textures, materials and meshes
//! - Camera and light uniforms
//! - `Renderer`, a frame loop with three frames in flight
//!
//! Resources are addressed by typed handles from `vkgfx-core`. A handle that
//! outlived its resource resolves to nothing instead of a dangling object.

pub mod cache;
pub mod camera;
pub mod draw;
pub mod error;
pub mod frame;
pub mod key;
pub mod renderer;
pub mod resources;
pub mod target;
pub mod types;

pub use cache::PipelineCache;
pub use camera::{Camera, CameraData, Light};
pub use draw::{DrawItem, RecordingState};
pub use error::{RenderError, Result};
pub use frame::{FrameRing, FRAME_RESOURCE_COUNT};
pub use key::{
    AttributeType, DescriptorSetLayoutKey, Extent, PipelineConfiguration, PipelineDescription,
    PipelineLayoutKey, PushConstantRange, RenderConfiguration, ShaderKey, VertexAttribute,
    VertexBinding, VertexLayout, VertexTopology, MAX_PUSH_CONSTANTS_SIZE,
};
pub use renderer::{FrameOutcome, Renderer};
pub use resources::ResourceManager;
pub use types::{
    Buffer, BufferLocation, BufferMetadata, BufferSlice, BufferUsage, Image, ImageFormat,
    ImageMetadata, IndexType, Material, Mesh, Texture,
};

pub use vkgfx_core::{
    BufferHandle, ImageHandle, MaterialHandle, MeshHandle, ResourceHandle, SamplerHandle,
    ShaderModuleHandle, TextureHandle,
};
