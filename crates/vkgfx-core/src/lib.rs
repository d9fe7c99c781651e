//! Core resource bookkeeping for vkgfx.
//!
//! This crate provides the storage layer the renderer builds on:
//! - `ResourceHandle`, a copyable (index, generation) pair
//! - Typed handle newtypes so handles into different containers cannot mix
//! - `ResourceContainer`, dense storage with O(1) add, remove and lookup
//!
//! Nothing in here touches Vulkan. GPU objects are just values of `T`.

pub mod container;
pub mod error;
pub mod handle;

pub use container::ResourceContainer;
pub use error::{CoreError, Result};
pub use handle::{
    BufferHandle, Handle, ImageHandle, MaterialHandle, MeshHandle, ResourceHandle, SamplerHandle,
    ShaderModuleHandle, TextureHandle,
};
