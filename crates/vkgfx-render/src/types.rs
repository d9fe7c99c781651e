//! Resource records stored by the [`ResourceManager`](crate::ResourceManager).

use ash::vk;
use vkgfx_core::{BufferHandle, ImageHandle, SamplerHandle, TextureHandle};
use vkgfx_gpu::{DescriptorCapabilities, GpuBuffer, GpuImage};

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex and index data.
    VertexIndex,
    /// Uniform data read through a dynamic descriptor.
    Uniform,
}

impl BufferUsage {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        match self {
            Self::VertexIndex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER
            }
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLocation {
    /// Filled through a staging copy.
    DeviceLocal,
    /// Mapped and written directly by the CPU.
    HostVisible,
}

/// Creation parameters of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferMetadata {
    pub usage: BufferUsage,
    pub location: BufferLocation,
    /// Mutable buffers keep one copy per frame in flight so the CPU can
    /// write the current frame's copy while older frames are still read.
    pub is_mutable: bool,
}

impl BufferMetadata {
    pub const fn new(usage: BufferUsage, location: BufferLocation, is_mutable: bool) -> Self {
        Self {
            usage,
            location,
            is_mutable,
        }
    }
}

/// A buffer owned by the resource manager.
pub struct Buffer {
    pub gpu: GpuBuffer,
    pub metadata: BufferMetadata,
    /// Size requested by the caller.
    pub size: u64,
    /// Size of one slot, rounded up for dynamic uniform offsets.
    pub aligned_size: u64,
    /// Number of slots. One unless the buffer is mutable.
    pub slot_count: u32,
}

impl Buffer {
    /// Byte offset of the copy used by frame slot `slot`.
    pub const fn dynamic_offset(&self, slot: usize) -> u64 {
        slot_offset(self.aligned_size, self.slot_count, slot)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.gpu.buffer
    }
}

/// Offset of `slot` in a buffer of `slot_count` copies, each `aligned_size`
/// bytes. Single-slot buffers always start at 0.
pub const fn slot_offset(aligned_size: u64, slot_count: u32, slot: usize) -> u64 {
    if slot_count <= 1 {
        return 0;
    }
    (slot as u64 % slot_count as u64) * aligned_size
}

/// Texel layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    R8G8B8A8,
    /// BC1, 8 bytes per 4x4 block.
    Bc1,
    /// BC3, 16 bytes per 4x4 block.
    Bc3,
    /// BC5, 16 bytes per 4x4 block.
    Bc5,
}

impl ImageFormat {
    pub const fn to_vk(self) -> vk::Format {
        match self {
            Self::R8G8B8A8 => vk::Format::R8G8B8A8_UNORM,
            Self::Bc1 => vk::Format::BC1_RGBA_UNORM_BLOCK,
            Self::Bc3 => vk::Format::BC3_UNORM_BLOCK,
            Self::Bc5 => vk::Format::BC5_UNORM_BLOCK,
        }
    }

    /// Bytes needed for a `width` x `height` image with one mip level.
    pub const fn byte_size(self, width: u32, height: u32) -> u64 {
        let (width, height) = (width as u64, height as u64);
        match self {
            Self::R8G8B8A8 => width * height * 4,
            Self::Bc1 => width.div_ceil(4) * height.div_ceil(4) * 8,
            Self::Bc3 | Self::Bc5 => width.div_ceil(4) * height.div_ceil(4) * 16,
        }
    }
}

/// Creation parameters of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageMetadata {
    pub const fn byte_size(&self) -> u64 {
        self.format.byte_size(self.width, self.height)
    }
}

/// A sampled image owned by the resource manager.
pub struct Image {
    pub gpu: GpuImage,
    pub view: vk::ImageView,
    pub metadata: ImageMetadata,
}

/// Image paired with the sampler it is read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub image: ImageHandle,
    pub sampler: SamplerHandle,
}

/// Resources bound in the material set. Unused slots stay null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Material {
    pub uniform_buffer: BufferHandle,
    pub albedo: TextureHandle,
    pub normal_map: TextureHandle,
    pub shadow_map: TextureHandle,
}

impl Material {
    /// Capabilities implied by the non-null slots.
    pub fn capabilities(&self) -> DescriptorCapabilities {
        let mut capabilities = DescriptorCapabilities::empty();
        capabilities.set(
            DescriptorCapabilities::UNIFORM_BUFFER,
            self.uniform_buffer.is_valid(),
        );
        capabilities.set(DescriptorCapabilities::ALBEDO_TEXTURE, self.albedo.is_valid());
        capabilities.set(DescriptorCapabilities::NORMAL_MAP, self.normal_map.is_valid());
        capabilities.set(DescriptorCapabilities::SHADOW_MAP, self.shadow_map.is_valid());
        capabilities
    }

    /// Texture bound for one sampler capability.
    pub fn texture(&self, capability: DescriptorCapabilities) -> TextureHandle {
        if capability == DescriptorCapabilities::ALBEDO_TEXTURE {
            self.albedo
        } else if capability == DescriptorCapabilities::NORMAL_MAP {
            self.normal_map
        } else if capability == DescriptorCapabilities::SHADOW_MAP {
            self.shadow_map
        } else {
            TextureHandle::NULL
        }
    }
}

/// A range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlice {
    pub buffer: BufferHandle,
    pub offset: u64,
}

impl BufferSlice {
    pub const fn new(buffer: BufferHandle, offset: u64) -> Self {
        Self { buffer, offset }
    }
}

/// Width of mesh indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    U16,
    #[default]
    U32,
}

impl IndexType {
    pub const fn to_vk(self) -> vk::IndexType {
        match self {
            Self::U16 => vk::IndexType::UINT16,
            Self::U32 => vk::IndexType::UINT32,
        }
    }

    pub const fn size(self) -> u64 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Geometry drawn with one indexed draw call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    /// One slice per vertex binding of the pipeline layout.
    pub vertex_buffers: Vec<BufferSlice>,
    pub index_buffer: BufferSlice,
    pub index_type: IndexType,
    pub index_count: u32,
    /// First index read from the index buffer.
    pub index_offset: u32,
    /// Added to every index before fetching vertices.
    pub vertex_offset: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkgfx_core::{Handle, ResourceHandle};

    #[test]
    fn slot_offsets_step_by_aligned_size() {
        assert_eq!(slot_offset(256, 3, 0), 0);
        assert_eq!(slot_offset(256, 3, 1), 256);
        assert_eq!(slot_offset(256, 3, 2), 512);
    }

    #[test]
    fn single_slot_buffers_start_at_zero() {
        assert_eq!(slot_offset(256, 1, 2), 0);
        assert_eq!(slot_offset(256, 0, 1), 0);
    }

    #[test]
    fn block_compressed_sizes_round_up_to_blocks() {
        assert_eq!(ImageFormat::R8G8B8A8.byte_size(2, 2), 16);
        assert_eq!(ImageFormat::Bc1.byte_size(4, 4), 8);
        assert_eq!(ImageFormat::Bc1.byte_size(5, 5), 32);
        assert_eq!(ImageFormat::Bc3.byte_size(8, 4), 32);
        assert_eq!(ImageFormat::Bc5.byte_size(1, 1), 16);
    }

    #[test]
    fn material_capabilities_follow_bound_slots() {
        let texture = TextureHandle::from_raw(ResourceHandle::new(0, 0));
        let material = Material {
            albedo: texture,
            ..Material::default()
        };
        assert_eq!(
            material.capabilities(),
            DescriptorCapabilities::ALBEDO_TEXTURE
        );
        assert_eq!(
            material.texture(DescriptorCapabilities::ALBEDO_TEXTURE),
            texture
        );
        assert!(material
            .texture(DescriptorCapabilities::NORMAL_MAP)
            .is_null());
    }

    #[test]
    fn index_widths() {
        assert_eq!(IndexType::U16.size(), 2);
        assert_eq!(IndexType::U32.to_vk(), vk::IndexType::UINT32);
    }
}
