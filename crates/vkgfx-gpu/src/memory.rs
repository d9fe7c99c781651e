//! Device memory for buffers and images, backed by `gpu-allocator`.
//!
//! Every resource created here owns its [`Allocation`]. Freeing goes back
//! through [`GpuAllocator`] so the sub-allocation is returned before the
//! Vulkan object is destroyed.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

/// Counts of what the allocator currently hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub buffers: usize,
    pub images: usize,
    pub bytes: u64,
}

impl MemoryStats {
    fn track(&mut self, kind: ResourceKind, bytes: u64) {
        match kind {
            ResourceKind::Buffer => self.buffers += 1,
            ResourceKind::Image => self.images += 1,
        }
        self.bytes += bytes;
    }

    fn untrack(&mut self, kind: ResourceKind, bytes: u64) {
        match kind {
            ResourceKind::Buffer => self.buffers = self.buffers.saturating_sub(1),
            ResourceKind::Image => self.images = self.images.saturating_sub(1),
        }
        self.bytes = self.bytes.saturating_sub(bytes);
    }
}

#[derive(Debug, Clone, Copy)]
enum ResourceKind {
    Buffer,
    Image,
}

/// Owns the `gpu-allocator` instance for one device.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    stats: MemoryStats,
}

impl GpuAllocator {
    /// # Safety
    /// `instance`, `device` and `physical_device` must be valid and related.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let debug_settings = AllocatorDebugSettings {
            log_memory_information: cfg!(debug_assertions),
            log_leaks_on_shutdown: true,
            ..AllocatorDebugSettings::default()
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
            stats: MemoryStats::default(),
        })
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Create an exclusive buffer of `size` bytes with bound memory.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let device = self.device.clone();
        let allocation = self.allocate_bound(
            ResourceKind::Buffer,
            requirements,
            location,
            name,
            |allocation| unsafe {
                device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            },
            || unsafe { device.destroy_buffer(buffer, None) },
        )?;

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Create an optimally tiled image described by `info` with bound memory.
    pub fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let device = self.device.clone();
        let allocation = self.allocate_bound(
            ResourceKind::Image,
            requirements,
            location,
            name,
            |allocation| unsafe {
                device.bind_image_memory(image, allocation.memory(), allocation.offset())
            },
            || unsafe { device.destroy_image(image, None) },
        )?;

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: info.format,
            extent: info.extent,
        })
    }

    /// Sub-allocate memory and bind it. On any failure the fresh object is
    /// destroyed through `discard` and its memory returned.
    fn allocate_bound(
        &mut self,
        kind: ResourceKind,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        name: &str,
        bind: impl FnOnce(&Allocation) -> ash::prelude::VkResult<()>,
        discard: impl FnOnce(),
    ) -> Result<Allocation> {
        let Some(allocator) = self.allocator.as_mut() else {
            discard();
            return Err(shut_down());
        };

        let desc = AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: matches!(kind, ResourceKind::Buffer),
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        };
        let allocation = match allocator.allocate(&desc) {
            Ok(allocation) => allocation,
            Err(e) => {
                discard();
                return Err(GpuError::AllocationFailed(format!("{name}: {e}")));
            }
        };

        if let Err(e) = bind(&allocation) {
            discard();
            if let Err(free_error) = allocator.free(allocation) {
                tracing::warn!("Failed to return memory of {name}: {free_error}");
            }
            return Err(e.into());
        }

        self.stats.track(kind, requirements.size);
        tracing::trace!(name, size = requirements.size, ?location, "Bound device memory");
        Ok(allocation)
    }

    fn release(&mut self, kind: ResourceKind, allocation: Option<Allocation>) -> Result<()> {
        let Some(allocation) = allocation else {
            return Ok(());
        };
        let allocator = self.allocator.as_mut().ok_or_else(shut_down)?;
        let bytes = allocation.size();
        allocator
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        self.stats.untrack(kind, bytes);
        Ok(())
    }

    /// Return the buffer's memory and destroy it. Safe to call twice.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        self.release(ResourceKind::Buffer, buffer.allocation.take())?;
        if buffer.buffer != vk::Buffer::null() {
            unsafe { self.device.destroy_buffer(buffer.buffer, None) };
            buffer.buffer = vk::Buffer::null();
        }
        Ok(())
    }

    /// Return the image's memory and destroy it. Safe to call twice.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        self.release(ResourceKind::Image, image.allocation.take())?;
        if image.image != vk::Image::null() {
            unsafe { self.device.destroy_image(image.image, None) };
            image.image = vk::Image::null();
        }
        Ok(())
    }

    /// Drop the underlying allocator. Anything still allocated is reported
    /// as a leak. Has to happen before the device goes away.
    pub fn shutdown(&mut self) {
        if self.allocator.take().is_some() && self.stats != MemoryStats::default() {
            tracing::warn!(stats = ?self.stats, "Allocator shut down with live resources");
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn shut_down() -> GpuError {
    GpuError::InvalidState("Allocator already shut down".to_string())
}

/// A buffer and the memory bound to it.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Host pointer to the start of the buffer. `None` for device-local memory.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        let allocation = self.allocation.as_ref()?;
        allocation.mapped_ptr().map(|ptr| ptr.as_ptr().cast())
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped_ptr().is_some()
    }

    /// Copy `data` into mapped memory at byte `offset`.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let base = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let start = checked_range(offset, data.len(), self.size)?;

        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(start), data.len()) };
        Ok(())
    }

    pub fn write_pod<T: bytemuck::Pod>(&self, offset: u64, data: &[T]) -> Result<()> {
        self.write_bytes(offset, bytemuck::cast_slice(data))
    }
}

/// Validate that `len` bytes at `offset` fit in `capacity` and return the
/// start as a host offset.
fn checked_range(offset: u64, len: usize, capacity: u64) -> Result<usize> {
    let fits = offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= capacity);
    if !fits {
        return Err(GpuError::InvalidState(format!(
            "Write of {len} bytes at {offset} overflows {capacity}-byte buffer"
        )));
    }
    usize::try_from(offset).map_err(|_| GpuError::InvalidState("Offset exceeds address space".into()))
}

/// An image and the memory bound to it.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// # Safety
    /// `device` must be the device that created the image.
    pub unsafe fn create_view(
        &self,
        device: &ash::Device,
        aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        create_image_view(device, self.image, self.format, aspect)
    }
}

/// View the first mip level and layer of a 2D image.
///
/// # Safety
/// `image` must have been created by `device`.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let range = vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(range);

    Ok(device.create_image_view(&info, None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_inside_capacity() {
        assert_eq!(checked_range(0, 16, 16).unwrap(), 0);
        assert_eq!(checked_range(8, 8, 16).unwrap(), 8);
        assert_eq!(checked_range(16, 0, 16).unwrap(), 16);
    }

    #[test]
    fn range_past_capacity_rejected() {
        assert!(checked_range(9, 8, 16).is_err());
        assert!(checked_range(u64::MAX, 1, u64::MAX).is_err());
    }

    #[test]
    fn stats_follow_tracked_resources() {
        let mut stats = MemoryStats::default();
        stats.track(ResourceKind::Buffer, 256);
        stats.track(ResourceKind::Image, 1024);
        assert_eq!(
            stats,
            MemoryStats {
                buffers: 1,
                images: 1,
                bytes: 1280
            }
        );

        stats.untrack(ResourceKind::Buffer, 256);
        stats.untrack(ResourceKind::Buffer, 256);
        assert_eq!(stats.buffers, 0);
        assert_eq!(stats.bytes, 768);
    }
}
