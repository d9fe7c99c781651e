//! Per-frame slots cycled by the renderer.

use crate::error::Result;
use ash::vk;
use vkgfx_gpu::descriptors::DescriptorPool;
use vkgfx_gpu::{CommandPool, DescriptorCapabilities, FrameSync};

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAME_RESOURCE_COUNT: usize = 3;

/// Sets each descriptor pool is sized for.
const DESCRIPTOR_SETS_PER_POOL: u32 = 256;

/// Fixed ring of per-frame values with a cursor on the current one.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    current: usize,
}

impl<T> FrameRing<T> {
    /// Build `count` slots with `init`, stopping at the first error.
    pub fn try_new<E>(
        count: usize,
        mut init: impl FnMut(usize) -> std::result::Result<T, E>,
    ) -> std::result::Result<Self, E> {
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            slots.push(init(index)?);
        }
        Ok(Self { slots, current: 0 })
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    /// Index of the current slot.
    pub fn index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Move to the next slot, wrapping around.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    /// Take every slot out of the ring.
    pub fn into_inner(self) -> Vec<T> {
        self.slots
    }
}

/// Everything one frame in flight owns.
pub struct FrameResources {
    pub sync: FrameSync,
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Pools for this frame's descriptor sets. Reset together when the slot
    /// is reused; a new pool is appended when all are full.
    pub descriptor_pools: Vec<DescriptorPool>,
}

impl FrameResources {
    /// # Safety
    /// The device must be valid and `queue_family` must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let sync = FrameSync::new(device)?;
        let command_pool = CommandPool::new(device, queue_family)?;
        let command_buffer = command_pool.allocate_one(device)?;
        let descriptor_pools = vec![new_descriptor_pool(device)?];

        Ok(Self {
            sync,
            command_pool,
            command_buffer,
            descriptor_pools,
        })
    }

    /// Return the command buffer and every descriptor set to their pools.
    ///
    /// # Safety
    /// The slot's previous submission must have completed.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        self.command_pool.reset(device)?;
        for pool in &self.descriptor_pools {
            pool.reset(device)?;
        }
        Ok(())
    }

    /// Allocate a descriptor set, growing the pool list when every pool is
    /// exhausted.
    ///
    /// # Safety
    /// The device and layout must be valid.
    pub unsafe fn allocate_descriptor_set(
        &mut self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        for pool in &self.descriptor_pools {
            if let Some(set) = pool.try_allocate(device, layout)? {
                return Ok(set);
            }
        }

        tracing::debug!(
            "Descriptor pools exhausted, adding pool {}",
            self.descriptor_pools.len() + 1
        );
        let pool = new_descriptor_pool(device)?;
        let set = pool.try_allocate(device, layout)?;
        self.descriptor_pools.push(pool);

        set.ok_or_else(|| vk::Result::ERROR_OUT_OF_POOL_MEMORY.into())
    }

    /// # Safety
    /// The device must be valid and the slot must be idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for pool in &self.descriptor_pools {
            pool.destroy(device);
        }
        self.command_pool.destroy(device);
        self.sync.destroy(device);
    }
}

unsafe fn new_descriptor_pool(device: &ash::Device) -> Result<DescriptorPool> {
    let samplers_per_set = DescriptorCapabilities::all().sampler_count();
    Ok(DescriptorPool::new(
        device,
        DESCRIPTOR_SETS_PER_POOL,
        samplers_per_set,
    )?)
}
