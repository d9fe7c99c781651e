//! Command pools, recording and queue submission.

use crate::error::{GpuError, Result};
use crate::sync::{create_fence, wait_for_fence};
use ash::vk;

/// Pool of primary command buffers for one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// A transient pool. Its buffers are recycled all at once by [`reset`].
    ///
    /// [`reset`]: CommandPool::reset
    ///
    /// # Safety
    /// `queue_family` must exist on `device`.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        Self::with_flags(device, queue_family, vk::CommandPoolCreateFlags::TRANSIENT)
    }

    /// # Safety
    /// `queue_family` must exist on `device`.
    pub unsafe fn with_flags(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let pool = device.create_command_pool(&info, None)?;
        Ok(Self { pool, queue_family })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// # Safety
    /// `device` must own the pool.
    pub unsafe fn allocate(&self, device: &ash::Device, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(device.allocate_command_buffers(&info)?)
    }

    /// # Safety
    /// `device` must own the pool.
    pub unsafe fn allocate_one(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        self.allocate(device, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))
    }

    /// Return every buffer of the pool to the initial state.
    ///
    /// # Safety
    /// No buffer from this pool may still be executing.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        Ok(())
    }

    /// Record a one-time buffer with `record`, run it on `queue` and block
    /// until it retires. Meant for uploads, not per-frame work.
    ///
    /// # Safety
    /// `queue` must belong to this pool's family on `device`.
    pub unsafe fn submit_and_wait<F>(&self, device: &ash::Device, queue: vk::Queue, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let cmd = self.allocate_one(device)?;
        let fence = match create_fence(device, false) {
            Ok(fence) => fence,
            Err(e) => {
                device.free_command_buffers(self.pool, &[cmd]);
                return Err(e);
            }
        };

        let result = record_and_run(device, queue, cmd, fence, record);

        device.destroy_fence(fence, None);
        device.free_command_buffers(self.pool, &[cmd]);
        result
    }

    /// # Safety
    /// No buffer from this pool may still be executing.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

unsafe fn record_and_run<F>(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    record(cmd);
    device.end_command_buffer(cmd)?;

    let buffers = [cmd];
    let info = vk::SubmitInfo::default().command_buffers(&buffers);
    device.queue_submit(queue, &[info], fence)?;
    wait_for_fence(device, fence, u64::MAX)
}

/// # Safety
/// `cmd` must be in the initial state.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let info = vk::CommandBufferBeginInfo {
        flags,
        ..Default::default()
    };
    device.begin_command_buffer(cmd, &info)?;
    Ok(())
}

/// Semaphores and fence of one frame submission.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmit {
    /// Waited on before `wait_stage` runs.
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    /// Signaled when the command buffer completes.
    pub signal: vk::Semaphore,
    /// Signaled alongside `signal`.
    pub fence: vk::Fence,
}

impl FrameSubmit {
    /// # Safety
    /// Every handle must belong to `device` and `fence` must be unsignaled.
    pub unsafe fn submit(&self, device: &ash::Device, queue: vk::Queue, cmd: vk::CommandBuffer) -> Result<()> {
        let buffers = [cmd];
        let waits = [self.wait];
        let stages = [self.wait_stage];
        let signals = [self.signal];

        let info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signals);

        device.queue_submit(queue, &[info], self.fence)?;
        Ok(())
    }
}

/// Submit a batch without command buffers that only waits on `semaphore`.
/// Unsignals a semaphore whose signal nobody else will wait on, and
/// signals `fence` when not null.
///
/// # Safety
/// `semaphore` must have a pending or completed signal, and `fence` must be
/// null or unsignaled.
pub unsafe fn submit_wait_only(
    device: &ash::Device,
    queue: vk::Queue,
    semaphore: vk::Semaphore,
    stage: vk::PipelineStageFlags,
    fence: vk::Fence,
) -> Result<()> {
    let waits = [semaphore];
    let stages = [stage];
    let info = vk::SubmitInfo::default()
        .wait_semaphores(&waits)
        .wait_dst_stage_mask(&stages);

    device.queue_submit(queue, &[info], fence)?;
    Ok(())
}
