//! Binary semaphores, fences and the objects a frame slot waits on.

use crate::error::Result;
use ash::vk;

/// # Safety
/// `device` must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo::default();
    Ok(device.create_semaphore(&info, None)?)
}

/// # Safety
/// `device` must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo {
        flags,
        ..Default::default()
    };
    Ok(device.create_fence(&info, None)?)
}

/// # Safety
/// `fence` must belong to `device`.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns)?;
    Ok(())
}

/// # Safety
/// `fence` must belong to `device` and not be part of a pending submission.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(std::slice::from_ref(&fence))?;
    Ok(())
}

/// What a frame slot waits on before it is reused.
///
/// The fence is created signaled, so a slot that never submitted passes
/// its first wait. The semaphore signaled at the end of rendering belongs to
/// the swapchain image, not to the slot.
pub struct FrameSync {
    /// Signaled once the acquired swapchain image may be written.
    pub image_available: vk::Semaphore,
    /// Signaled when the slot's last submission retired.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// # Safety
    /// `device` must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let image_available = create_semaphore(device)?;
        create_fence(device, true)
            .map(|in_flight| Self {
                image_available,
                in_flight,
            })
            .inspect_err(|_| device.destroy_semaphore(image_available, None))
    }

    /// Block until the slot's previous submission retired.
    ///
    /// # Safety
    /// `device` must own the fence.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        wait_for_fence(device, self.in_flight, u64::MAX)
    }

    /// Only valid right before the submission that signals the fence again.
    ///
    /// # Safety
    /// `device` must own the fence.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        reset_fence(device, self.in_flight)
    }

    /// # Safety
    /// Neither object may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_fence(self.in_flight, None);
    }
}
