//! Synchronization primitives.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Owned binary semaphore.
pub struct Semaphore {
    handle: vk::Semaphore,
    device: Arc<ash::Device>,
}

impl Semaphore {
    /// Create a semaphore.
    pub fn new(device: &Arc<ash::Device>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: device is a live logical device.
        let handle = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: owners drop sync objects only after a device idle wait.
        unsafe { self.device.destroy_semaphore(self.handle, None) };
    }
}

/// Owned fence.
pub struct Fence {
    handle: vk::Fence,
    device: Arc<ash::Device>,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    ///
    /// Per-frame fences start signaled so the first wait on a fresh slot
    /// returns immediately.
    pub fn new(device: &Arc<ash::Device>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: device is a live logical device.
        let handle = unsafe { device.create_fence(&create_info, None)? };
        Ok(Self {
            handle,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence is signaled or `timeout_ns` elapses.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        // SAFETY: the fence belongs to this device.
        unsafe { self.device.wait_for_fences(&[self.handle], true, timeout_ns) }
            .map_err(|e| GpuError::from_wait(e, "fence", timeout_ns))
    }

    /// Reset the fence to unsignaled.
    pub fn reset(&self) -> Result<()> {
        // SAFETY: the fence belongs to this device and is not pending.
        unsafe { self.device.reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: owners drop sync objects only after a device idle wait.
        unsafe { self.device.destroy_fence(self.handle, None) };
    }
}
