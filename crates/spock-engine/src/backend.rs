//! GPU operations the renderer drives each frame.

use anyhow::Result;
use ash::vk;

use crate::mesh::{MeshAsset, MeshHandle};
use crate::record::CommandRecorder;

/// Result of rebuilding the swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: vk::Extent2D,
    pub image_count: usize,
    pub view_count: usize,
}

/// Per-frame GPU operations, addressed by frame slot.
///
/// The renderer calls these in a fixed order each frame:
/// wait, reset, acquire, record, submit, present.
pub trait FrameBackend {
    /// Block until the slot's previous submission finished.
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> Result<()>;

    fn reset_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquire a swapchain image, signaling the slot's image-available
    /// semaphore. Returns the image index.
    fn acquire_next_image(&mut self, slot: usize, timeout_ns: u64) -> Result<u32>;

    /// Reset and record the slot's command buffer.
    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        record: &mut dyn FnMut(&mut dyn CommandRecorder),
    ) -> Result<()>;

    /// Submit the slot's command buffer, waiting on image-available and
    /// signaling render-finished and the slot fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` after render-finished is signaled.
    ///
    /// Returns `true` when the swapchain should be rebuilt.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool>;

    fn swapchain_extent(&self) -> vk::Extent2D;

    fn draw_extent(&self) -> vk::Extent2D;

    /// Destroy the swapchain and create a new one for a `width` x `height` window.
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<SwapchainInfo>;

    fn upload_mesh(&mut self, mesh: &MeshAsset) -> Result<MeshHandle>;

    fn wait_idle(&mut self) -> Result<()>;
}
