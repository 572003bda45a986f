//! Command buffer management.

use std::sync::Arc;

use ash::vk;

use crate::error::Result;
use crate::sync::Fence;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: device is live and the queue family was validated at device creation.
        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self {
            pool,
            device: Arc::clone(device),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate a single primary command buffer.
    ///
    /// The buffer is freed together with the pool.
    pub fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: the pool is owned by this device.
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: command buffers from this pool are idle by the time it is dropped.
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Reset and begin recording a command buffer for one-time submission.
///
/// # Safety
/// The command buffer must not be pending execution.
pub unsafe fn begin_one_time(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: guaranteed by the caller.
    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.begin_command_buffer(cmd, &begin_info)?;
    }
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The command buffer must be in the recording state.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: guaranteed by the caller.
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// A semaphore wait or signal at a pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreStage {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

impl SemaphoreStage {
    pub fn new(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self { semaphore, stage }
    }

    fn info(self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(self.stage)
            .device_index(0)
            .value(1)
    }
}

/// Submit one command buffer with `vkQueueSubmit2`.
///
/// # Safety
/// All handles must be valid and the command buffer fully recorded.
pub unsafe fn submit_command_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: Option<SemaphoreStage>,
    signal: Option<SemaphoreStage>,
    fence: vk::Fence,
) -> Result<()> {
    let cmd_infos = [vk::CommandBufferSubmitInfo::default()
        .command_buffer(cmd)
        .device_mask(0)];
    let wait_infos: Vec<_> = wait.into_iter().map(SemaphoreStage::info).collect();
    let signal_infos: Vec<_> = signal.into_iter().map(SemaphoreStage::info).collect();

    let submit = vk::SubmitInfo2::default()
        .command_buffer_infos(&cmd_infos)
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    // SAFETY: guaranteed by the caller.
    unsafe { device.queue_submit2(queue, &[submit], fence)? };
    Ok(())
}

/// Blocking one-shot submission with its own pool, command buffer and fence.
///
/// Used for uploads outside the frame loop.
pub struct ImmediateSubmitter {
    command_buffer: vk::CommandBuffer,
    fence: Fence,
    // Owns `command_buffer`.
    #[allow(dead_code)]
    pool: CommandPool,
    queue: vk::Queue,
    timeout_ns: u64,
}

impl ImmediateSubmitter {
    pub fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        queue: vk::Queue,
        timeout_ns: u64,
    ) -> Result<Self> {
        let pool = CommandPool::new(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = pool.allocate_command_buffer()?;
        let fence = Fence::new(device, false)?;

        Ok(Self {
            command_buffer,
            fence,
            pool,
            queue,
            timeout_ns,
        })
    }

    /// Record commands with `record`, submit them and wait for completion.
    pub fn submit<F>(&self, device: &ash::Device, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        self.fence.reset()?;

        let cmd = self.command_buffer;
        // SAFETY: the previous submission completed when its fence wait returned.
        unsafe {
            begin_one_time(device, cmd)?;
            record(cmd);
            end_command_buffer(device, cmd)?;
            submit_command_buffer(device, self.queue, cmd, None, None, self.fence.handle())?;
        }

        self.fence.wait(self.timeout_ns)
    }
}
