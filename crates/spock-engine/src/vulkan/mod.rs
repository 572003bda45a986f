//! Vulkan implementation of [`FrameBackend`].

mod pipelines;
mod recorder;
mod upload;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use spock_gpu::command::{begin_one_time, end_command_buffer, submit_command_buffer};
use spock_gpu::{
    write_storage_image, AllocatedImage, CommandPool, DescriptorAllocator,
    DescriptorLayoutBuilder, DescriptorSetLayout, Fence, GpuContext, GpuContextBuilder,
    ImmediateSubmitter, PoolSizeRatio, Semaphore, SemaphoreStage, Surface, Swapchain,
};
use spock_platform::WindowHost;
use tracing::{debug, error, info};

use crate::backend::{FrameBackend, SwapchainInfo};
use crate::config::{timeout_ns, BackgroundMode, EngineConfig};
use crate::effects::builtin_effects;
use crate::frame::FRAME_OVERLAP;
use crate::mesh::{MeshAsset, MeshHandle};
use crate::record::CommandRecorder;

use self::pipelines::{BackgroundPipelines, GeometryPipelines, ShaderSource};
use self::recorder::{FrameTargets, VulkanRecorder};
use self::upload::{upload_mesh, GpuMeshBuffers};

/// HDR format of the offscreen draw image.
pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Resources owned by one frame in flight.
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    // Owns `command_buffer`.
    #[allow(dead_code)]
    command_pool: CommandPool,
    image_available: Semaphore,
    render_finished: Semaphore,
    render_fence: Fence,
}

impl FrameSlot {
    fn new(gpu: &GpuContext) -> Result<Self> {
        let device = gpu.device_arc();
        let command_pool = CommandPool::new(
            device,
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool.allocate_command_buffer()?;

        Ok(Self {
            command_buffer,
            command_pool,
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            // Signaled so the first wait on each slot returns at once.
            render_fence: Fence::new(device, true)?,
        })
    }
}

/// Vulkan backend: device, window surface, swapchain, render targets,
/// pipelines and per-frame resources.
///
/// Fields drop top to bottom, after [`Drop::drop`] waits for the device to go
/// idle. Everything created from the device is declared before `gpu`.
pub struct VulkanBackend {
    frames: Vec<FrameSlot>,
    immediate: ImmediateSubmitter,
    meshes: Vec<GpuMeshBuffers>,
    geometry: Option<GeometryPipelines>,
    background: Option<BackgroundPipelines>,
    draw_descriptors: vk::DescriptorSet,
    // Pool and layout behind `draw_descriptors`.
    #[allow(dead_code)]
    descriptor_allocator: DescriptorAllocator,
    #[allow(dead_code)]
    draw_image_layout: DescriptorSetLayout,
    depth_image: AllocatedImage,
    draw_image: AllocatedImage,
    swapchain: Option<Swapchain>,
    surface: Surface,
    gpu: GpuContext,
}

impl VulkanBackend {
    /// Bring up the device for `host`'s window and build every resource the
    /// frame loop needs.
    pub fn new(config: &EngineConfig, host: &WindowHost) -> Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name(config.title.clone())
            .validation(config.validation)
            .display(host.display_handle()?)
            .build()?;
        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: the host owns the window and outlives the backend.
        let surface = unsafe { Surface::from_window(&gpu, host.window().as_ref())? };

        let window = host.inner_size();
        // SAFETY: no other swapchain exists for this surface.
        let swapchain = unsafe { surface.create_swapchain(window.0, window.1)? };

        let (draw_width, draw_height) = config.draw_size(window);
        let draw_extent = vk::Extent2D {
            width: draw_width,
            height: draw_height,
        };
        let draw_image = AllocatedImage::new(
            gpu.allocator(),
            draw_extent,
            DRAW_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
            "draw image",
        )?;
        let depth_image = AllocatedImage::new(
            gpu.allocator(),
            draw_extent,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth image",
        )?;
        info!("Draw image: {draw_width}x{draw_height} {DRAW_FORMAT:?}");

        let device = gpu.device_arc();
        let draw_image_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(device, vk::ShaderStageFlags::COMPUTE)?;
        let mut descriptor_allocator = DescriptorAllocator::init_pool(
            device,
            10,
            &[PoolSizeRatio {
                descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                ratio: 1.0,
            }],
        )?;
        let draw_descriptors = descriptor_allocator.allocate(&draw_image_layout)?;
        // SAFETY: the set was just allocated and is not in use.
        unsafe {
            write_storage_image(
                device,
                draw_descriptors,
                0,
                draw_image.view(),
                vk::ImageLayout::GENERAL,
            );
        }

        let shaders = ShaderSource::new(config.shader_dir.as_deref());
        if let ShaderSource::Directory(dir) = shaders {
            info!("Loading shaders from {}", dir.display());
        }

        let background = match config.background {
            BackgroundMode::Compute => Some(
                BackgroundPipelines::new(
                    device,
                    &draw_image_layout,
                    shaders,
                    &builtin_effects(),
                )
                .context("building compute background pipelines")?,
            ),
            BackgroundMode::Clear => None,
        };

        let geometry = if config.geometry {
            Some(
                GeometryPipelines::new(
                    device,
                    shaders,
                    draw_image.format(),
                    depth_image.format(),
                )
                .context("building geometry pipelines")?,
            )
        } else {
            None
        };

        let immediate = ImmediateSubmitter::new(
            device,
            gpu.graphics_queue_family(),
            gpu.graphics_queue(),
            timeout_ns(config.fence_timeout),
        )?;

        let frames = (0..FRAME_OVERLAP)
            .map(|_| FrameSlot::new(&gpu))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            immediate,
            meshes: Vec::new(),
            geometry,
            background,
            draw_descriptors,
            descriptor_allocator,
            draw_image_layout,
            depth_image,
            draw_image,
            swapchain: Some(swapchain),
            surface,
            gpu,
        })
    }

    fn frame(&self, slot: usize) -> Result<&FrameSlot> {
        self.frames
            .get(slot)
            .ok_or_else(|| anyhow!("frame slot {slot} out of range"))
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("no swapchain (last rebuild failed)"))
    }
}

impl FrameBackend for VulkanBackend {
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> Result<()> {
        self.frame(slot)?.render_fence.wait(timeout_ns)?;
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        self.frame(slot)?.render_fence.reset()?;
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize, timeout_ns: u64) -> Result<u32> {
        let semaphore = self.frame(slot)?.image_available.handle();
        let (index, suboptimal) = self
            .swapchain()?
            .acquire_next_image(semaphore, timeout_ns)?;
        if suboptimal {
            debug!("Acquired suboptimal swapchain image {index}");
        }
        Ok(index)
    }

    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        record: &mut dyn FnMut(&mut dyn CommandRecorder),
    ) -> Result<()> {
        let cmd = self.frame(slot)?.command_buffer;
        let device = self.gpu.device();
        let swapchain = self.swapchain()?;
        if image_index as usize >= swapchain.images().len() {
            return Err(anyhow!("swapchain image {image_index} out of range"));
        }

        let mut recorder = VulkanRecorder {
            device,
            cmd,
            targets: FrameTargets {
                draw: &self.draw_image,
                depth: &self.depth_image,
                swapchain_images: swapchain.images(),
                draw_descriptors: self.draw_descriptors,
                background: self.background.as_ref(),
                geometry: self.geometry.as_ref(),
                meshes: &self.meshes,
            },
        };

        // SAFETY: the slot's fence was waited on, so `cmd` is no longer pending.
        unsafe {
            begin_one_time(device, cmd)?;
            record(&mut recorder);
            end_command_buffer(device, cmd)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = self.frame(slot)?;
        // SAFETY: the command buffer was fully recorded this frame.
        unsafe {
            submit_command_buffer(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                frame.command_buffer,
                Some(SemaphoreStage::new(
                    frame.image_available.handle(),
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                )),
                Some(SemaphoreStage::new(
                    frame.render_finished.handle(),
                    vk::PipelineStageFlags2::ALL_GRAPHICS,
                )),
                frame.render_fence.handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool> {
        let wait = self.frame(slot)?.render_finished.handle();
        let rebuild = self
            .swapchain()?
            .present(self.gpu.graphics_queue(), image_index, wait)?;
        Ok(rebuild)
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or_else(vk::Extent2D::default, Swapchain::extent)
    }

    fn draw_extent(&self) -> vk::Extent2D {
        self.draw_image.extent()
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<SwapchainInfo> {
        self.gpu.wait_idle()?;
        self.swapchain = None;

        // SAFETY: the old swapchain was destroyed above and the device is idle.
        let swapchain = unsafe { self.surface.create_swapchain(width, height)? };
        let info = SwapchainInfo {
            extent: swapchain.extent(),
            image_count: swapchain.images().len(),
            view_count: swapchain.image_views().len(),
        };
        self.swapchain = Some(swapchain);
        Ok(info)
    }

    fn upload_mesh(&mut self, mesh: &MeshAsset) -> Result<MeshHandle> {
        let buffers = upload_mesh(
            self.gpu.device_arc(),
            self.gpu.allocator(),
            &self.immediate,
            mesh,
        )?;
        self.meshes.push(buffers);
        Ok(MeshHandle(self.meshes.len() - 1))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()?;
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {e}");
        }
        debug!("Destroying Vulkan backend");
    }
}
