//! GPU memory management.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::error::{GpuError, Result};

/// Allocator shared between the context and every buffer/image it hands out.
pub type SharedAllocator = Arc<Mutex<GpuAllocator>>;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations are freed and logged as leaks.
    pub fn shutdown(&mut self) {
        self.allocator.take();
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn release(allocator: &SharedAllocator, allocation: Option<Allocation>, what: &str) {
    if let Some(allocation) = allocation {
        if let Err(e) = allocator.lock().free(allocation) {
            tracing::warn!("Failed to free {what}: {e}");
        }
    }
}

/// A GPU buffer with its allocation. Freed on drop.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    allocator: SharedAllocator,
    device: Arc<ash::Device>,
}

impl GpuBuffer {
    /// Create and bind a buffer.
    pub fn new(
        allocator: &SharedAllocator,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let device = allocator.lock().device().clone();

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: device is live.
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        // SAFETY: buffer was just created on this device.
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let mut this = Self {
            buffer,
            allocation: None,
            size,
            allocator: Arc::clone(allocator),
            device,
        };

        let allocation = allocator
            .lock()
            .allocate(name, requirements, location, true)?;
        // SAFETY: the memory handle is only used to bind while the allocation is alive.
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        this.allocation = Some(allocation);
        // SAFETY: the allocation satisfies the buffer's requirements.
        unsafe { this.device.bind_buffer_memory(buffer, memory, offset)? };

        Ok(this)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the device address of this buffer.
    ///
    /// The buffer must have been created with `SHADER_DEVICE_ADDRESS` usage.
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        // SAFETY: buffer is live and bound to memory.
        unsafe { self.device.get_buffer_device_address(&info) }
    }

    /// Write `data` at byte `offset` (buffer must be host-visible).
    pub fn write<T: bytemuck::Pod>(&mut self, offset: u64, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = self.size;

        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| GpuError::InvalidState("Data range too large for buffer".to_string()))?;

        let mapped = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        #[allow(clippy::cast_possible_truncation)]
        mapped[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        // SAFETY: buffers are dropped only once no submitted work references them.
        unsafe { self.device.destroy_buffer(self.buffer, None) };
        release(&self.allocator, self.allocation.take(), "buffer");
    }
}

/// A GPU image with its allocation. Freed on drop.
pub struct GpuImage {
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    allocator: SharedAllocator,
    device: Arc<ash::Device>,
}

impl GpuImage {
    /// Create and bind an image.
    pub fn new(
        allocator: &SharedAllocator,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let device = allocator.lock().device().clone();

        // SAFETY: device is live.
        let image = unsafe { device.create_image(create_info, None)? };
        // SAFETY: image was just created on this device.
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let mut this = Self {
            image,
            allocation: None,
            format: create_info.format,
            extent: create_info.extent,
            allocator: Arc::clone(allocator),
            device,
        };

        let allocation = allocator
            .lock()
            .allocate(name, requirements, location, false)?;
        // SAFETY: the memory handle is only used to bind while the allocation is alive.
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        this.allocation = Some(allocation);
        // SAFETY: the allocation satisfies the image's requirements.
        unsafe { this.device.bind_image_memory(image, memory, offset)? };

        Ok(this)
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        // SAFETY: images are dropped only once no submitted work references them.
        unsafe { self.device.destroy_image(self.image, None) };
        release(&self.allocator, self.allocation.take(), "image");
    }
}
