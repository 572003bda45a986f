//! GPU context management.

use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;

use crate::capabilities::GpuCapabilities;
use crate::debug::DebugMessenger;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, required_instance_extensions, select_physical_device};
use crate::memory::{GpuAllocator, SharedAllocator};

/// Main GPU context holding Vulkan resources.
///
/// Dropping it waits for the device, then tears down the allocator, device,
/// debug messenger and instance in that order.
pub struct GpuContext {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: SharedAllocator,
    graphics_queue_family: u32,
    graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device, for RAII wrappers.
    pub fn device_arc(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &SharedAllocator {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is live for the lifetime of the context.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: every object created from this context is dropped by now.
        unsafe {
            let _ = self.device.device_wait_idle();

            // Frees all VkDeviceMemory; must happen before the device goes.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.debug_messenger.take();
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Spock".to_string(),
            enable_validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Display the context will present to; selects the surface extensions.
    pub fn display(mut self, display: RawDisplayHandle) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let display = self.display.ok_or_else(|| {
            GpuError::InvalidState("GpuContextBuilder needs a display handle".to_string())
        })?;

        // SAFETY: loading the system Vulkan library.
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let extensions = required_instance_extensions(display, self.enable_validation)?;
        // SAFETY: extension names are static NUL-terminated strings.
        let instance = unsafe {
            create_instance(&entry, &self.app_name, &extensions, self.enable_validation)?
        };

        // Everything below owns `instance` through `partial` until the context exists.
        let mut partial = PartialContext {
            instance: Some(instance),
            debug_messenger: None,
        };
        let instance = partial.instance()?;

        if self.enable_validation {
            // SAFETY: the debug utils extension was enabled above.
            match unsafe { DebugMessenger::new(&entry, instance) } {
                Ok(messenger) => partial.debug_messenger = Some(messenger),
                Err(e) => tracing::warn!("Debug messenger unavailable: {e}"),
            }
        }

        let instance = partial.instance()?;
        // SAFETY: instance is live.
        let (physical_device, capabilities) = unsafe { select_physical_device(instance)? };
        tracing::info!("Selected GPU: {}", capabilities.summary());

        // SAFETY: physical device was enumerated from this instance.
        let graphics_queue_family = unsafe { find_graphics_queue_family(instance, physical_device)? };

        // SAFETY: as above.
        let device = unsafe { create_device(instance, physical_device, graphics_queue_family)? };
        // SAFETY: the family was requested with one queue.
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let device = Arc::new(device);

        // SAFETY: all handles are live.
        let allocator = match unsafe { GpuAllocator::new(instance, device.clone(), physical_device) } {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing else was created on the device yet.
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let (instance, debug_messenger) = partial.into_parts()?;
        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            capabilities,
            allocator: Arc::new(Mutex::new(allocator)),
            graphics_queue_family,
            graphics_queue,
        })
    }
}

/// Instance-level objects created before the context exists.
///
/// Destroys them if building fails part way.
struct PartialContext {
    instance: Option<ash::Instance>,
    debug_messenger: Option<DebugMessenger>,
}

impl PartialContext {
    fn instance(&self) -> Result<&ash::Instance> {
        self.instance
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("instance already taken".to_string()))
    }

    fn into_parts(mut self) -> Result<(ash::Instance, Option<DebugMessenger>)> {
        let instance = self
            .instance
            .take()
            .ok_or_else(|| GpuError::InvalidState("instance already taken".to_string()))?;
        Ok((instance, self.debug_messenger.take()))
    }
}

impl Drop for PartialContext {
    fn drop(&mut self) {
        self.debug_messenger.take();
        if let Some(instance) = self.instance.take() {
            // SAFETY: no child objects remain when a build is abandoned.
            unsafe { instance.destroy_instance(None) };
        }
    }
}

/// Find a queue family supporting graphics and compute.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    // SAFETY: guaranteed by the caller.
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    families
        .iter()
        .position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .and_then(|index| u32::try_from(index).ok())
        .ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device with the Vulkan 1.2/1.3 features the engine uses.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = [1.0_f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priority)];

    let extension_names = [ash::khr::swapchain::NAME.as_ptr()];

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .buffer_device_address(true)
        .descriptor_indexing(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(vk::PhysicalDeviceFeatures::default().shader_int64(true))
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    // SAFETY: guaranteed by the caller; all create-info data outlives the call.
    let device = unsafe { instance.create_device(physical_device, &device_create_info, None)? };
    Ok(device)
}
