//! GPU capability detection.

use std::ffi::CStr;

use ash::vk;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,

    /// Dynamic rendering (VK 1.3 core)
    pub supports_dynamic_rendering: bool,
    /// Synchronization2 (VK 1.3 core)
    pub supports_synchronization2: bool,
    /// Buffer device address (VK 1.2 core)
    pub supports_buffer_device_address: bool,
    /// Descriptor indexing (VK 1.2 core)
    pub supports_descriptor_indexing: bool,
    /// 64-bit integers in shaders
    pub supports_shader_int64: bool,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    pub max_push_constants_size: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        // SAFETY: guaranteed by the caller.
        let (properties, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features13)
            .push_next(&mut features12);
        // SAFETY: guaranteed by the caller.
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        // Read before the chained structs, which `features2` borrows.
        let supports_shader_int64 = features2.features.shader_int64 == vk::TRUE;

        // SAFETY: the driver fills device_name with a NUL-terminated string.
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            supports_dynamic_rendering: features13.dynamic_rendering == vk::TRUE,
            supports_synchronization2: features13.synchronization2 == vk::TRUE,
            supports_buffer_device_address: features12.buffer_device_address == vk::TRUE,
            supports_descriptor_indexing: features12.descriptor_indexing == vk::TRUE,
            supports_shader_int64,
            device_local_memory_mb,
            max_push_constants_size: properties.limits.max_push_constants_size,
        }
    }

    /// Check if the GPU can run the engine.
    ///
    /// Requires Vulkan 1.3 with every feature the logical device enables:
    /// dynamic rendering, synchronization2, buffer device address, descriptor
    /// indexing and `shaderInt64`. Push constants must fit 128 bytes.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        (api_major, api_minor) >= (1, 3)
            && self.supports_dynamic_rendering
            && self.supports_synchronization2
            && self.supports_buffer_device_address
            && self.supports_descriptor_indexing
            && self.supports_shader_int64
            && self.max_push_constants_size >= 128
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::make_api_version(0, 1, 3, 250),
            supports_dynamic_rendering: true,
            supports_synchronization2: true,
            supports_buffer_device_address: true,
            supports_descriptor_indexing: true,
            supports_shader_int64: true,
            device_local_memory_mb: 8192,
            max_push_constants_size: 128,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requirements() {
        assert!(capable().meets_requirements());

        let old_api = GpuCapabilities {
            api_version: vk::make_api_version(0, 1, 2, 0),
            ..capable()
        };
        assert!(!old_api.meets_requirements());

        let no_sync2 = GpuCapabilities {
            supports_synchronization2: false,
            ..capable()
        };
        assert!(!no_sync2.meets_requirements());

        let no_int64 = GpuCapabilities {
            supports_shader_int64: false,
            ..capable()
        };
        assert!(!no_int64.meets_requirements());

        let no_indexing = GpuCapabilities {
            supports_descriptor_indexing: false,
            ..capable()
        };
        assert!(!no_indexing.meets_requirements());

        let newer = GpuCapabilities {
            api_version: vk::make_api_version(0, 1, 4, 0),
            ..capable()
        };
        assert!(newer.meets_requirements());
    }

    #[test]
    fn summary_names_device() {
        let summary = capable().summary();
        assert!(summary.contains("Test GPU"));
        assert!(summary.contains("Vulkan 1.3.250"));
    }
}
