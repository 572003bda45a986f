//! Vulkan abstraction layer for the Spock engine.
//!
//! This crate provides:
//! - Vulkan instance, debug messenger and device management
//! - Surface and fixed-format swapchain handling
//! - Fences, semaphores, command pools and immediate submission
//! - Descriptor layouts and pools, shader loading and pipelines
//! - Memory allocation via gpu-allocator
//!
//! Every Vulkan object is owned by a wrapper that destroys it on drop. Owners
//! hold an `Arc<ash::Device>`; the [`GpuContext`] must outlive all of them.

pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{CommandPool, ImmediateSubmitter, SemaphoreStage};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_storage_image, DescriptorAllocator, DescriptorLayoutBuilder, DescriptorSetLayout,
    PoolSizeRatio, PoolUsage,
};
pub use error::{GpuError, Result};
pub use image::AllocatedImage;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage, SharedAllocator};
pub use pipeline::{GraphicsPipelineConfig, Pipeline, PipelineLayout};
pub use shader::{load_shader_module, ShaderModule};
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};
