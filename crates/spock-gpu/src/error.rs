//! GPU error types.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A fence or acquire wait ran past its timeout.
    #[error("Timed out after {timeout_ns} ns waiting for {what}")]
    Timeout { what: &'static str, timeout_ns: u64 },

    /// Vulkan loader could not be found.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader file could not be read.
    #[error("Failed to read shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shader module rejected or empty.
    #[error("Invalid shader module: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl GpuError {
    /// Map a `VK_TIMEOUT` result to [`GpuError::Timeout`], passing other codes through.
    pub(crate) fn from_wait(result: vk::Result, what: &'static str, timeout_ns: u64) -> Self {
        if result == vk::Result::TIMEOUT {
            Self::Timeout { what, timeout_ns }
        } else {
            Self::Vulkan(result)
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_is_distinct() {
        let err = GpuError::from_wait(vk::Result::TIMEOUT, "render fence", 1_000);
        assert!(matches!(
            err,
            GpuError::Timeout {
                what: "render fence",
                timeout_ns: 1_000
            }
        ));

        let err = GpuError::from_wait(vk::Result::ERROR_DEVICE_LOST, "render fence", 1_000);
        assert!(matches!(
            err,
            GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
