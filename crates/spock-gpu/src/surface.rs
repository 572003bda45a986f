//! Surface management for windowed rendering.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::Swapchain;

/// Window surface plus the swapchain loader for the context's device.
///
/// Must be dropped before the [`GpuContext`] it was created from.
pub struct Surface {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
}

impl Surface {
    /// Create a surface for `window`.
    ///
    /// # Safety
    /// The window must outlive the surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        // SAFETY: guaranteed by the caller.
        let surface = unsafe {
            ash_window::create_surface(
                gpu.entry(),
                gpu.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        let this = Self {
            surface,
            surface_loader,
            swapchain_loader: ash::khr::swapchain::Device::new(gpu.instance(), gpu.device()),
            physical_device: gpu.physical_device(),
            device: Arc::clone(gpu.device_arc()),
        };

        // SAFETY: the surface and physical device come from the same instance.
        let supported = unsafe {
            this.surface_loader.get_physical_device_surface_support(
                this.physical_device,
                gpu.graphics_queue_family(),
                this.surface,
            )?
        };
        if !supported {
            return Err(GpuError::SurfaceCreation(
                "Graphics queue cannot present to this surface".to_string(),
            ));
        }

        Ok(this)
    }

    /// Query surface capabilities.
    pub fn capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        // SAFETY: the surface and physical device come from the same instance.
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)?
        };
        Ok(caps)
    }

    /// Create a swapchain for this surface at the requested size.
    ///
    /// # Safety
    /// Any previous swapchain for this surface must already be dropped.
    pub unsafe fn create_swapchain(&self, width: u32, height: u32) -> Result<Swapchain> {
        let caps = self.capabilities()?;
        // SAFETY: guaranteed by the caller.
        unsafe {
            Swapchain::new(
                &self.device,
                &self.swapchain_loader,
                self.surface,
                &caps,
                width,
                height,
            )
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: every swapchain for this surface is dropped first.
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}
