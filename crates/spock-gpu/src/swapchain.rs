//! Swapchain management.
//!
//! The swapchain always uses FIFO presentation and a `B8G8R8A8_UNORM` /
//! `SRGB_NONLINEAR` surface format. There is no negotiation and no reuse of
//! a previous swapchain: a rebuild drops the old one and creates a new one.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::image::color_subresource_range;

/// Fixed swapchain image format.
pub const SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
/// Fixed swapchain color space.
pub const SWAPCHAIN_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;
/// Fixed present mode (vsync-locked).
pub const SWAPCHAIN_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Swapchain with its images and one view per image.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
    loader: ash::khr::swapchain::Device,
    device: Arc<ash::Device>,
}

impl Swapchain {
    /// Create a new swapchain for `surface` at the requested size.
    ///
    /// # Safety
    /// `surface` must be a live surface compatible with `device`, and no
    /// other swapchain may currently target it.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let extent = calculate_extent(capabilities, width, height);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count(capabilities))
            .image_format(SWAPCHAIN_FORMAT)
            .image_color_space(SWAPCHAIN_COLOR_SPACE)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(SWAPCHAIN_PRESENT_MODE)
            .clipped(true);

        // SAFETY: guaranteed by the caller.
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // From here on `Drop` cleans up whatever has been created.
        let mut this = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            extent,
            loader: loader.clone(),
            device: Arc::clone(device),
        };

        // SAFETY: the swapchain was just created by this loader.
        this.images = unsafe { loader.get_swapchain_images(swapchain)? };
        this.image_views = create_views(&this.images, |&image| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(SWAPCHAIN_FORMAT)
                .components(vk::ComponentMapping::default())
                .subresource_range(color_subresource_range());
            // SAFETY: `image` is a live swapchain image.
            unsafe { device.create_image_view(&view_info, None) }
        })?;

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            extent.width,
            extent.height,
            this.images.len()
        );

        Ok(this)
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// Returns the image index and the suboptimal flag.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        // SAFETY: the swapchain and semaphore are owned by the same device.
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
        .map_err(|e| GpuError::from_wait(e, "swapchain image", timeout_ns))
    }

    /// Present an image.
    ///
    /// Returns `true` when the swapchain is out of date or suboptimal and
    /// should be rebuilt.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the queue supports present and the image index came from acquire.
        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // SAFETY: the owner waits for device idle before dropping the swapchain.
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Create one view per image, stopping at the first failure.
pub fn create_views<I, V, E, F>(images: &[I], make_view: F) -> std::result::Result<Vec<V>, E>
where
    F: FnMut(&I) -> std::result::Result<V, E>,
{
    images.iter().map(make_view).collect()
}

/// Number of images to request: one more than the minimum, clamped to the maximum.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Calculate swapchain extent.
///
/// Uses the surface's current extent when the platform defines one, else the
/// requested size clamped to the surface limits. Never returns a zero dimension.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    let extent = if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    };

    vk::Extent2D {
        width: extent.width.max(1),
        height: extent.height.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undefined_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn extent_uses_current_extent_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 450,
            },
            ..undefined_extent_caps()
        };
        let extent = calculate_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 450));
    }

    #[test]
    fn extent_clamps_requested_size() {
        let caps = undefined_extent_caps();
        let extent = calculate_extent(&caps, 10_000, 600);
        assert_eq!((extent.width, extent.height), (4096, 600));
    }

    #[test]
    fn extent_never_zero() {
        let caps = undefined_extent_caps();
        let extent = calculate_extent(&caps, 0, 0);
        assert_eq!((extent.width, extent.height), (1, 1));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = undefined_extent_caps();
        assert_eq!(image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(image_count(&caps), 2);

        // Zero means no upper bound.
        caps.max_image_count = 0;
        assert_eq!(image_count(&caps), 3);
    }

    #[test]
    fn rebuilt_views_match_images() {
        let caps = undefined_extent_caps();
        for (w, h) in [(1, 1), (800, 450), (1920, 1080), (3, 7)] {
            let extent = calculate_extent(&caps, w, h);
            assert!(extent.width >= 1 && extent.height >= 1);

            // Stand-in for the images a driver hands back for this extent.
            let images: Vec<u64> = (0..u64::from(image_count(&caps))).collect();
            let views = create_views(&images, |&i| Ok::<_, ()>(i * 10)).unwrap();
            assert_eq!(views.len(), images.len());
            assert!(views.iter().zip(&images).all(|(v, i)| *v == i * 10));
        }
    }

    #[test]
    fn view_creation_stops_on_error() {
        let images = [1, 2, 3];
        let result = create_views(&images, |&i| if i == 2 { Err("boom") } else { Ok(i) });
        assert_eq!(result, Err("boom"));
    }
}
