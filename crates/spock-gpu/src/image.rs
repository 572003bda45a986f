//! Image helpers: layout transitions, blits and owned images with a view.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::Result;
use crate::memory::{GpuImage, SharedAllocator};

/// Full subresource range for a single-mip, single-layer image.
pub fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    subresource_range(vk::ImageAspectFlags::COLOR)
}

/// Aspect touched by a transition into `new_layout`.
pub fn aspect_for_layout(new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    match new_layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Record a full-image layout transition.
///
/// Uses a single all-commands barrier.
///
/// # Safety
/// `cmd` must be recording and `image` must be owned by `device`.
pub unsafe fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .image(image)
        .subresource_range(subresource_range(aspect_for_layout(new_layout)));

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
    // SAFETY: guaranteed by the caller.
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

/// Blit region covering all of `src_extent` into all of `dst_extent`.
pub fn blit_region(src_extent: vk::Extent2D, dst_extent: vk::Extent2D) -> vk::ImageBlit2<'static> {
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    vk::ImageBlit2::default()
        .src_subresource(layers)
        .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
        .dst_subresource(layers)
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)])
}

#[allow(clippy::cast_possible_wrap)]
fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// Record a scaling blit from `src` (TRANSFER_SRC) to `dst` (TRANSFER_DST).
///
/// # Safety
/// `cmd` must be recording and both images must be in the stated layouts.
pub unsafe fn copy_image_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let region = blit_region(src_extent, dst_extent);
    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(std::slice::from_ref(&region));

    // SAFETY: guaranteed by the caller.
    unsafe { device.cmd_blit_image2(cmd, &blit_info) };
}

/// Device-local 2D image with a view over its whole subresource range.
pub struct AllocatedImage {
    view: vk::ImageView,
    image: GpuImage,
    device: Arc<ash::Device>,
}

impl AllocatedImage {
    /// Allocate an image and create its view.
    pub fn new(
        allocator: &SharedAllocator,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &str,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = GpuImage::new(allocator, &create_info, MemoryLocation::GpuOnly, name)?;
        let device = image.device().clone();

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource_range(aspect));
        // SAFETY: the image was just created on this device.
        let view = unsafe { device.create_image_view(&view_info, None)? };

        Ok(Self {
            view,
            image,
            device,
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.image.handle()
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    pub fn extent(&self) -> vk::Extent2D {
        let extent = self.image.extent();
        vk::Extent2D {
            width: extent.width,
            height: extent.height,
        }
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        // SAFETY: the view is idle once its owner is dropped; the image itself is
        // released afterwards by `GpuImage::drop`.
        unsafe { self.device.destroy_image_view(self.view, None) };
    }
}
