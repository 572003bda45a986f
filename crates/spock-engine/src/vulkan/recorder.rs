//! [`CommandRecorder`] that writes into a Vulkan command buffer.

use ash::vk;
use glam::Mat4;
use spock_gpu::image::{color_subresource_range, copy_image_to_image, transition_image};
use spock_gpu::AllocatedImage;
use tracing::warn;

use super::pipelines::{BackgroundPipelines, GeometryPipelines};
use super::upload::GpuMeshBuffers;
use crate::effects::ComputePushConstants;
use crate::mesh::{GeoSurface, GpuDrawPushConstants, MeshHandle};
use crate::record::{CommandRecorder, FrameImage};

/// Resources a frame's commands may reference.
pub(super) struct FrameTargets<'a> {
    pub draw: &'a AllocatedImage,
    pub depth: &'a AllocatedImage,
    pub swapchain_images: &'a [vk::Image],
    pub draw_descriptors: vk::DescriptorSet,
    pub background: Option<&'a BackgroundPipelines>,
    pub geometry: Option<&'a GeometryPipelines>,
    pub meshes: &'a [GpuMeshBuffers],
}

/// Records into a command buffer between `begin` and `end`.
///
/// Only constructed by the backend while `cmd` is in the recording state.
pub(super) struct VulkanRecorder<'a> {
    pub device: &'a ash::Device,
    pub cmd: vk::CommandBuffer,
    pub targets: FrameTargets<'a>,
}

impl VulkanRecorder<'_> {
    fn image(&self, image: FrameImage) -> Option<vk::Image> {
        match image {
            FrameImage::Draw => Some(self.targets.draw.handle()),
            FrameImage::Depth => Some(self.targets.depth.handle()),
            FrameImage::Swapchain(index) => {
                self.targets.swapchain_images.get(index as usize).copied()
            }
        }
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn transition(&mut self, image: FrameImage, from: vk::ImageLayout, to: vk::ImageLayout) {
        let Some(handle) = self.image(image) else {
            warn!("No image for {image:?}");
            return;
        };
        // SAFETY: recording, and the image outlives the frame.
        unsafe { transition_image(self.device, self.cmd, handle, from, to) };
    }

    fn clear(&mut self, image: FrameImage, color: [f32; 4]) {
        let Some(handle) = self.image(image) else {
            return;
        };
        let clear = vk::ClearColorValue { float32: color };
        // SAFETY: recording; the image is in GENERAL layout.
        unsafe {
            self.device.cmd_clear_color_image(
                self.cmd,
                handle,
                vk::ImageLayout::GENERAL,
                &clear,
                &[color_subresource_range()],
            );
        }
    }

    fn dispatch_background(
        &mut self,
        effect: usize,
        push: &ComputePushConstants,
        group_counts: [u32; 3],
    ) {
        let Some(background) = self.targets.background else {
            warn!("Compute background requested but no effects are loaded");
            return;
        };
        let Some(pipeline) = background.pipeline(effect) else {
            warn!("Unknown background effect {effect}");
            return;
        };

        let [x, y, z] = group_counts;
        // SAFETY: recording; pipeline, layout and set belong to this device.
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::COMPUTE,
                background.layout(),
                0,
                &[self.targets.draw_descriptors],
                &[],
            );
            self.device.cmd_push_constants(
                self.cmd,
                background.layout(),
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(push),
            );
            self.device.cmd_dispatch(self.cmd, x, y, z);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn begin_geometry(&mut self, extent: vk::Extent2D) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.draw.view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);

        // Reversed depth: 0.0 is the far plane.
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.depth.view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        // SAFETY: recording; both attachments are in the layouts named above.
        unsafe {
            self.device.cmd_begin_rendering(self.cmd, &rendering_info);
            self.device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
    }

    fn draw_triangle(&mut self) {
        let Some(geometry) = self.targets.geometry else {
            return;
        };
        // SAFETY: recording inside begin_rendering.
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                geometry.triangle(),
            );
            self.device.cmd_draw(self.cmd, 3, 1, 0, 0);
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, surface: GeoSurface, world: &Mat4) {
        let Some(geometry) = self.targets.geometry else {
            return;
        };
        let Some(buffers) = self.targets.meshes.get(mesh.0) else {
            warn!("Unknown mesh {mesh:?}");
            return;
        };

        let push = GpuDrawPushConstants::new(world, buffers.vertex_buffer_address());
        // SAFETY: recording inside begin_rendering; buffers outlive the frame.
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, geometry.mesh());
            self.device.cmd_push_constants(
                self.cmd,
                geometry.mesh_layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );
            self.device.cmd_bind_index_buffer(
                self.cmd,
                buffers.index_buffer(),
                0,
                vk::IndexType::UINT32,
            );
            self.device
                .cmd_draw_indexed(self.cmd, surface.count, 1, surface.start_index, 0, 0);
        }
    }

    fn end_geometry(&mut self) {
        // SAFETY: paired with begin_geometry.
        unsafe { self.device.cmd_end_rendering(self.cmd) };
    }

    fn blit(
        &mut self,
        src: FrameImage,
        dst: FrameImage,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        let (Some(src), Some(dst)) = (self.image(src), self.image(dst)) else {
            warn!("Blit between unknown images");
            return;
        };
        // SAFETY: recording; src is TRANSFER_SRC and dst TRANSFER_DST.
        unsafe { copy_image_to_image(self.device, self.cmd, src, dst, src_extent, dst_extent) };
    }
}
