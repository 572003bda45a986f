//! Per-frame command sequence.
//!
//! [`record_frame`] decides what goes into a frame's command buffer; a
//! [`CommandRecorder`] turns each step into Vulkan commands. Keeping the two
//! apart lets the ordering of barriers, passes and the final blit be checked
//! without a device.

use ash::vk;
use glam::Mat4;

use crate::effects::ComputePushConstants;
use crate::mesh::{GeoSurface, MeshHandle, SceneMesh};

/// Compute workgroup edge length used by the background shaders.
pub const WORKGROUP_SIZE: u32 = 16;

/// Images a frame touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameImage {
    /// Offscreen HDR color target.
    Draw,
    /// Depth target for the geometry pass.
    Depth,
    /// Swapchain image at the given index.
    Swapchain(u32),
}

/// Sink for the steps of a frame.
pub trait CommandRecorder {
    fn transition(&mut self, image: FrameImage, from: vk::ImageLayout, to: vk::ImageLayout);

    /// Clear `image`, which must be in `GENERAL` layout.
    fn clear(&mut self, image: FrameImage, color: [f32; 4]);

    /// Run background effect `effect` over the draw image.
    fn dispatch_background(
        &mut self,
        effect: usize,
        push: &ComputePushConstants,
        group_counts: [u32; 3],
    );

    /// Begin dynamic rendering into the draw and depth images.
    fn begin_geometry(&mut self, extent: vk::Extent2D);

    fn draw_triangle(&mut self);

    fn draw_mesh(&mut self, mesh: MeshHandle, surface: GeoSurface, world: &Mat4);

    fn end_geometry(&mut self);

    fn blit(
        &mut self,
        src: FrameImage,
        dst: FrameImage,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    );
}

/// How the background is produced this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Clear([f32; 4]),
    Compute {
        effect: usize,
        push: ComputePushConstants,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryPlan<'a> {
    pub view_proj: Mat4,
    pub meshes: &'a [SceneMesh],
}

/// Everything needed to record one frame.
#[derive(Debug, Clone, Copy)]
pub struct FramePlan<'a> {
    pub image_index: u32,
    pub draw_extent: vk::Extent2D,
    pub swapchain_extent: vk::Extent2D,
    pub background: Background,
    pub geometry: Option<GeometryPlan<'a>>,
}

/// Workgroups needed to cover `extent` with 16x16 groups.
pub fn workgroup_count(extent: vk::Extent2D) -> [u32; 3] {
    [
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// Clear color for `frame`: blue pulsing with a 120-frame period.
#[allow(clippy::cast_precision_loss)]
pub fn flash_color(frame: u64) -> [f32; 4] {
    let flash = (frame as f32 / 120.0).sin().abs();
    [0.0, 0.0, flash, 1.0]
}

/// Record the full frame: background, optional geometry, then copy the draw
/// image into the swapchain image and leave it ready for present.
pub fn record_frame(rec: &mut dyn CommandRecorder, plan: &FramePlan<'_>) {
    use vk::ImageLayout as L;

    let swapchain = FrameImage::Swapchain(plan.image_index);

    rec.transition(FrameImage::Draw, L::UNDEFINED, L::GENERAL);

    match plan.background {
        Background::Clear(color) => rec.clear(FrameImage::Draw, color),
        Background::Compute { effect, push } => {
            rec.dispatch_background(effect, &push, workgroup_count(plan.draw_extent));
        }
    }

    if let Some(geometry) = &plan.geometry {
        rec.transition(FrameImage::Draw, L::GENERAL, L::COLOR_ATTACHMENT_OPTIMAL);
        rec.transition(FrameImage::Depth, L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL);

        rec.begin_geometry(plan.draw_extent);
        rec.draw_triangle();
        for mesh in geometry.meshes {
            let world = mesh.world_matrix(&geometry.view_proj);
            for &surface in &mesh.surfaces {
                rec.draw_mesh(mesh.handle, surface, &world);
            }
        }
        rec.end_geometry();

        rec.transition(
            FrameImage::Draw,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::TRANSFER_SRC_OPTIMAL,
        );
    } else {
        rec.transition(FrameImage::Draw, L::GENERAL, L::TRANSFER_SRC_OPTIMAL);
    }

    rec.transition(swapchain, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL);
    rec.blit(
        FrameImage::Draw,
        swapchain,
        plan.draw_extent,
        plan.swapchain_extent,
    );
    rec.transition(swapchain, L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshSpace;
    use crate::testing::{Command, RecordingRecorder};
    use approx::assert_relative_eq;
    use vk::ImageLayout as L;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn plan(background: Background, geometry: Option<GeometryPlan<'_>>) -> FramePlan<'_> {
        FramePlan {
            image_index: 2,
            draw_extent: extent(800, 600),
            swapchain_extent: extent(1024, 768),
            background,
            geometry,
        }
    }

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(extent(800, 600)), [50, 38, 1]);
        assert_eq!(workgroup_count(extent(16, 16)), [1, 1, 1]);
        assert_eq!(workgroup_count(extent(17, 1)), [2, 1, 1]);
        assert_eq!(workgroup_count(extent(1, 1)), [1, 1, 1]);
    }

    #[test]
    fn flash_is_bounded() {
        assert_relative_eq!(flash_color(0)[2], 0.0);
        for frame in [1, 60, 188, 377, 10_000] {
            let color = flash_color(frame);
            assert!((0.0..=1.0).contains(&color[2]));
            assert_relative_eq!(color[3], 1.0);
        }
    }

    #[test]
    fn compute_only_frame() {
        let push = ComputePushConstants::default();
        let mut rec = RecordingRecorder::default();
        record_frame(&mut rec, &plan(Background::Compute { effect: 1, push }, None));

        assert_eq!(
            rec.commands,
            vec![
                Command::Transition(FrameImage::Draw, L::UNDEFINED, L::GENERAL),
                Command::Dispatch {
                    effect: 1,
                    group_counts: [50, 38, 1]
                },
                Command::Transition(FrameImage::Draw, L::GENERAL, L::TRANSFER_SRC_OPTIMAL),
                Command::Transition(
                    FrameImage::Swapchain(2),
                    L::UNDEFINED,
                    L::TRANSFER_DST_OPTIMAL
                ),
                Command::Blit {
                    src: FrameImage::Draw,
                    dst: FrameImage::Swapchain(2),
                    src_extent: extent(800, 600),
                    dst_extent: extent(1024, 768),
                },
                Command::Transition(
                    FrameImage::Swapchain(2),
                    L::TRANSFER_DST_OPTIMAL,
                    L::PRESENT_SRC_KHR
                ),
            ]
        );
    }

    #[test]
    fn clear_background_clears_in_general_layout() {
        let mut rec = RecordingRecorder::default();
        record_frame(&mut rec, &plan(Background::Clear([0.0, 0.0, 0.5, 1.0]), None));

        assert_eq!(
            &rec.commands[..2],
            &[
                Command::Transition(FrameImage::Draw, L::UNDEFINED, L::GENERAL),
                Command::Clear(FrameImage::Draw),
            ]
        );
        assert!(!rec
            .commands
            .iter()
            .any(|c| matches!(c, Command::Dispatch { .. })));
    }

    #[test]
    fn geometry_pass_draws_every_surface() {
        let meshes = [SceneMesh {
            handle: MeshHandle(0),
            name: "pair".to_string(),
            surfaces: vec![
                GeoSurface {
                    start_index: 0,
                    count: 3,
                },
                GeoSurface {
                    start_index: 3,
                    count: 3,
                },
            ],
            space: MeshSpace::World,
        }];
        let geometry = GeometryPlan {
            view_proj: Mat4::IDENTITY,
            meshes: &meshes,
        };
        let push = ComputePushConstants::default();
        let mut rec = RecordingRecorder::default();
        record_frame(
            &mut rec,
            &plan(Background::Compute { effect: 0, push }, Some(geometry)),
        );

        let commands = &rec.commands;
        let begin = commands
            .iter()
            .position(|c| *c == Command::BeginGeometry(extent(800, 600)))
            .unwrap();
        let end = commands
            .iter()
            .position(|c| *c == Command::EndGeometry)
            .unwrap();

        assert_eq!(
            &commands[begin - 2..begin],
            &[
                Command::Transition(FrameImage::Draw, L::GENERAL, L::COLOR_ATTACHMENT_OPTIMAL),
                Command::Transition(
                    FrameImage::Depth,
                    L::UNDEFINED,
                    L::DEPTH_ATTACHMENT_OPTIMAL
                ),
            ]
        );
        assert_eq!(
            &commands[begin + 1..end],
            &[
                Command::Triangle,
                Command::Mesh(MeshHandle(0), meshes[0].surfaces[0], Mat4::IDENTITY),
                Command::Mesh(MeshHandle(0), meshes[0].surfaces[1], Mat4::IDENTITY),
            ]
        );
        assert_eq!(
            commands[end + 1],
            Command::Transition(
                FrameImage::Draw,
                L::COLOR_ATTACHMENT_OPTIMAL,
                L::TRANSFER_SRC_OPTIMAL
            )
        );
    }

    #[test]
    fn clip_space_meshes_skip_the_camera() {
        let surface = GeoSurface {
            start_index: 0,
            count: 6,
        };
        let meshes = [
            SceneMesh {
                handle: MeshHandle(0),
                name: "rectangle".to_string(),
                surfaces: vec![surface],
                space: MeshSpace::Clip,
            },
            SceneMesh {
                handle: MeshHandle(1),
                name: "model".to_string(),
                surfaces: vec![surface],
                space: MeshSpace::World,
            },
        ];
        let view_proj = Mat4::from_scale(glam::Vec3::new(2.0, -2.0, 0.5));
        let geometry = GeometryPlan {
            view_proj,
            meshes: &meshes,
        };
        let mut rec = RecordingRecorder::default();
        record_frame(
            &mut rec,
            &plan(Background::Clear([0.0; 4]), Some(geometry)),
        );

        let draws: Vec<_> = rec
            .commands
            .iter()
            .filter(|c| matches!(c, Command::Mesh(..)))
            .cloned()
            .collect();
        assert_eq!(
            draws,
            vec![
                Command::Mesh(MeshHandle(0), surface, Mat4::IDENTITY),
                Command::Mesh(MeshHandle(1), surface, view_proj),
            ]
        );
    }
}
