//! Mesh data fed to the geometry pass.
//!
//! Vertices are fetched in the vertex shader through a buffer device
//! address passed in push constants, so the layout here must match the
//! `Vertex` struct declared in `colored_triangle_mesh.vert`.

use anyhow::{bail, Result};
use ash::vk;
use glam::{Mat4, Vec3};

/// Vertex as stored in the GPU vertex buffer (std430, 48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv_x: f32,
    pub normal: [f32; 3],
    pub uv_y: f32,
    pub color: [f32; 4],
}

impl Vertex {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-draw push constants for mesh draws (72 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDrawPushConstants {
    /// Column-major world-view-projection matrix.
    pub world_matrix: [[f32; 4]; 4],
    /// Device address of the vertex buffer.
    pub vertex_buffer: u64,
}

impl GpuDrawPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(world: &Mat4, vertex_buffer: vk::DeviceAddress) -> Self {
        Self {
            world_matrix: world.to_cols_array_2d(),
            vertex_buffer,
        }
    }
}

/// Range of indices drawn as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
}

/// Pre-parsed mesh ready for upload.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<GeoSurface>,
}

impl MeshAsset {
    /// Unit quad in the XY plane, one surface.
    pub fn rectangle() -> Self {
        let corner = |x: f32, y: f32, color: [f32; 4]| Vertex {
            position: [x, y, 0.0],
            color,
            ..Vertex::default()
        };

        Self {
            name: "rectangle".to_string(),
            vertices: vec![
                corner(0.5, -0.5, [0.0, 0.0, 0.0, 1.0]),
                corner(0.5, 0.5, [0.5, 0.5, 0.5, 1.0]),
                corner(-0.5, -0.5, [1.0, 0.0, 0.0, 1.0]),
                corner(-0.5, 0.5, [0.0, 1.0, 0.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 2, 1, 3],
            surfaces: vec![GeoSurface {
                start_index: 0,
                count: 6,
            }],
        }
    }

    /// Check that the mesh is non-empty and every surface and index is in range.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            bail!("mesh '{}' has no vertices or indices", self.name);
        }

        let vertex_count = self.vertices.len();
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= vertex_count)
        {
            bail!(
                "mesh '{}' index {index} out of range for {vertex_count} vertices",
                self.name
            );
        }

        let index_count = self.indices.len() as u64;
        for surface in &self.surfaces {
            let end = u64::from(surface.start_index) + u64::from(surface.count);
            if end > index_count {
                bail!(
                    "mesh '{}' surface {}..{end} exceeds {index_count} indices",
                    self.name,
                    surface.start_index
                );
            }
        }

        Ok(())
    }
}

/// Opaque reference to a mesh uploaded by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub usize);

/// Space a mesh's vertex positions are given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshSpace {
    /// Already in clip space; drawn with an identity world matrix.
    Clip,
    /// World space, seen through the scene camera.
    #[default]
    World,
}

/// Uploaded mesh and the surfaces to draw from it.
#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub handle: MeshHandle,
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub space: MeshSpace,
}

impl SceneMesh {
    /// Matrix pushed for this mesh given the scene camera's `view_proj`.
    pub fn world_matrix(&self, view_proj: &Mat4) -> Mat4 {
        match self.space {
            MeshSpace::Clip => Mat4::IDENTITY,
            MeshSpace::World => *view_proj,
        }
    }
}

/// Vertical field of view of the scene camera, in degrees.
const FOV_Y_DEGREES: f32 = 70.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 10_000.0;

/// View-projection for the scene at `extent`.
///
/// Camera sits at z = +5 looking down -Z. Depth is reversed (near maps to 1,
/// far to 0) and Y is flipped for Vulkan clip space.
#[allow(clippy::cast_precision_loss)]
pub fn scene_matrix(extent: vk::Extent2D) -> Mat4 {
    let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
    let aspect = extent.width as f32 / extent.height.max(1) as f32;

    let mut projection = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, FAR, NEAR);
    projection.y_axis.y *= -1.0;

    projection * view
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn vertex_layout() {
        assert_eq!(Vertex::SIZE, 48);
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex, uv_x), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 16);
        assert_eq!(std::mem::offset_of!(Vertex, uv_y), 28);
        assert_eq!(std::mem::offset_of!(Vertex, color), 32);
    }

    #[test]
    fn draw_push_constants_layout() {
        assert_eq!(GpuDrawPushConstants::SIZE, 72);
        assert_eq!(std::mem::offset_of!(GpuDrawPushConstants, world_matrix), 0);
        assert_eq!(std::mem::offset_of!(GpuDrawPushConstants, vertex_buffer), 64);
    }

    #[test]
    fn push_constants_are_column_major() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let push = GpuDrawPushConstants::new(&world, 0xdead_beef);
        assert_eq!(push.world_matrix[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(push.vertex_buffer, 0xdead_beef);
    }

    #[test]
    fn rectangle_is_valid() {
        let mesh = MeshAsset::rectangle();
        mesh.validate().unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(mesh.surfaces, vec![GeoSurface { start_index: 0, count: 6 }]);
    }

    #[test]
    fn validate_rejects_bad_ranges() {
        let mut mesh = MeshAsset::rectangle();
        mesh.indices.push(4);
        assert!(mesh.validate().is_err());

        let mut mesh = MeshAsset::rectangle();
        mesh.surfaces.push(GeoSurface {
            start_index: 4,
            count: 3,
        });
        assert!(mesh.validate().is_err());

        let mut mesh = MeshAsset::rectangle();
        mesh.vertices.clear();
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn world_matrix_follows_mesh_space() {
        let view_proj = scene_matrix(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let mut mesh = SceneMesh {
            handle: MeshHandle(0),
            name: "rectangle".to_string(),
            surfaces: Vec::new(),
            space: MeshSpace::Clip,
        };
        assert_eq!(mesh.world_matrix(&view_proj), Mat4::IDENTITY);

        mesh.space = MeshSpace::World;
        assert_eq!(mesh.world_matrix(&view_proj), view_proj);
    }

    #[test]
    fn scene_depth_is_reversed_and_y_flipped() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let matrix = scene_matrix(extent);

        let project = |p: Vec3| {
            let clip = matrix * Vec4::new(p.x, p.y, p.z, 1.0);
            clip.truncate() / clip.w
        };

        let center = project(Vec3::ZERO);
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-6);
        assert!(center.z > 0.0 && center.z < 1.0);

        // Closer to the camera means larger depth.
        let nearer = project(Vec3::new(0.0, 0.0, 2.0));
        assert!(nearer.z > center.z);

        // +Y in world space ends up at negative clip Y.
        let above = project(Vec3::new(0.0, 1.0, 0.0));
        assert!(above.y < 0.0);
    }
}
