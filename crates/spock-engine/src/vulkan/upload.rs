//! Mesh upload through a staging buffer.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use spock_gpu::{GpuBuffer, ImmediateSubmitter, SharedAllocator};

use crate::mesh::MeshAsset;

/// Device-local index and vertex buffers for one mesh.
pub struct GpuMeshBuffers {
    index_buffer: GpuBuffer,
    // Backs `vertex_buffer_address`.
    #[allow(dead_code)]
    vertex_buffer: GpuBuffer,
    vertex_buffer_address: vk::DeviceAddress,
}

impl GpuMeshBuffers {
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Address the vertex shader reads vertices from.
    pub fn vertex_buffer_address(&self) -> vk::DeviceAddress {
        self.vertex_buffer_address
    }
}

/// Copy `mesh` into new GPU-only buffers and wait for the transfer.
pub fn upload_mesh(
    device: &Arc<ash::Device>,
    allocator: &SharedAllocator,
    submitter: &ImmediateSubmitter,
    mesh: &MeshAsset,
) -> Result<GpuMeshBuffers> {
    let vertex_bytes = std::mem::size_of_val(mesh.vertices.as_slice()) as u64;
    let index_bytes = std::mem::size_of_val(mesh.indices.as_slice()) as u64;

    let vertex_buffer = GpuBuffer::new(
        allocator,
        vertex_bytes,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        &format!("{} vertices", mesh.name),
    )?;
    let vertex_buffer_address = vertex_buffer.device_address();

    let index_buffer = GpuBuffer::new(
        allocator,
        index_bytes,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        &format!("{} indices", mesh.name),
    )?;

    let mut staging = GpuBuffer::new(
        allocator,
        vertex_bytes + index_bytes,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        &format!("{} staging", mesh.name),
    )?;
    staging.write(0, &mesh.vertices)?;
    staging.write(vertex_bytes, &mesh.indices)?;

    submitter
        .submit(device, |cmd| {
            let vertex_copy = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: vertex_bytes,
            };
            let index_copy = vk::BufferCopy {
                src_offset: vertex_bytes,
                dst_offset: 0,
                size: index_bytes,
            };
            // SAFETY: `cmd` is recording and all three buffers are live.
            unsafe {
                device.cmd_copy_buffer(cmd, staging.handle(), vertex_buffer.handle(), &[vertex_copy]);
                device.cmd_copy_buffer(cmd, staging.handle(), index_buffer.handle(), &[index_copy]);
            }
        })
        .with_context(|| format!("uploading mesh '{}'", mesh.name))?;

    Ok(GpuMeshBuffers {
        index_buffer,
        vertex_buffer,
        vertex_buffer_address,
    })
}
