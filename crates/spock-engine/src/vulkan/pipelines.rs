//! Pipelines for the background and geometry passes.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use spock_gpu::pipeline::{create_compute_pipeline, create_graphics_pipeline, push_constant_range};
use spock_gpu::shader::spirv_words;
use spock_gpu::{
    load_shader_module, DescriptorSetLayout, GpuError, GraphicsPipelineConfig, Pipeline,
    PipelineLayout, Result, ShaderModule,
};
use spock_shaders::{MESH_VERT, TRIANGLE_FRAG, TRIANGLE_VERT};
use tracing::{debug, info};

use crate::effects::{ComputeEffect, ComputePushConstants};
use crate::mesh::GpuDrawPushConstants;

/// Where compiled shaders are read from.
#[derive(Debug, Clone, Copy)]
pub enum ShaderSource<'a> {
    /// SPIR-V built into the binary by `spock-shaders`.
    Embedded,
    /// `.spv` files with the same names in a directory.
    Directory(&'a Path),
}

impl<'a> ShaderSource<'a> {
    pub fn new(dir: Option<&'a Path>) -> Self {
        dir.map_or(Self::Embedded, Self::Directory)
    }

    pub fn load(self, device: &Arc<ash::Device>, name: &str) -> Result<ShaderModule> {
        match self {
            Self::Directory(dir) => load_shader_module(device, &dir.join(name)),
            Self::Embedded => {
                let words = embedded_words(name)?;
                let module = ShaderModule::from_words(device, &words)?;
                debug!("Loaded embedded shader {name} ({} words)", words.len());
                Ok(module)
            }
        }
    }
}

fn embedded_words(name: &str) -> Result<Vec<u32>> {
    spock_shaders::spirv(name)
        .map(spirv_words)
        .ok_or_else(|| GpuError::ShaderModule(format!("no embedded shader named {name}")))
}

/// One compute pipeline per effect, sharing a layout with the draw-image
/// descriptor set and the compute push-constant block.
pub struct BackgroundPipelines {
    pipelines: Vec<Pipeline>,
    layout: PipelineLayout,
}

impl BackgroundPipelines {
    pub fn new(
        device: &Arc<ash::Device>,
        draw_image_layout: &DescriptorSetLayout,
        shaders: ShaderSource<'_>,
        effects: &[ComputeEffect],
    ) -> Result<Self> {
        check_draw_image_bindings(draw_image_layout.bindings())?;

        let push_range =
            push_constant_range(vk::ShaderStageFlags::COMPUTE, ComputePushConstants::SIZE)?;
        let layout = PipelineLayout::new(device, &[draw_image_layout.handle()], &[push_range])?;

        let pipelines = effects
            .iter()
            .map(|effect| {
                let shader = shaders.load(device, effect.shader)?;
                let pipeline = create_compute_pipeline(device, &shader, &layout)?;
                info!("Compute effect '{}' ready", effect.name);
                Ok(pipeline)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { pipelines, layout })
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    pub fn pipeline(&self, effect: usize) -> Option<vk::Pipeline> {
        self.pipelines.get(effect).map(Pipeline::handle)
    }
}

/// The background shaders write `image2D` at set 0, binding 0.
fn check_draw_image_bindings(bindings: &[vk::DescriptorSetLayoutBinding<'_>]) -> Result<()> {
    let matches = |binding: &vk::DescriptorSetLayoutBinding<'_>| {
        binding.binding == 0
            && binding.descriptor_type == vk::DescriptorType::STORAGE_IMAGE
            && binding.stage_flags.contains(vk::ShaderStageFlags::COMPUTE)
    };
    if bindings.iter().any(matches) {
        Ok(())
    } else {
        Err(GpuError::InvalidState(
            "background layout needs a compute storage image at binding 0".to_string(),
        ))
    }
}

/// Hardcoded triangle and vertex-pulling mesh pipelines.
pub struct GeometryPipelines {
    triangle: Pipeline,
    mesh: Pipeline,
    // Layout of `triangle`.
    #[allow(dead_code)]
    triangle_layout: PipelineLayout,
    mesh_layout: PipelineLayout,
}

impl GeometryPipelines {
    pub fn new(
        device: &Arc<ash::Device>,
        shaders: ShaderSource<'_>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let fragment = shaders.load(device, TRIANGLE_FRAG)?;
        let triangle_vert = shaders.load(device, TRIANGLE_VERT)?;
        let mesh_vert = shaders.load(device, MESH_VERT)?;

        let triangle_layout = PipelineLayout::new(device, &[], &[])?;
        let triangle_config = GraphicsPipelineConfig {
            color_format,
            depth_format,
            ..Default::default()
        };
        let triangle = create_graphics_pipeline(
            device,
            &triangle_config,
            &triangle_vert,
            &fragment,
            &triangle_layout,
        )?;

        let push_range =
            push_constant_range(vk::ShaderStageFlags::VERTEX, GpuDrawPushConstants::SIZE)?;
        let mesh_layout = PipelineLayout::new(device, &[], &[push_range])?;
        let mesh_config = GraphicsPipelineConfig {
            depth_compare: Some(vk::CompareOp::GREATER_OR_EQUAL),
            depth_write: true,
            ..triangle_config
        };
        let mesh = create_graphics_pipeline(
            device,
            &mesh_config,
            &mesh_vert,
            &fragment,
            &mesh_layout,
        )?;

        info!("Geometry pipelines ready");

        Ok(Self {
            triangle,
            mesh,
            triangle_layout,
            mesh_layout,
        })
    }

    pub fn triangle(&self) -> vk::Pipeline {
        self.triangle.handle()
    }

    pub fn mesh(&self) -> vk::Pipeline {
        self.mesh.handle()
    }

    pub fn mesh_layout(&self) -> vk::PipelineLayout {
        self.mesh_layout.handle()
    }
}
