//! Pipeline creation and management.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::shader::ShaderModule;

/// Owned pipeline layout.
pub struct PipelineLayout {
    layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<ash::Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        // SAFETY: device is live and the set layouts belong to it.
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        Ok(Self {
            layout,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines using this layout are dropped first.
        unsafe { self.device.destroy_pipeline_layout(self.layout, None) };
    }
}

/// Push-constant range of `size` bytes visible to `stages`.
pub fn push_constant_range(stages: vk::ShaderStageFlags, size: usize) -> Result<vk::PushConstantRange> {
    let size = u32::try_from(size)
        .map_err(|_| GpuError::PipelineCreation(format!("push constant block of {size} bytes")))?;
    Ok(vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size,
    })
}

/// Owned pipeline handle, compute or graphics.
pub struct Pipeline {
    pipeline: vk::Pipeline,
    device: Arc<ash::Device>,
}

impl Pipeline {
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: the owner waits for device idle before dropping pipelines.
        unsafe { self.device.destroy_pipeline(self.pipeline, None) };
    }
}

/// Create a compute pipeline with entry point `main`.
pub fn create_compute_pipeline(
    device: &Arc<ash::Device>,
    shader: &ShaderModule,
    layout: &PipelineLayout,
) -> Result<Pipeline> {
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader.handle())
        .name(c"main");

    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info)
        .layout(layout.handle());

    // SAFETY: module and layout belong to this device.
    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;

    Ok(Pipeline {
        pipeline: pipelines[0],
        device: Arc::clone(device),
    })
}

/// Graphics pipeline configuration for dynamic rendering.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// Depth comparison; `None` disables the depth test.
    pub depth_compare: Option<vk::CompareOp>,
    pub depth_write: bool,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_compare: None,
            depth_write: false,
            color_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Depth state described by this config.
    pub fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        match self.depth_compare {
            Some(op) => state
                .depth_test_enable(true)
                .depth_write_enable(self.depth_write)
                .depth_compare_op(op),
            None => state
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER),
        }
    }
}

/// Create a graphics pipeline using dynamic rendering (Vulkan 1.3).
///
/// Vertex data is fetched through buffer device addresses, so the pipeline
/// declares no vertex input. Viewport and scissor are dynamic.
pub fn create_graphics_pipeline(
    device: &Arc<ash::Device>,
    config: &GraphicsPipelineConfig,
    vertex_shader: &ShaderModule,
    fragment_shader: &ShaderModule,
    layout: &PipelineLayout,
) -> Result<Pipeline> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader.handle())
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader.handle())
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(config.topology)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(config.polygon_mode)
        .cull_mode(config.cull_mode)
        .front_face(config.front_face)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false)
        .min_sample_shading(1.0);

    let depth_stencil = config.depth_stencil_state();

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];

    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [config.color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(config.depth_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout.handle())
        .push_next(&mut rendering_info);

    // SAFETY: modules and layout belong to this device; all state outlives the call.
    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;

    Ok(Pipeline {
        pipeline: pipelines[0],
        device: Arc::clone(device),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_disabled_by_default() {
        let state = GraphicsPipelineConfig::default().depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::FALSE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn reversed_depth_test() {
        let config = GraphicsPipelineConfig {
            depth_compare: Some(vk::CompareOp::GREATER_OR_EQUAL),
            depth_write: true,
            ..Default::default()
        };
        let state = config.depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::GREATER_OR_EQUAL);
    }

    #[test]
    fn push_constant_range_covers_block() {
        let range = push_constant_range(vk::ShaderStageFlags::COMPUTE, 64).unwrap();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 64);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }
}
