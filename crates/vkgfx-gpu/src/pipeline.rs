//! Pipeline layouts and graphics pipelines.

use crate::error::{GpuError, Result};
use ash::vk;

/// Owned `VkPipelineLayout`.
pub struct PipelineLayout {
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// # Safety
    /// The device and set layouts must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(format!("layout: {e}")))?;

        Ok(Self { layout })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// # Safety
    /// The device must be valid and no pipeline built on the layout may be
    /// in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline_layout(self.layout, None);
    }
}

/// Fixed-function and shader state for one graphics pipeline.
///
/// The viewport is baked from `extent`. Scissor is dynamic.
#[derive(Clone)]
pub struct GraphicsPipelineDesc<'a> {
    pub stages: Vec<vk::PipelineShaderStageCreateInfo<'a>>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub cull_back_faces: bool,
    pub wireframe: bool,
    pub depth_test: bool,
    pub alpha_blending: bool,
    pub depth_bias: bool,
}

impl Default for GraphicsPipelineDesc<'_> {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            extent: vk::Extent2D::default(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            cull_back_faces: true,
            wireframe: false,
            depth_test: true,
            alpha_blending: false,
            depth_bias: false,
        }
    }
}

impl GraphicsPipelineDesc<'_> {
    /// Reject descriptions Vulkan would fail on in less obvious ways.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(GpuError::PipelineCreation("no shader stages".to_string()));
        }
        if self.render_pass == vk::RenderPass::null() || self.layout == vk::PipelineLayout::null() {
            return Err(GpuError::PipelineCreation(
                "render pass and layout must be set".to_string(),
            ));
        }
        if let Some(attribute) = self
            .vertex_attributes
            .iter()
            .find(|attribute| attribute.format == vk::Format::UNDEFINED)
        {
            return Err(GpuError::PipelineCreation(format!(
                "vertex attribute at location {} has no format",
                attribute.location
            )));
        }
        Ok(())
    }

    fn rasterization_state(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        let state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(if self.wireframe {
                vk::PolygonMode::LINE
            } else {
                vk::PolygonMode::FILL
            })
            .cull_mode(if self.cull_back_faces {
                vk::CullModeFlags::BACK
            } else {
                vk::CullModeFlags::NONE
            })
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        if self.depth_bias {
            state
                .depth_bias_enable(true)
                .depth_bias_constant_factor(1.25)
                .depth_bias_slope_factor(1.75)
        } else {
            state.depth_bias_enable(false)
        }
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);

        if self.alpha_blending {
            attachment
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            attachment.blend_enable(false)
        }
    }
}

/// Owned graphics `VkPipeline`. The layout is borrowed and not destroyed
/// with the pipeline.
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// # Safety
    /// The device and every handle in `desc` must be valid.
    pub unsafe fn new(device: &ash::Device, desc: &GraphicsPipelineDesc<'_>) -> Result<Self> {
        desc.validate()?;

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D::default().extent(desc.extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = desc.rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [desc.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&desc.stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);

        let pipelines = device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;

        Ok(Self {
            pipeline: pipelines[0],
            layout: desc.layout,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
    }
}
