//! Graphics pipeline construction
//!
//! One pipeline per (shader pair, fixed-function state, target subpass).
//! Viewport and scissor are always dynamic state so a pipeline survives any
//! swapchain size; the pass suite only rebuilds framebuffers on resize,
//! never pipelines.

use std::ffi::CStr;

use ash::{vk, Device};

use crate::render::primitives::Vertex;
use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};
use crate::render::vulkan::rendering::render_pass::{RenderPass, RenderPassLayout};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// A compiled SPIR-V shader module with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytes.
    ///
    /// SPIR-V words are u32; byte blobs that are not 4-byte aligned or not a
    /// whole number of words are rejected before reaching the driver.
    pub fn from_bytes(device: &Device, bytes: &[u8]) -> VulkanResult<Self> {
        let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "SPIR-V bytecode is not 4-byte aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Get the module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Everything a pipeline needs besides its render pass and set layout
pub struct PipelineParams<'a> {
    /// Vertex stage SPIR-V
    pub vertex_shader: &'a [u8],
    /// Fragment stage SPIR-V
    pub fragment_shader: &'a [u8],
    /// When set, no vertex input is bound; the vertex shader synthesizes
    /// geometry from `gl_VertexIndex` (the full-screen composite triangle)
    pub procedural_vertices: bool,
    /// Rasterization state
    pub rasterization: vk::PipelineRasterizationStateCreateInfo,
    /// Sample count of the target subpass's attachments
    pub samples: vk::SampleCountFlags,
    /// Depth/stencil state
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo,
    /// Per-attachment blend state; length must match the target subpass's
    /// color attachment count
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    /// Target subpass index within the render pass
    pub subpass: u32,
}

/// Filled-polygon rasterization with the given cull mode.
///
/// Back-face culling for solid opaque geometry; transparent surfaces are
/// drawn double-sided (CullModeFlags::NONE) because both faces contribute.
pub fn fill_rasterization(cull_mode: vk::CullModeFlags) -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Standard less-than depth test.
///
/// Transparent accumulation tests against the opaque depth buffer but must
/// not write to it, so `depth_write` is off for those pipelines.
pub fn depth_test(depth_write: bool) -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(depth_write)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .build()
}

/// Straight color write, no blending
pub fn opaque_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ZERO)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

/// Check a pipeline's blend-attachment count against its target subpass.
///
/// A mismatch is an implementation bug: the driver would read uninitialized
/// blend state (or ignore declared state) for the unmatched attachments.
pub fn check_blend_attachment_count(
    layout: &RenderPassLayout,
    subpass: u32,
    blend_count: usize,
) -> VulkanResult<()> {
    let expected = layout.color_attachment_count(subpass);
    if blend_count as u32 != expected {
        return Err(VulkanError::Configuration(format!(
            "subpass {} has {} color attachments but {} blend states were supplied",
            subpass, expected, blend_count
        )));
    }
    Ok(())
}

/// A pipeline layout and graphics pipeline with RAII cleanup
pub struct Pipeline {
    device: Device,
    /// Pipeline layout (one descriptor set, no push constants)
    pub layout: vk::PipelineLayout,
    /// Graphics pipeline handle
    pub pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Compile a graphics pipeline against `render_pass`.
    ///
    /// Shader-module or pipeline-compile failures are fatal; they indicate
    /// broken build artifacts or a broken driver, not runtime conditions.
    pub fn new(
        device: Device,
        set_layout: vk::DescriptorSetLayout,
        render_pass: &RenderPass,
        params: &PipelineParams,
    ) -> VulkanResult<Self> {
        check_blend_attachment_count(
            render_pass.layout(),
            params.subpass,
            params.blend_attachments.len(),
        )?;

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let vertex_module = ShaderModule::from_bytes(&device, params.vertex_shader)?;
        let fragment_module = ShaderModule::from_bytes(&device, params.fragment_shader)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module.handle())
                .name(ENTRY_POINT)
                .build(),
        ];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input = if params.procedural_vertices {
            vk::PipelineVertexInputStateCreateInfo::builder()
        } else {
            vk::PipelineVertexInputStateCreateInfo::builder()
                .vertex_binding_descriptions(&binding_descriptions)
                .vertex_attribute_descriptions(&attribute_descriptions)
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(params.samples)
            // Per-sample shading reduces aliasing on interior texture detail
            .sample_shading_enable(true)
            .min_sample_shading(0.2);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&params.blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .dynamic_state(&dynamic_state)
            .rasterization_state(&params.rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&params.depth_stencil)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(params.subpass);

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?[0]
        };

        Ok(Self {
            device,
            layout,
            pipeline,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_count_must_match_subpass_colors() {
        let layout = RenderPassLayout {
            color_counts: vec![2, 1],
        };

        assert!(check_blend_attachment_count(&layout, 0, 2).is_ok());
        assert!(check_blend_attachment_count(&layout, 1, 1).is_ok());
        assert!(matches!(
            check_blend_attachment_count(&layout, 0, 1),
            Err(VulkanError::Configuration(_))
        ));
        assert!(matches!(
            check_blend_attachment_count(&layout, 1, 2),
            Err(VulkanError::Configuration(_))
        ));
        // A subpass index past the end has zero color attachments
        assert!(matches!(
            check_blend_attachment_count(&layout, 2, 1),
            Err(VulkanError::Configuration(_))
        ));
    }
}
