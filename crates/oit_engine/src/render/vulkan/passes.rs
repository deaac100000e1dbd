//! The scene pass suite
//!
//! Everything extent-independent about the frame's passes lives in
//! [`PassSuite`]: the opaque and transparency render passes and the four
//! pipelines compiled against them. The extent-dependent pieces, offscreen
//! images ([`FrameTargets`]) and framebuffers ([`PassFramebuffers`]), are
//! rebuilt on every swapchain recreation; the suite itself survives because
//! formats and sample counts do not change with window size and viewport
//! state is dynamic.

use ash::{vk, Device};

use crate::render::assets::SceneAssets;
use crate::render::vulkan::initialization::context::{
    VulkanContext, VulkanError, VulkanResult,
};
use crate::render::vulkan::rendering::commands::CommandPool;
use crate::render::vulkan::rendering::pipeline::{
    depth_test, fill_rasterization, opaque_blend, Pipeline, PipelineParams,
};
use crate::render::vulkan::rendering::render_pass::{
    AttachmentRole, RenderPass, RenderPassBuilder,
};
use crate::render::vulkan::resources::image::{
    cmd_image_transition, depth_aspect_mask, ImageResource, ImageSpec,
};
use crate::render::vulkan::wboit;

/// Format of the offscreen scene color target (blitted to the swapchain)
pub const SCENE_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Pick a depth format the device can use for optimal-tiling attachments
pub fn find_depth_format(context: &VulkanContext) -> VulkanResult<vk::Format> {
    let candidates = [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ];
    for format in candidates {
        let properties = unsafe {
            context
                .instance
                .instance
                .get_physical_device_format_properties(context.physical_device.device, format)
        };
        if properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return Ok(format);
        }
    }
    Err(VulkanError::UnsupportedFormat(
        "no depth format supports optimal-tiling attachments".to_string(),
    ))
}

/// The declarative offscreen image plan for one surface extent.
///
/// Recreation with an unchanged extent must produce an identical plan; the
/// recreation path is idempotent exactly because the live images are built
/// from this list.
pub fn offscreen_image_specs(
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
) -> Vec<ImageSpec> {
    vec![
        // Shared scene color: rendered by the opaque and transparency
        // passes, then resolved/blitted out
        ImageSpec::render_target(
            extent,
            SCENE_COLOR_FORMAT,
            samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
        ),
        // Shared depth: written by the opaque pass, read-only afterwards
        ImageSpec::render_target(
            extent,
            depth_format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect_mask(depth_format),
        ),
        // Weighted color accumulator
        ImageSpec::render_target(
            extent,
            wboit::WEIGHTED_COLOR_FORMAT,
            samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        ),
        // Reveal accumulator
        ImageSpec::render_target(
            extent,
            wboit::REVEAL_FORMAT,
            samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        ),
        // Single-sample resolve destination; the multisampled scene color
        // cannot be blitted directly
        ImageSpec::render_target(
            extent,
            SCENE_COLOR_FORMAT,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
        ),
    ]
}

/// The offscreen images backing one swapchain configuration
pub struct FrameTargets {
    /// Shared scene color target
    pub scene_color: ImageResource,
    /// Shared depth buffer
    pub depth: ImageResource,
    /// Weighted color accumulator
    pub weighted_color: ImageResource,
    /// Reveal accumulator
    pub reveal: ImageResource,
    /// Single-sample resolve destination for the swapchain blit
    pub downsample: ImageResource,
}

impl FrameTargets {
    /// Create and initialize the offscreen images for `extent`.
    ///
    /// The render targets are moved into their steady-state layouts on the
    /// one-shot path so the first frame's passes can LOAD them.
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let specs = offscreen_image_specs(extent, samples, depth_format);
        let mut scene_color = build_target(context, specs[0])?;
        let mut depth = build_target(context, specs[1])?;
        let mut weighted_color = build_target(context, specs[2])?;
        let mut reveal = build_target(context, specs[3])?;
        let downsample = build_target(context, specs[4])?;

        command_pool.submit_one_shot(context.graphics_queue(), |cmd| {
            scene_color.cmd_transition_layout(
                cmd,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                None,
            );
            depth.cmd_transition_layout(
                cmd,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                None,
            );
            weighted_color.cmd_transition_layout(
                cmd,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                None,
            );
            reveal.cmd_transition_layout(
                cmd,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                None,
            );
            // downsample stays UNDEFINED; the blit path transitions it
        })?;

        Ok(Self {
            scene_color,
            depth,
            weighted_color,
            reveal,
            downsample,
        })
    }
}

fn build_target(context: &VulkanContext, spec: ImageSpec) -> VulkanResult<ImageResource> {
    let mut image = ImageResource::new(context.raw_device(), spec);
    image.create_image()?;
    let requirements = image.memory_requirements();
    let memory_type = context.find_memory_type(
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    image.bind_memory(requirements.size, memory_type)?;
    image.create_view()?;
    Ok(image)
}

/// Build the single-subpass opaque scene pass
pub fn opaque_render_pass(
    device: Device,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> VulkanResult<RenderPass> {
    let mut builder = RenderPassBuilder::new();
    builder.add_attachment(
        SCENE_COLOR_FORMAT,
        samples,
        vk::AttachmentLoadOp::CLEAR,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    builder.add_attachment(
        depth_format,
        samples,
        vk::AttachmentLoadOp::CLEAR,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );
    builder.add_subpass(
        vk::PipelineBindPoint::GRAPHICS,
        &[(0, AttachmentRole::Color), (1, AttachmentRole::Depth)],
    );

    let dependencies = [
        // Earlier reads of both CLEAR-loaded attachments finish first
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build(),
        // With transparency off the color output goes straight to the blit
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::TRANSFER)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .build(),
    ];

    builder.build(device, &dependencies)
}

/// Render passes and pipelines for the scene, compiled once per device
pub struct PassSuite {
    /// Opaque scene pass (color + depth)
    pub opaque_pass: RenderPass,
    /// Two-subpass weighted-blended transparency pass
    pub transparency_pass: RenderPass,
    /// Opaque geometry pipeline (back-face culled)
    pub opaque_pipeline: Pipeline,
    /// Fallback pipeline drawing the transparent mesh opaquely, double-sided
    pub hair_pipeline: Pipeline,
    /// WBOIT accumulation pipeline (transparency subpass 0)
    pub accumulation_pipeline: Pipeline,
    /// WBOIT composite pipeline (transparency subpass 1, procedural triangle)
    pub composite_pipeline: Pipeline,
}

impl PassSuite {
    /// Compile the pass suite against the provided shader binaries
    pub fn new(
        device: Device,
        set_layout: vk::DescriptorSetLayout,
        assets: &SceneAssets,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let missing = assets.missing_shaders();
        if !missing.is_empty() {
            return Err(VulkanError::MissingAsset(format!(
                "shader binaries {:?}",
                missing
            )));
        }
        let shader = |name: &str| assets.shaders[name].as_slice();

        let opaque_pass = opaque_render_pass(device.clone(), depth_format, samples)?;
        let transparency_pass = wboit::transparency_render_pass(
            device.clone(),
            SCENE_COLOR_FORMAT,
            depth_format,
            samples,
        )?;

        let opaque_pipeline = Pipeline::new(
            device.clone(),
            set_layout,
            &opaque_pass,
            &PipelineParams {
                vertex_shader: shader("scene_vert"),
                fragment_shader: shader("opaque_frag"),
                procedural_vertices: false,
                rasterization: fill_rasterization(vk::CullModeFlags::BACK),
                samples,
                depth_stencil: depth_test(true),
                blend_attachments: vec![opaque_blend()],
                subpass: 0,
            },
        )?;

        // Same pass, different shading: strands are thin two-sided surfaces,
        // so culling is off even when they are drawn opaquely
        let hair_pipeline = Pipeline::new(
            device.clone(),
            set_layout,
            &opaque_pass,
            &PipelineParams {
                vertex_shader: shader("scene_vert"),
                fragment_shader: shader("hair_frag"),
                procedural_vertices: false,
                rasterization: fill_rasterization(vk::CullModeFlags::NONE),
                samples,
                depth_stencil: depth_test(true),
                blend_attachments: vec![opaque_blend()],
                subpass: 0,
            },
        )?;

        let accumulation_pipeline = Pipeline::new(
            device.clone(),
            set_layout,
            &transparency_pass,
            &PipelineParams {
                vertex_shader: shader("scene_vert"),
                fragment_shader: shader("wboit_accum_frag"),
                procedural_vertices: false,
                rasterization: fill_rasterization(vk::CullModeFlags::NONE),
                samples,
                // Depth-tested against the opaque scene, never written
                depth_stencil: depth_test(false),
                blend_attachments: wboit::accumulation_blend_states().to_vec(),
                subpass: 0,
            },
        )?;

        let composite_pipeline = Pipeline::new(
            device,
            set_layout,
            &transparency_pass,
            &PipelineParams {
                vertex_shader: shader("fullscreen_vert"),
                fragment_shader: shader("wboit_composite_frag"),
                procedural_vertices: true,
                rasterization: fill_rasterization(vk::CullModeFlags::NONE),
                samples,
                depth_stencil: depth_test(false),
                blend_attachments: vec![wboit::composite_blend_state()],
                subpass: 1,
            },
        )?;

        Ok(Self {
            opaque_pass,
            transparency_pass,
            opaque_pipeline,
            hair_pipeline,
            accumulation_pipeline,
            composite_pipeline,
        })
    }
}

/// Framebuffers binding the offscreen targets to the scene passes
pub struct PassFramebuffers {
    device: Device,
    /// Opaque pass framebuffer ([scene color, depth])
    pub opaque: vk::Framebuffer,
    /// Transparency pass framebuffer
    /// ([weighted color, reveal, scene color, depth])
    pub transparency: vk::Framebuffer,
    /// Extent the framebuffers were built for
    pub extent: vk::Extent2D,
}

impl PassFramebuffers {
    /// Build framebuffers for the suite over the current targets
    pub fn new(
        device: Device,
        suite: &PassSuite,
        targets: &FrameTargets,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let opaque = create_framebuffer(
            &device,
            suite.opaque_pass.handle(),
            &[targets.scene_color.view, targets.depth.view],
            extent,
        )?;
        // Attachment order must match the transparency pass declaration
        let transparency = create_framebuffer(
            &device,
            suite.transparency_pass.handle(),
            &[
                targets.weighted_color.view,
                targets.reveal.view,
                targets.scene_color.view,
                targets.depth.view,
            ],
            extent,
        )?;

        Ok(Self {
            device,
            opaque,
            transparency,
            extent,
        })
    }
}

impl Drop for PassFramebuffers {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.opaque, None);
            self.device.destroy_framebuffer(self.transparency, None);
        }
    }
}

fn create_framebuffer(
    device: &Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> VulkanResult<vk::Framebuffer> {
    let create_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    unsafe {
        device
            .create_framebuffer(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

/// One step of the fixed per-frame pass sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// The opaque scene pass. With transparency disabled the transparent
    /// mesh is drawn here too, opaquely, through the fallback pipeline.
    OpaquePass {
        /// Draw the transparent mesh opaquely in this pass
        include_transparent_mesh: bool,
    },
    /// The two-subpass weighted-blended transparency pass
    TransparencyPass,
    /// Resolve (under MSAA) and blit the scene color to the swapchain image
    ResolveBlit,
    /// The overlay pass over the swapchain image
    OverlayPass,
}

/// The pass sequence for one frame, driven by the overlay's toggle
pub fn frame_sequence(transparency_enabled: bool) -> Vec<FrameStep> {
    if transparency_enabled {
        vec![
            FrameStep::OpaquePass {
                include_transparent_mesh: false,
            },
            FrameStep::TransparencyPass,
            FrameStep::ResolveBlit,
            FrameStep::OverlayPass,
        ]
    } else {
        vec![
            FrameStep::OpaquePass {
                include_transparent_mesh: true,
            },
            FrameStep::ResolveBlit,
            FrameStep::OverlayPass,
        ]
    }
}

/// Number of render pass executions a sequence performs (the blit records
/// barriers and transfer commands, not a pass)
pub fn render_pass_executions(steps: &[FrameStep]) -> usize {
    steps
        .iter()
        .filter(|step| !matches!(step, FrameStep::ResolveBlit))
        .count()
}

/// Bind the dynamic viewport/scissor state for the current extent
pub fn cmd_set_viewport_scissor(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    extent: vk::Extent2D,
) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    unsafe {
        device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        device.cmd_set_scissor(command_buffer, 0, &[scissor]);
    }
}

/// Resolve (under MSAA) and blit the scene color into the swapchain image.
///
/// Leaves the swapchain image in TRANSFER_DST for the overlay pass and
/// returns the scene color to its color-attachment state for the next frame.
pub fn record_resolve_blit(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    targets: &mut FrameTargets,
    swapchain_image: vk::Image,
    swapchain_extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
) {
    debug_assert_eq!(
        targets.scene_color.current_layout(),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    );

    targets.scene_color.cmd_transition_layout(
        command_buffer,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::AccessFlags::TRANSFER_READ,
        None,
    );

    let source_extent = vk::Extent2D {
        width: targets.scene_color.spec.width,
        height: targets.scene_color.spec.height,
    };

    // A multisampled image cannot be blitted; resolve it to the
    // single-sample downsample target first
    let blit_source = if samples != vk::SampleCountFlags::TYPE_1 {
        targets.downsample.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            None,
        );

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageResolve {
            src_subresource: subresource,
            src_offset: vk::Offset3D::default(),
            dst_subresource: subresource,
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: source_extent.width,
                height: source_extent.height,
                depth: 1,
            },
        };
        unsafe {
            device.cmd_resolve_image(
                command_buffer,
                targets.scene_color.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                targets.downsample.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        targets.downsample.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            None,
        );
        targets.downsample.image
    } else {
        targets.scene_color.image
    };

    cmd_image_transition(
        device,
        command_buffer,
        swapchain_image,
        vk::ImageAspectFlags::COLOR,
        vk::AccessFlags::empty(),
        vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    let subresource = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let blit = vk::ImageBlit {
        src_subresource: subresource,
        src_offsets: [
            vk::Offset3D::default(),
            vk::Offset3D {
                x: source_extent.width as i32,
                y: source_extent.height as i32,
                z: 1,
            },
        ],
        dst_subresource: subresource,
        dst_offsets: [
            vk::Offset3D::default(),
            vk::Offset3D {
                x: swapchain_extent.width as i32,
                y: swapchain_extent.height as i32,
                z: 1,
            },
        ],
    };
    unsafe {
        device.cmd_blit_image(
            command_buffer,
            blit_source,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::NEAREST,
        );
    }

    targets.scene_color.cmd_transition_layout(
        command_buffer,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn image_plan_is_stable_for_equal_extents() {
        let first = offscreen_image_specs(
            EXTENT,
            vk::SampleCountFlags::TYPE_4,
            vk::Format::D32_SFLOAT,
        );
        let second = offscreen_image_specs(
            EXTENT,
            vk::SampleCountFlags::TYPE_4,
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn image_plan_changes_with_extent() {
        let base = offscreen_image_specs(
            EXTENT,
            vk::SampleCountFlags::TYPE_4,
            vk::Format::D32_SFLOAT,
        );
        let resized = offscreen_image_specs(
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            vk::SampleCountFlags::TYPE_4,
            vk::Format::D32_SFLOAT,
        );
        assert_ne!(base, resized);
        // Only extents differ; formats and usages are configuration-stable
        for (a, b) in base.iter().zip(&resized) {
            assert_eq!(a.format, b.format);
            assert_eq!(a.usage, b.usage);
            assert_eq!(a.samples, b.samples);
        }
    }

    #[test]
    fn downsample_target_is_always_single_sample() {
        let specs = offscreen_image_specs(
            EXTENT,
            vk::SampleCountFlags::TYPE_8,
            vk::Format::D32_SFLOAT,
        );
        let downsample = specs.last().unwrap();
        assert_eq!(downsample.samples, vk::SampleCountFlags::TYPE_1);
        assert!(downsample.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(downsample.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn transparency_on_runs_three_passes() {
        let steps = frame_sequence(true);
        assert_eq!(render_pass_executions(&steps), 3);
        assert!(steps.contains(&FrameStep::TransparencyPass));
        assert!(steps.contains(&FrameStep::OpaquePass {
            include_transparent_mesh: false
        }));
    }

    #[test]
    fn transparency_off_runs_two_passes_and_skips_blending() {
        let steps = frame_sequence(false);
        assert_eq!(render_pass_executions(&steps), 2);
        assert!(!steps.contains(&FrameStep::TransparencyPass));
        // The transparent mesh is still visible, drawn opaquely instead
        assert!(steps.contains(&FrameStep::OpaquePass {
            include_transparent_mesh: true
        }));
    }

    #[test]
    fn every_sequence_ends_with_blit_then_overlay() {
        for enabled in [true, false] {
            let steps = frame_sequence(enabled);
            let n = steps.len();
            assert_eq!(steps[n - 2], FrameStep::ResolveBlit);
            assert_eq!(steps[n - 1], FrameStep::OverlayPass);
        }
    }
}
