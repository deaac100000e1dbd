//! Weighted blended order-independent transparency
//!
//! Transparency without primitive sorting, in two subpasses of one render
//! pass:
//!
//! * Subpass 0 rasterizes every transparent triangle into two accumulators:
//!   a weighted color sum (additive, ONE/ONE) and a reveal product
//!   (ZERO/ONE_MINUS_SRC_COLOR, so each fragment multiplies in its own
//!   transmittance). Depth testing runs against the opaque pass's depth
//!   buffer with writes disabled, which is what lets transparency respect
//!   opaque occlusion without a depth pre-pass.
//! * Subpass 1 reads both accumulators as input attachments and draws one
//!   procedural full-screen triangle whose fragment normalizes the weighted
//!   sum, then composites over the opaque color already in the shared
//!   attachment with (ONE_MINUS_SRC_ALPHA, SRC_ALPHA) where source alpha is
//!   the reveal factor. With reveal still at its clear value of 1.0 the
//!   destination passes through untouched.
//!
//! The shared opaque color attachment is LOADed, never cleared; the opaque
//! pass's output is the composite background.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::VulkanResult;
use crate::render::vulkan::rendering::render_pass::{
    AttachmentRole, RenderPass, RenderPassBuilder,
};

/// Attachment index of the weighted color accumulator
pub const ATTACHMENT_WEIGHTED_COLOR: u32 = 0;
/// Attachment index of the reveal accumulator
pub const ATTACHMENT_REVEAL: u32 = 1;
/// Attachment index of the shared opaque color target
pub const ATTACHMENT_SCENE_COLOR: u32 = 2;
/// Attachment index of the shared depth buffer
pub const ATTACHMENT_DEPTH: u32 = 3;

/// Accumulator formats: high-precision color sum, single-channel reveal
pub const WEIGHTED_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Reveal factor format
pub const REVEAL_FORMAT: vk::Format = vk::Format::R16_SFLOAT;

/// Build the two-subpass transparency pass.
///
/// Attachment order is [weighted color, reveal, scene color, depth]; the
/// framebuffer must bind views in the same order.
pub fn transparency_render_pass(
    device: Device,
    scene_color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> VulkanResult<RenderPass> {
    let mut builder = RenderPassBuilder::new();

    // Accumulators are cleared to their identity values each frame
    builder.add_attachment(
        WEIGHTED_COLOR_FORMAT,
        samples,
        vk::AttachmentLoadOp::CLEAR,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    builder.add_attachment(
        REVEAL_FORMAT,
        samples,
        vk::AttachmentLoadOp::CLEAR,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    // The opaque result is composited over, so it is loaded, not cleared
    builder.add_attachment(
        scene_color_format,
        samples,
        vk::AttachmentLoadOp::LOAD,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    // Depth is read-only here: loaded from the opaque pass, tested, kept
    builder.add_attachment(
        depth_format,
        samples,
        vk::AttachmentLoadOp::LOAD,
        vk::AttachmentStoreOp::STORE,
        vk::AttachmentLoadOp::DONT_CARE,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    builder.add_subpass(
        vk::PipelineBindPoint::GRAPHICS,
        &[
            (ATTACHMENT_WEIGHTED_COLOR, AttachmentRole::Color),
            (ATTACHMENT_REVEAL, AttachmentRole::Color),
            (ATTACHMENT_DEPTH, AttachmentRole::Depth),
        ],
    );
    builder.add_subpass(
        vk::PipelineBindPoint::GRAPHICS,
        &[
            (ATTACHMENT_WEIGHTED_COLOR, AttachmentRole::Input),
            (ATTACHMENT_REVEAL, AttachmentRole::Input),
            (ATTACHMENT_SCENE_COLOR, AttachmentRole::Color),
        ],
    );

    let dependencies = [
        // Prior frame's accumulator reads (input attachments, fragment
        // shader stage) and writes finish before the clears
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::FRAGMENT_SHADER,
            )
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
            .build(),
        // Accumulator writes become input-attachment reads in the composite
        // subpass; BY_REGION is enough since the read is per-pixel
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(1)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
        // Composite output is reused as a transfer source by the blit
        vk::SubpassDependency::builder()
            .src_subpass(1)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build(),
    ];

    builder.build(device, &dependencies)
}

/// Blend states for the accumulation subpass, one per accumulator.
///
/// Weighted color adds every fragment's premultiplied contribution; the
/// reveal channel multiplies in per-fragment transmittance via
/// (ZERO, ONE_MINUS_SRC_COLOR).
pub fn accumulation_blend_states() -> [vk::PipelineColorBlendAttachmentState; 2] {
    let weighted_sum = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ONE)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build();

    let reveal_product = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::ZERO)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_COLOR)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ZERO)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build();

    [weighted_sum, reveal_product]
}

/// Blend state for the composite subpass.
///
/// The fragment shader outputs the normalized average with alpha set to the
/// reveal factor; (ONE_MINUS_SRC_ALPHA, SRC_ALPHA) then weights the average
/// against the opaque background.
pub fn composite_blend_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

/// Clear values for the accumulation attachments.
///
/// Weighted color clears to zero (empty sum); reveal clears to 1.0, meaning
/// every pixel initially shows the background all the way through. Only the
/// CLEAR-loaded attachments need values.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 0.0],
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [1.0, 0.0, 0.0, 0.0],
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// The composite fragment's output: normalized average of the weighted
    /// sum, with the reveal factor carried in alpha. Mirrors the composite
    /// fragment shader.
    fn composite_fragment(weighted: [f32; 4], reveal: f32) -> ([f32; 3], f32) {
        let denominator = weighted[3].max(f32::EPSILON);
        (
            [
                weighted[0] / denominator,
                weighted[1] / denominator,
                weighted[2] / denominator,
            ],
            reveal,
        )
    }

    /// Fixed-function blend (ONE_MINUS_SRC_ALPHA, SRC_ALPHA) per channel
    fn blend_over(source: [f32; 3], source_alpha: f32, destination: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0; 3];
        for channel in 0..3 {
            out[channel] =
                (1.0 - source_alpha) * source[channel] + source_alpha * destination[channel];
        }
        out
    }

    #[test]
    fn zero_fragments_leave_background_untouched() {
        // Accumulators at their clear values: empty sum, full reveal
        let weighted = [0.0, 0.0, 0.0, 0.0];
        let reveal = 1.0;
        let background = [0.25, 0.5, 0.75];

        let (average, alpha) = composite_fragment(weighted, reveal);
        let composited = blend_over(average, alpha, background);

        for channel in 0..3 {
            assert_relative_eq!(composited[channel], background[channel]);
        }
    }

    #[test]
    fn single_fragment_matches_alpha_blending() {
        // One fragment of color c, alpha a, weight w: the weighted sum holds
        // (w*a*c, w*a) and reveal holds 1-a, so compositing must reduce to
        // ordinary over-blending of that single surface.
        let (color, alpha, weight) = ([0.8f32, 0.2, 0.1], 0.6f32, 3.5f32);
        let background = [0.1, 0.1, 0.1];

        let weighted = [
            weight * alpha * color[0],
            weight * alpha * color[1],
            weight * alpha * color[2],
            weight * alpha,
        ];
        let reveal = 1.0 - alpha;

        let (average, out_alpha) = composite_fragment(weighted, reveal);
        let composited = blend_over(average, out_alpha, background);

        for channel in 0..3 {
            let expected = alpha * color[channel] + (1.0 - alpha) * background[channel];
            assert_relative_eq!(composited[channel], expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn reveal_blend_accumulates_transmittance() {
        // The reveal attachment starts at 1 and each fragment multiplies in
        // (1 - alpha) through the (ZERO, ONE_MINUS_SRC_COLOR) equation.
        let alphas = [0.3f32, 0.5, 0.2];
        let mut reveal = 1.0f32;
        for alpha in alphas {
            // dst = 0 * src + (1 - src) * dst, with src = alpha
            reveal = (1.0 - alpha) * reveal;
        }
        assert_relative_eq!(reveal, 0.7 * 0.5 * 0.8, epsilon = 1e-6);
    }

    #[test]
    fn accumulation_states_are_order_independent() {
        let [sum, product] = accumulation_blend_states();
        assert_eq!(sum.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(sum.dst_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(product.src_color_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(
            product.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_COLOR
        );
    }

    #[test]
    fn accumulators_clear_to_identity() {
        let [weighted, reveal] = clear_values();
        unsafe {
            assert_eq!(weighted.color.float32, [0.0, 0.0, 0.0, 0.0]);
            assert_eq!(reveal.color.float32[0], 1.0);
        }
    }
}
