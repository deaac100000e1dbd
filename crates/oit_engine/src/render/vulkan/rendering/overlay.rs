//! Debug overlay pass integration
//!
//! The overlay is the last pass before presentation. It LOADs the blitted
//! frame from the swapchain image and draws widgets on top through an
//! injected painter callback; the widgets themselves are the application's
//! business. The overlay owns the [`OverlayState`] the orchestrator reads
//! each frame to decide whether the transparency pass runs.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::VulkanResult;
use crate::render::vulkan::rendering::render_pass::{
    AttachmentRole, RenderPass, RenderPassBuilder,
};
use crate::render::vulkan::resources::image::cmd_image_transition;

/// Mutable UI state shared between the overlay widgets and the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayState {
    /// Whether the weighted-blended transparency pass runs this frame
    pub transparency_enabled: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            transparency_enabled: true,
        }
    }
}

/// Widget-painting callback recorded inside the overlay render pass.
///
/// Receives the command buffer with the pass already begun and may flip
/// flags on the state in response to earlier input events.
pub type OverlayPainter = Box<dyn FnMut(vk::CommandBuffer, &mut OverlayState)>;

/// Render pass, per-image framebuffers and state for the overlay.
///
/// The pass survives resizes; only the framebuffers are swapchain-bound and
/// are torn down and rebuilt through [`OverlayBackend::destroy_swapchain_state`]
/// and [`OverlayBackend::create_swapchain_state`].
pub struct OverlayBackend {
    device: Device,
    render_pass: RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    state: OverlayState,
    painter: Option<OverlayPainter>,
}

impl OverlayBackend {
    /// Build the overlay render pass for the swapchain format.
    ///
    /// The attachment is LOADed (the blit result must survive) and the
    /// dependencies cover the transfer write before the pass and the
    /// presentation read after it.
    pub fn new(device: Device, swapchain_format: vk::Format) -> VulkanResult<Self> {
        let mut builder = RenderPassBuilder::new();
        builder.add_attachment(
            swapchain_format,
            vk::SampleCountFlags::TYPE_1,
            vk::AttachmentLoadOp::LOAD,
            vk::AttachmentStoreOp::STORE,
            vk::AttachmentLoadOp::DONT_CARE,
            vk::AttachmentStoreOp::DONT_CARE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        builder.add_subpass(vk::PipelineBindPoint::GRAPHICS, &[(0, AttachmentRole::Color)]);

        let dependencies = [
            // The blit into the swapchain image must finish before the
            // overlay reads/writes it as a color attachment
            vk::SubpassDependency::builder()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::TRANSFER)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .build(),
            // Overlay writes complete before presentation consumes the image
            vk::SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .build(),
        ];

        let render_pass = builder.build(device.clone(), &dependencies)?;

        Ok(Self {
            device,
            render_pass,
            framebuffers: Vec::new(),
            extent: vk::Extent2D::default(),
            state: OverlayState::default(),
            painter: None,
        })
    }

    /// Install the widget painter
    pub fn set_painter(&mut self, painter: OverlayPainter) {
        self.painter = Some(painter);
    }

    /// Current overlay state
    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Mutable access for the application's per-frame update
    pub fn state_mut(&mut self) -> &mut OverlayState {
        &mut self.state
    }

    /// Build one framebuffer per swapchain image view
    pub fn create_swapchain_state(
        &mut self,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        debug_assert!(self.framebuffers.is_empty(), "swapchain state already built");
        for &view in views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&create_info, None)
                    .map_err(crate::render::vulkan::initialization::context::VulkanError::Api)?
            };
            self.framebuffers.push(framebuffer);
        }
        self.extent = extent;
        Ok(())
    }

    /// Destroy the per-image framebuffers ahead of swapchain recreation
    pub fn destroy_swapchain_state(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }

    /// Record the overlay pass over the acquired swapchain image.
    ///
    /// The image arrives in TRANSFER_DST from the blit and leaves in
    /// PRESENT_SRC, ready for the present call.
    pub fn record(&mut self, command_buffer: vk::CommandBuffer, image: vk::Image, index: usize) {
        cmd_image_transition(
            &self.device,
            command_buffer,
            image,
            vk::ImageAspectFlags::COLOR,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[index])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            });

        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        if let Some(painter) = &mut self.painter {
            painter(command_buffer, &mut self.state);
        }

        unsafe {
            self.device.cmd_end_render_pass(command_buffer);
        }

        cmd_image_transition(
            &self.device,
            command_buffer,
            image,
            vk::ImageAspectFlags::COLOR,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::empty(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
    }
}

impl Drop for OverlayBackend {
    fn drop(&mut self) {
        self.destroy_swapchain_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparency_defaults_on() {
        assert!(OverlayState::default().transparency_enabled);
    }
}
