//! Declarative render pass construction
//!
//! A [`RenderPassBuilder`] collects attachment descriptions, role-tagged
//! subpasses and explicit dependencies, validates the wiring, then compiles
//! the pass object. Three dependency categories must always be covered by
//! the caller:
//!
//! 1. external -> first subpass for attachments loaded with CLEAR,
//! 2. subpass -> subpass wherever a color output becomes an input
//!    attachment,
//! 3. last subpass -> external before an attachment is reused as a
//!    transfer or presentation source.
//!
//! Missing one of these is the classic hazard in multi-pass engines; the
//! pass suites in this crate list their dependencies next to the subpass
//! wiring so the coverage is reviewable in one place.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};

/// How a subpass uses one of the pass's attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRole {
    /// Written as a color attachment (COLOR_ATTACHMENT_OPTIMAL)
    Color,
    /// Bound as the depth/stencil attachment (DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    Depth,
    /// Read as an input attachment (SHADER_READ_ONLY_OPTIMAL)
    Input,
}

struct SubpassDecl {
    bind_point: vk::PipelineBindPoint,
    uses: Vec<(u32, AttachmentRole)>,
}

/// Shape of a compiled render pass, kept for later sanity checks.
///
/// Pipeline creation checks its blend-attachment count against the color
/// count recorded here for its target subpass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassLayout {
    /// Color attachment count per subpass, in declaration order
    pub color_counts: Vec<u32>,
}

impl RenderPassLayout {
    /// Color attachment count of one subpass
    pub fn color_attachment_count(&self, subpass: u32) -> u32 {
        self.color_counts
            .get(subpass as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Number of subpasses
    pub fn subpass_count(&self) -> usize {
        self.color_counts.len()
    }
}

/// Builder for attachments, subpasses and dependencies
#[derive(Default)]
pub struct RenderPassBuilder {
    attachments: Vec<vk::AttachmentDescription>,
    subpasses: Vec<SubpassDecl>,
}

impl RenderPassBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attachment description
    #[allow(clippy::too_many_arguments)]
    pub fn add_attachment(
        &mut self,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        stencil_load_op: vk::AttachmentLoadOp,
        stencil_store_op: vk::AttachmentStoreOp,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
    ) -> &mut Self {
        self.attachments.push(
            vk::AttachmentDescription::builder()
                .format(format)
                .samples(samples)
                .load_op(load_op)
                .store_op(store_op)
                .stencil_load_op(stencil_load_op)
                .stencil_store_op(stencil_store_op)
                .initial_layout(initial_layout)
                .final_layout(final_layout)
                .build(),
        );
        self
    }

    /// Append a subpass referencing already-declared attachment indices
    pub fn add_subpass(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        uses: &[(u32, AttachmentRole)],
    ) -> &mut Self {
        self.subpasses.push(SubpassDecl {
            bind_point,
            uses: uses.to_vec(),
        });
        self
    }

    /// Check the declared wiring without touching the device.
    ///
    /// Rules: every referenced attachment index must be declared; within one
    /// subpass an attachment may hold at most one role of each kind; a
    /// subpass has at most one depth attachment.
    pub fn validate(&self) -> VulkanResult<RenderPassLayout> {
        let attachment_count = self.attachments.len() as u32;
        let mut color_counts = Vec::with_capacity(self.subpasses.len());

        for (subpass_index, subpass) in self.subpasses.iter().enumerate() {
            let mut colors = 0u32;
            let mut depths = 0u32;
            for &(index, role) in &subpass.uses {
                if index >= attachment_count {
                    return Err(VulkanError::Configuration(format!(
                        "subpass {} references undeclared attachment {} ({} declared)",
                        subpass_index, index, attachment_count
                    )));
                }
                let duplicates = subpass
                    .uses
                    .iter()
                    .filter(|&&(i, r)| i == index && r == role)
                    .count();
                if duplicates > 1 {
                    return Err(VulkanError::Configuration(format!(
                        "subpass {} binds attachment {} as {:?} more than once",
                        subpass_index, index, role
                    )));
                }
                match role {
                    AttachmentRole::Color => colors += 1,
                    AttachmentRole::Depth => depths += 1,
                    AttachmentRole::Input => {}
                }
            }
            if depths > 1 {
                return Err(VulkanError::Configuration(format!(
                    "subpass {} declares {} depth attachments",
                    subpass_index, depths
                )));
            }
            color_counts.push(colors);
        }

        Ok(RenderPassLayout { color_counts })
    }

    /// Validate, then compile the pass with the given dependency list.
    ///
    /// Driver rejection here means the wiring itself is wrong and is fatal.
    pub fn build(
        self,
        device: Device,
        dependencies: &[vk::SubpassDependency],
    ) -> VulkanResult<RenderPass> {
        let layout = self.validate()?;

        // Reference arrays must stay alive until the create call
        let mut color_refs: Vec<Vec<vk::AttachmentReference>> = Vec::new();
        let mut input_refs: Vec<Vec<vk::AttachmentReference>> = Vec::new();
        let mut depth_refs: Vec<Option<vk::AttachmentReference>> = Vec::new();

        for subpass in &self.subpasses {
            let mut colors = Vec::new();
            let mut inputs = Vec::new();
            let mut depth = None;
            for &(attachment, role) in &subpass.uses {
                match role {
                    AttachmentRole::Color => colors.push(vk::AttachmentReference {
                        attachment,
                        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    }),
                    AttachmentRole::Depth => {
                        depth = Some(vk::AttachmentReference {
                            attachment,
                            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                        })
                    }
                    AttachmentRole::Input => inputs.push(vk::AttachmentReference {
                        attachment,
                        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }),
                }
            }
            color_refs.push(colors);
            input_refs.push(inputs);
            depth_refs.push(depth);
        }

        let descriptions: Vec<vk::SubpassDescription> = self
            .subpasses
            .iter()
            .enumerate()
            .map(|(i, subpass)| {
                let mut description = vk::SubpassDescription::builder()
                    .pipeline_bind_point(subpass.bind_point)
                    .color_attachments(&color_refs[i])
                    .input_attachments(&input_refs[i]);
                if let Some(depth) = &depth_refs[i] {
                    description = description.depth_stencil_attachment(depth);
                }
                description.build()
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&self.attachments)
            .subpasses(&descriptions)
            .dependencies(dependencies);

        let handle = unsafe {
            device
                .create_render_pass(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(RenderPass {
            device,
            handle,
            layout,
        })
    }
}

/// A compiled render pass and the layout it was validated against
pub struct RenderPass {
    device: Device,
    handle: vk::RenderPass,
    layout: RenderPassLayout,
}

impl RenderPass {
    /// Get the pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    /// Validated per-subpass shape
    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_attachment(builder: &mut RenderPassBuilder, format: vk::Format) {
        builder.add_attachment(
            format,
            vk::SampleCountFlags::TYPE_1,
            vk::AttachmentLoadOp::CLEAR,
            vk::AttachmentStoreOp::STORE,
            vk::AttachmentLoadOp::DONT_CARE,
            vk::AttachmentStoreOp::DONT_CARE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
    }

    #[test]
    fn undeclared_attachment_fails_validation() {
        let mut builder = RenderPassBuilder::new();
        color_attachment(&mut builder, vk::Format::R8G8B8A8_SRGB);
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[(0, AttachmentRole::Color), (1, AttachmentRole::Depth)],
        );

        assert!(matches!(
            builder.validate(),
            Err(VulkanError::Configuration(_))
        ));
    }

    #[test]
    fn double_booked_role_fails_validation() {
        let mut builder = RenderPassBuilder::new();
        color_attachment(&mut builder, vk::Format::R8G8B8A8_SRGB);
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[(0, AttachmentRole::Color), (0, AttachmentRole::Color)],
        );

        assert!(matches!(
            builder.validate(),
            Err(VulkanError::Configuration(_))
        ));
    }

    #[test]
    fn one_attachment_may_hold_distinct_roles() {
        // An attachment written in one role and read as input elsewhere in
        // the same subpass list is legal; only repeated same-role use is not.
        let mut builder = RenderPassBuilder::new();
        color_attachment(&mut builder, vk::Format::R16G16B16A16_SFLOAT);
        color_attachment(&mut builder, vk::Format::R8G8B8A8_SRGB);
        builder.add_subpass(vk::PipelineBindPoint::GRAPHICS, &[(0, AttachmentRole::Color)]);
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[(0, AttachmentRole::Input), (1, AttachmentRole::Color)],
        );

        let layout = builder.validate().unwrap();
        assert_eq!(layout.color_counts, vec![1, 1]);
    }

    #[test]
    fn two_depth_attachments_fail_validation() {
        let mut builder = RenderPassBuilder::new();
        color_attachment(&mut builder, vk::Format::D32_SFLOAT);
        color_attachment(&mut builder, vk::Format::D32_SFLOAT);
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[(0, AttachmentRole::Depth), (1, AttachmentRole::Depth)],
        );

        assert!(matches!(
            builder.validate(),
            Err(VulkanError::Configuration(_))
        ));
    }

    #[test]
    fn transparency_shaped_pass_reports_color_counts() {
        // Two accumulation targets plus shared color/depth, then a
        // composite subpass reading the accumulators
        let mut builder = RenderPassBuilder::new();
        color_attachment(&mut builder, vk::Format::R16G16B16A16_SFLOAT);
        color_attachment(&mut builder, vk::Format::R16_SFLOAT);
        color_attachment(&mut builder, vk::Format::R8G8B8A8_SRGB);
        color_attachment(&mut builder, vk::Format::D32_SFLOAT);
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[
                (0, AttachmentRole::Color),
                (1, AttachmentRole::Color),
                (3, AttachmentRole::Depth),
            ],
        );
        builder.add_subpass(
            vk::PipelineBindPoint::GRAPHICS,
            &[
                (0, AttachmentRole::Input),
                (1, AttachmentRole::Input),
                (2, AttachmentRole::Color),
            ],
        );

        let layout = builder.validate().unwrap();
        assert_eq!(layout.subpass_count(), 2);
        assert_eq!(layout.color_attachment_count(0), 2);
        assert_eq!(layout.color_attachment_count(1), 1);
    }
}
