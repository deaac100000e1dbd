//! GPU image resources with explicit layout/access tracking
//!
//! Every offscreen target and texture in the engine is an [`ImageResource`]:
//! a single owner for the image, its memory and its view, carrying the
//! image's current layout and access scope. Barriers are always emitted
//! through the tracker, so the recorded state matches what the GPU will
//! observe as long as transitions for one image are recorded on a single
//! command stream.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};

/// Derive the pipeline stages implied by an access mask.
///
/// This is the one table both the image transition helper and the raw
/// swapchain-image helper consult; keeping it in a single pure function
/// avoids the masks drifting apart. An empty access mask maps to
/// TOP_OF_PIPE so it can be used on both sides of a barrier.
pub fn access_stage_mask(access: vk::AccessFlags) -> vk::PipelineStageFlags {
    const SHADER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
        vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
            | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
    );
    const DEPTH_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
    );

    if access.is_empty() {
        return vk::PipelineStageFlags::TOP_OF_PIPE;
    }

    let table: [(vk::AccessFlags, vk::PipelineStageFlags); 13] = [
        (
            vk::AccessFlags::INDIRECT_COMMAND_READ,
            vk::PipelineStageFlags::DRAW_INDIRECT,
        ),
        (
            vk::AccessFlags::INDEX_READ,
            vk::PipelineStageFlags::VERTEX_INPUT,
        ),
        (
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            vk::PipelineStageFlags::VERTEX_INPUT,
        ),
        (vk::AccessFlags::UNIFORM_READ, SHADER_STAGES),
        (
            vk::AccessFlags::INPUT_ATTACHMENT_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (vk::AccessFlags::SHADER_READ, SHADER_STAGES),
        (vk::AccessFlags::SHADER_WRITE, SHADER_STAGES),
        (
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, DEPTH_STAGES),
        (vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, DEPTH_STAGES),
        (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ];

    let mut stages = vk::PipelineStageFlags::empty();
    for (mask, stage) in table {
        if access.intersects(mask) {
            stages |= stage;
        }
    }
    if access.intersects(vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE) {
        stages |= vk::PipelineStageFlags::HOST;
    }

    debug_assert!(!stages.is_empty(), "unmapped access mask {:?}", access);
    stages
}

/// Aspect flags for a depth attachment format.
///
/// Combined depth/stencil formats must transition both aspects together;
/// depth-only formats must not name a stencil aspect at all.
pub fn depth_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// One barrier derived from a tracked state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierTransition {
    /// Previous layout
    pub old_layout: vk::ImageLayout,
    /// Requested layout
    pub new_layout: vk::ImageLayout,
    /// Accesses to make available
    pub src_access: vk::AccessFlags,
    /// Accesses to make visible
    pub dst_access: vk::AccessFlags,
    /// Stages that must complete before the barrier
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait on the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

/// Tracked (layout, access) state of an image.
///
/// The tracked pair must always reflect the last transition recorded on the
/// command stream that executes before any dependent command; stale tracking
/// is undefined GPU behavior. Transitioning one image from two logical
/// threads therefore requires external serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTracker {
    /// Current image layout
    pub layout: vk::ImageLayout,
    /// Current access scope
    pub access: vk::AccessFlags,
}

impl Default for LayoutTracker {
    fn default() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
        }
    }
}

impl LayoutTracker {
    /// Compute the barrier for a transition and advance the tracked state
    pub fn transition(
        &mut self,
        new_layout: vk::ImageLayout,
        new_access: vk::AccessFlags,
    ) -> BarrierTransition {
        let barrier = BarrierTransition {
            old_layout: self.layout,
            new_layout,
            src_access: self.access,
            dst_access: new_access,
            src_stage: access_stage_mask(self.access),
            dst_stage: access_stage_mask(new_access),
        };
        self.layout = new_layout;
        self.access = new_access;
        barrier
    }
}

/// Record a layout transition for a raw image handle.
///
/// Used for swapchain images, which the engine does not own and therefore
/// does not wrap in an [`ImageResource`].
pub fn cmd_image_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        });

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            access_stage_mask(src_access),
            access_stage_mask(dst_access),
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

/// Declarative description of an image resource.
///
/// Comparing the spec lists produced before and after a resize is how the
/// recreation path asserts it rebuilt structurally identical resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// Array layer count
    pub layers: u32,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Pixel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// View aspect
    pub aspect: vk::ImageAspectFlags,
}

impl ImageSpec {
    /// A single-mip, single-layer 2D color or depth target
    pub fn render_target(
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            mip_levels: 1,
            layers: 1,
            samples,
            format,
            usage,
            aspect,
        }
    }
}

/// An image, its memory and its view, with tracked layout/access state
pub struct ImageResource {
    device: Device,
    /// Image handle
    pub image: vk::Image,
    /// View over the full mip/layer range (null until [`Self::create_view`])
    pub view: vk::ImageView,
    memory: vk::DeviceMemory,
    /// Creation parameters
    pub spec: ImageSpec,
    tracker: LayoutTracker,
    // Swapchain images belong to the presentation engine
    owns_image: bool,
}

impl ImageResource {
    /// Create an unbacked image resource; call [`Self::create_image`],
    /// [`Self::bind_memory`] and [`Self::create_view`] to finish it.
    pub fn new(device: Device, spec: ImageSpec) -> Self {
        Self {
            device,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            memory: vk::DeviceMemory::null(),
            spec,
            tracker: LayoutTracker::default(),
            owns_image: true,
        }
    }

    /// Wrap a swapchain image. Only the view is owned.
    pub fn from_swapchain_image(device: Device, image: vk::Image, format: vk::Format) -> Self {
        Self {
            device,
            image,
            view: vk::ImageView::null(),
            memory: vk::DeviceMemory::null(),
            spec: ImageSpec {
                width: 0,
                height: 0,
                mip_levels: 1,
                layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                format,
                usage: vk::ImageUsageFlags::empty(),
                aspect: vk::ImageAspectFlags::COLOR,
            },
            tracker: LayoutTracker::default(),
            owns_image: false,
        }
    }

    /// Allocate the image object. Fatal on driver rejection.
    pub fn create_image(&mut self) -> VulkanResult<()> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: self.spec.width,
                height: self.spec.height,
                depth: 1,
            })
            .mip_levels(self.spec.mip_levels)
            .array_layers(self.spec.layers)
            .format(self.spec.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(self.spec.usage)
            .samples(self.spec.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        self.image = unsafe {
            self.device
                .create_image(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(())
    }

    /// Memory requirements of the created image
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(self.image) }
    }

    /// Bind device memory of the given size and type
    pub fn bind_memory(
        &mut self,
        allocation_size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VulkanResult<()> {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(allocation_size)
            .memory_type_index(memory_type_index);

        self.memory = unsafe {
            self.device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            self.device
                .bind_image_memory(self.image, self.memory, 0)
                .map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    /// Create a 2D view over the full mip/layer range
    pub fn create_view(&mut self) -> VulkanResult<()> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.spec.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.spec.aspect,
                base_mip_level: 0,
                level_count: self.spec.mip_levels,
                base_array_layer: 0,
                layer_count: self.spec.layers,
            });

        self.view = unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(())
    }

    /// Currently tracked layout
    pub fn current_layout(&self) -> vk::ImageLayout {
        self.tracker.layout
    }

    /// Currently tracked access scope
    pub fn current_access(&self) -> vk::AccessFlags {
        self.tracker.access
    }

    /// Record a barrier moving the image from its tracked layout/access to
    /// the requested ones, then update the tracked state.
    ///
    /// `range` defaults to the full resource.
    pub fn cmd_transition_layout(
        &mut self,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
        new_access: vk::AccessFlags,
        range: Option<vk::ImageSubresourceRange>,
    ) {
        let transition = self.tracker.transition(new_layout, new_access);
        let range = range.unwrap_or(vk::ImageSubresourceRange {
            aspect_mask: self.spec.aspect,
            base_mip_level: 0,
            level_count: self.spec.mip_levels,
            base_array_layer: 0,
            layer_count: self.spec.layers,
        });

        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .old_layout(transition.old_layout)
            .new_layout(transition.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(range);

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
    }

    /// Overwrite the tracked state without emitting a barrier.
    ///
    /// Used when a render pass performed the transition through its
    /// attachment final layout.
    pub fn set_tracked_state(&mut self, layout: vk::ImageLayout, access: vk::AccessFlags) {
        self.tracker = LayoutTracker { layout, access };
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            if self.owns_image {
                if self.image != vk::Image::null() {
                    self.device.destroy_image(self.image, None);
                }
                if self.memory != vk::DeviceMemory::null() {
                    self.device.free_memory(self.memory, None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reflects_last_transition() {
        let mut tracker = LayoutTracker::default();
        let sequence = [
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
            ),
            (
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::SHADER_READ,
            ),
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            (
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
            ),
        ];

        for (layout, access) in sequence {
            tracker.transition(layout, access);
            assert_eq!(tracker.layout, layout);
            assert_eq!(tracker.access, access);
        }
    }

    #[test]
    fn barriers_chain_old_state_to_new() {
        let mut tracker = LayoutTracker::default();
        let first = tracker.transition(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.src_access, vk::AccessFlags::empty());
        assert_eq!(first.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let second = tracker.transition(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
        );
        assert_eq!(second.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(second.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            second.src_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn stencil_rides_along_on_combined_formats() {
        assert_eq!(
            depth_aspect_mask(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth_aspect_mask(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn access_table_covers_frame_masks() {
        assert_eq!(
            access_stage_mask(vk::AccessFlags::empty()),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
        assert_eq!(
            access_stage_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        );
        assert_eq!(
            access_stage_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ),
            vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        assert_eq!(
            access_stage_mask(
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            ),
            vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }
}
