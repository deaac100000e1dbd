//! Descriptor binding sets
//!
//! One descriptor set layout shared by every pipeline, instantiated once per
//! in-flight frame. The set is declared with a binding budget up front;
//! registering fewer (or more) bindings than declared is a configuration
//! error caught before any device call, so a silently dropped texture cannot
//! make it into a frame.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};

/// The resource bound at one binding index.
///
/// An exhaustive match at write time replaces the original's runtime
/// type-code dispatch.
#[derive(Debug, Clone)]
pub enum BindingResource {
    /// A uniform buffer, one handle per in-flight frame
    UniformBuffer {
        /// Buffer handles, length must equal the frame count at `create`
        buffers: Vec<vk::Buffer>,
        /// Bound range in bytes
        range: vk::DeviceSize,
    },
    /// A sampled texture
    SampledImage {
        /// View in SHADER_READ_ONLY_OPTIMAL
        view: vk::ImageView,
        /// Sampler to bind with
        sampler: vk::Sampler,
    },
    /// A subpass input attachment
    InputAttachment {
        /// View in SHADER_READ_ONLY_OPTIMAL while read
        view: vk::ImageView,
    },
}

impl BindingResource {
    fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            Self::SampledImage { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::InputAttachment { .. } => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

struct DeclaredBinding {
    index: u32,
    stage_flags: vk::ShaderStageFlags,
    resource: BindingResource,
}

/// Declared binding budget, by descriptor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingBudget {
    /// Number of uniform buffer bindings
    pub uniform_buffers: u32,
    /// Number of combined image sampler bindings
    pub sampled_images: u32,
    /// Number of input attachment bindings
    pub input_attachments: u32,
}

impl BindingBudget {
    /// Total declared bindings
    pub fn total(&self) -> u32 {
        self.uniform_buffers + self.sampled_images + self.input_attachments
    }
}

/// A budgeted descriptor set: pool, layout and one set per in-flight frame.
///
/// The device is only handed over at [`Self::create`]; everything before
/// that point is plain bookkeeping.
pub struct DescriptorBindingSet {
    device: Option<Device>,
    budget: BindingBudget,
    bindings: Vec<DeclaredBinding>,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorBindingSet {
    /// Start an empty set with a declared budget
    pub fn new(budget: BindingBudget) -> Self {
        Self {
            device: None,
            budget,
            bindings: Vec::new(),
            pool: vk::DescriptorPool::null(),
            layout: vk::DescriptorSetLayout::null(),
            sets: Vec::new(),
        }
    }

    /// Register one binding
    pub fn add_binding(
        &mut self,
        index: u32,
        stage_flags: vk::ShaderStageFlags,
        resource: BindingResource,
    ) {
        self.bindings.push(DeclaredBinding {
            index,
            stage_flags,
            resource,
        });
    }

    /// Check the registered bindings against the declared budget.
    ///
    /// Pure; runs before any device object is created.
    pub fn validate(&self, frames_in_flight: usize) -> VulkanResult<()> {
        let mut counts = BindingBudget {
            uniform_buffers: 0,
            sampled_images: 0,
            input_attachments: 0,
        };
        for binding in &self.bindings {
            match &binding.resource {
                BindingResource::UniformBuffer { buffers, .. } => {
                    counts.uniform_buffers += 1;
                    if buffers.len() != frames_in_flight {
                        return Err(VulkanError::Configuration(format!(
                            "binding {} has {} uniform buffers for {} frames in flight",
                            binding.index,
                            buffers.len(),
                            frames_in_flight
                        )));
                    }
                }
                BindingResource::SampledImage { .. } => counts.sampled_images += 1,
                BindingResource::InputAttachment { .. } => counts.input_attachments += 1,
            }
        }

        if counts != self.budget {
            return Err(VulkanError::Configuration(format!(
                "registered bindings {:?} do not match the declared budget {:?}",
                counts, self.budget
            )));
        }
        Ok(())
    }

    /// Allocate the pool, layout and per-frame sets and write every binding
    /// for every frame.
    ///
    /// The pool is sized from the budget with headroom so re-creation on
    /// resize cannot exhaust it.
    pub fn create(&mut self, device: Device, frames_in_flight: usize) -> VulkanResult<()> {
        self.validate(frames_in_flight)?;
        let frames = frames_in_flight as u32;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: (frames * self.budget.uniform_buffers).max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: (frames * self.budget.sampled_images).max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count: (frames * self.budget.input_attachments).max(1),
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(frames);
        self.pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.index)
                    .descriptor_type(binding.resource.descriptor_type())
                    .descriptor_count(1)
                    .stage_flags(binding.stage_flags)
                    .build()
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&layout_bindings);
        self.layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let layouts = vec![self.layout; frames_in_flight];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        self.sets = unsafe {
            device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        self.write_all(&device, frames_in_flight);
        self.device = Some(device);
        Ok(())
    }

    fn write_all(&self, device: &Device, frames_in_flight: usize) {
        // Info structs must outlive the update call, so collect them first.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut writes: Vec<(usize, u32, vk::DescriptorType, bool, usize)> = Vec::new();

        for frame in 0..frames_in_flight {
            for binding in &self.bindings {
                match &binding.resource {
                    BindingResource::UniformBuffer { buffers, range } => {
                        buffer_infos.push(vk::DescriptorBufferInfo {
                            buffer: buffers[frame],
                            offset: 0,
                            range: *range,
                        });
                        writes.push((
                            frame,
                            binding.index,
                            vk::DescriptorType::UNIFORM_BUFFER,
                            true,
                            buffer_infos.len() - 1,
                        ));
                    }
                    BindingResource::SampledImage { view, sampler } => {
                        image_infos.push(vk::DescriptorImageInfo {
                            sampler: *sampler,
                            image_view: *view,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        });
                        writes.push((
                            frame,
                            binding.index,
                            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                            false,
                            image_infos.len() - 1,
                        ));
                    }
                    BindingResource::InputAttachment { view } => {
                        image_infos.push(vk::DescriptorImageInfo {
                            sampler: vk::Sampler::null(),
                            image_view: *view,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        });
                        writes.push((
                            frame,
                            binding.index,
                            vk::DescriptorType::INPUT_ATTACHMENT,
                            false,
                            image_infos.len() - 1,
                        ));
                    }
                }
            }
        }

        let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|&(frame, index, ty, is_buffer, info_index)| {
                let mut write = vk::WriteDescriptorSet::builder()
                    .dst_set(self.sets[frame])
                    .dst_binding(index)
                    .dst_array_element(0)
                    .descriptor_type(ty);
                if is_buffer {
                    write = write
                        .buffer_info(std::slice::from_ref(&buffer_infos[info_index]));
                } else {
                    write = write.image_info(std::slice::from_ref(&image_infos[info_index]));
                }
                write.build()
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&descriptor_writes, &[]);
        }
    }

    /// Layout handle for pipeline creation
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Descriptor set for one frame slot
    pub fn set(&self, frame: usize) -> vk::DescriptorSet {
        self.sets[frame]
    }
}

impl Drop for DescriptorBindingSet {
    fn drop(&mut self) {
        let Some(device) = &self.device else {
            // create() never ran, nothing was allocated
            return;
        };
        unsafe {
            if self.pool != vk::DescriptorPool::null() {
                device.destroy_descriptor_pool(self.pool, None);
            }
            if self.layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.layout, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_for(bindings: &[BindingResource]) -> BindingBudget {
        let mut counts = BindingBudget {
            uniform_buffers: 0,
            sampled_images: 0,
            input_attachments: 0,
        };
        for resource in bindings {
            match resource {
                BindingResource::UniformBuffer { .. } => counts.uniform_buffers += 1,
                BindingResource::SampledImage { .. } => counts.sampled_images += 1,
                BindingResource::InputAttachment { .. } => counts.input_attachments += 1,
            }
        }
        counts
    }

    // validate() never touches the device, so these tests run without a GPU.
    #[test]
    fn under_registered_bindings_fail_validation() {
        let mut set = DescriptorBindingSet::new(BindingBudget {
            uniform_buffers: 1,
            sampled_images: 1,
            input_attachments: 2,
        });
        set.add_binding(
            0,
            vk::ShaderStageFlags::VERTEX,
            BindingResource::UniformBuffer {
                buffers: vec![vk::Buffer::null(); 2],
                range: 256,
            },
        );

        match set.validate(2) {
            Err(VulkanError::Configuration(_)) => {}
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn full_budget_passes_validation() {
        let mut set = DescriptorBindingSet::new(BindingBudget {
            uniform_buffers: 1,
            sampled_images: 1,
            input_attachments: 2,
        });
        set.add_binding(
            0,
            vk::ShaderStageFlags::VERTEX,
            BindingResource::UniformBuffer {
                buffers: vec![vk::Buffer::null(); 2],
                range: 256,
            },
        );
        set.add_binding(
            1,
            vk::ShaderStageFlags::FRAGMENT,
            BindingResource::InputAttachment {
                view: vk::ImageView::null(),
            },
        );
        set.add_binding(
            2,
            vk::ShaderStageFlags::FRAGMENT,
            BindingResource::InputAttachment {
                view: vk::ImageView::null(),
            },
        );
        set.add_binding(
            3,
            vk::ShaderStageFlags::FRAGMENT,
            BindingResource::SampledImage {
                view: vk::ImageView::null(),
                sampler: vk::Sampler::null(),
            },
        );

        assert!(set.validate(2).is_ok());

        let registered = counts_for(&[
            BindingResource::UniformBuffer {
                buffers: vec![],
                range: 0,
            },
            BindingResource::InputAttachment {
                view: vk::ImageView::null(),
            },
            BindingResource::InputAttachment {
                view: vk::ImageView::null(),
            },
            BindingResource::SampledImage {
                view: vk::ImageView::null(),
                sampler: vk::Sampler::null(),
            },
        ]);
        assert_eq!(registered.total(), 4);
    }

    #[test]
    fn per_frame_buffer_count_is_checked() {
        let mut set = DescriptorBindingSet::new(BindingBudget {
            uniform_buffers: 1,
            sampled_images: 0,
            input_attachments: 0,
        });
        set.add_binding(
            0,
            vk::ShaderStageFlags::VERTEX,
            BindingResource::UniformBuffer {
                buffers: vec![vk::Buffer::null(); 1],
                range: 256,
            },
        );

        assert!(matches!(
            set.validate(2),
            Err(VulkanError::Configuration(_))
        ));
    }
}
