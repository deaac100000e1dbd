//! Sampled texture upload and samplers
//!
//! Textures are uploaded through a staging buffer on the one-shot command
//! path, then optionally get a full mip chain generated by repeated linear
//! blits. Formats without linear-blit support are rejected; the engine has
//! no fallback conversion path.

use ash::{vk, Device};

use crate::render::assets::{HdrImage, TextureData};
use crate::render::vulkan::initialization::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::rendering::commands::CommandPool;
use crate::render::vulkan::resources::buffer::Buffer;
use crate::render::vulkan::resources::image::{ImageResource, ImageSpec};

/// Mip chain length for a base extent
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// A sampled texture: image resource plus its mip level count
pub struct Texture {
    /// The backing image (SHADER_READ_ONLY after upload)
    pub image: ImageResource,
    /// Number of mip levels
    pub mip_levels: u32,
}

impl Texture {
    /// Upload an 8-bit RGBA texture, generating mips when asked to
    pub fn from_rgba8(
        context: &VulkanContext,
        command_pool: &CommandPool,
        data: &TextureData,
    ) -> VulkanResult<Self> {
        Self::upload(
            context,
            command_pool,
            data.width,
            data.height,
            &data.pixels,
            vk::Format::R8G8B8A8_SRGB,
            data.mipmapped,
        )
    }

    /// Upload the 32-bit float RGBA environment map with a full mip chain
    pub fn from_hdr(
        context: &VulkanContext,
        command_pool: &CommandPool,
        data: &HdrImage,
    ) -> VulkanResult<Self> {
        Self::upload(
            context,
            command_pool,
            data.width,
            data.height,
            bytemuck::cast_slice(&data.pixels),
            vk::Format::R32G32B32A32_SFLOAT,
            true,
        )
    }

    fn upload(
        context: &VulkanContext,
        command_pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        format: vk::Format,
        mipmapped: bool,
    ) -> VulkanResult<Self> {
        let mip_levels = if mipmapped {
            mip_level_count(width, height)
        } else {
            1
        };

        let staging = Buffer::new(
            context,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(pixels)?;

        let mut image = ImageResource::new(
            context.raw_device(),
            ImageSpec {
                width,
                height,
                mip_levels,
                layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                format,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        );
        image.create_image()?;
        let requirements = image.memory_requirements();
        let memory_type = context.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        image.bind_memory(requirements.size, memory_type)?;

        let device = context.raw_device();
        command_pool.submit_one_shot(context.graphics_queue(), |cmd| {
            image.cmd_transition_layout(
                cmd,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                None,
            );
            copy_buffer_to_image(&device, cmd, staging.buffer, image.image, width, height);
            if !mipmapped {
                image.cmd_transition_layout(
                    cmd,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::SHADER_READ,
                    None,
                );
            }
        })?;

        if mipmapped {
            generate_mipmaps(context, command_pool, &mut image)?;
        }

        image.create_view()?;
        log::debug!(
            "Uploaded {}x{} texture ({:?}, {} mips)",
            width,
            height,
            format,
            mip_levels
        );

        Ok(Self { image, mip_levels })
    }
}

fn copy_buffer_to_image(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });

    unsafe {
        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region.build()],
        );
    }
}

/// Fill the mip chain by blitting each level from the one above it.
///
/// Expects the image in TRANSFER_DST_OPTIMAL with level 0 filled; leaves
/// every level in SHADER_READ_ONLY_OPTIMAL.
fn generate_mipmaps(
    context: &VulkanContext,
    command_pool: &CommandPool,
    image: &mut ImageResource,
) -> VulkanResult<()> {
    let format = image.spec.format;
    let format_properties = unsafe {
        context
            .instance
            .instance
            .get_physical_device_format_properties(context.physical_device.device, format)
    };
    if !format_properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        return Err(VulkanError::UnsupportedFormat(format!(
            "{:?} does not support linear blitting for mip generation",
            format
        )));
    }

    let device = context.raw_device();
    let mip_levels = image.spec.mip_levels;
    let handle = image.image;

    command_pool.submit_one_shot(context.graphics_queue(), |cmd| {
        let mut barrier = vk::ImageMemoryBarrier::builder()
            .image(handle)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();

        let mut mip_width = image.spec.width as i32;
        let mut mip_height = image.spec.height as i32;

        for level in 1..mip_levels {
            barrier.subresource_range.base_mip_level = level - 1;
            barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
            barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }

            let blit = vk::ImageBlit {
                src_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ],
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: (mip_width / 2).max(1),
                        y: (mip_height / 2).max(1),
                        z: 1,
                    },
                ],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            };
            unsafe {
                device.cmd_blit_image(
                    cmd,
                    handle,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }

            barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
            barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }

            mip_width = (mip_width / 2).max(1);
            mip_height = (mip_height / 2).max(1);
        }

        // The last level was only ever a blit destination
        barrier.subresource_range.base_mip_level = mip_levels - 1;
        barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
        barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    })?;

    image.set_tracked_state(
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::SHADER_READ,
    );
    Ok(())
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler.
    ///
    /// `nearest` selects point filtering (directional/flow maps);
    /// `clamp` selects clamp-to-edge addressing (environment maps).
    pub fn new(
        context: &VulkanContext,
        mip_levels: u32,
        nearest: bool,
        clamp: bool,
    ) -> VulkanResult<Self> {
        let filter = if nearest {
            vk::Filter::NEAREST
        } else {
            vk::Filter::LINEAR
        };
        let address_mode = if clamp {
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        } else {
            vk::SamplerAddressMode::REPEAT
        };
        let max_anisotropy = context
            .physical_device
            .properties
            .limits
            .max_sampler_anisotropy;

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        let sampler = unsafe {
            context
                .raw_device()
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: context.raw_device(),
            sampler,
        })
    }

    /// Get the sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_lengths() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(3, 5), 3);
    }
}
