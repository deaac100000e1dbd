//! The frame orchestrator
//!
//! [`Renderer`] owns the swapchain, the per-slot sync objects and every GPU
//! resource built from the scene assets, and drives the fixed pass sequence
//! each frame: opaque scene, weighted-blended transparency when enabled,
//! resolve/blit to the acquired swapchain image, overlay, present.
//!
//! Per frame slot the orchestrator moves through acquire, record, submit
//! and present. The only blocking points on the CPU are the slot's fence
//! wait before its command buffer is reused and the device-idle wait during
//! swapchain recreation. Surface loss (out-of-date, suboptimal, an external
//! resize notification) is absorbed by rebuilding the swapchain-bound
//! resources in dependency order; every other submission or presentation
//! error is fatal.

use std::collections::HashMap;

use ash::vk;

use crate::config::{PresentPreference, RendererConfig};
use crate::render::assets::SceneAssets;
use crate::render::primitives::{CameraState, CameraUniform};
use crate::render::vulkan::initialization::context::{
    VulkanContext, VulkanError, VulkanResult,
};
use crate::render::vulkan::initialization::window::Window;
use crate::render::vulkan::passes::{
    self, FrameStep, FrameTargets, PassFramebuffers, PassSuite,
};
use crate::render::vulkan::rendering::commands::CommandPool;
use crate::render::vulkan::rendering::overlay::{OverlayBackend, OverlayPainter, OverlayState};
use crate::render::vulkan::rendering::pipeline::Pipeline;
use crate::render::vulkan::resources::buffer::{MeshBuffer, UniformBuffer};
use crate::render::vulkan::resources::descriptor::{
    BindingBudget, BindingResource, DescriptorBindingSet,
};
use crate::render::vulkan::resources::texture::{Sampler, Texture};
use crate::render::vulkan::state::swapchain::{AcquiredImage, Swapchain};
use crate::render::vulkan::state::sync::{FrameSchedule, FrameSync, MAX_FRAMES_IN_FLIGHT};
use crate::render::vulkan::wboit;

/// Binding index of the per-frame camera uniform buffer
pub const BIND_CAMERA_UBO: u32 = 0;
/// Binding index of the weighted color input attachment
pub const BIND_WBOIT_COLOR: u32 = 1;
/// Binding index of the reveal input attachment
pub const BIND_WBOIT_REVEAL: u32 = 2;
/// First binding index of the sampled textures; the environment map takes
/// the index after the last texture
pub const BIND_TEXTURE_BASE: u32 = 3;

/// Device-local vertex and index buffers for one mesh
struct GpuMesh {
    vertices: MeshBuffer,
    indices: MeshBuffer,
}

/// An uploaded scene texture and its sampling mode
struct SceneTexture {
    texture: Texture,
    /// Point sampling for non-mipmapped directional/flow maps
    nearest: bool,
}

struct TextureSamplers {
    linear: Sampler,
    nearest: Sampler,
    environment: Sampler,
}

/// Resources bound to one swapchain configuration, rebuilt on resize.
///
/// Declaration order is destruction order: framebuffers release their view
/// references before the descriptor set, which in turn goes before the
/// images both of them pointed at.
struct SwapchainBound {
    framebuffers: PassFramebuffers,
    descriptor: DescriptorBindingSet,
    targets: FrameTargets,
}

/// Stable upload/binding order for the named textures
fn sorted_texture_names(textures: &HashMap<String, crate::render::assets::TextureData>) -> Vec<String> {
    let mut names: Vec<String> = textures.keys().cloned().collect();
    names.sort();
    names
}

/// The renderer and frame loop.
///
/// Field declaration order encodes the teardown order: samplers, sampled
/// images, per-frame buffers, swapchain-bound resources, pipelines and
/// render passes, the swapchain, sync objects, the command pool, and
/// finally the context (device, then surface, then instance).
pub struct Renderer {
    schedule: FrameSchedule,
    camera: CameraState,
    clear_color: [f32; 4],
    present_preference: PresentPreference,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    command_buffers: Vec<vk::CommandBuffer>,

    samplers: TextureSamplers,
    textures: Vec<SceneTexture>,
    environment: Texture,
    meshes: HashMap<String, GpuMesh>,
    uniform: UniformBuffer,
    bound: SwapchainBound,
    overlay: OverlayBackend,
    passes: PassSuite,
    swapchain: Swapchain,
    frame_sync: Vec<FrameSync>,
    command_pool: CommandPool,
    context: VulkanContext,
    window: Window,
}

impl Renderer {
    /// Build every GPU resource from the decoded scene assets and prepare
    /// the first frame. Creation failures are fatal; they indicate a device
    /// or asset-pipeline problem, not a runtime condition.
    pub fn new(
        window: Window,
        assets: SceneAssets,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let context = VulkanContext::new(&window, config)?;
        let samples = context.scene_sample_count(config);
        let depth_format = passes::find_depth_format(&context)?;
        log::info!(
            "Scene passes: {:?} samples, {:?} depth",
            samples,
            depth_format
        );

        let command_pool = CommandPool::new(context.raw_device(), context.device.graphics_family)?;
        let swapchain = Swapchain::new(
            &context,
            window.framebuffer_extent(),
            config.present_preference,
        )?;

        let mut meshes = HashMap::new();
        for (name, mesh) in &assets.meshes {
            let vertices = MeshBuffer::vertex(&context, &command_pool, &mesh.vertices)?;
            let indices = MeshBuffer::index(&context, &command_pool, &mesh.indices)?;
            meshes.insert(name.clone(), GpuMesh { vertices, indices });
        }
        for required in [SceneAssets::OPAQUE_MESH, SceneAssets::TRANSPARENT_MESH] {
            if !meshes.contains_key(required) {
                return Err(VulkanError::MissingAsset(format!("mesh \"{}\"", required)));
            }
        }

        let mut textures = Vec::new();
        for name in sorted_texture_names(&assets.textures) {
            let data = &assets.textures[&name];
            let texture = Texture::from_rgba8(&context, &command_pool, data)?;
            textures.push(SceneTexture {
                texture,
                nearest: !data.mipmapped,
            });
        }
        if assets.environment.width == 0 || assets.environment.height == 0 {
            return Err(VulkanError::MissingAsset("environment map".to_string()));
        }
        let environment = Texture::from_hdr(&context, &command_pool, &assets.environment)?;

        let max_texture_mips = textures
            .iter()
            .map(|t| t.texture.mip_levels)
            .max()
            .unwrap_or(1);
        let samplers = TextureSamplers {
            linear: Sampler::new(&context, max_texture_mips, false, false)?,
            nearest: Sampler::new(&context, 1, true, false)?,
            environment: Sampler::new(&context, environment.mip_levels, false, true)?,
        };

        let uniform = UniformBuffer::new(
            &context,
            std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
            MAX_FRAMES_IN_FLIGHT,
        )?;

        let targets = FrameTargets::new(
            &context,
            &command_pool,
            swapchain.extent(),
            samples,
            depth_format,
        )?;
        let descriptor =
            build_descriptor(&context, &targets, &textures, &environment, &samplers, &uniform)?;
        let passes = PassSuite::new(
            context.raw_device(),
            descriptor.layout(),
            &assets,
            samples,
            depth_format,
        )?;
        let framebuffers = PassFramebuffers::new(
            context.raw_device(),
            &passes,
            &targets,
            swapchain.extent(),
        )?;

        let mut overlay = OverlayBackend::new(context.raw_device(), swapchain.format())?;
        overlay.create_swapchain_state(swapchain.views(), swapchain.extent())?;

        let frame_sync = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(context.raw_device()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let command_buffers = command_pool.allocate_primary(MAX_FRAMES_IN_FLIGHT as u32)?;

        Ok(Self {
            schedule: FrameSchedule::new(),
            camera: CameraState::default(),
            clear_color: config.clear_color,
            present_preference: config.present_preference,
            samples,
            depth_format,
            command_buffers,
            samplers,
            textures,
            environment,
            meshes,
            uniform,
            bound: SwapchainBound {
                framebuffers,
                descriptor,
                targets,
            },
            overlay,
            passes,
            swapchain,
            frame_sync,
            command_pool,
            context,
            window,
        })
    }

    /// Install the overlay widget painter
    pub fn set_overlay_painter(&mut self, painter: OverlayPainter) {
        self.overlay.set_painter(painter);
    }

    /// Current overlay state
    pub fn overlay_state(&self) -> OverlayState {
        self.overlay.state()
    }

    /// Replace the camera state used for the next frame
    pub fn set_camera(&mut self, camera: CameraState) {
        self.camera = camera;
    }

    /// Poll events, update and draw until the window asks to close.
    ///
    /// `update` runs once per frame with the surface aspect ratio, the
    /// camera state and the overlay state.
    pub fn run_frame_loop<F>(&mut self, mut update: F) -> VulkanResult<()>
    where
        F: FnMut(f32, &mut CameraState, &mut OverlayState),
    {
        while !self.window.should_close() {
            self.window.poll_events();
            let extent = self.swapchain.extent();
            let aspect = extent.width as f32 / extent.height.max(1) as f32;
            update(aspect, &mut self.camera, self.overlay.state_mut());
            self.draw_frame()?;
        }
        self.context.wait_idle()
    }

    /// Record, submit and present one frame on the current slot.
    ///
    /// Out-of-date surfaces (at acquire or present) and a pending window
    /// resize trigger swapchain recreation and are never errors.
    pub fn draw_frame(&mut self) -> VulkanResult<()> {
        let slot = self.schedule.current();
        // The slot's previous frame must be off the GPU before its command
        // buffer and uniform slice are touched again
        self.frame_sync[slot].in_flight.wait(u64::MAX)?;

        let acquired = self
            .swapchain
            .acquire(self.frame_sync[slot].image_available.handle())?;
        let image_index = match acquired {
            AcquiredImage::Ready { index } => index,
            AcquiredImage::OutOfDate => {
                self.recreate_swapchain()?;
                return Ok(());
            }
        };

        self.frame_sync[slot].in_flight.reset()?;
        let command_buffer = self.command_buffers[slot];
        let device = self.context.raw_device();
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }

        self.uniform.write(slot, &CameraUniform::from(&self.camera));
        self.record_frame(command_buffer, image_index as usize, slot)?;

        let wait_semaphores = [self.frame_sync[slot].image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit_buffers = [command_buffer];
        let signal_semaphores = [self.frame_sync[slot].render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&submit_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            device
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info.build()],
                    self.frame_sync[slot].in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let needs_recreate = self.swapchain.present(
            self.context.present_queue(),
            self.frame_sync[slot].render_finished.handle(),
            image_index,
        )?;
        self.schedule.advance();

        if needs_recreate || self.window.take_resized() {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Re-record the slot's command buffer by walking the pass sequence
    fn record_frame(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: usize,
        slot: usize,
    ) -> VulkanResult<()> {
        let device = self.context.raw_device();
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let swapchain_image = self.swapchain.images()[image_index];
        let swapchain_extent = self.swapchain.extent();
        let steps = passes::frame_sequence(self.overlay.state().transparency_enabled);
        for step in steps {
            match step {
                FrameStep::OpaquePass {
                    include_transparent_mesh,
                } => self.record_opaque_pass(command_buffer, slot, include_transparent_mesh),
                FrameStep::TransparencyPass => {
                    self.record_transparency_pass(command_buffer, slot)
                }
                FrameStep::ResolveBlit => passes::record_resolve_blit(
                    &device,
                    command_buffer,
                    &mut self.bound.targets,
                    swapchain_image,
                    swapchain_extent,
                    self.samples,
                ),
                FrameStep::OverlayPass => {
                    self.overlay.record(command_buffer, swapchain_image, image_index)
                }
            }
        }

        unsafe {
            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    fn record_opaque_pass(
        &mut self,
        command_buffer: vk::CommandBuffer,
        slot: usize,
        include_transparent_mesh: bool,
    ) {
        let device = self.context.raw_device();
        // Guard against the previous frame's blit read of the scene color
        self.bound.targets.scene_color.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            None,
        );
        // Tracked access must include the pass's depth writes so the next
        // barrier on this image flushes them
        self.bound.targets.depth.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            None,
        );

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let extent = self.bound.framebuffers.extent;
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.passes.opaque_pass.handle())
            .framebuffer(self.bound.framebuffers.opaque)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        passes::cmd_set_viewport_scissor(&device, command_buffer, extent);

        self.draw_mesh(
            command_buffer,
            slot,
            SceneAssets::OPAQUE_MESH,
            &self.passes.opaque_pipeline,
        );
        if include_transparent_mesh {
            self.draw_mesh(
                command_buffer,
                slot,
                SceneAssets::TRANSPARENT_MESH,
                &self.passes.hair_pipeline,
            );
        }

        unsafe {
            device.cmd_end_render_pass(command_buffer);
        }
    }

    fn record_transparency_pass(&mut self, command_buffer: vk::CommandBuffer, slot: usize) {
        let device = self.context.raw_device();
        // Same-layout barriers: the opaque pass's color and depth writes
        // must land before this pass LOADs them
        self.bound.targets.scene_color.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            None,
        );
        self.bound.targets.depth.cmd_transition_layout(
            command_buffer,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            None,
        );

        let clear_values = wboit::clear_values();
        let extent = self.bound.framebuffers.extent;
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.passes.transparency_pass.handle())
            .framebuffer(self.bound.framebuffers.transparency)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        passes::cmd_set_viewport_scissor(&device, command_buffer, extent);

        // Subpass 0: accumulate weighted color and reveal
        self.draw_mesh(
            command_buffer,
            slot,
            SceneAssets::TRANSPARENT_MESH,
            &self.passes.accumulation_pipeline,
        );

        // Subpass 1: composite with one procedural full-screen triangle
        unsafe {
            device.cmd_next_subpass(command_buffer, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.passes.composite_pipeline.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.passes.composite_pipeline.layout,
                0,
                &[self.bound.descriptor.set(slot)],
                &[],
            );
            device.cmd_draw(command_buffer, 3, 1, 0, 0);
            device.cmd_end_render_pass(command_buffer);
        }
    }

    /// Bind a mesh's buffers and the frame's descriptor set, then draw
    fn draw_mesh(
        &self,
        command_buffer: vk::CommandBuffer,
        slot: usize,
        name: &str,
        pipeline: &Pipeline,
    ) {
        let Some(mesh) = self.meshes.get(name) else {
            debug_assert!(false, "mesh \"{name}\" vanished after initialization");
            return;
        };
        let device = self.context.raw_device();
        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[mesh.vertices.buffer.buffer],
                &[0],
            );
            device.cmd_bind_index_buffer(
                command_buffer,
                mesh.indices.buffer.buffer,
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[self.bound.descriptor.set(slot)],
                &[],
            );
            device.cmd_draw_indexed(command_buffer, mesh.indices.count, 1, 0, 0, 0);
        }
    }

    /// Rebuild everything bound to the surface extent.
    ///
    /// Waits for a usable extent (a minimized window reports zero), idles
    /// the device, then rebuilds swapchain, offscreen images, descriptor
    /// set, framebuffers and overlay state in that dependency order. Render
    /// passes and pipelines survive: formats and sample counts are
    /// extent-independent and viewport state is dynamic.
    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let extent = self.window.wait_for_valid_extent();
        self.context.wait_idle()?;

        self.overlay.destroy_swapchain_state();
        self.swapchain
            .recreate(&self.context, extent, self.present_preference)?;

        let targets = FrameTargets::new(
            &self.context,
            &self.command_pool,
            self.swapchain.extent(),
            self.samples,
            self.depth_format,
        )?;
        let descriptor = build_descriptor(
            &self.context,
            &targets,
            &self.textures,
            &self.environment,
            &self.samplers,
            &self.uniform,
        )?;
        let framebuffers = PassFramebuffers::new(
            self.context.raw_device(),
            &self.passes,
            &targets,
            self.swapchain.extent(),
        )?;
        self.bound = SwapchainBound {
            framebuffers,
            descriptor,
            targets,
        };
        self.overlay
            .create_swapchain_state(self.swapchain.views(), self.swapchain.extent())?;

        log::info!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // In-flight frames may still reference every resource about to be
        // destroyed; the field drops below run only on an idle device
        let _ = self.context.wait_idle();
    }
}

/// Assemble the budgeted descriptor set for the current offscreen targets.
///
/// Binding order: camera UBO, the two transparency input attachments, the
/// sorted scene textures, then the environment map. The budget must match
/// exactly; [`DescriptorBindingSet::create`] rejects any drift.
fn build_descriptor(
    context: &VulkanContext,
    targets: &FrameTargets,
    textures: &[SceneTexture],
    environment: &Texture,
    samplers: &TextureSamplers,
    uniform: &UniformBuffer,
) -> VulkanResult<DescriptorBindingSet> {
    let budget = BindingBudget {
        uniform_buffers: 1,
        sampled_images: textures.len() as u32 + 1,
        input_attachments: 2,
    };
    let mut set = DescriptorBindingSet::new(budget);

    set.add_binding(
        BIND_CAMERA_UBO,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        BindingResource::UniformBuffer {
            buffers: uniform.handles(),
            range: uniform.range(),
        },
    );
    set.add_binding(
        BIND_WBOIT_COLOR,
        vk::ShaderStageFlags::FRAGMENT,
        BindingResource::InputAttachment {
            view: targets.weighted_color.view,
        },
    );
    set.add_binding(
        BIND_WBOIT_REVEAL,
        vk::ShaderStageFlags::FRAGMENT,
        BindingResource::InputAttachment {
            view: targets.reveal.view,
        },
    );
    for (offset, scene_texture) in textures.iter().enumerate() {
        let sampler = if scene_texture.nearest {
            &samplers.nearest
        } else {
            &samplers.linear
        };
        set.add_binding(
            BIND_TEXTURE_BASE + offset as u32,
            vk::ShaderStageFlags::FRAGMENT,
            BindingResource::SampledImage {
                view: scene_texture.texture.image.view,
                sampler: sampler.handle(),
            },
        );
    }
    set.add_binding(
        BIND_TEXTURE_BASE + textures.len() as u32,
        vk::ShaderStageFlags::FRAGMENT,
        BindingResource::SampledImage {
            view: environment.image.view,
            sampler: samplers.environment.handle(),
        },
    );

    set.create(context.raw_device(), MAX_FRAMES_IN_FLIGHT)?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::assets::TextureData;

    #[test]
    fn texture_binding_order_is_name_sorted() {
        let mut textures = HashMap::new();
        for name in ["skin", "hair-flow", "cloth"] {
            textures.insert(
                name.to_string(),
                TextureData {
                    width: 1,
                    height: 1,
                    pixels: vec![0; 4],
                    mipmapped: true,
                },
            );
        }

        let names = sorted_texture_names(&textures);
        assert_eq!(names, ["cloth", "hair-flow", "skin"]);
    }
}
