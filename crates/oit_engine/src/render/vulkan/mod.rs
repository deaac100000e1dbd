//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules,
//! with the frame orchestrator on top.

/// Vulkan initialization types (context, window)
pub mod initialization;

/// Vulkan resource management (images, buffers, textures, descriptors)
pub mod resources;

/// Vulkan rendering operations (render passes, pipelines, commands, overlay)
pub mod rendering;

/// Vulkan state management (swapchain, synchronization)
pub mod state;

/// Scene pass suite (opaque pass, offscreen targets, resolve/blit)
pub mod passes;

/// Weighted blended order-independent transparency pass
pub mod wboit;

/// Frame orchestrator
pub mod renderer;

pub use initialization::context::{
    LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult,
};
pub use initialization::window::Window;

pub use resources::buffer::{Buffer, MeshBuffer, UniformBuffer};
pub use resources::descriptor::{BindingResource, DescriptorBindingSet};
pub use resources::image::{access_stage_mask, depth_aspect_mask, ImageResource, LayoutTracker};
pub use resources::texture::{Sampler, Texture};

pub use rendering::commands::CommandPool;
pub use rendering::overlay::{OverlayBackend, OverlayPainter, OverlayState};
pub use rendering::pipeline::{Pipeline, PipelineParams, ShaderModule};
pub use rendering::render_pass::{AttachmentRole, RenderPass, RenderPassBuilder};

pub use state::swapchain::Swapchain;
pub use state::sync::{Fence, FrameSchedule, FrameSync, Semaphore, MAX_FRAMES_IN_FLIGHT};

pub use renderer::Renderer;
