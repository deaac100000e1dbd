//! Vulkan state management: swapchain and frame synchronization

pub mod swapchain;
pub mod sync;
