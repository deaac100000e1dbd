//! Vulkan resource management

pub mod buffer;
pub mod descriptor;
pub mod image;
pub mod texture;
