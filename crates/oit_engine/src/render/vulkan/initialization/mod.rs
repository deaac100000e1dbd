//! Vulkan initialization: instance, device selection and the window surface

pub mod context;
pub mod window;
