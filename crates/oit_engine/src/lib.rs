//! # OIT Engine
//!
//! A real-time Vulkan rendering engine built around weighted blended
//! order-independent transparency (WBOIT).
//!
//! The engine drives a windowed graphics device through a fixed per-frame
//! pass sequence: an opaque scene pass, a two-subpass transparency pass that
//! accumulates weighted colors and a reveal factor, a resolve/blit to the
//! swapchain image, and an overlay pass. Double-buffered frame slots keep at
//! most two frames in flight, and the swapchain is recreated in place when
//! the surface resizes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oit_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     oit_engine::foundation::logging::init();
//!
//!     let config = RendererConfig::new("Viewer");
//!     let window = Window::new(&config)?;
//!     let assets = SceneAssets::default();
//!
//!     let mut renderer = Renderer::new(window, assets, &config)?;
//!     renderer.run_frame_loop(|_aspect, _camera, _overlay| {})?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Foundation utilities (logging)
pub mod foundation;

/// Renderer configuration
pub mod config;

/// Rendering system: assets, primitives and the Vulkan backend
pub mod render;

pub use config::{ConfigError, RendererConfig};

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::RendererConfig;
    pub use crate::render::assets::{HdrImage, SceneAssets, TextureData};
    pub use crate::render::primitives::{CameraState, Mesh, Vertex};
    pub use crate::render::vulkan::{
        OverlayState, Renderer, VulkanError, VulkanResult, Window,
    };
}
