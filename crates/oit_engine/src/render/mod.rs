//! Rendering system
//!
//! `assets` and `primitives` define the data handed to the engine by the
//! application; `vulkan` contains the backend that turns them into frames.

/// Input asset bundle (shader binaries, meshes, textures, environment map)
pub mod assets;

/// Geometry and camera primitives
pub mod primitives;

/// Vulkan backend
pub mod vulkan;

pub use assets::{HdrImage, SceneAssets, TextureData};
pub use primitives::{CameraState, Mesh, Vertex};
pub use vulkan::{OverlayPainter, OverlayState, Renderer, VulkanError, VulkanResult, Window};
