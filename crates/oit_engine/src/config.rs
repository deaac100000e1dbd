//! Renderer configuration
//!
//! Applications customize the renderer through [`RendererConfig`] instead of
//! hardcoding values in the rendering system itself. The configuration can be
//! built programmatically or loaded from a RON file.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Preferred presentation mode, mapped to the Vulkan equivalent at swapchain
/// creation. The device falls back to FIFO when the preference is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentPreference {
    /// Low-latency triple buffering (VK_PRESENT_MODE_MAILBOX_KHR)
    Mailbox,
    /// Vsync (VK_PRESENT_MODE_FIFO_KHR), always available
    Fifo,
}

/// Configuration for the Vulkan renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Initial window size in pixels
    pub window_extent: (u32, u32),
    /// Preferred presentation mode
    pub present_preference: PresentPreference,
    /// Whether to request device-max multisampling for the scene passes
    pub multisampling: bool,
    /// Whether to enable Vulkan validation layers (None = debug builds only)
    pub enable_validation: Option<bool>,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Directory the application loads SPIR-V shader binaries from
    pub shader_dir: String,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            window_extent: (1280, 720),
            present_preference: PresentPreference::Mailbox,
            multisampling: true,
            enable_validation: None,
            clear_color: [0.5, 0.5, 0.5, 1.0],
            shader_dir: "shaders".to_string(),
        }
    }

    /// Load configuration from a RON file
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set the initial window size
    pub fn with_window_extent(mut self, width: u32, height: u32) -> Self {
        self.window_extent = (width.max(1), height.max(1));
        self
    }

    /// Set background clear color [R, G, B, A] (0.0-1.0 range)
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable Vulkan validation layers
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Whether validation layers should be enabled for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("OIT Viewer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ron_round_trip() {
        let config = RendererConfig::new("roundtrip")
            .with_window_extent(640, 480)
            .with_validation(false);

        let text = ron::to_string(&config).unwrap();
        let parsed: RendererConfig = ron::from_str(&text).unwrap();

        assert_eq!(parsed.application_name, "roundtrip");
        assert_eq!(parsed.window_extent, (640, 480));
        assert_eq!(parsed.enable_validation, Some(false));
        assert_eq!(parsed.present_preference, PresentPreference::Mailbox);
    }

    #[test]
    fn window_extent_never_zero() {
        let config = RendererConfig::default().with_window_extent(0, 0);
        assert_eq!(config.window_extent, (1, 1));
    }
}
