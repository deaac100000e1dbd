//! Scene asset inputs
//!
//! The engine does not decode files. The application hands over named,
//! already-decoded assets at initialization: SPIR-V shader binaries, meshes,
//! 8-bit RGBA textures and one high-dynamic-range environment image.

use std::collections::HashMap;

use crate::render::primitives::Mesh;

/// A decoded 8-bit RGBA texture
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes
    pub pixels: Vec<u8>,
    /// Whether a full mip chain should be generated at upload time.
    /// Directional/flow maps are sampled with nearest filtering and keep a
    /// single mip level; averaging their texels would corrupt the encoded
    /// directions.
    pub mipmapped: bool,
}

/// A decoded high-dynamic-range environment image (RGBA, 32-bit float)
#[derive(Debug, Clone, Default)]
pub struct HdrImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA32F pixels, `width * height * 4` floats
    pub pixels: Vec<f32>,
}

/// Everything the renderer needs from the outside world, by name.
///
/// Mesh and texture names are chosen by the application; the renderer looks
/// up the conventional `"opaque-mesh"` / `"transparent-mesh"` entries when
/// recording the scene passes. Shader names are fixed (see
/// [`SceneAssets::REQUIRED_SHADERS`]).
#[derive(Debug, Clone, Default)]
pub struct SceneAssets {
    /// Named SPIR-V shader binaries
    pub shaders: HashMap<String, Vec<u8>>,
    /// Named meshes
    pub meshes: HashMap<String, Mesh>,
    /// Named RGBA8 textures
    pub textures: HashMap<String, TextureData>,
    /// The environment map
    pub environment: HdrImage,
}

impl SceneAssets {
    /// Shader binaries the pass suite expects to find in `shaders`
    pub const REQUIRED_SHADERS: [&'static str; 6] = [
        "scene_vert",
        "opaque_frag",
        "hair_frag",
        "wboit_accum_frag",
        "fullscreen_vert",
        "wboit_composite_frag",
    ];

    /// Name of the mesh drawn by the opaque pass
    pub const OPAQUE_MESH: &'static str = "opaque-mesh";

    /// Name of the mesh drawn by the transparency passes
    pub const TRANSPARENT_MESH: &'static str = "transparent-mesh";

    /// Names of shader binaries that are required but missing
    pub fn missing_shaders(&self) -> Vec<&'static str> {
        Self::REQUIRED_SHADERS
            .iter()
            .copied()
            .filter(|name| !self.shaders.contains_key(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shaders_reports_gaps() {
        let mut assets = SceneAssets::default();
        assets
            .shaders
            .insert("scene_vert".to_string(), vec![0u8; 8]);

        let missing = assets.missing_shaders();
        assert!(!missing.contains(&"scene_vert"));
        assert!(missing.contains(&"wboit_composite_frag"));
        assert_eq!(missing.len(), SceneAssets::REQUIRED_SHADERS.len() - 1);
    }
}
