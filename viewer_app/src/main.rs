//! OIT viewer application
//!
//! Thin shell around the engine: reads the renderer configuration, decodes
//! the character/hair scene from disk and feeds an orbiting camera into the
//! frame loop. Shader binaries come pre-compiled from `build.rs`; the engine
//! itself never touches the filesystem.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use nalgebra::{Matrix4, Point3, Vector3};

use oit_engine::prelude::*;

const CONFIG_PATH: &str = "viewer_app/renderer.ron";

const OPAQUE_MESH_FILE: &str = "models/character.obj";
const TRANSPARENT_MESH_FILE: &str = "models/hair.obj";
const ENVIRONMENT_FILE: &str = "env/studio.hdr";

/// (engine name, file, mipmapped) per scene texture. The flow map encodes
/// strand directions and keeps a single point-sampled mip level; averaging
/// its texels would corrupt the directions.
const TEXTURE_FILES: [(&str, &str, bool); 3] = [
    ("head-albedo", "textures/head_albedo.png", true),
    ("hair-albedo", "textures/hair_albedo.png", true),
    ("hair-flow", "textures/hair_flow.png", false),
];

struct Options {
    asset_root: PathBuf,
    opaque_hair: bool,
}

impl Options {
    fn parse() -> Self {
        let mut asset_root = PathBuf::from("assets");
        let mut opaque_hair = false;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--opaque-hair" => opaque_hair = true,
                path => asset_root = PathBuf::from(path),
            }
        }
        Self {
            asset_root,
            opaque_hair,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    oit_engine::foundation::logging::init();
    let options = Options::parse();

    let config = if Path::new(CONFIG_PATH).exists() {
        log::info!("Loading renderer config from {}", CONFIG_PATH);
        RendererConfig::load_from_file(CONFIG_PATH)?
    } else {
        RendererConfig::new("OIT Viewer")
    };

    let assets = load_assets(&options.asset_root, &config)?;
    let (orbit_target, scene_radius) =
        scene_bounds(&assets.meshes[SceneAssets::OPAQUE_MESH]);
    log::info!(
        "Scene centered at {:.2?}, radius {:.2}",
        orbit_target,
        scene_radius
    );

    let window = Window::new(&config)?;
    let mut renderer = Renderer::new(window, assets, &config)?;

    let start = Instant::now();
    let transparency = !options.opaque_hair;
    renderer.run_frame_loop(move |aspect, camera, overlay| {
        overlay.transparency_enabled = transparency;
        *camera = orbit_camera(start.elapsed().as_secs_f32(), aspect, orbit_target, scene_radius);
    })?;

    Ok(())
}

fn load_assets(root: &Path, config: &RendererConfig) -> Result<SceneAssets, Box<dyn Error>> {
    let mut assets = SceneAssets::default();

    for name in SceneAssets::REQUIRED_SHADERS {
        // The composite shader reads the accumulators per sample under MSAA,
        // so the binary must match the scene sample count
        let file = if name == "wboit_composite_frag" && config.multisampling {
            "wboit_composite_ms_frag"
        } else {
            name
        };
        let path = Path::new(&config.shader_dir).join(format!("{}.spv", file));
        let bytes =
            std::fs::read(&path).map_err(|e| format!("shader binary {:?}: {}", path, e))?;
        assets.shaders.insert(name.to_string(), bytes);
    }

    assets.meshes.insert(
        SceneAssets::OPAQUE_MESH.to_string(),
        load_mesh(&root.join(OPAQUE_MESH_FILE))?,
    );
    assets.meshes.insert(
        SceneAssets::TRANSPARENT_MESH.to_string(),
        load_mesh(&root.join(TRANSPARENT_MESH_FILE))?,
    );

    for (name, file, mipmapped) in TEXTURE_FILES {
        assets
            .textures
            .insert(name.to_string(), load_texture(&root.join(file), mipmapped)?);
    }
    assets.environment = load_environment(&root.join(ENVIRONMENT_FILE))?;

    Ok(assets)
}

fn load_mesh(path: &Path) -> Result<Mesh, Box<dyn Error>> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| format!("mesh {:?}: {}", path, e))?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for model in models {
        let mesh = model.mesh;
        let base = vertices.len() as u32;
        let vertex_count = mesh.positions.len() / 3;
        for i in 0..vertex_count {
            let normal = if mesh.normals.len() >= (i + 1) * 3 {
                [
                    mesh.normals[3 * i],
                    mesh.normals[3 * i + 1],
                    mesh.normals[3 * i + 2],
                    0.0,
                ]
            } else {
                [0.0, 1.0, 0.0, 0.0]
            };
            let tex_coord = if mesh.texcoords.len() >= (i + 1) * 2 {
                // OBJ texture coordinates have a bottom-left origin
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            };
            vertices.push(Vertex {
                position: [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                    1.0,
                ],
                normal,
                tex_coord,
                color: [1.0, 1.0, 1.0, 1.0],
            });
        }
        indices.extend(mesh.indices.iter().map(|&index| base + index));
    }

    log::info!(
        "Loaded {:?}: {} vertices, {} triangles",
        path,
        vertices.len(),
        indices.len() / 3
    );
    Ok(Mesh::new(vertices, indices))
}

fn load_texture(path: &Path, mipmapped: bool) -> Result<TextureData, Box<dyn Error>> {
    let image = image::open(path)
        .map_err(|e| format!("texture {:?}: {}", path, e))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(TextureData {
        width,
        height,
        pixels: image.into_raw(),
        mipmapped,
    })
}

fn load_environment(path: &Path) -> Result<HdrImage, Box<dyn Error>> {
    let image = image::open(path)
        .map_err(|e| format!("environment {:?}: {}", path, e))?
        .to_rgba32f();
    let (width, height) = image.dimensions();
    Ok(HdrImage {
        width,
        height,
        pixels: image.into_raw(),
    })
}

/// Center and bounding radius of a mesh, for framing the orbit
fn scene_bounds(mesh: &Mesh) -> (Point3<f32>, f32) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for vertex in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex.position[axis]);
            max[axis] = max[axis].max(vertex.position[axis]);
        }
    }
    if mesh.vertices.is_empty() {
        return (Point3::origin(), 1.0);
    }

    let center = Point3::new(
        (min[0] + max[0]) * 0.5,
        (min[1] + max[1]) * 0.5,
        (min[2] + max[2]) * 0.5,
    );
    let half_diagonal = ((max[0] - min[0]).powi(2)
        + (max[1] - min[1]).powi(2)
        + (max[2] - min[2]).powi(2))
    .sqrt()
        * 0.5;
    (center, half_diagonal.max(1e-3))
}

/// A slow orbit around the scene at a distance scaled to its bounds
fn orbit_camera(seconds: f32, aspect: f32, target: Point3<f32>, radius: f32) -> CameraState {
    let angle = seconds * 0.4;
    let distance = radius * 2.5;
    let eye = Point3::new(
        target.x + distance * angle.cos(),
        target.y + distance * 0.25,
        target.z + distance * angle.sin(),
    );

    let view = Matrix4::look_at_rh(&eye, &target, &Vector3::y());
    let projection = Matrix4::new_perspective(
        aspect.max(1e-3),
        45.0f32.to_radians(),
        0.02 * distance,
        50.0 * distance,
    );

    CameraState {
        view,
        projection,
        position: eye,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_at(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            position: [x, y, z, 1.0],
            normal: [0.0, 1.0, 0.0, 0.0],
            tex_coord: [0.0, 0.0],
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn bounds_center_and_radius() {
        let mesh = Mesh::new(
            vec![vertex_at(-1.0, -2.0, -3.0), vertex_at(1.0, 2.0, 3.0)],
            vec![0, 1, 0],
        );
        let (center, radius) = scene_bounds(&mesh);
        assert_eq!(center, Point3::origin());
        assert!((radius - (1.0f32 + 4.0 + 9.0).sqrt()).abs() < 1e-5);
    }

    #[test]
    fn empty_mesh_gets_fallback_bounds() {
        let (center, radius) = scene_bounds(&Mesh::default());
        assert_eq!(center, Point3::origin());
        assert_eq!(radius, 1.0);
    }
}
