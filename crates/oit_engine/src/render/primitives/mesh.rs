//! Mesh and vertex definitions

use ash::vk;

/// A single mesh vertex.
///
/// Positions and normals are padded to vec4 so the layout matches the
/// shader-side struct without alignment surprises.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Object-space position (w = 1)
    pub position: [f32; 4],
    /// Object-space normal (w = 0)
    pub normal: [f32; 4],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
    /// Vertex color
    pub color: [f32; 4],
}

impl Vertex {
    /// Vertex buffer binding description (binding 0, per-vertex rate)
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Attribute descriptions for position, normal, texcoord and color
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 16,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 32,
            },
            vk::VertexInputAttributeDescription {
                location: 3,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 40,
            },
        ]
    }
}

/// An indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertex and index arrays
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_offsets_match_layout() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset as usize, 0);
        assert_eq!(attrs[1].offset as usize, 16);
        assert_eq!(attrs[2].offset as usize, 32);
        assert_eq!(attrs[3].offset as usize, 40);
        assert_eq!(
            Vertex::binding_description().stride as usize,
            std::mem::size_of::<Vertex>()
        );
    }
}
