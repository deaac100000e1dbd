//! Camera state and the per-frame uniform payload
//!
//! Camera interaction (mouse/scroll handling) lives in the application; the
//! engine only consumes the resulting matrices.

use nalgebra::{Matrix4, Point3};

/// View state handed to the renderer each frame
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    /// World-to-view matrix
    pub view: Matrix4<f32>,
    /// View-to-clip matrix (OpenGL-style, Y is flipped on upload)
    pub projection: Matrix4<f32>,
    /// Camera position in world space
    pub position: Point3<f32>,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            position: Point3::origin(),
        }
    }
}

/// Uniform buffer payload, std140-compatible
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    /// Model matrix (identity; the scene is authored in world space)
    pub model: [[f32; 4]; 4],
    /// View matrix
    pub view: [[f32; 4]; 4],
    /// Projection matrix with the Y axis flipped for Vulkan clip space
    pub projection: [[f32; 4]; 4],
    /// Camera world position (w unused)
    pub camera_position: [f32; 4],
}

impl From<&CameraState> for CameraUniform {
    fn from(camera: &CameraState) -> Self {
        // Projections built with GL conventions render upside down in
        // Vulkan; flipping the Y scaling factor compensates.
        let mut projection = camera.projection;
        projection[(1, 1)] *= -1.0;

        Self {
            model: Matrix4::identity().into(),
            view: camera.view.into(),
            projection: projection.into(),
            camera_position: [
                camera.position.x,
                camera.position.y,
                camera.position.z,
                1.0,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn upload_flips_projection_y() {
        let mut camera = CameraState::default();
        camera.projection = Matrix4::new_perspective(16.0 / 9.0, 1.0, 0.1, 100.0);

        let uniform = CameraUniform::from(&camera);
        assert_relative_eq!(uniform.projection[1][1], -camera.projection[(1, 1)]);
        assert_relative_eq!(uniform.projection[0][0], camera.projection[(0, 0)]);
    }
}
