//! Camera, light and the per-frame uniform block.

use glam::{Mat4, Vec3};

/// Perspective camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Camera {
    /// Camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            position,
            direction: (target - position).normalize(),
            aspect,
            ..Self::default()
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.direction = (target - self.position).normalize();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// Projection with Vulkan's downward Y axis.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }
}

/// Point light.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 10.0, 10.0),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Contents of the frame uniform buffer (set 0, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraData {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// Light position in view space.
    pub light_position: [f32; 4],
    /// Light color premultiplied by intensity.
    pub light_color: [f32; 4],
}

impl CameraData {
    pub fn new(camera: &Camera, light: &Light) -> Self {
        let view = camera.view_matrix();
        let light_position = view.transform_point3(light.position);
        let light_color = light.color * light.intensity;

        Self {
            view: view.to_cols_array_2d(),
            projection: camera.projection_matrix().to_cols_array_2d(),
            light_position: light_position.extend(1.0).to_array(),
            light_color: light_color.extend(1.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let flipped = camera.projection_matrix();
        let plain = Mat4::perspective_rh(camera.fov, camera.aspect, camera.near, camera.far);

        assert_relative_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_relative_eq!(flipped.x_axis.x, plain.x_axis.x);
    }

    #[test]
    fn looking_at_normalizes_direction() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0);
        assert_relative_eq!(camera.direction.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.direction.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn light_is_moved_into_view_space() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0);
        let light = Light {
            position: Vec3::ZERO,
            color: Vec3::new(1.0, 0.5, 0.25),
            intensity: 2.0,
        };

        let data = CameraData::new(&camera, &light);

        // Origin sits 5 units in front of the camera, down its -Z axis.
        assert_relative_eq!(data.light_position[2], -5.0, epsilon = 1e-5);
        assert_relative_eq!(data.light_position[3], 1.0);
        assert_relative_eq!(data.light_color[0], 2.0);
        assert_relative_eq!(data.light_color[1], 1.0);
        assert_relative_eq!(data.light_color[2], 0.5);
    }

    #[test]
    fn camera_data_is_std140_sized() {
        assert_eq!(std::mem::size_of::<CameraData>(), 160);
    }
}
