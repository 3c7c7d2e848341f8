// Camera and model transforms
//
// The camera is fixed; the keyboard only spins the model about +Z.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use winit::keyboard::KeyCode;

use crate::config::ControlsConfig;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Matches the `UniformBufferObject` block in mesh.vert
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub fn new(model_angle: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(model_angle);
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

/// Keyboard-driven model rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelControls {
    direction: f32,
    step: f32,
    speed: f32,
}

impl ModelControls {
    pub fn from_config(controls: &ControlsConfig) -> Self {
        Self {
            direction: 0.0,
            step: controls.rotation_step,
            speed: controls.rotation_speed,
        }
    }

    /// Returns true if the key was handled. Held keys repeat.
    pub fn handle_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        if !pressed {
            return false;
        }

        match key {
            KeyCode::KeyE => self.direction += self.step,
            KeyCode::KeyY => self.direction -= self.step,
            _ => return false,
        }

        log::trace!("Model direction {:.3}", self.direction);
        true
    }

    /// Rotation about +Z in radians
    pub fn model_angle(&self) -> f32 {
        self.speed * self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn controls() -> ModelControls {
        ModelControls::from_config(&ControlsConfig::default())
    }

    #[test]
    fn e_and_y_step_in_opposite_directions() {
        let mut c = controls();
        assert!(c.handle_key(KeyCode::KeyE, true));
        assert!(c.handle_key(KeyCode::KeyE, true));
        assert_relative_eq!(c.model_angle(), 1.2 * 0.02, epsilon = 1e-6);

        assert!(c.handle_key(KeyCode::KeyY, true));
        assert!(c.handle_key(KeyCode::KeyY, true));
        assert!(c.handle_key(KeyCode::KeyY, true));
        assert_relative_eq!(c.model_angle(), -1.2 * 0.01, epsilon = 1e-6);
    }

    #[test]
    fn releases_and_other_keys_are_ignored() {
        let mut c = controls();
        assert!(!c.handle_key(KeyCode::KeyE, false));
        assert!(!c.handle_key(KeyCode::KeyW, true));
        assert_eq!(c.model_angle(), 0.0);
    }

    #[test]
    fn configured_step_and_speed_are_used() {
        let mut c = ModelControls::from_config(&ControlsConfig {
            rotation_step: 0.5,
            rotation_speed: 2.0,
        });
        c.handle_key(KeyCode::KeyE, true);
        assert_relative_eq!(c.model_angle(), 1.0);
    }

    #[test]
    fn model_rotates_about_z() {
        let ubo = UniformBufferObject::new(std::f32::consts::FRAC_PI_2, 1.0);
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.z, 0.0, epsilon = 1e-6);

        let up = ubo.model * Vec4::new(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(up.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn origin_projects_to_screen_center() {
        let ubo = UniformBufferObject::new(0.0, 1.0);
        let clip = ubo.proj * ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let ubo = UniformBufferObject::new(0.0, 1.0);
        assert!(ubo.proj.y_axis.y < 0.0);
        assert!(ubo.proj.x_axis.x > 0.0);

        // +Z is up in the world, so it lands in the upper half (negative NDC y)
        let clip = ubo.proj * ubo.view * Vec4::new(0.0, 0.0, 0.5, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
        let ubo = UniformBufferObject::new(0.3, 1.5);
        assert_eq!(bytemuck::bytes_of(&ubo).len(), 192);
    }
}
