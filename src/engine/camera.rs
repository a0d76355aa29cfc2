// Orbit camera for the blob viewer.
//
// Camera model:
//   - Always looks at the world origin, where the blob lives
//   - Pitch (elevation) and yaw (horizontal rotation) around that point
//   - Yaw drifts slowly on its own; A/D rotate, W/S tilt
//   - Mouse wheel zooms by changing the orbit distance

use glam::{Mat4, Quat, Vec3};
use super::input::InputState;
use winit::keyboard::KeyCode;

pub struct OrbitCamera {
    /// Private: always clamped to [min_distance, max_distance] in update(). Use distance() to read.
    distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    /// Elevation angle in radians, kept inside (-max_pitch, max_pitch)
    pub pitch: f32,
    pub max_pitch: f32,

    /// Horizontal rotation in radians (0 = eye on +Z)
    pub yaw: f32,

    /// Idle yaw drift in radians per second
    pub drift_speed: f32,

    /// Manual rotation speed in radians per second
    pub rotate_speed: f32,

    /// Zoom change (in distance units) per scroll line
    pub zoom_speed: f32,

    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self {
            distance: 3.5,
            min_distance: 1.5,
            max_distance: 10.0,
            pitch: 15.0_f32.to_radians(),
            max_pitch: 80.0_f32.to_radians(),
            yaw: 0.0,
            drift_speed: 0.15,
            rotate_speed: 1.5,
            zoom_speed: 0.3,
            fov: 45.0_f32.to_radians(),
            near: 0.05,
            far: 50.0,
        }
    }

    /// Update orbit from input. Call once per frame before rendering.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        self.yaw += self.drift_speed * dt;

        if input.is_key_held(KeyCode::KeyA) { self.yaw -= self.rotate_speed * dt; }
        if input.is_key_held(KeyCode::KeyD) { self.yaw += self.rotate_speed * dt; }
        if input.is_key_held(KeyCode::KeyW) { self.pitch += self.rotate_speed * dt; }
        if input.is_key_held(KeyCode::KeyS) { self.pitch -= self.rotate_speed * dt; }
        self.pitch = self.pitch.clamp(-self.max_pitch, self.max_pitch);
        self.yaw %= std::f32::consts::TAU;

        // Scroll up (positive delta) zooms in (decreases distance)
        self.distance -= input.scroll_delta * self.zoom_speed;
        self.distance = self.distance.clamp(self.min_distance, self.max_distance);
    }

    /// World-space position of the camera eye.
    pub fn camera_position(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos() * self.distance,
            self.pitch.sin() * self.distance,
            self.yaw.cos() * self.pitch.cos() * self.distance,
        )
    }

    /// Camera-to-world rotation: screen right is `orientation() * X`, screen
    /// up is `orientation() * Y`, and +Z points from the origin to the eye.
    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(-self.pitch)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.camera_position(), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    /// Combined view-projection matrix ready to upload to the GPU.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn distance(&self) -> f32 { self.distance }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_is_clamped() {
        let mut cam = OrbitCamera::new();
        let mut input = InputState::new();
        input.scroll_delta = 1000.0;
        cam.update(&input, 0.0);
        assert_eq!(cam.distance(), cam.min_distance);
        input.scroll_delta = -1000.0;
        cam.update(&input, 0.0);
        assert_eq!(cam.distance(), cam.max_distance);
    }

    #[test]
    fn eye_sits_at_orbit_distance() {
        let mut cam = OrbitCamera::new();
        cam.yaw = 1.1;
        cam.pitch = -0.4;
        assert!((cam.camera_position().length() - cam.distance()).abs() < 1e-5);
    }

    #[test]
    fn orientation_matches_the_view() {
        let mut cam = OrbitCamera::new();
        cam.yaw = 2.3;
        cam.pitch = 0.6;
        let q = cam.orientation();
        let eye_dir = cam.camera_position().normalize();
        assert!((q * Vec3::Z).abs_diff_eq(eye_dir, 1e-5));

        // Screen axes as seen through the view matrix.
        let view = cam.view_matrix();
        assert!(view.transform_vector3(q * Vec3::X).abs_diff_eq(Vec3::X, 1e-5));
        assert!(view.transform_vector3(q * Vec3::Y).abs_diff_eq(Vec3::Y, 1e-5));
    }
}
