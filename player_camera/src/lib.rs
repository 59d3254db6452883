//! Camera derivation from player pose: look control, eye smoothing, projection.
#![forbid(unsafe_code)]

use rapier3d::math::{Isometry, Point, Rotation, Translation, Vector};
use rapier3d::na::{Matrix4, Perspective3};
use rapier3d::prelude::{Ray, Real};

/// Pitch stops just short of straight up/down so the yaw axis stays defined.
pub const PITCH_LIMIT: Real = std::f32::consts::FRAC_PI_2 - 0.01;
pub const DEFAULT_MOUSE_SENSITIVITY: Real = 0.002;
pub const DEFAULT_SMOOTHING: Real = 0.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y: Real,
    pub aspect: Real,
    pub near: Real,
    pub far: Real,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 75.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as Real / height.max(1) as Real;
    }

    fn matrix(&self) -> Matrix4<Real> {
        let gl = Perspective3::new(self.aspect, self.fov_y, self.near, self.far).to_homogeneous();
        opengl_to_wgpu() * gl
    }
}

// Maps OpenGL clip depth (-1..1) onto the 0..1 range wgpu expects.
fn opengl_to_wgpu() -> Matrix4<Real> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.5, 0.5, //
        0.0, 0.0, 0.0, 1.0,
    )
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub eye: Vector<Real>,
    pub yaw: Real,
    pub pitch: Real,
}

impl CameraPose {
    /// Yaw about world up, then pitch about the camera's local X.
    pub fn orientation(&self) -> Rotation<Real> {
        Rotation::from_axis_angle(&Vector::y_axis(), self.yaw)
            * Rotation::from_axis_angle(&Vector::x_axis(), self.pitch)
    }

    pub fn forward(&self) -> Vector<Real> {
        self.orientation() * Vector::new(0.0, 0.0, -1.0)
    }

    /// Ray from the eye through a point given in normalized device coordinates
    /// (`[0, 0]` is the viewport centre, `[1, 1]` the top-right corner).
    pub fn screen_ray(&self, ndc: [Real; 2], projection: &Projection) -> Ray {
        let half_height = (projection.fov_y * 0.5).tan();
        let local = Vector::new(
            ndc[0] * half_height * projection.aspect,
            ndc[1] * half_height,
            -1.0,
        );
        let dir = (self.orientation() * local).normalize();
        Ray::new(Point::from(self.eye), dir)
    }

    pub fn view_matrix(&self) -> Matrix4<Real> {
        Isometry::from_parts(Translation::from(self.eye), self.orientation())
            .inverse()
            .to_homogeneous()
    }

    pub fn view_proj(&self, projection: &Projection) -> [[f32; 4]; 4] {
        (projection.matrix() * self.view_matrix()).into()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlayerCamera {
    eye_height: Real,
    smoothing: Real,
    sensitivity: Real,
    yaw: Real,
    pitch: Real,
    eye: Vector<Real>,
}

impl PlayerCamera {
    pub fn new(eye_height: Real) -> Self {
        Self {
            eye_height,
            smoothing: DEFAULT_SMOOTHING,
            sensitivity: DEFAULT_MOUSE_SENSITIVITY,
            yaw: 0.0,
            pitch: 0.0,
            eye: Vector::zeros(),
        }
    }

    pub fn with_smoothing(mut self, smoothing: Real) -> Self {
        self.smoothing = smoothing.clamp(0.0, 1.0);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Real) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn eye_height(&self) -> Real {
        self.eye_height
    }

    pub fn yaw(&self) -> Real {
        self.yaw
    }

    pub fn pitch(&self) -> Real {
        self.pitch
    }

    pub fn set_look(&mut self, yaw: Real, pitch: Real) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Applies raw pointer motion. Moving right turns right; moving down looks down.
    pub fn apply_mouse_delta(&mut self, dx: Real, dy: Real) {
        self.yaw -= dx * self.sensitivity;
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Places the eye at `origin` + eye height with no smoothing.
    pub fn snap_to(&mut self, origin: Vector<Real>) -> CameraPose {
        self.eye = self.target_for(origin);
        self.pose()
    }

    /// Moves the eye a fixed fraction of the way toward `origin` + eye height.
    pub fn follow(&mut self, origin: Vector<Real>) -> CameraPose {
        let target = self.target_for(origin);
        self.eye += (target - self.eye) * self.smoothing;
        self.pose()
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            eye: self.eye,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    fn target_for(&self, origin: Vector<Real>) -> Vector<Real> {
        origin + Vector::new(0.0, self.eye_height, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vector<Real>, b: Vector<Real>) -> bool {
        (a - b).norm() < 1.0e-5
    }

    #[test]
    fn follow_closes_a_fifth_of_the_gap() {
        let mut camera = PlayerCamera::new(1.6);
        camera.snap_to(Vector::zeros());
        let pose = camera.follow(Vector::new(10.0, 0.0, 0.0));
        assert!(approx(pose.eye, Vector::new(2.0, 1.6, 0.0)));
        let pose = camera.follow(Vector::new(10.0, 0.0, 0.0));
        assert!(approx(pose.eye, Vector::new(3.6, 1.6, 0.0)));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = PlayerCamera::new(1.6);
        camera.apply_mouse_delta(0.0, -10_000.0);
        assert!((camera.pitch() - PITCH_LIMIT).abs() < 1.0e-6);
        camera.apply_mouse_delta(0.0, 20_000.0);
        assert!((camera.pitch() + PITCH_LIMIT).abs() < 1.0e-6);
    }

    #[test]
    fn moving_the_mouse_right_turns_right() {
        let mut camera = PlayerCamera::new(1.6);
        camera.apply_mouse_delta(std::f32::consts::FRAC_PI_2 / DEFAULT_MOUSE_SENSITIVITY, 0.0);
        let forward = camera.pose().forward();
        assert!(approx(forward, Vector::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn centre_ray_matches_forward() {
        let mut camera = PlayerCamera::new(1.6);
        camera.set_look(0.7, -0.3);
        let pose = camera.snap_to(Vector::new(1.0, 0.0, 2.0));
        let ray = pose.screen_ray([0.0, 0.0], &Projection::default());
        assert!(approx(ray.dir, pose.forward()));
        assert!(approx(ray.origin.coords, Vector::new(1.0, 1.6, 2.0)));
    }

    #[test]
    fn view_proj_puts_forward_points_on_screen_centre() {
        let mut camera = PlayerCamera::new(1.6);
        let pose = camera.snap_to(Vector::zeros());
        let projection = Projection::default();
        let m = Matrix4::from(pose.view_proj(&projection));
        let clip = m * rapier3d::na::Vector4::new(0.0, 1.6, -5.0, 1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(ndc.x.abs() < 1.0e-5 && ndc.y.abs() < 1.0e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
