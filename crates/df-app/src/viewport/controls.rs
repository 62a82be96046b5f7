use std::f32::consts::{PI, TAU};
use glam::Vec3;
use crate::viewport::camera::PerspectiveCamera;

pub const DAMPING_FACTOR: f32 = 0.05;
const MIN_POLAR: f32 = 1e-4;
const SETTLED: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    /// azimuth around +Y, measured from +Z
    theta: f32,
    /// polar angle from +Y
    phi: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self { radius, theta: 0.0, phi: 0.0 };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

/// Orbit camera controls with damped inertia: input accumulates a pending
/// rotation that `update` bleeds into the camera a fraction at a time.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    delta_theta: f32,
    delta_phi: f32,
    scale: f32,

    saved_target: Vec3,
    saved_position: Vec3,
}

impl OrbitControls {
    /// Attaches to `camera` and remembers its pose as the reset state.
    pub fn new(camera: &PerspectiveCamera) -> Self {
        Self {
            target: camera.target,
            damping_factor: DAMPING_FACTOR,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.1,
            max_distance: 100.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            saved_target: camera.target,
            saved_position: camera.position,
        }
    }

    /// Drag by a pixel delta; a full-height drag turns the camera a full circle.
    pub fn rotate(&mut self, dx: f32, dy: f32, viewport_height: u32) {
        let height = viewport_height.max(1) as f32;
        self.delta_theta -= TAU * dx / height * self.rotate_speed;
        self.delta_phi -= TAU * dy / height * self.rotate_speed;
    }

    /// Positive wheel steps move toward the target.
    pub fn zoom(&mut self, steps: f32) {
        self.scale *= 0.95_f32.powf(steps * self.zoom_speed);
    }

    /// Advances one frame. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        spherical.theta += self.delta_theta * self.damping_factor;
        spherical.phi = (spherical.phi + self.delta_phi * self.damping_factor).clamp(MIN_POLAR, PI - MIN_POLAR);
        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        let position = self.target + spherical.to_offset();
        let moved = position.distance_squared(camera.position) > SETTLED * SETTLED
            || camera.target != self.target;

        camera.position = position;
        camera.target = self.target;

        self.delta_theta *= 1.0 - self.damping_factor;
        self.delta_phi *= 1.0 - self.damping_factor;
        if self.delta_theta.abs() < SETTLED {
            self.delta_theta = 0.0;
        }
        if self.delta_phi.abs() < SETTLED {
            self.delta_phi = 0.0;
        }
        self.scale = 1.0;

        moved
    }

    pub fn is_settled(&self) -> bool {
        self.delta_theta == 0.0 && self.delta_phi == 0.0 && self.scale == 1.0
    }

    /// Restores the pose captured at construction and drops any inertia.
    pub fn reset(&mut self, camera: &mut PerspectiveCamera) {
        self.target = self.saved_target;
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;

        camera.target = self.saved_target;
        camera.position = self.saved_position;
    }
}
