//! Orbit camera: spherical coordinates around a target, with damped
//! rotation, distance-clamped zoom and screen-space panning.

use egui::{Pos2, Rect, Vec2};
use glam::{Mat4, Vec3};

use super::geometry::Ray;

pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 20.0, 30.0);
pub const DEFAULT_TARGET: Vec3 = Vec3::ZERO;
pub const FOV_Y_DEG: f32 = 75.0;
pub const NEAR: f32 = 0.1;
pub const FAR: f32 = 1000.0;
pub const MIN_DISTANCE: f32 = 5.0;
pub const MAX_DISTANCE: f32 = 100.0;
pub const DAMPING: f32 = 0.05;

const PHI_EPS: f32 = 1e-3;

#[derive(Clone, Debug)]
pub struct OrbitCamera {
    target: Vec3,
    radius: f32,
    // azimuth around +Y, measured from +Z
    theta: f32,
    // polar angle from +Y
    phi: f32,
    theta_delta: f32,
    phi_delta: f32,
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::looking_from(DEFAULT_POSITION, DEFAULT_TARGET)
    }
}

impl OrbitCamera {
    pub fn looking_from(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let radius = offset.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let theta = offset.x.atan2(offset.z);
        let phi = (offset.y / offset.length().max(f32::EPSILON)).clamp(-1.0, 1.0).acos();
        Self {
            target,
            radius,
            theta,
            phi,
            theta_delta: 0.0,
            phi_delta: 0.0,
            fov_y: FOV_Y_DEG.to_radians(),
        }
    }

    pub fn position(&self) -> Vec3 {
        let sin_phi = self.phi.sin();
        self.target
            + Vec3::new(
                self.radius * sin_phi * self.theta.sin(),
                self.radius * self.phi.cos(),
                self.radius * sin_phi * self.theta.cos(),
            )
    }

    pub fn target(&self) -> Vec3 { self.target }
    pub fn distance(&self) -> f32 { self.radius }

    /// Restore the default viewpoint and drop any pending damped motion.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Queue a rotation from a pointer drag of `delta` pixels inside a
    /// viewport of height `viewport_h`.
    pub fn rotate(&mut self, delta: Vec2, viewport_h: f32) {
        let h = viewport_h.max(1.0);
        self.theta_delta -= std::f32::consts::TAU * delta.x / h;
        self.phi_delta -= std::f32::consts::TAU * delta.y / h;
    }

    pub fn zoom(&mut self, scroll: f32) {
        if scroll == 0.0 {
            return;
        }
        let scale = 0.95_f32.powf(scroll / 50.0);
        self.radius = (self.radius * scale).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn pan(&mut self, delta: Vec2, viewport_h: f32) {
        let (right, up, _) = self.basis();
        let world_per_px = 2.0 * self.radius * (self.fov_y * 0.5).tan() / viewport_h.max(1.0);
        self.target += (-right * delta.x + up * delta.y) * world_per_px;
    }

    /// Advance damping by one frame. Returns true while motion is still
    /// settling so the caller can keep repainting.
    pub fn update(&mut self) -> bool {
        self.theta += self.theta_delta * DAMPING;
        self.phi = (self.phi + self.phi_delta * DAMPING).clamp(PHI_EPS, std::f32::consts::PI - PHI_EPS);
        self.theta_delta *= 1.0 - DAMPING;
        self.phi_delta *= 1.0 - DAMPING;
        if self.theta_delta.abs() < 1e-5 { self.theta_delta = 0.0; }
        if self.phi_delta.abs() < 1e-5 { self.phi_delta = 0.0; }
        self.theta_delta != 0.0 || self.phi_delta != 0.0
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    // (right, up, forward) in world space
    fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.position()).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        (right, up, forward)
    }

    /// Projects a world point into `viewport`. Returns the screen position
    /// and the view-space depth, or None when the point is behind the near
    /// plane or past the far plane.
    pub fn project(&self, world: Vec3, viewport: Rect) -> Option<(Pos2, f32)> {
        self.project_with(&self.view_matrix(), world, viewport)
    }

    pub fn project_with(&self, view: &Mat4, world: Vec3, viewport: Rect) -> Option<(Pos2, f32)> {
        let v = view.transform_point3(world);
        let depth = -v.z;
        if !(NEAR..=FAR).contains(&depth) {
            return None;
        }
        let aspect = viewport.width() / viewport.height().max(1.0);
        let tan_half = (self.fov_y * 0.5).tan();
        let ndc_x = v.x / (depth * tan_half * aspect);
        let ndc_y = v.y / (depth * tan_half);
        let c = viewport.center();
        Some((
            Pos2::new(c.x + ndc_x * viewport.width() * 0.5, c.y - ndc_y * viewport.height() * 0.5),
            depth,
        ))
    }

    /// Ray from the camera through a screen position.
    pub fn ray_through(&self, screen: Pos2, viewport: Rect) -> Ray {
        let (right, up, forward) = self.basis();
        let aspect = viewport.width() / viewport.height().max(1.0);
        let tan_half = (self.fov_y * 0.5).tan();
        let c = viewport.center();
        let ndc_x = (screen.x - c.x) / (viewport.width() * 0.5).max(1.0);
        let ndc_y = -(screen.y - c.y) / (viewport.height() * 0.5).max(1.0);
        let dir = forward + right * (ndc_x * tan_half * aspect) + up * (ndc_y * tan_half);
        Ray::new(self.position(), dir)
    }
}
