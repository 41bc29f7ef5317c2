//! Decorative particle cloud drawn behind the schema.

use egui::Color32;
use glam::{Quat, Vec3};
use rand::Rng;

pub const DEFAULT_COUNT: usize = 1000;
const EXTENT: f32 = 200.0;
const SPIN_PER_FRAME: f32 = 0.001;
pub const OPACITY: f32 = 0.6;

#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub color: Color32,
    pub size: f32,
}

#[derive(Clone, Debug, Default)]
pub struct ParticleField {
    particles: Vec<Particle>,
    rotation_y: f32,
}

impl ParticleField {
    pub fn new<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let particles = (0..count)
            .map(|_| {
                let position = Vec3::new(
                    (rng.random::<f32>() - 0.5) * EXTENT,
                    (rng.random::<f32>() - 0.5) * EXTENT,
                    (rng.random::<f32>() - 0.5) * EXTENT,
                );
                let r = 0.2 + rng.random::<f32>() * 0.3;
                let g = 0.4 + rng.random::<f32>() * 0.4;
                let b = 0.8 + rng.random::<f32>() * 0.2;
                let color = Color32::from_rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8);
                let size = rng.random::<f32>() * 2.0 + 0.5;
                Particle { position, color, size }
            })
            .collect();
        Self { particles, rotation_y: 0.0 }
    }

    pub fn len(&self) -> usize { self.particles.len() }
    pub fn is_empty(&self) -> bool { self.particles.is_empty() }
    pub fn rotation_y(&self) -> f32 { self.rotation_y }
    pub fn particles(&self) -> &[Particle] { &self.particles }

    /// One animation frame at `now_ms` milliseconds: each particle drifts
    /// vertically on a sine and horizontally on a cosine of time, phase
    /// shifted by its flat buffer index, and the cloud spins about Y.
    pub fn advance(&mut self, now_ms: f64) {
        for (k, p) in self.particles.iter_mut().enumerate() {
            let i = (k * 3) as f64;
            p.position.y += ((now_ms * 0.001 + i).sin() * 0.01) as f32;
            p.position.x += ((now_ms * 0.0005 + i).cos() * 0.005) as f32;
        }
        self.rotation_y += SPIN_PER_FRAME;
    }

    /// Particle positions with the cloud rotation applied.
    pub fn world_positions(&self) -> impl Iterator<Item = (Vec3, &Particle)> {
        let rot = Quat::from_rotation_y(self.rotation_y);
        self.particles.iter().map(move |p| (rot * p.position, p))
    }
}
