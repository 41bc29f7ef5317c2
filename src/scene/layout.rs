use glam::Vec3;
use rand::Rng;

pub const DEFAULT_RADIUS: f32 = 25.0;
pub const DEFAULT_JITTER: f32 = 10.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RadialLayout {
    pub radius: f32,
    /// Total span of the vertical jitter; y is drawn from [-span/2, span/2).
    pub jitter: f32,
}

impl Default for RadialLayout {
    fn default() -> Self {
        Self { radius: DEFAULT_RADIUS, jitter: DEFAULT_JITTER }
    }
}

impl RadialLayout {
    /// Angle of slot `index` out of `count` evenly spaced slots.
    pub fn angle(index: usize, count: usize) -> f32 {
        if count == 0 {
            return 0.0;
        }
        index as f32 * (std::f32::consts::TAU / count as f32)
    }

    pub fn position<R: Rng + ?Sized>(&self, index: usize, count: usize, rng: &mut R) -> Vec3 {
        let angle = Self::angle(index, count);
        let y = (rng.random::<f32>() - 0.5) * self.jitter;
        Vec3::new(self.radius * angle.cos(), y, self.radius * angle.sin())
    }

    pub fn positions<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Vec3> {
        (0..count).map(|i| self.position(i, count, rng)).collect()
    }
}
