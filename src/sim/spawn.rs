//! Spawn placement for locally composed bubbles
//!
//! Seeded so tests can pin positions; the UI seeds from entropy.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use uuid::Builder;

use super::bounds::Viewport;
use super::state::{BubbleId, LOCAL_ID_PREFIX};

pub struct Spawner {
    rng: Pcg32,
}

impl Spawner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Pcg32::from_rng(&mut rand::rng()),
        }
    }

    /// Uniform point in the viewport's spawn region
    pub fn position(&mut self, viewport: &Viewport) -> Vec2 {
        let (lo, hi) = viewport.spawn_region();
        Vec2::new(self.uniform(lo.x, hi.x), self.uniform(lo.y, hi.y))
    }

    /// Drift velocity with each component in `[-speed/2, speed/2)`
    pub fn velocity(&mut self, speed: f32) -> Vec2 {
        Vec2::new(
            (self.rng.random::<f32>() - 0.5) * speed,
            (self.rng.random::<f32>() - 0.5) * speed,
        )
    }

    /// Fresh client-side identifier
    pub fn local_id(&mut self) -> BubbleId {
        let uuid = Builder::from_random_bytes(self.rng.random()).into_uuid();
        BubbleId::new(format!("{}{}", LOCAL_ID_PREFIX, uuid))
    }

    fn uniform(&mut self, lo: f32, hi: f32) -> f32 {
        if hi > lo { self.rng.random_range(lo..hi) } else { lo }
    }
}
