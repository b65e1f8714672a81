//! Viewport bounds and wall reflection
//!
//! Margins are asymmetric: bubbles render to the right of and below their
//! anchor point, and the chat bar sits along the bottom edge.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Distance kept from each viewport edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            right: MARGIN_RIGHT,
            bottom: MARGIN_BOTTOM,
        }
    }
}

/// The area bubbles live in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub margins: Margins,
}

impl Viewport {
    pub fn new(width: f32, height: f32, margins: Margins) -> Self {
        Self {
            width,
            height,
            margins,
        }
    }

    /// Top-left corner of the allowed region
    #[inline]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.margins.left, self.margins.top)
    }

    /// Bottom-right corner of the allowed region.
    ///
    /// Collapses onto `min()` when the viewport is smaller than its margins.
    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(
            (self.width - self.margins.right).max(self.margins.left),
            (self.height - self.margins.bottom).max(self.margins.top),
        )
    }

    /// Center of the allowed region
    pub fn center(&self) -> Vec2 {
        (self.min() + self.max()) * 0.5
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        let (min, max) = (self.min(), self.max());
        pos.x >= min.x && pos.x <= max.x && pos.y >= min.y && pos.y <= max.y
    }

    /// Interior region new bubbles spawn in, at least `SPAWN_CLEARANCE` from
    /// every wall (collapsing toward the center when the viewport is small)
    pub fn spawn_region(&self) -> (Vec2, Vec2) {
        let center = self.center();
        let inner_min = (self.min() + Vec2::splat(SPAWN_CLEARANCE)).min(center);
        let inner_max = (self.max() - Vec2::splat(SPAWN_CLEARANCE)).max(center);

        let lo = Vec2::new(SPAWN_INSET_X, SPAWN_INSET_Y).clamp(inner_min, inner_max);
        let hi = Vec2::new(self.width - SPAWN_INSET_X, self.height - SPAWN_INSET_Y)
            .clamp(lo, inner_max);
        (lo, hi)
    }

    /// Reflect a position/velocity pair off the walls, one axis at a time
    pub fn reflect(&self, pos: Vec2, vel: Vec2) -> (Vec2, Vec2) {
        let (min, max) = (self.min(), self.max());
        let (x, vx) = reflect_axis(pos.x, vel.x, min.x, max.x);
        let (y, vy) = reflect_axis(pos.y, vel.y, min.y, max.y);
        (Vec2::new(x, y), Vec2::new(vx, vy))
    }
}

/// Clamp `pos` into `[lo, hi]` and turn the velocity back inward when the
/// position touches or crosses a wall. Inclusive so a bubble resting exactly
/// on a wall still bounces.
#[inline]
pub fn reflect_axis(pos: f32, vel: f32, lo: f32, hi: f32) -> (f32, f32) {
    if pos <= lo {
        (lo, vel.abs())
    } else if pos >= hi {
        (hi, -vel.abs())
    } else {
        (pos, vel)
    }
}
