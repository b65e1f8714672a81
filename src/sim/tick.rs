//! Physics stepper
//!
//! Advances every bubble by one tick. Velocities are in pixels per tick, so
//! there is no dt: the driver calls this once per display frame.
//!
//! Per bubble, in order:
//! 1. integrate position
//! 2. reflect off the viewport walls
//! 3. pairwise repulsion from every bubble closer than `min_separation`
//! 4. damping
//!
//! Repulsion is evaluated on the post-integration positions of all bubbles,
//! so iteration order does not matter. The scan is all-pairs below
//! `grid_threshold` bubbles and grid-bucketed above it; both give identical
//! results.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::bounds::Viewport;
use super::grid::SpatialGrid;
use super::state::Bubble;
use crate::consts::*;

/// Force model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Bubbles closer than this repel each other (pixels)
    pub min_separation: f32,
    /// Velocity added per pixel of overlap
    pub repulsion: f32,
    /// Per-tick velocity multiplier, slightly below 1
    pub damping: f32,
    /// Bubble count at which the repulsion pass switches to the grid
    pub grid_threshold: usize,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            min_separation: MIN_SEPARATION,
            repulsion: REPULSION,
            damping: DAMPING,
            grid_threshold: GRID_THRESHOLD,
        }
    }
}

/// Advance all bubbles by one tick. Only `pos` and `vel` are written.
pub fn step(bubbles: &mut [Bubble], viewport: &Viewport, params: &PhysicsParams) {
    if bubbles.is_empty() {
        return;
    }

    // Integrate + reflect
    let center = viewport.center();
    for bubble in bubbles.iter_mut() {
        if !bubble.pos.is_finite() {
            bubble.pos = center;
        }
        if !bubble.vel.is_finite() {
            bubble.vel = Vec2::ZERO;
        }
        let (pos, vel) = viewport.reflect(bubble.pos + bubble.vel, bubble.vel);
        bubble.pos = pos;
        bubble.vel = vel;
    }

    // Repulsion on candidate positions
    let candidates: Vec<Vec2> = bubbles.iter().map(|b| b.pos).collect();
    let impulses = repulsion_impulses(&candidates, params);

    for (bubble, impulse) in bubbles.iter_mut().zip(impulses) {
        if impulse != Vec2::ZERO {
            // The impulse also displaces the bubble this tick, then walls apply again
            let (pos, vel) = viewport.reflect(bubble.pos + impulse, bubble.vel + impulse);
            bubble.pos = pos;
            bubble.vel = vel;
        }

        // Damping
        bubble.vel *= params.damping;
    }
}

/// Summed repulsion impulse for each position
pub fn repulsion_impulses(positions: &[Vec2], params: &PhysicsParams) -> Vec<Vec2> {
    let mut impulses = vec![Vec2::ZERO; positions.len()];
    if params.repulsion == 0.0 || params.min_separation <= 0.0 {
        return impulses;
    }

    if positions.len() >= params.grid_threshold {
        let mut grid = SpatialGrid::new(params.min_separation);
        grid.rebuild(positions);
        let mut neighbors = Vec::new();
        for (i, impulse) in impulses.iter_mut().enumerate() {
            grid.query_neighbors(positions[i], &mut neighbors);
            for &j in &neighbors {
                *impulse += pair_impulse(i, j, positions, params);
            }
        }
    } else {
        for (i, impulse) in impulses.iter_mut().enumerate() {
            for j in 0..positions.len() {
                *impulse += pair_impulse(i, j, positions, params);
            }
        }
    }

    impulses
}

/// Impulse on bubble `i` from bubble `j`
#[inline]
fn pair_impulse(i: usize, j: usize, positions: &[Vec2], params: &PhysicsParams) -> Vec2 {
    if i == j {
        return Vec2::ZERO;
    }

    let delta = positions[i] - positions[j];
    let distance = delta.length();
    if distance >= params.min_separation {
        return Vec2::ZERO;
    }

    // Coincident bubbles get a fixed axis, opposite for each side of the pair
    let dir = if distance > f32::EPSILON {
        delta / distance
    } else if i < j {
        -Vec2::X
    } else {
        Vec2::X
    };

    dir * ((params.min_separation - distance) * params.repulsion)
}
