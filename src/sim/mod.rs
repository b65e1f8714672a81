//! Simulation module
//!
//! Everything that moves bubbles or decides which bubbles exist lives here:
//! - No rendering, network, or clock dependencies
//! - Viewport and RNG are passed in
//! - Stable iteration order (creation time)

pub mod bounds;
pub mod grid;
pub mod spawn;
pub mod state;
pub mod store;
pub mod tick;

pub use bounds::{Margins, Viewport, reflect_axis};
pub use grid::SpatialGrid;
pub use spawn::Spawner;
pub use state::{Bubble, BubbleId, LOCAL_ID_PREFIX, Origin, User};
pub use store::{BubbleStore, Retention, Upsert};
pub use tick::{PhysicsParams, repulsion_impulses, step};
