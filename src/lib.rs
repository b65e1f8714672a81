//! Bubblefield - shared floating message bubbles
//!
//! Core modules:
//! - `sim`: Pure simulation (bubble state, entity store, physics stepper)
//! - `driver`: Per-frame animation scheduling
//! - `reconcile`: Merges local, refreshed, and live-feed bubbles into the store
//! - `persistence`: Bridge to the external value store and live feed
//! - `platform`: Clock and browser/native differences
//! - `field`: The surface the UI talks to

pub mod driver;
pub mod error;
pub mod field;
pub mod persistence;
pub mod platform;
pub mod reconcile;
pub mod settings;
pub mod sim;

pub use error::{FetchError, MalformedRecord, MessageError, SyncError, WriteError};
pub use field::BubbleField;
pub use settings::{MotionPreset, Settings};

use chrono::{DateTime, Utc};

/// Tuning constants
pub mod consts {
    /// Longest message a bubble may carry (characters)
    pub const MAX_MESSAGE_LEN: usize = 280;

    /// Bubbles kept when following the live feed
    pub const DEFAULT_RETENTION: usize = 50;

    /// Viewport margins. Right and bottom leave room for the bubble body and the chat bar.
    pub const MARGIN_LEFT: f32 = 50.0;
    pub const MARGIN_TOP: f32 = 50.0;
    pub const MARGIN_RIGHT: f32 = 250.0;
    pub const MARGIN_BOTTOM: f32 = 200.0;

    /// Spawn inset from the viewport edges
    pub const SPAWN_INSET_X: f32 = 100.0;
    pub const SPAWN_INSET_Y: f32 = 150.0;
    /// Minimum gap between the spawn region and the walls
    pub const SPAWN_CLEARANCE: f32 = 50.0;
    /// Full width of the initial velocity range (components in ±SPAWN_SPEED/2)
    pub const SPAWN_SPEED: f32 = 0.05;

    /// Bubbles closer than this push each other apart (pixels)
    pub const MIN_SEPARATION: f32 = 120.0;
    /// Velocity added per pixel of overlap
    pub const REPULSION: f32 = 0.0002;
    /// Per-tick velocity multiplier
    pub const DAMPING: f32 = 0.999;
    /// Above this many bubbles the repulsion pass uses a spatial grid
    pub const GRID_THRESHOLD: usize = 64;

    /// Wall-clock period between position flushes
    pub const FLUSH_INTERVAL_MS: i64 = 5_000;
}

/// Human-readable age of a bubble, as shown in its detail view
pub fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes();

    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "Just now");
        // Clock skew puts remote timestamps slightly in the future
        assert_eq!(format_age(now + Duration::seconds(5), now), "Just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now - Duration::minutes(59), now), "59m ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2d ago");
    }
}
