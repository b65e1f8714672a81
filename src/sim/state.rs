//! Bubble entities and their owners
//!
//! Everything the store holds and the stepper mutates lives here.

use std::fmt;

use chrono::{DateTime, Utc};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Prefix for identifiers minted on this client before the bridge assigns one
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Opaque bubble identifier, stable for the bubble's lifetime in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BubbleId(String);

impl BubbleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for identifiers minted locally (not yet adopted from the bridge)
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

impl fmt::Display for BubbleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BubbleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Owner snapshot carried by every bubble (denormalized from the profile)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    /// Cumulative reputation, bumped by every reaction on the user's bubbles
    pub aura: u64,
    pub is_online: bool,
}

/// Where a bubble in the store came from. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Created here; the bridge has not acknowledged it yet
    LocalPending,
    /// Created here and acknowledged; carries the bridge identifier
    Confirmed,
    /// Arrived through a refresh or the live feed
    #[default]
    Remote,
    /// Dropped by the retention policy (terminal)
    Evicted,
}

impl Origin {
    /// Transition taken when the bubble's identifier shows up in a bridge response
    pub fn confirm(self) -> Origin {
        match self {
            Origin::LocalPending => Origin::Confirmed,
            other => other,
        }
    }

    /// Whether the bridge knows this bubble's identifier
    pub fn has_bridge_identity(self) -> bool {
        matches!(self, Origin::Confirmed | Origin::Remote)
    }
}

/// A floating message bubble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bubble {
    pub id: BubbleId,
    pub user_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub pos: Vec2,
    /// Pixels per tick
    pub vel: Vec2,
    pub reactions: u32,
    pub user: User,
    #[serde(skip)]
    pub origin: Origin,
}

impl Bubble {
    /// Current speed in pixels per tick
    #[inline]
    pub fn speed(&self) -> f32 {
        self.vel.length()
    }

    /// Fold a newer copy of the same bubble into this one.
    ///
    /// Motion stays local so the bubble does not jump mid-animation, and the
    /// reaction counter never goes backwards.
    pub fn absorb(&mut self, incoming: Bubble) {
        self.reactions = self.reactions.max(incoming.reactions);
        let aura = self.user.aura.max(incoming.user.aura);
        self.user = incoming.user;
        self.user.aura = aura;
        self.message = incoming.message;
        self.origin = self.origin.confirm();
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("user-{}", id),
            avatar: None,
            aura: 10,
            is_online: true,
        }
    }

    /// Bubble created `age_secs` after a fixed epoch, at rest at `pos`
    pub fn bubble(id: &str, age_secs: i64, pos: Vec2) -> Bubble {
        Bubble {
            id: BubbleId::new(id),
            user_id: "u1".to_string(),
            message: format!("hello from {}", id),
            created_at: Utc.timestamp_opt(1_700_000_000 + age_secs, 0).unwrap(),
            pos,
            vel: Vec2::ZERO,
            reactions: 0,
            user: user("u1"),
            origin: Origin::Remote,
        }
    }
}
