//! Persistence bridge
//!
//! The external value store and live feed, seen from the client. The backend
//! is a dumb store: it keeps rows, bumps counters, and announces inserts.
//! Physics never waits on it.
//!
//! Features:
//! - Recent-bubble query and single-record lookup
//! - Insert with bridge-assigned identifiers
//! - Best-effort batched position upserts
//! - Insert notifications delivered over a channel

pub mod memory;
pub mod validate;

pub use memory::MemoryBridge;
pub use validate::{clean_message, validate_record};

use std::sync::mpsc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, WriteError};
use crate::sim::{Bubble, BubbleId, User};

/// A bubble as submitted, before the bridge assigns identity and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleDraft {
    pub author: User,
    pub message: String,
    pub pos: Vec2,
    pub vel: Vec2,
}

impl BubbleDraft {
    pub fn from_bubble(bubble: &Bubble) -> Self {
        Self {
            author: bubble.user.clone(),
            message: bubble.message.clone(),
            pos: bubble.pos,
            vel: bubble.vel,
        }
    }
}

/// One row of a position flush
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate<'a> {
    pub id: &'a str,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl<'a> PositionUpdate<'a> {
    pub fn of(bubble: &'a Bubble) -> Self {
        Self {
            id: bubble.id.as_str(),
            x: bubble.pos.x,
            y: bubble.pos.y,
            vx: bubble.vel.x,
            vy: bubble.vel.y,
        }
    }
}

/// Live-feed announcement of a newly inserted bubble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedNotice {
    pub id: BubbleId,
}

pub type FeedSender = mpsc::Sender<FeedNotice>;
pub type FeedReceiver = mpsc::Receiver<FeedNotice>;

/// Live-feed subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// The external store, as the reconciliation layer consumes it
pub trait Bridge {
    /// Most recent bubbles, newest first, each with its owner snapshot
    fn fetch_recent(&mut self, limit: usize) -> Result<Vec<Bubble>, FetchError>;

    /// Full record of one bubble, owner snapshot included
    fn fetch_one(&mut self, id: &BubbleId) -> Result<Bubble, FetchError>;

    /// Store a new bubble; returns the canonical record with the bridge's id
    fn insert(&mut self, draft: &BubbleDraft) -> Result<Bubble, WriteError>;

    /// Count one reaction. Unknown ids are ignored by the backend.
    fn increment_reaction(&mut self, id: &BubbleId) -> Result<(), WriteError>;

    /// Best effort: rows may be partially applied on failure
    fn upsert_positions(&mut self, batch: &[PositionUpdate<'_>]) -> Result<(), WriteError>;

    /// Deliver a notice on `sink` for every insert from now on
    fn subscribe_inserts(&mut self, sink: FeedSender) -> Result<Subscription, FetchError>;
}
