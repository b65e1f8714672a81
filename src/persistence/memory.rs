//! In-process bridge
//!
//! Behaves like the hosted store (bridge-assigned ids, profile join, insert
//! notifications) without a network. Clones share one backend, so a clone can
//! play "another client" in tests and the demo. Failures can be switched on
//! per operation class.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Duration, Utc};
use glam::Vec2;
use uuid::Uuid;

use super::{Bridge, BubbleDraft, FeedNotice, FeedSender, PositionUpdate, Subscription};
use crate::error::{FetchError, WriteError};
use crate::platform::{Clock, SystemClock};
use crate::sim::{Bubble, BubbleId, Origin, User};

/// Stored bubble row (owner kept separately, as in the hosted schema)
#[derive(Debug, Clone)]
struct Row {
    id: BubbleId,
    user_id: String,
    message: String,
    created_at: DateTime<Utc>,
    pos: Vec2,
    vel: Vec2,
    reactions: u32,
}

struct Inner {
    rows: Vec<Row>,
    profiles: HashMap<String, User>,
    subscribers: Vec<(u64, FeedSender)>,
    next_subscriber: u64,
    clock: Rc<dyn Clock>,
    fail_fetches: bool,
    fail_writes: bool,
    position_batches: usize,
}

impl Inner {
    fn join(&self, row: &Row) -> Bubble {
        let user = self.profiles.get(&row.user_id).cloned().unwrap_or_else(|| User {
            id: row.user_id.clone(),
            name: "Unknown".to_string(),
            avatar: None,
            aura: 0,
            is_online: false,
        });
        Bubble {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            message: row.message.clone(),
            created_at: row.created_at,
            pos: row.pos,
            vel: row.vel,
            reactions: row.reactions,
            user,
            origin: Origin::Remote,
        }
    }

    fn announce(&mut self, id: &BubbleId) {
        // Receivers that went away are dropped from the list
        self.subscribers
            .retain(|(_, sink)| sink.send(FeedNotice { id: id.clone() }).is_ok());
    }

    fn check_fetch(&self) -> Result<(), FetchError> {
        if self.fail_fetches {
            Err(FetchError::Transport("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> Result<(), WriteError> {
        if self.fail_writes {
            Err(WriteError::Transport("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct MemoryBridge {
    inner: Rc<RefCell<Inner>>,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new(Rc::new(SystemClock))
    }
}

impl MemoryBridge {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                rows: Vec::new(),
                profiles: HashMap::new(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                clock,
                fail_fetches: false,
                fail_writes: false,
                position_batches: 0,
            })),
        }
    }

    /// Backend preloaded with three profiles and a bubble from each
    pub fn with_demo_content(clock: Rc<dyn Clock>) -> Self {
        let bridge = Self::new(clock.clone());
        let now = clock.now();

        let demo = [
            ("1", "ArtisticSoul", 42, true, "Just discovered this amazing new art technique! ✨", 300, 3, (240.0, 220.0)),
            ("2", "TechExplorer", 38, true, "Good vibes only! Spreading positivity everywhere 🌟", 180, 7, (520.0, 340.0)),
            ("3", "DreamCatcher", 51, false, "Dreams are the seeds of reality 🌱", 120, 12, (780.0, 260.0)),
        ];

        for (i, (user_id, name, aura, online, message, age, reactions, (x, y))) in
            demo.into_iter().enumerate()
        {
            let user = User {
                id: user_id.to_string(),
                name: name.to_string(),
                avatar: None,
                aura,
                is_online: online,
            };
            let drift = if i % 2 == 0 { 0.02 } else { -0.02 };
            bridge.seed(Bubble {
                id: BubbleId::new(format!("demo-{}", i + 1)),
                user_id: user.id.clone(),
                message: message.to_string(),
                created_at: now - Duration::seconds(age),
                pos: Vec2::new(x, y),
                vel: Vec2::new(drift, -drift / 2.0),
                reactions,
                user,
                origin: Origin::Remote,
            });
        }
        bridge
    }

    /// Store a record as-is (no validation, no notification)
    pub fn seed(&self, bubble: Bubble) {
        let mut inner = self.inner.borrow_mut();
        inner
            .profiles
            .entry(bubble.user.id.clone())
            .or_insert_with(|| bubble.user.clone());
        inner.rows.push(Row {
            id: bubble.id,
            user_id: bubble.user_id,
            message: bubble.message,
            created_at: bubble.created_at,
            pos: bubble.pos,
            vel: bubble.vel,
            reactions: bubble.reactions,
        });
    }

    /// Store a record as-is and announce it on the feed
    pub fn publish(&self, bubble: Bubble) {
        let id = bubble.id.clone();
        self.seed(bubble);
        self.inner.borrow_mut().announce(&id);
    }

    /// Announce an existing record again (duplicate delivery)
    pub fn renotify(&self, id: &BubbleId) {
        self.inner.borrow_mut().announce(id);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.inner.borrow_mut().fail_fetches = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Both reads and writes fail
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.fail_fetches = offline;
        inner.fail_writes = offline;
    }

    pub fn row_count(&self) -> usize {
        self.inner.borrow().rows.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Position batches accepted so far
    pub fn position_batches(&self) -> usize {
        self.inner.borrow().position_batches
    }

    /// Stored record, joined with its owner
    pub fn record(&self, id: &BubbleId) -> Option<Bubble> {
        let inner = self.inner.borrow();
        inner.rows.iter().find(|r| &r.id == id).map(|r| inner.join(r))
    }

    pub fn profile(&self, user_id: &str) -> Option<User> {
        self.inner.borrow().profiles.get(user_id).cloned()
    }
}

impl Bridge for MemoryBridge {
    fn fetch_recent(&mut self, limit: usize) -> Result<Vec<Bubble>, FetchError> {
        let inner = self.inner.borrow();
        inner.check_fetch()?;

        let mut rows: Vec<&Row> = inner.rows.iter().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().take(limit).map(|r| inner.join(r)).collect())
    }

    fn fetch_one(&mut self, id: &BubbleId) -> Result<Bubble, FetchError> {
        let inner = self.inner.borrow();
        inner.check_fetch()?;

        inner
            .rows
            .iter()
            .find(|r| &r.id == id)
            .map(|r| inner.join(r))
            .ok_or_else(|| FetchError::NotFound(id.clone()))
    }

    fn insert(&mut self, draft: &BubbleDraft) -> Result<Bubble, WriteError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;

        inner
            .profiles
            .entry(draft.author.id.clone())
            .or_insert_with(|| draft.author.clone());

        let row = Row {
            id: BubbleId::new(Uuid::new_v4().to_string()),
            user_id: draft.author.id.clone(),
            message: draft.message.clone(),
            created_at: inner.clock.now(),
            pos: draft.pos,
            vel: draft.vel,
            reactions: 0,
        };
        let record = inner.join(&row);
        inner.rows.push(row);
        inner.announce(&record.id);
        Ok(record)
    }

    fn increment_reaction(&mut self, id: &BubbleId) -> Result<(), WriteError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;

        let Some(row) = inner.rows.iter_mut().find(|r| &r.id == id) else {
            return Ok(());
        };
        row.reactions += 1;
        let owner = row.user_id.clone();
        if let Some(profile) = inner.profiles.get_mut(&owner) {
            profile.aura += 1;
        }
        Ok(())
    }

    fn upsert_positions(&mut self, batch: &[PositionUpdate<'_>]) -> Result<(), WriteError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;

        for update in batch {
            if let Some(row) = inner.rows.iter_mut().find(|r| r.id.as_str() == update.id) {
                row.pos = Vec2::new(update.x, update.y);
                row.vel = Vec2::new(update.vx, update.vy);
            }
        }
        inner.position_batches += 1;
        Ok(())
    }

    fn subscribe_inserts(&mut self, sink: FeedSender) -> Result<Subscription, FetchError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_fetch()?;

        let key = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((key, sink));

        let backend: Weak<RefCell<Inner>> = Rc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = backend.upgrade() {
                inner.borrow_mut().subscribers.retain(|(k, _)| *k != key);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualClock;
    use crate::sim::state::fixtures::{bubble, user};
    use chrono::TimeZone;
    use std::sync::mpsc;

    fn bridge() -> (MemoryBridge, ManualClock) {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        (MemoryBridge::new(Rc::new(clock.clone())), clock)
    }

    fn draft(message: &str) -> BubbleDraft {
        BubbleDraft {
            author: user("u1"),
            message: message.to_string(),
            pos: Vec2::new(300.0, 300.0),
            vel: Vec2::ZERO,
        }
    }

    #[test]
    fn test_fetch_recent_newest_first_with_limit() {
        let (mut bridge, clock) = bridge();
        for i in 0..5 {
            bridge.insert(&draft(&format!("m{}", i))).unwrap();
            clock.advance(Duration::seconds(1));
        }

        let recent = bridge.fetch_recent(3).unwrap();
        let messages: Vec<&str> = recent.iter().map(|b| b.message.as_str()).collect();
        assert_eq!(messages, vec!["m4", "m3", "m2"]);
        assert!(recent.iter().all(|b| b.origin == Origin::Remote));
    }

    #[test]
    fn test_insert_assigns_id_and_notifies() {
        let (mut bridge, _) = bridge();
        let (tx, rx) = mpsc::channel();
        let _sub = bridge.subscribe_inserts(tx).unwrap();

        let record = bridge.insert(&draft("hi")).unwrap();
        assert!(!record.id.is_local());
        assert_eq!(record.user.name, "user-u1");
        assert_eq!(rx.try_recv().unwrap(), FeedNotice { id: record.id });
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let (mut bridge, _) = bridge();
        let (tx, _rx) = mpsc::channel();
        let sub = bridge.subscribe_inserts(tx).unwrap();
        assert_eq!(bridge.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bridge.subscriber_count(), 0);
    }

    #[test]
    fn test_reaction_bumps_row_and_profile() {
        let (mut bridge, _) = bridge();
        let record = bridge.insert(&draft("hi")).unwrap();
        bridge.increment_reaction(&record.id).unwrap();
        bridge.increment_reaction(&BubbleId::new("unknown")).unwrap();

        assert_eq!(bridge.record(&record.id).unwrap().reactions, 1);
        assert_eq!(bridge.profile("u1").unwrap().aura, 11);
    }

    #[test]
    fn test_failures_switchable() {
        let (mut bridge, _) = bridge();
        bridge.set_offline(true);
        assert!(bridge.fetch_recent(10).is_err());
        assert!(bridge.insert(&draft("hi")).is_err());
        assert!(bridge.upsert_positions(&[]).is_err());

        bridge.set_offline(false);
        assert!(bridge.fetch_recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_positions_applied_to_known_rows() {
        let (mut bridge, _) = bridge();
        let mut moved = bubble("b1", 0, Vec2::new(1.0, 1.0));
        bridge.seed(moved.clone());
        moved.pos = Vec2::new(400.0, 250.0);

        let ghost = bubble("ghost", 0, Vec2::ZERO);
        bridge
            .upsert_positions(&[PositionUpdate::of(&moved), PositionUpdate::of(&ghost)])
            .unwrap();

        assert_eq!(bridge.record(&moved.id).unwrap().pos, Vec2::new(400.0, 250.0));
        assert_eq!(bridge.row_count(), 1);
        assert_eq!(bridge.position_batches(), 1);
    }

    #[test]
    fn test_demo_content() {
        let mut demo = MemoryBridge::with_demo_content(Rc::new(SystemClock));
        assert_eq!(demo.row_count(), 3);
        assert_eq!(demo.profile("3").unwrap().name, "DreamCatcher");

        // Oldest demo bubble is listed last
        let recent = demo.fetch_recent(10).unwrap();
        assert_eq!(recent[2].id.as_str(), "demo-1");
    }
}
