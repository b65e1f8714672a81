//! Entity store
//!
//! Single owner of every bubble on screen. Bubbles are kept ordered by
//! creation time (oldest first), identifiers are unique, and an optional
//! retention bound drops the oldest bubbles on overflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Bubble, BubbleId, Origin};

/// How many bubbles the store keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Retention {
    /// Keep everything (purely local operation)
    Unbounded,
    /// Keep the N most recently created bubbles
    MostRecent(usize),
}

impl Retention {
    pub fn limit(&self) -> Option<usize> {
        match self {
            Retention::Unbounded => None,
            Retention::MostRecent(n) => Some(*n),
        }
    }
}

/// Result of putting a bubble into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// New identifier, bubble added
    Inserted,
    /// Identifier already present, record folded into the existing bubble
    Merged,
}

#[derive(Debug, Clone)]
pub struct BubbleStore {
    bubbles: Vec<Bubble>,
    retention: Retention,
}

impl BubbleStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            bubbles: Vec::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Change the retention bound, evicting immediately if it shrank
    pub fn set_retention(&mut self, retention: Retention) -> Vec<Bubble> {
        self.retention = retention;
        self.enforce_retention()
    }

    /// All bubbles, oldest first
    pub fn as_slice(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// Mutable view for the physics stepper (motion fields only by convention)
    pub fn motion_mut(&mut self) -> &mut [Bubble] {
        &mut self.bubbles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter()
    }

    pub fn contains(&self, id: &BubbleId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: &BubbleId) -> Option<&Bubble> {
        self.index_of(id).map(|i| &self.bubbles[i])
    }

    pub fn get_mut(&mut self, id: &BubbleId) -> Option<&mut Bubble> {
        self.index_of(id).map(move |i| &mut self.bubbles[i])
    }

    fn index_of(&self, id: &BubbleId) -> Option<usize> {
        self.bubbles.iter().position(|b| &b.id == id)
    }

    /// Insert a bubble, or fold it into the bubble with the same identifier.
    ///
    /// Returns what happened plus any bubbles the retention bound evicted.
    pub fn upsert(&mut self, bubble: Bubble) -> (Upsert, Vec<Bubble>) {
        if let Some(existing) = self.get_mut(&bubble.id) {
            existing.absorb(bubble);
            return (Upsert::Merged, Vec::new());
        }

        self.insert_ordered(bubble);
        (Upsert::Inserted, self.enforce_retention())
    }

    /// Give a bubble the identifier and creation time the bridge assigned.
    ///
    /// If a copy under the new identifier already arrived, the two collapse
    /// into one, keeping this bubble's motion. The bubble moves to its place
    /// in creation order under the bridge timestamp.
    pub fn adopt_id(&mut self, old: &BubbleId, new: BubbleId, created_at: DateTime<Utc>) -> bool {
        let Some(index) = self.index_of(old) else {
            return false;
        };
        let mut bubble = self.bubbles.remove(index);

        let echo = self.index_of(&new).map(|i| self.bubbles.remove(i));

        bubble.id = new;
        bubble.created_at = created_at;
        bubble.origin = bubble.origin.confirm();
        if let Some(echo) = echo {
            bubble.absorb(echo);
        }
        self.insert_ordered(bubble);
        true
    }

    /// Drop every bubble matching the predicate, returning them
    pub fn remove_where(&mut self, mut pred: impl FnMut(&Bubble) -> bool) -> Vec<Bubble> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.bubbles.len());
        for bubble in self.bubbles.drain(..) {
            if pred(&bubble) {
                removed.push(bubble);
            } else {
                kept.push(bubble);
            }
        }
        self.bubbles = kept;
        removed
    }

    /// Count one reaction on a bubble and credit its owner.
    ///
    /// Every bubble by the same owner carries the owner snapshot, so all of
    /// them see the new aura. Returns false if the bubble is unknown.
    pub fn add_reaction(&mut self, id: &BubbleId) -> bool {
        let Some(bubble) = self.get_mut(id) else {
            return false;
        };
        bubble.reactions = bubble.reactions.saturating_add(1);
        let owner = bubble.user_id.clone();
        let aura = bubble.user.aura.saturating_add(1);

        for b in self.bubbles.iter_mut().filter(|b| b.user_id == owner) {
            b.user.aura = b.user.aura.max(aura);
        }
        true
    }

    /// Insert keeping creation order; ties go after existing bubbles
    fn insert_ordered(&mut self, bubble: Bubble) {
        let at = self
            .bubbles
            .partition_point(|b| b.created_at <= bubble.created_at);
        self.bubbles.insert(at, bubble);
    }

    /// Drop the oldest bubbles beyond the retention bound
    fn enforce_retention(&mut self) -> Vec<Bubble> {
        let Some(limit) = self.retention.limit() else {
            return Vec::new();
        };
        if self.bubbles.len() <= limit {
            return Vec::new();
        }

        let overflow = self.bubbles.len() - limit;
        let mut evicted: Vec<Bubble> = self.bubbles.drain(..overflow).collect();
        for bubble in &mut evicted {
            bubble.origin = Origin::Evicted;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::fixtures::bubble;
    use glam::Vec2;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn p() -> Vec2 {
        Vec2::new(400.0, 300.0)
    }

    #[test]
    fn test_upsert_same_id_twice_is_one_entry() {
        let mut store = BubbleStore::new(Retention::MostRecent(10));
        assert_eq!(store.upsert(bubble("a", 0, p())).0, Upsert::Inserted);
        assert_eq!(store.upsert(bubble("a", 0, p())).0, Upsert::Merged);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest_by_creation() {
        let mut store = BubbleStore::new(Retention::MostRecent(2));
        store.upsert(bubble("new", 30, p()));
        store.upsert(bubble("old", 10, p()));
        let (_, evicted) = store.upsert(bubble("mid", 20, p()));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id.as_str(), "old");
        assert_eq!(evicted[0].origin, Origin::Evicted);
        let ids: Vec<&str> = store.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["mid", "new"]);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut store = BubbleStore::new(Retention::Unbounded);
        for i in 0..200 {
            store.upsert(bubble(&format!("b{}", i), i, p()));
        }
        assert_eq!(store.len(), 200);

        let evicted = store.set_retention(Retention::MostRecent(50));
        assert_eq!(evicted.len(), 150);
        assert_eq!(store.len(), 50);
        assert_eq!(store.as_slice()[0].id.as_str(), "b150");
    }

    #[test]
    fn test_reaction_credits_owner_everywhere() {
        let mut store = BubbleStore::new(Retention::Unbounded);
        store.upsert(bubble("a", 0, p()));
        store.upsert(bubble("b", 1, p()));

        assert!(store.add_reaction(&BubbleId::new("a")));
        let a = store.get(&BubbleId::new("a")).unwrap();
        let b = store.get(&BubbleId::new("b")).unwrap();
        assert_eq!(a.reactions, 1);
        assert_eq!(b.reactions, 0);
        assert_eq!(a.user.aura, 11);
        assert_eq!(b.user.aura, 11);
    }

    #[test]
    fn test_reaction_on_unknown_id_is_noop() {
        let mut store = BubbleStore::new(Retention::Unbounded);
        store.upsert(bubble("a", 0, p()));
        let before = store.clone();

        assert!(!store.add_reaction(&BubbleId::new("missing")));
        assert_eq!(store.as_slice()[0].reactions, before.as_slice()[0].reactions);
        assert_eq!(store.as_slice()[0].user, before.as_slice()[0].user);
    }

    #[test]
    fn test_adopt_id_collapses_early_echo() {
        let mut store = BubbleStore::new(Retention::Unbounded);
        let mut local = bubble("local-1", 5, Vec2::new(200.0, 200.0));
        local.origin = Origin::LocalPending;
        store.upsert(local);
        // Echo from the feed beat the insert acknowledgement
        let mut echo = bubble("srv-1", 5, Vec2::new(900.0, 500.0));
        echo.reactions = 2;
        store.upsert(echo);
        assert_eq!(store.len(), 2);

        let canonical = store.get(&BubbleId::new("srv-1")).unwrap().created_at;
        assert!(store.adopt_id(&BubbleId::new("local-1"), BubbleId::new("srv-1"), canonical));
        assert_eq!(store.len(), 1);
        let kept = &store.as_slice()[0];
        assert_eq!(kept.id.as_str(), "srv-1");
        assert_eq!(kept.pos, Vec2::new(200.0, 200.0));
        assert_eq!(kept.reactions, 2);
        assert_eq!(kept.origin, Origin::Confirmed);
    }

    #[test]
    fn test_adopt_unknown_id() {
        let mut store = BubbleStore::new(Retention::Unbounded);
        let now = bubble("x", 0, p()).created_at;
        assert!(!store.adopt_id(&BubbleId::new("nope"), BubbleId::new("x"), now));
    }

    #[test]
    fn test_adopt_id_takes_bridge_timestamp_and_reorders() {
        let mut store = BubbleStore::new(Retention::MostRecent(10));
        // Client clock ran ahead: the local bubble sorts after "b"
        let mut local = bubble("local-1", 50, p());
        local.origin = Origin::LocalPending;
        store.upsert(local);
        store.upsert(bubble("b", 20, p()));
        let ids: Vec<&str> = store.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "local-1"]);

        let bridge_time = bubble("srv-1", 10, p()).created_at;
        assert!(store.adopt_id(&BubbleId::new("local-1"), BubbleId::new("srv-1"), bridge_time));

        let ids: Vec<&str> = store.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1", "b"]);
        assert_eq!(store.get(&BubbleId::new("srv-1")).unwrap().created_at, bridge_time);
    }

    proptest! {
        #[test]
        fn prop_bounded_size_and_unique_ids(
            inserts in prop::collection::vec((0u8..40, 0i64..1000), 0..200),
            limit in 1usize..20,
        ) {
            let mut store = BubbleStore::new(Retention::MostRecent(limit));
            for (id, age) in inserts {
                store.upsert(bubble(&format!("b{}", id), age, p()));
                prop_assert!(store.len() <= limit);

                let ids: HashSet<_> = store.iter().map(|b| b.id.clone()).collect();
                prop_assert_eq!(ids.len(), store.len());
                prop_assert!(store.as_slice().windows(2).all(|w| w[0].created_at <= w[1].created_at));
            }
        }
    }
}
