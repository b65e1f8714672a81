//! Reconciliation layer
//!
//! Keeps the entity store consistent under three write sources:
//! - local composition (optimistic, visible before the bridge answers)
//! - bulk refresh of the most recent bubbles
//! - the live insert feed
//!
//! Identifier equality is the only dedup key. A locally created bubble is
//! `LocalPending` under a client id until the bridge acknowledges the insert;
//! it then adopts the bridge id and becomes `Confirmed`, so the feed echo of
//! that insert merges into it instead of adding a second bubble.
//!
//! Bridge failures are reported and never roll back local state.

use std::collections::HashSet;
use std::sync::mpsc::{self, TryRecvError};

use chrono::{DateTime, Duration, Utc};

use crate::consts::{DEFAULT_RETENTION, FLUSH_INTERVAL_MS, SPAWN_SPEED};
use crate::error::{MessageError, Reporter, SyncError, log_reporter};
use crate::persistence::{
    Bridge, BubbleDraft, FeedReceiver, PositionUpdate, Subscription, clean_message,
    validate_record,
};
use crate::sim::{Bubble, BubbleId, BubbleStore, Origin, Spawner, Upsert, User, Viewport};

/// Fires once per interval of wall-clock time, independent of frame rate
#[derive(Debug, Clone)]
pub struct FlushTimer {
    interval: Duration,
    last: Option<DateTime<Utc>>,
}

impl FlushTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True when a flush is due. The first poll only starts the period.
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now - last >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Live-feed connection: the channel end plus the handle keeping it open
struct Feed {
    notices: FeedReceiver,
    _subscription: Subscription,
}

pub struct Reconciler<B: Bridge> {
    bridge: B,
    feed: Option<Feed>,
    flush: FlushTimer,
    limit: usize,
    spawner: Spawner,
    spawn_speed: f32,
    reporter: Reporter,
}

impl<B: Bridge> Reconciler<B> {
    pub fn new(bridge: B, spawner: Spawner) -> Self {
        Self {
            bridge,
            feed: None,
            flush: FlushTimer::new(Duration::milliseconds(FLUSH_INTERVAL_MS)),
            limit: DEFAULT_RETENTION,
            spawner,
            spawn_speed: SPAWN_SPEED,
            reporter: log_reporter(),
        }
    }

    /// Bubble count requested from refreshes
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        self.flush = FlushTimer::new(interval);
    }

    pub fn set_spawn_speed(&mut self, speed: f32) {
        self.spawn_speed = speed;
    }

    pub fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = reporter;
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn is_subscribed(&self) -> bool {
        self.feed.is_some()
    }

    fn report(&mut self, err: impl Into<SyncError>) {
        let err = err.into();
        (self.reporter)(&err);
    }

    /// Subscribe to the live feed, then load the recent bubbles.
    ///
    /// Subscribing first means nothing inserted during the refresh is missed;
    /// duplicates between the two are merged by id.
    pub fn mount(&mut self, store: &mut BubbleStore) {
        if self.feed.is_none() {
            let (tx, rx) = mpsc::channel();
            match self.bridge.subscribe_inserts(tx) {
                Ok(subscription) => {
                    self.feed = Some(Feed {
                        notices: rx,
                        _subscription: subscription,
                    });
                    log::info!("Subscribed to live feed");
                }
                Err(e) => self.report(e),
            }
        }
        self.flush.reset();
        if self.refresh(store).is_err() {
            log::debug!("Mounted without initial bubbles; waiting for the live feed");
        }
    }

    /// Release the live-feed subscription
    pub fn teardown(&mut self) {
        if self.feed.take().is_some() {
            log::info!("Unsubscribed from live feed");
        }
    }

    /// Create a bubble from user input and show it immediately.
    ///
    /// The bridge insert happens afterwards; if it fails the bubble stays
    /// local. Returns the id the bubble ends up under.
    pub fn add_local(
        &mut self,
        store: &mut BubbleStore,
        message: &str,
        author: &User,
        viewport: &Viewport,
        now: DateTime<Utc>,
    ) -> Result<BubbleId, MessageError> {
        let message = clean_message(message)?;

        let local_id = self.spawner.local_id();
        let bubble = Bubble {
            id: local_id.clone(),
            user_id: author.id.clone(),
            message,
            created_at: now,
            pos: self.spawner.position(viewport),
            vel: self.spawner.velocity(self.spawn_speed),
            reactions: 0,
            user: author.clone(),
            origin: Origin::LocalPending,
        };
        let draft = BubbleDraft::from_bubble(&bubble);

        let (_, evicted) = store.upsert(bubble);
        log_evictions(&evicted);
        log::debug!("Local bubble {} shown", local_id);

        match self.bridge.insert(&draft) {
            Ok(record) => {
                if store.adopt_id(&local_id, record.id.clone(), record.created_at) {
                    log::debug!("Local bubble {} confirmed as {}", local_id, record.id);
                }
                Ok(record.id)
            }
            Err(e) => {
                self.report(e);
                Ok(local_id)
            }
        }
    }

    /// Count a reaction locally, then tell the bridge. Unknown ids do nothing.
    pub fn add_reaction(&mut self, store: &mut BubbleStore, id: &BubbleId) -> bool {
        if !store.add_reaction(id) {
            log::debug!("Reaction on unknown bubble {} ignored", id);
            return false;
        }
        if let Err(e) = self.bridge.increment_reaction(id) {
            self.report(e);
        }
        true
    }

    /// Replace bridge-backed bubbles with the most recent set from the bridge.
    ///
    /// Local bubbles the bridge has not acknowledged are kept. On failure the
    /// store is left untouched.
    pub fn refresh(&mut self, store: &mut BubbleStore) -> Result<usize, SyncError> {
        let records = match self.bridge.fetch_recent(self.limit) {
            Ok(records) => records,
            Err(e) => {
                let err = SyncError::from(e);
                (self.reporter)(&err);
                return Err(err);
            }
        };

        let records: Vec<Bubble> = records
            .into_iter()
            .filter(|record| match validate_record(record) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Dropping malformed record: {}", e);
                    (self.reporter)(&SyncError::from(e));
                    false
                }
            })
            .collect();

        let keep: HashSet<BubbleId> = records.iter().map(|r| r.id.clone()).collect();
        let dropped = store.remove_where(|b| b.origin.has_bridge_identity() && !keep.contains(&b.id));
        if !dropped.is_empty() {
            log::debug!("Refresh dropped {} stale bubbles", dropped.len());
        }

        let count = records.len();
        for record in records {
            self.merge(store, record);
        }
        log::info!("Refreshed {} bubbles ({} in store)", count, store.len());
        Ok(count)
    }

    /// Fold one bridge record into the store by id
    pub fn merge(&mut self, store: &mut BubbleStore, record: Bubble) -> Upsert {
        let id = record.id.clone();
        let (outcome, evicted) = store.upsert(record);
        match outcome {
            Upsert::Merged => log::debug!("Bubble {} already present, merged", id),
            Upsert::Inserted => log::debug!("Bubble {} added", id),
        }
        log_evictions(&evicted);
        outcome
    }

    /// Drain queued live-feed notices, fetching and merging each record.
    /// Returns how many records were merged.
    pub fn pump_feed(&mut self, store: &mut BubbleStore) -> usize {
        let mut notices = Vec::new();
        let mut disconnected = false;
        if let Some(feed) = &self.feed {
            loop {
                match feed.notices.try_recv() {
                    Ok(notice) => notices.push(notice),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            log::warn!("Live feed closed by the bridge");
            self.feed = None;
        }

        let mut merged = 0;
        for notice in notices {
            let record = match self.bridge.fetch_one(&notice.id) {
                Ok(record) => record,
                Err(e) => {
                    self.report(e);
                    continue;
                }
            };
            if let Err(e) = validate_record(&record) {
                log::warn!("Dropping malformed record: {}", e);
                self.report(e);
                continue;
            }
            self.merge(store, record);
            merged += 1;
        }
        merged
    }

    /// Flush positions if the interval has elapsed. Returns whether it ran.
    pub fn maybe_flush(&mut self, store: &BubbleStore, now: DateTime<Utc>) -> bool {
        if !self.flush.due(now) {
            return false;
        }
        self.flush_positions(store);
        true
    }

    /// Send every bridge-backed bubble's motion as one batch
    pub fn flush_positions(&mut self, store: &BubbleStore) {
        let batch: Vec<PositionUpdate<'_>> = store
            .iter()
            .filter(|b| b.origin.has_bridge_identity())
            .map(PositionUpdate::of)
            .collect();
        if batch.is_empty() {
            return;
        }

        match self.bridge.upsert_positions(&batch) {
            Ok(()) => log::debug!("Flushed {} positions", batch.len()),
            Err(e) => self.report(e),
        }
    }
}

fn log_evictions(evicted: &[Bubble]) {
    for bubble in evicted {
        log::debug!("Evicted bubble {} ({:?})", bubble.id, bubble.origin);
    }
}
