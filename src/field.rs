//! Bubble field
//!
//! The surface the UI talks to. Owns the entity store and wires the physics
//! stepper, animation driver and reconciliation layer around it; every store
//! mutation goes through here, on the caller's single control flow.
//!
//! The host calls:
//! - `on_frame()` whenever the scheduler fires
//! - `pump()` from a wall-clock timer to drain the live feed and run the
//!   periodic position flush. Frames stop while the field is empty, so the
//!   pump must not ride on them.

use std::rc::Rc;

use chrono::Duration;

use crate::driver::{AnimationDriver, FrameScheduler};
use crate::error::{MessageError, SyncError};
use crate::persistence::Bridge;
use crate::platform::Clock;
use crate::reconcile::Reconciler;
use crate::settings::Settings;
use crate::sim::{
    Bubble, BubbleId, BubbleStore, PhysicsParams, Retention, Spawner, User, Viewport, step,
};

/// Called with the current bubbles after every animation frame
pub type Observer = Box<dyn FnMut(&[Bubble])>;

pub struct BubbleField<B: Bridge, S: FrameScheduler> {
    store: BubbleStore,
    reconciler: Reconciler<B>,
    driver: AnimationDriver,
    scheduler: S,
    clock: Rc<dyn Clock>,
    viewport: Viewport,
    physics: PhysicsParams,
    retention: usize,
    observers: Vec<Observer>,
}

impl<B: Bridge, S: FrameScheduler> BubbleField<B, S> {
    /// Create an unmounted field. Until `mount`, the store is purely local and
    /// unbounded.
    pub fn new(
        settings: &Settings,
        width: f32,
        height: f32,
        bridge: B,
        scheduler: S,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let settings = settings.clone().validated();
        let spawner = match settings.spawn_seed {
            Some(seed) => Spawner::new(seed),
            None => Spawner::from_entropy(),
        };

        let mut reconciler = Reconciler::new(bridge, spawner);
        reconciler.set_limit(settings.retention);
        reconciler.set_flush_interval(Duration::milliseconds(settings.flush_interval_ms));
        reconciler.set_spawn_speed(settings.effective_spawn_speed());

        Self {
            store: BubbleStore::new(Retention::Unbounded),
            reconciler,
            driver: AnimationDriver::new(),
            scheduler,
            clock,
            viewport: Viewport::new(width, height, settings.margins),
            physics: settings.effective_physics(),
            retention: settings.retention.max(1),
            observers: Vec::new(),
        }
    }

    /// Attach to the live feed and load the recent bubbles.
    ///
    /// From here on the store keeps only the most recent `retention` bubbles.
    pub fn mount(&mut self) {
        self.driver.revive();
        for bubble in self
            .store
            .set_retention(Retention::MostRecent(self.retention))
        {
            log::debug!("Evicted bubble {} on mount", bubble.id);
        }
        self.reconciler.mount(&mut self.store);
        log::info!("Field mounted with {} bubbles", self.store.len());
        self.settle();
    }

    /// Release the pending frame and the live-feed subscription
    pub fn teardown(&mut self) {
        self.driver.teardown(&mut self.scheduler);
        self.reconciler.teardown();
        log::info!("Field torn down");
    }

    /// Show a new bubble from `author` right away and send it to the bridge
    pub fn add_bubble(&mut self, message: &str, author: &User) -> Result<BubbleId, MessageError> {
        let now = self.clock.now();
        let id = self
            .reconciler
            .add_local(&mut self.store, message, author, &self.viewport, now)?;
        self.settle();
        Ok(id)
    }

    /// Count a reaction. Unknown ids are ignored.
    pub fn add_reaction(&mut self, id: &BubbleId) {
        self.reconciler.add_reaction(&mut self.store, id);
    }

    /// Current bubbles, oldest first
    pub fn bubbles(&self) -> &[Bubble] {
        self.store.as_slice()
    }

    pub fn get(&self, id: &BubbleId) -> Option<&Bubble> {
        self.store.get(id)
    }

    /// Register a view to re-render after every frame
    pub fn subscribe(&mut self, observer: impl FnMut(&[Bubble]) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Route bridge failures somewhere other than the log
    pub fn on_error(&mut self, hook: impl FnMut(&SyncError) + 'static) {
        self.reconciler.set_reporter(Box::new(hook));
    }

    /// Run one simulation tick for a fired frame. Returns false for frames
    /// that were cancelled or arrive after teardown.
    pub fn on_frame(&mut self) -> bool {
        let Self {
            store,
            driver,
            scheduler,
            viewport,
            physics,
            observers,
            ..
        } = self;

        driver.on_frame(scheduler, || {
            step(store.motion_mut(), viewport, physics);
            for observer in observers.iter_mut() {
                observer(store.as_slice());
            }
            store.len()
        })
    }

    /// Drain the live feed and flush positions if due.
    /// Returns how many feed records were merged.
    pub fn pump(&mut self) -> usize {
        let merged = self.reconciler.pump_feed(&mut self.store);
        let now = self.clock.now();
        self.reconciler.maybe_flush(&self.store, now);
        self.settle();
        merged
    }

    /// Reload the most recent bubbles from the bridge
    pub fn refresh(&mut self) -> Result<usize, SyncError> {
        let result = self.reconciler.refresh(&mut self.store);
        self.settle();
        result
    }

    /// Send every bridge-backed position now, outside the periodic schedule
    pub fn flush(&mut self) {
        self.reconciler.flush_positions(&self.store);
    }

    /// New viewport size. Bubbles outside the new bounds are pulled back
    /// inside on the next tick.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.width = width;
        self.viewport.height = height;
        log::debug!("Viewport resized to {}x{}", width, height);
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn physics(&self) -> &PhysicsParams {
        &self.physics
    }

    /// "5m ago" style age of a bubble
    pub fn age_of(&self, id: &BubbleId) -> Option<String> {
        let now = self.clock.now();
        self.store
            .get(id)
            .map(|b| crate::format_age(b.created_at, now))
    }

    /// Current bubbles as pretty JSON
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self.store.as_slice())
    }

    pub fn is_animating(&self) -> bool {
        self.driver.is_running()
    }

    pub fn frames(&self) -> u64 {
        self.driver.frames()
    }

    pub fn is_subscribed(&self) -> bool {
        self.reconciler.is_subscribed()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn bridge(&self) -> &B {
        self.reconciler.bridge()
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        self.reconciler.bridge_mut()
    }

    /// Start or stop the frame loop to match the store
    fn settle(&mut self) {
        let was_running = self.driver.is_running();
        self.driver.sync(!self.store.is_empty(), &mut self.scheduler);

        // No more frames are coming: views still need to see the empty set
        if was_running && self.store.is_empty() {
            for observer in self.observers.iter_mut() {
                observer(&[]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ManualScheduler;
    use crate::persistence::MemoryBridge;
    use crate::platform::ManualClock;
    use crate::sim::state::fixtures::{bubble, user};
    use chrono::{TimeZone, Utc};
    use glam::Vec2;
    use std::cell::{Cell, RefCell};

    struct Fixture {
        field: BubbleField<MemoryBridge, ManualScheduler>,
        bridge: MemoryBridge,
        clock: ManualClock,
    }

    fn fixture(settings: Settings) -> Fixture {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let bridge = MemoryBridge::new(Rc::new(clock.clone()));
        let field = BubbleField::new(
            &settings,
            1280.0,
            800.0,
            bridge.clone(),
            ManualScheduler::new(),
            Rc::new(clock.clone()),
        );
        Fixture {
            field,
            bridge,
            clock,
        }
    }

    fn seeded() -> Settings {
        Settings {
            spawn_seed: Some(7),
            ..Settings::default()
        }
    }

    /// Fire pending frames and pump, `n` times
    fn run_frames(field: &mut BubbleField<MemoryBridge, ManualScheduler>, n: usize) {
        for _ in 0..n {
            if field.scheduler_mut().fire().is_some() {
                field.on_frame();
            }
            field.pump();
        }
    }

    #[test]
    fn test_driver_follows_bubble_count() {
        let mut f = fixture(seeded());
        f.field.mount();
        assert!(!f.field.is_animating());
        assert!(f.field.scheduler().pending().is_empty());

        f.field.add_bubble("hello", &user("me")).unwrap();
        assert!(f.field.is_animating());

        f.field.add_bubble("again", &user("me")).unwrap();
        assert_eq!(f.field.scheduler().pending().len(), 1);

        run_frames(&mut f.field, 10);
        assert_eq!(f.field.frames(), 10);
        assert_eq!(f.field.scheduler().pending().len(), 1);
    }

    #[test]
    fn test_remote_insert_wakes_idle_field() {
        let mut f = fixture(seeded());
        f.field.mount();
        assert!(f.field.bubbles().is_empty());
        assert!(!f.field.is_animating());

        let mut other_client = f.bridge.clone();
        let draft = crate::persistence::BubbleDraft::from_bubble(&bubble("r", 0, Vec2::new(400.0, 300.0)));
        let id = other_client.insert(&draft).unwrap().id;

        // No frame is pending, so only the pump can pick this up
        assert!(f.field.scheduler().pending().is_empty());
        assert_eq!(f.field.pump(), 1);
        assert!(f.field.get(&id).is_some());
        assert!(f.field.is_animating());
        assert_eq!(f.field.scheduler().pending().len(), 1);
    }

    #[test]
    fn test_settings_validated_on_construction() {
        let mut settings = seeded();
        settings.physics.damping = 1.5;
        settings.physics.repulsion = -1.0;
        settings.retention = 0;
        let f = fixture(settings);

        assert_eq!(f.field.physics().damping, crate::consts::DAMPING);
        assert_eq!(f.field.physics().repulsion, crate::consts::REPULSION);
    }

    #[test]
    fn test_local_only_field_is_unbounded() {
        let mut settings = seeded();
        settings.retention = 2;
        let mut f = fixture(settings);

        // Not mounted: purely local
        for i in 0..5 {
            f.field.add_bubble(&format!("msg {}", i), &user("me")).unwrap();
        }
        assert_eq!(f.field.bubbles().len(), 5);

        f.field.mount();
        assert_eq!(f.field.bubbles().len(), 2);
    }

    #[test]
    fn test_invalid_message_rejected_without_side_effects() {
        let mut f = fixture(seeded());
        f.field.mount();
        assert!(f.field.add_bubble("   ", &user("me")).is_err());
        assert!(f.field.bubbles().is_empty());
        assert!(!f.field.is_animating());
        assert_eq!(f.bridge.row_count(), 0);
    }

    #[test]
    fn test_refresh_then_feed_duplicate() {
        let mut f = fixture(seeded());
        let a = bubble("a", 0, Vec2::new(300.0, 300.0));
        let b = bubble("b", 10, Vec2::new(600.0, 300.0));
        f.bridge.seed(a.clone());
        f.bridge.seed(b);

        f.field.mount();
        assert_eq!(f.field.bubbles().len(), 2);

        f.bridge.renotify(&a.id);
        assert_eq!(f.field.pump(), 1);
        assert_eq!(f.field.bubbles().len(), 2);
    }

    #[test]
    fn test_observers_called_once_per_frame() {
        let mut f = fixture(seeded());
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::new(RefCell::new(0));
        {
            let calls = calls.clone();
            let seen = seen.clone();
            f.field.subscribe(move |bubbles| {
                calls.set(calls.get() + 1);
                *seen.borrow_mut() = bubbles.len();
            });
        }

        f.field.mount();
        f.field.add_bubble("one", &user("me")).unwrap();
        f.field.add_bubble("two", &user("me")).unwrap();
        assert_eq!(calls.get(), 0);

        run_frames(&mut f.field, 3);
        assert_eq!(calls.get(), 3);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut f = fixture(seeded());
        f.field.mount();
        f.field.add_bubble("bye", &user("me")).unwrap();
        assert!(f.field.is_subscribed());
        assert_eq!(f.bridge.subscriber_count(), 1);

        f.field.teardown();
        assert!(f.field.scheduler().pending().is_empty());
        assert!(!f.field.is_subscribed());
        assert_eq!(f.bridge.subscriber_count(), 0);

        // Inserts from elsewhere no longer reach this field
        let mut remote = f.bridge.clone();
        let other = bubble("x", 0, Vec2::new(400.0, 400.0));
        remote
            .insert(&crate::persistence::BubbleDraft::from_bubble(&other))
            .unwrap();
        assert_eq!(f.field.pump(), 0);

        // Nothing reschedules after teardown
        f.field.add_bubble("late", &user("me")).unwrap();
        assert!(f.field.scheduler().pending().is_empty());
        assert!(!f.field.on_frame());

        // Remounting brings both back
        f.field.mount();
        assert!(f.field.is_subscribed());
        assert_eq!(f.field.scheduler().pending().len(), 1);
    }

    #[test]
    fn test_frames_keep_bubbles_in_bounds() {
        let mut f = fixture(seeded());
        f.field.mount();
        for i in 0..12 {
            f.field.add_bubble(&format!("crowd {}", i), &user("me")).unwrap();
        }

        run_frames(&mut f.field, 200);
        let viewport = *f.field.viewport();
        assert!(f.field.bubbles().iter().all(|b| viewport.contains(b.pos)));

        // Shrinking pulls everything back inside on the next tick
        f.field.resize(700.0, 500.0);
        run_frames(&mut f.field, 1);
        let viewport = *f.field.viewport();
        assert!(f.field.bubbles().iter().all(|b| viewport.contains(b.pos)));
    }

    #[test]
    fn test_periodic_flush_uses_wall_clock() {
        let mut f = fixture(seeded());
        f.field.mount();
        f.field.add_bubble("moving", &user("me")).unwrap();

        // Many frames within one interval: no flush
        f.field.pump();
        run_frames(&mut f.field, 50);
        assert_eq!(f.bridge.position_batches(), 0);

        f.clock.advance(Duration::milliseconds(5_000));
        f.field.pump();
        assert_eq!(f.bridge.position_batches(), 1);
    }

    #[test]
    fn test_bridge_outage_keeps_simulation_running() {
        let mut f = fixture(seeded());
        let errors = Rc::new(Cell::new(0));
        {
            let errors = errors.clone();
            f.field.on_error(move |_| errors.set(errors.get() + 1));
        }

        f.bridge.set_offline(true);
        f.field.mount();
        let id = f.field.add_bubble("offline", &user("me")).unwrap();
        assert!(id.is_local());

        f.field.add_reaction(&id);
        assert_eq!(f.field.get(&id).map(|b| b.reactions), Some(1));

        let start = f.field.get(&id).map(|b| b.pos);
        run_frames(&mut f.field, 5);
        assert_eq!(f.field.frames(), 5);
        assert_ne!(f.field.get(&id).map(|b| b.pos), start);

        // Subscribe, refresh, insert and reaction all failed
        assert_eq!(errors.get(), 4);
    }

    #[test]
    fn test_unknown_reaction_is_noop() {
        let mut f = fixture(seeded());
        f.field.mount();
        f.field.add_bubble("hi", &user("me")).unwrap();
        let before = f.field.snapshot_json().unwrap();
        f.field.add_reaction(&BubbleId::new("nope"));
        assert_eq!(f.field.snapshot_json().unwrap(), before);
    }

    #[test]
    fn test_age_and_snapshot() {
        let mut f = fixture(seeded());
        f.field.mount();
        let id = f.field.add_bubble("tick tock", &user("me")).unwrap();
        assert_eq!(f.field.age_of(&id).as_deref(), Some("Just now"));

        f.clock.advance(Duration::minutes(90));
        assert_eq!(f.field.age_of(&id).as_deref(), Some("1h ago"));

        let json: serde_json::Value = serde_json::from_str(&f.field.snapshot_json().unwrap()).unwrap();
        assert_eq!(json[0]["message"], "tick tock");
    }
}
