//! Animation driver
//!
//! Runs one simulation tick per display frame while there is something to
//! animate. The host owns the actual frame signal (`requestAnimationFrame` on
//! web, a loop natively) behind `FrameScheduler`; the driver only decides
//! when a frame is wanted and makes sure at most one is ever pending.

/// Identifies a scheduled frame so it can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Source of frame callbacks
pub trait FrameScheduler {
    /// Ask for one callback at the next frame. `None` if the platform refused.
    fn request_frame(&mut self) -> Option<FrameHandle>;
    /// Withdraw a request that has not fired yet
    fn cancel_frame(&mut self, handle: FrameHandle);
}

#[derive(Debug, Default)]
pub struct AnimationDriver {
    pending: Option<FrameHandle>,
    torn_down: bool,
    frames: u64,
}

impl AnimationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame is scheduled
    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    /// Frames run since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Start when there are bubbles, stop when there are none
    pub fn sync(&mut self, has_bubbles: bool, scheduler: &mut impl FrameScheduler) {
        if self.torn_down {
            return;
        }
        match (has_bubbles, self.pending) {
            (true, None) => {
                self.schedule(scheduler);
                log::debug!("Animation started");
            }
            (false, Some(handle)) => {
                scheduler.cancel_frame(handle);
                self.pending = None;
                log::debug!("Animation stopped (no bubbles)");
            }
            _ => {}
        }
    }

    /// Handle a fired frame: run `frame` (which returns the bubble count
    /// afterwards) and schedule the next one if anything is left.
    ///
    /// Frames that were cancelled or arrive after teardown are ignored.
    pub fn on_frame(
        &mut self,
        scheduler: &mut impl FrameScheduler,
        frame: impl FnOnce() -> usize,
    ) -> bool {
        if self.torn_down || self.pending.take().is_none() {
            return false;
        }

        self.frames += 1;
        let remaining = frame();
        if remaining > 0 {
            self.schedule(scheduler);
        } else {
            log::debug!("Animation stopped (no bubbles)");
        }
        true
    }

    /// Cancel the pending frame and refuse to schedule more
    pub fn teardown(&mut self, scheduler: &mut impl FrameScheduler) {
        if let Some(handle) = self.pending.take() {
            scheduler.cancel_frame(handle);
        }
        self.torn_down = true;
    }

    /// Allow scheduling again after a teardown
    pub fn revive(&mut self) {
        self.torn_down = false;
    }

    fn schedule(&mut self, scheduler: &mut impl FrameScheduler) {
        // Never more than one outstanding request
        if let Some(previous) = self.pending.take() {
            scheduler.cancel_frame(previous);
        }
        self.pending = scheduler.request_frame();
        if self.pending.is_none() {
            log::warn!("Frame request refused; animation idle");
        }
    }
}

/// Scheduler driven by hand: tests and the native demo fire frames explicitly
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Vec<FrameHandle>,
    requested: u64,
    cancelled: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet fired or cancelled
    pub fn pending(&self) -> &[FrameHandle] {
        &self.pending
    }

    /// Fire the oldest pending request, if any
    pub fn fire(&mut self) -> Option<FrameHandle> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> Option<FrameHandle> {
        self.next_id += 1;
        self.requested += 1;
        let handle = FrameHandle(self.next_id);
        self.pending.push(handle);
        Some(handle)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let before = self.pending.len();
        self.pending.retain(|h| *h != handle);
        if self.pending.len() != before {
            self.cancelled += 1;
        }
    }
}
