use std::time::{Duration, Instant};

/// Deadline-based rotation timer, polled by the control loop. There is no
/// timer thread: a tick can only happen inside `poll`, so once `stop` clears
/// the deadline no further tick can fire.
#[derive(Debug)]
pub struct RotationSchedule {
    interval: Duration,
    deadline: Option<Instant>,
}

impl RotationSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arms the schedule. Starting an already-running schedule does not move
    /// the pending deadline. Returns true when this call actually started it,
    /// which is the caller's cue to rotate immediately.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.interval);
        true
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// A new interval takes effect at the next re-arm; an already-pending
    /// deadline keeps its original due time.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Fires at most once per call. A due deadline re-arms at `now + interval`
    /// rather than `deadline + interval`, so a late poll does not cause a
    /// burst of catch-up ticks.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}
