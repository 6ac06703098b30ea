//! Per-component acquisition state and device timestamp derivation

use std::thread::{self, ThreadId};

use crate::time::{ms_to_ticks, ticks_to_ms};

/// Lifecycle of a component, and of a processing thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    /// Stop requested; already queued data is still processed
    Finishing,
}

impl RunState {
    pub fn is_active(self) -> bool {
        self != RunState::Stopped
    }
}

/// What to do with a data report for one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The component is stopped; the report is not for it
    Ignored,
    /// The report belongs to the current run
    Counted,
    /// The report is past the stop point; the component just stopped and
    /// its listener must be told
    Finished,
}

/// Progress of the finished callback owed for a component's last run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finish {
    #[default]
    Idle,
    Owed { forced: bool },
    /// Claimed by a thread that is running the callback
    Delivering(ThreadId),
}

/// Acquisition state of one logical detector element
///
/// Mutated only under the owning processor's data lock. A run's finished
/// callback is claimed under that lock and delivered outside it; the next
/// run must not begin until it has gone out.
#[derive(Debug, Clone, Default)]
pub struct Component {
    status: RunState,
    start_stop_ts: i64,
    accumulated_ms: i64,
    run_ms: i64,
    finish: Finish,
}

impl Component {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunState {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Tick at which the status last changed
    pub fn start_stop_ts(&self) -> i64 {
        self.start_stop_ts
    }

    /// Start a run at tick `now`
    ///
    /// Returns false if the component was already running.
    pub fn begin(&mut self, now: i64) -> bool {
        if self.status == RunState::Running {
            return false;
        }
        self.accumulated_ms += self.run_ms;
        self.run_ms = 0;
        self.status = RunState::Running;
        self.start_stop_ts = now;
        true
    }

    /// Request a stop at tick `now`
    ///
    /// A forced stop moves straight to `Stopped`; otherwise the component
    /// drains through `Finishing`. Returns false if it was already stopped.
    pub fn end(&mut self, force: bool, now: i64) -> bool {
        if self.status == RunState::Stopped {
            return false;
        }
        self.status = if force {
            RunState::Stopped
        } else {
            RunState::Finishing
        };
        self.start_stop_ts = now;
        true
    }

    /// Decide whether a report stamped `timestamp` belongs to this component
    /// and account its `elapsed_ms` if so
    pub fn attribute(&mut self, timestamp: i64, elapsed_ms: i64) -> Attribution {
        match self.status {
            RunState::Stopped => Attribution::Ignored,
            RunState::Finishing if timestamp > self.start_stop_ts => {
                self.status = RunState::Stopped;
                self.finish = Finish::Owed { forced: false };
                Attribution::Finished
            }
            RunState::Running | RunState::Finishing => {
                self.run_ms += elapsed_ms;
                Attribution::Counted
            }
        }
    }

    /// Mark the component stopped when its processing thread exits
    ///
    /// Returns true if it was still active, meaning its finished callback is
    /// still owed.
    pub fn settle(&mut self) -> bool {
        let was_active = self.is_active();
        self.status = RunState::Stopped;
        was_active
    }

    /// Record that the listener must be told the run ended
    pub fn owe_finish(&mut self, forced: bool) {
        self.finish = Finish::Owed { forced };
    }

    pub fn finish(&self) -> Finish {
        self.finish
    }

    /// Take an owed finished callback for delivery by the calling thread
    ///
    /// Returns whether the stop was forced, or `None` if nothing is owed.
    pub fn claim_finish(&mut self) -> Option<bool> {
        let Finish::Owed { forced } = self.finish else {
            return None;
        };
        self.finish = Finish::Delivering(thread::current().id());
        Some(forced)
    }

    /// The claiming thread has run the callback
    pub fn finish_delivered(&mut self) {
        if let Finish::Delivering(owner) = self.finish {
            if owner == thread::current().id() {
                self.finish = Finish::Idle;
            }
        }
    }

    /// True while another thread is running this component's finished
    /// callback
    pub fn finish_in_flight(&self) -> bool {
        matches!(self.finish, Finish::Delivering(owner) if owner != thread::current().id())
    }

    /// Overwrite the time of the current run (for host-timed links)
    pub fn set_run_ms(&mut self, ms: i64) {
        self.run_ms = ms;
    }

    /// Milliseconds acquired over all runs since the last reset
    pub fn real_time_ms(&self) -> i64 {
        self.accumulated_ms + self.run_ms
    }

    pub fn reset_real_time(&mut self) {
        self.accumulated_ms = 0;
        self.run_ms = 0;
    }
}

/// Turns per-report elapsed times into absolute host ticks
///
/// The first report after a restart only opens the reference point.
/// Later reports accumulate their elapsed times on top of it; a derived
/// timestamp ahead of the host clock is clamped to now and the
/// accumulator is pulled back to match, so drift can't compound.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    awaiting_first: bool,
    start: i64,
    accumulated_ms: i64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the reference point; the next report re-opens it
    pub fn restart(&mut self) {
        self.awaiting_first = true;
        self.accumulated_ms = 0;
    }

    pub fn is_awaiting_first(&self) -> bool {
        self.awaiting_first
    }

    pub fn accumulated_ms(&self) -> i64 {
        self.accumulated_ms
    }

    /// Timestamp for a report that covered `elapsed_ms`, received at `now`
    ///
    /// Returns `None` for the first report after a restart.
    pub fn advance(&mut self, elapsed_ms: u32, now: i64) -> Option<i64> {
        if self.awaiting_first {
            self.awaiting_first = false;
            self.start = now;
            self.accumulated_ms = 0;
            return None;
        }

        self.accumulated_ms += elapsed_ms as i64;
        let timestamp = self.start + ms_to_ticks(self.accumulated_ms);
        if timestamp > now {
            self.accumulated_ms = ticks_to_ms(now - self.start);
            return Some(now);
        }
        Some(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_idempotent() {
        let mut c = Component::new();
        assert!(c.begin(10));
        assert!(!c.begin(20));
        assert_eq!(c.start_stop_ts(), 10);
        assert_eq!(c.status(), RunState::Running);
    }

    #[test]
    fn test_end_while_stopped() {
        let mut c = Component::new();
        assert!(!c.end(true, 5));
        assert_eq!(c.status(), RunState::Stopped);
    }

    #[test]
    fn test_finishing_attribution() {
        let mut c = Component::new();
        c.begin(0);
        assert_eq!(c.attribute(100, 10), Attribution::Counted);
        assert!(c.end(false, 200));
        assert_eq!(c.status(), RunState::Finishing);
        assert_eq!(c.attribute(200, 10), Attribution::Counted);
        assert_eq!(c.attribute(201, 10), Attribution::Finished);
        assert_eq!(c.status(), RunState::Stopped);
        assert_eq!(c.finish(), Finish::Owed { forced: false });
        assert_eq!(c.attribute(300, 10), Attribution::Ignored);
        assert_eq!(c.real_time_ms(), 20);
    }

    #[test]
    fn test_real_time_accumulates_across_runs() {
        let mut c = Component::new();
        c.begin(0);
        c.attribute(1, 100);
        c.end(true, 2);
        c.begin(3);
        c.attribute(4, 50);
        assert_eq!(c.real_time_ms(), 150);
        c.reset_real_time();
        assert_eq!(c.real_time_ms(), 0);
    }

    #[test]
    fn test_settle() {
        let mut c = Component::new();
        assert!(!c.settle());
        c.begin(0);
        c.end(false, 1);
        assert!(c.settle());
        assert!(!c.is_active());
    }

    #[test]
    fn test_finish_is_claimed_once() {
        let mut c = Component::new();
        assert_eq!(c.claim_finish(), None);
        c.begin(0);
        c.end(true, 1);
        c.owe_finish(true);
        assert_eq!(c.claim_finish(), Some(true));
        assert_eq!(c.claim_finish(), None);
        // The claiming thread isn't waiting on itself
        assert!(!c.finish_in_flight());
        c.finish_delivered();
        assert_eq!(c.finish(), Finish::Idle);
    }

    #[test]
    fn test_finish_in_flight_on_other_thread() {
        let mut c = Component::new();
        c.owe_finish(false);
        let mut c = std::thread::spawn(move || {
            assert_eq!(c.claim_finish(), Some(false));
            c
        })
        .join()
        .unwrap();
        assert!(c.finish_in_flight());
        // Only the claiming thread can mark it delivered
        c.finish_delivered();
        assert!(c.finish_in_flight());
    }

    #[test]
    fn test_first_report_opens_reference() {
        let mut t = Timeline::new();
        t.restart();
        let now = ms_to_ticks(1_000);
        assert_eq!(t.advance(5_000, now), None);
        assert_eq!(t.accumulated_ms(), 0);
        assert_eq!(t.advance(100, now + ms_to_ticks(200)), Some(now + ms_to_ticks(100)));
    }

    #[test]
    fn test_drift_is_clamped_to_now() {
        let mut t = Timeline::new();
        t.restart();
        t.advance(0, 0);
        let now = ms_to_ticks(250);
        assert_eq!(t.advance(100, now), Some(ms_to_ticks(100)));
        assert_eq!(t.advance(100, now), Some(ms_to_ticks(200)));
        // Would be 300 ms, host says 250
        assert_eq!(t.advance(100, now), Some(now));
        assert_eq!(t.accumulated_ms(), 250);
        // Next delta builds on the corrected accumulator
        let later = ms_to_ticks(1_000);
        assert_eq!(t.advance(100, later), Some(ms_to_ticks(350)));
    }
}
