//! Edit scheduler — batches rapid local mutations.
//!
//! One scheduler per open document. Each local mutation restarts the
//! quiescence window; the batch is cut when the window elapses or on an
//! explicit flush. At most one request per document is in flight: a batch
//! that comes due mid-flight waits and goes out right after the in-flight
//! request resolves, never concurrently, which keeps the `base_version`
//! chain meaningful.
//!
//! Pure state machine over caller-supplied [`Instant`]s; the session owns
//! the actual diffing and sending.

use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct EditScheduler {
    window: Duration,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl EditScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            in_flight: false,
        }
    }

    /// A mutation landed; (re)start the quiescence window.
    pub fn record_edit(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Whether any batch is pending, due or not.
    pub fn has_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether a batch should be cut and sent now.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight && self.deadline.is_some_and(|d| d <= now)
    }

    /// Earliest instant at which `is_due` can become true.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Cut the pending batch and mark its request in flight.
    pub fn begin_flush(&mut self) {
        self.deadline = None;
        self.in_flight = true;
    }

    /// The in-flight request resolved. Returns true when a batch queued
    /// during the flight is already due and should be sent immediately.
    pub fn complete(&mut self, now: Instant) -> bool {
        self.in_flight = false;
        self.is_due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn idle_scheduler_is_never_due() {
        let scheduler = EditScheduler::new(WINDOW);
        assert!(!scheduler.has_pending());
        assert!(!scheduler.is_due(Instant::now()));
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn edit_becomes_due_after_window() {
        let t0 = Instant::now();
        let mut scheduler = EditScheduler::new(WINDOW);
        scheduler.record_edit(t0);

        assert!(scheduler.has_pending());
        assert!(!scheduler.is_due(t0));
        assert!(!scheduler.is_due(t0 + Duration::from_millis(299)));
        assert!(scheduler.is_due(t0 + WINDOW));
    }

    #[test]
    fn each_edit_restarts_the_window() {
        let t0 = Instant::now();
        let mut scheduler = EditScheduler::new(WINDOW);
        scheduler.record_edit(t0);
        scheduler.record_edit(t0 + Duration::from_millis(200));

        // The first deadline has passed, but the second edit pushed it out.
        assert!(!scheduler.is_due(t0 + WINDOW));
        assert!(scheduler.is_due(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn flush_clears_the_deadline() {
        let t0 = Instant::now();
        let mut scheduler = EditScheduler::new(WINDOW);
        scheduler.record_edit(t0);
        scheduler.begin_flush();

        assert!(!scheduler.has_pending());
        assert!(scheduler.in_flight());
        assert!(!scheduler.is_due(t0 + WINDOW));
    }

    #[test]
    fn batch_due_mid_flight_waits_for_completion() {
        let t0 = Instant::now();
        let mut scheduler = EditScheduler::new(WINDOW);
        scheduler.record_edit(t0);
        scheduler.begin_flush();

        // Edits keep arriving while the request is in flight.
        scheduler.record_edit(t0 + Duration::from_millis(50));
        let due_at = t0 + Duration::from_millis(350);
        assert!(!scheduler.is_due(due_at), "never concurrent with a flight");

        // Resolution reports the queued batch as immediately sendable.
        assert!(scheduler.complete(due_at));
        assert!(scheduler.is_due(due_at));
    }

    #[test]
    fn completion_with_fresh_edit_still_waits_the_window() {
        let t0 = Instant::now();
        let mut scheduler = EditScheduler::new(WINDOW);
        scheduler.record_edit(t0);
        scheduler.begin_flush();
        scheduler.record_edit(t0 + Duration::from_millis(90));

        // The queued batch's window has not elapsed yet.
        assert!(!scheduler.complete(t0 + Duration::from_millis(100)));
        assert!(scheduler.is_due(t0 + Duration::from_millis(390)));
    }
}
