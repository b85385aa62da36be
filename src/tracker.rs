//! In-flight sequence tracking and idle detection.
//!
//! [`ActivityTracker`] owns the set of sequence numbers whose processing has
//! not been confirmed yet. The queue is idle exactly when that set is empty.
//! All state lives behind one mutex; blocked waiters park on a condition
//! variable that is notified whenever an entry settles.

use crate::error::{Error, Result};
use crate::event::Event;
use crate::handler::{Transition, TransitionHandler};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// The queue is idle.
    Idle,
    /// The awaited sequence has settled.
    Settled,
    /// The timeout elapsed first.
    TimedOut,
    /// The wait was interrupted through an [`Interrupter`](crate::handle::Interrupter).
    Interrupted,
}

/// Where a sequence number stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceStatus {
    /// Registered and not yet settled.
    InFlight,
    /// Issued and no longer in flight.
    Settled,
    /// Never issued.
    Unknown,
}

/// Snapshot of tracker state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    /// Sequences not yet settled.
    pub in_flight: BTreeSet<u64>,
    /// Highest sequence ever registered. Never decreases.
    pub last_sequence: u64,
}

impl QueueState {
    /// Check if nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Classify a sequence number.
    pub fn status(&self, sequence: u64) -> SequenceStatus {
        if sequence == 0 || sequence > self.last_sequence {
            SequenceStatus::Unknown
        } else if self.in_flight.contains(&sequence) {
            SequenceStatus::InFlight
        } else {
            SequenceStatus::Settled
        }
    }
}

/// Tracks in-flight events and wakes waiters when the queue drains.
pub struct ActivityTracker {
    state: Mutex<QueueState>,
    changed: Condvar,
    handlers: Mutex<Vec<(u64, Arc<dyn TransitionHandler>)>>,
    next_handler_id: AtomicU64,
}

impl ActivityTracker {
    /// Create an idle tracker with no issued sequences.
    pub fn new() -> Self {
        Self::with_last_sequence(0)
    }

    /// Create an idle tracker that treats every sequence up to
    /// `last_sequence` as already settled.
    pub fn with_last_sequence(last_sequence: u64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                in_flight: BTreeSet::new(),
                last_sequence,
            }),
            changed: Condvar::new(),
            handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `append` and register the event it returns, under the state lock.
    ///
    /// No query can observe the event as neither in-flight nor settled.
    pub fn admit<F>(&self, append: F) -> Result<Event>
    where
        F: FnOnce() -> Result<Event>,
    {
        let event = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| Error::ThreadError("tracker mutex poisoned".into()))?;
            let event = append()?;
            state.in_flight.insert(event.sequence);
            state.last_sequence = state.last_sequence.max(event.sequence);
            event
        };
        self.dispatch(&[Transition::Queued(event.clone())]);
        Ok(event)
    }

    /// Mark a sequence as in flight.
    pub fn register_in_flight(&self, sequence: u64) {
        if sequence == 0 {
            log::warn!("ignoring registration of sequence 0");
            return;
        }
        let inserted = {
            let mut state = self.lock();
            state.last_sequence = state.last_sequence.max(sequence);
            state.in_flight.insert(sequence)
        };
        if inserted {
            self.dispatch(&[Transition::Registered(sequence)]);
        }
    }

    /// Mark a sequence as processed.
    ///
    /// Settling an unknown or already settled sequence is a no-op. Returns
    /// whether the sequence was in flight.
    pub fn settle(&self, sequence: u64) -> bool {
        let (removed, became_idle) = {
            let mut state = self.lock();
            let removed = state.in_flight.remove(&sequence);
            (removed, removed && state.in_flight.is_empty())
        };
        if !removed {
            return false;
        }
        self.changed.notify_all();
        if became_idle {
            log::debug!("queue idle after settling {}", sequence);
            self.dispatch(&[Transition::Settled(sequence), Transition::Idle]);
        } else {
            self.dispatch(&[Transition::Settled(sequence)]);
        }
        true
    }

    /// Settle everything in flight. Returns how many entries were cleared.
    pub fn flush(&self) -> usize {
        let cleared = {
            let mut state = self.lock();
            let cleared = state.in_flight.len();
            state.in_flight.clear();
            cleared
        };
        if cleared > 0 {
            self.changed.notify_all();
            self.dispatch(&[Transition::Flushed(cleared), Transition::Idle]);
        }
        cleared
    }

    /// Check if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_idle()
    }

    /// Check if a sequence was issued and is no longer in flight.
    ///
    /// Sequences that were never issued are not settled; use
    /// [`status`](Self::status) to tell them apart from in-flight ones.
    pub fn is_settled(&self, sequence: u64) -> bool {
        self.status(sequence) == SequenceStatus::Settled
    }

    /// Classify a sequence number.
    pub fn status(&self, sequence: u64) -> SequenceStatus {
        self.lock().status(sequence)
    }

    /// Number of sequences in flight.
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Highest sequence registered so far.
    pub fn last_sequence(&self) -> u64 {
        self.lock().last_sequence
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> QueueState {
        self.lock().clone()
    }

    /// Block until the queue is idle.
    ///
    /// `interrupted` is consumed: a set flag ends the wait with
    /// [`WaitOutcome::Interrupted`] and is cleared.
    pub fn wait_idle(&self, timeout: Duration, interrupted: &AtomicBool) -> Result<WaitOutcome> {
        self.wait_until(timeout, interrupted, WaitOutcome::Idle, QueueState::is_idle)
    }

    /// Block until `sequence` is no longer in flight.
    pub fn wait_settled(
        &self,
        sequence: u64,
        timeout: Duration,
        interrupted: &AtomicBool,
    ) -> Result<WaitOutcome> {
        if self.status(sequence) == SequenceStatus::Unknown {
            return Err(Error::UnknownSequence(sequence));
        }
        self.wait_until(timeout, interrupted, WaitOutcome::Settled, |state| {
            !state.in_flight.contains(&sequence)
        })
    }

    fn wait_until<P>(
        &self,
        timeout: Duration,
        interrupted: &AtomicBool,
        outcome: WaitOutcome,
        satisfied: P,
    ) -> Result<WaitOutcome>
    where
        P: Fn(&QueueState) -> bool,
    {
        // None means the deadline is beyond what Instant can represent.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::ThreadError("tracker mutex poisoned".into()))?;

        loop {
            if satisfied(&*state) {
                return Ok(outcome);
            }
            if interrupted.swap(false, Ordering::SeqCst) {
                return Ok(WaitOutcome::Interrupted);
            }
            state = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(WaitOutcome::TimedOut);
                    }
                    self.changed
                        .wait_timeout(state, remaining)
                        .map_err(|_| Error::ThreadError("tracker mutex poisoned".into()))?
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .map_err(|_| Error::ThreadError("tracker mutex poisoned".into()))?,
            };
        }
    }

    /// Wake every blocked waiter so it re-checks its condition and
    /// interrupt flag.
    pub fn wake_all(&self) {
        // Taking the lock orders this wake after any waiter's flag check.
        drop(self.lock());
        self.changed.notify_all();
    }

    /// Attach a handler. Returns its id for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, handler: Arc<dyn TransitionHandler>) -> u64 {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Detach a handler. Returns whether it was attached.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Check if a handler id is attached.
    pub fn is_subscribed(&self, id: u64) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(handler_id, _)| *handler_id == id)
    }

    fn dispatch(&self, transitions: &[Transition]) {
        let handlers: Vec<Arc<dyn TransitionHandler>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for transition in transitions {
            for handler in &handlers {
                handler.handle_transition(transition);
            }
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::thread;

    #[test]
    fn test_register_then_settle() {
        let tracker = ActivityTracker::new();
        assert!(tracker.is_empty());

        tracker.register_in_flight(1);
        assert!(!tracker.is_empty());

        tracker.register_in_flight(2);
        tracker.settle(1);
        assert!(!tracker.is_empty());

        tracker.settle(2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_settle_is_idempotent() {
        let tracker = ActivityTracker::new();
        tracker.register_in_flight(1);
        tracker.register_in_flight(2);

        assert!(tracker.settle(1));
        let after_once = tracker.snapshot();
        assert!(!tracker.settle(1));
        assert_eq!(tracker.snapshot(), after_once);

        // Unknown sequences are a no-op too.
        assert!(!tracker.settle(99));
        assert_eq!(tracker.snapshot(), after_once);
    }

    #[test]
    fn test_status_distinguishes_unknown() {
        let tracker = ActivityTracker::new();
        tracker.register_in_flight(3);

        assert_eq!(tracker.status(3), SequenceStatus::InFlight);
        assert_eq!(tracker.status(2), SequenceStatus::Settled);
        assert_eq!(tracker.status(4), SequenceStatus::Unknown);
        assert_eq!(tracker.status(0), SequenceStatus::Unknown);
        assert!(!tracker.is_settled(4));
        assert!(!tracker.is_settled(3));

        tracker.settle(3);
        assert!(tracker.is_settled(3));
        assert_eq!(tracker.last_sequence(), 3);
    }

    #[test]
    fn test_last_sequence_never_decreases() {
        let tracker = ActivityTracker::new();
        tracker.register_in_flight(10);
        tracker.register_in_flight(4);
        assert_eq!(tracker.last_sequence(), 10);

        let state = tracker.snapshot();
        assert!(state.in_flight.iter().all(|s| *s <= state.last_sequence));
    }

    #[test]
    fn test_admit_registers_appended_event() {
        let tracker = ActivityTracker::new();
        let event = tracker
            .admit(|| Ok(Event::new(1, EventKind::Add, "sdb")))
            .unwrap();
        assert_eq!(tracker.status(event.sequence), SequenceStatus::InFlight);

        let err = tracker
            .admit(|| Err(Error::StorageExhausted("full".into())))
            .unwrap_err();
        assert!(matches!(err, Error::StorageExhausted(_)));
        assert_eq!(tracker.in_flight_count(), 1);
    }

    #[test]
    fn test_flush_clears_everything() {
        let tracker = ActivityTracker::new();
        for seq in 1..=5 {
            tracker.register_in_flight(seq);
        }
        assert_eq!(tracker.flush(), 5);
        assert!(tracker.is_empty());
        assert_eq!(tracker.flush(), 0);
    }

    #[test]
    fn test_wait_idle_returns_immediately_when_idle() {
        let tracker = ActivityTracker::new();
        let flag = AtomicBool::new(false);
        let start = Instant::now();
        let outcome = tracker.wait_idle(Duration::from_secs(30), &flag).unwrap();
        assert_eq!(outcome, WaitOutcome::Idle);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_zero_timeout_on_busy_queue() {
        let tracker = ActivityTracker::new();
        tracker.register_in_flight(1);
        let flag = AtomicBool::new(false);
        let outcome = tracker.wait_idle(Duration::ZERO, &flag).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_waiter_released_after_all_settled() {
        let tracker = Arc::new(ActivityTracker::new());
        for seq in 1..=100 {
            tracker.register_in_flight(seq);
        }

        let waiter = {
            let tracker = tracker.clone();
            thread::spawn(move || {
                let flag = AtomicBool::new(false);
                tracker.wait_idle(Duration::from_secs(30), &flag).unwrap()
            })
        };

        thread::sleep(Duration::from_millis(20));
        for seq in 1..=99 {
            tracker.settle(seq);
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        tracker.settle(100);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Idle);
    }

    #[test]
    fn test_wait_settled() {
        let tracker = Arc::new(ActivityTracker::new());
        tracker.register_in_flight(1);
        tracker.register_in_flight(2);

        let waiter = {
            let tracker = tracker.clone();
            thread::spawn(move || {
                let flag = AtomicBool::new(false);
                tracker.wait_settled(2, Duration::from_secs(30), &flag).unwrap()
            })
        };
        tracker.settle(2);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Settled);
        assert!(!tracker.is_empty());

        let flag = AtomicBool::new(false);
        assert!(matches!(
            tracker.wait_settled(9, Duration::ZERO, &flag),
            Err(Error::UnknownSequence(9))
        ));
    }

    #[test]
    fn test_interrupt_wakes_waiter() {
        let tracker = Arc::new(ActivityTracker::new());
        tracker.register_in_flight(1);
        let flag = Arc::new(AtomicBool::new(false));

        let waiter = {
            let tracker = tracker.clone();
            let flag = flag.clone();
            thread::spawn(move || tracker.wait_idle(Duration::from_secs(30), &flag).unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);
        tracker.wake_all();

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Interrupted);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handlers_see_transitions() {
        let tracker = ActivityTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = tracker.subscribe(Arc::new(move |t: &Transition| {
            sink.lock().unwrap().push(t.clone());
        }));

        tracker.register_in_flight(1);
        tracker.settle(1);
        tracker.settle(1);
        assert!(tracker.unsubscribe(id));
        tracker.register_in_flight(2);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Transition::Registered(1),
                Transition::Settled(1),
                Transition::Idle
            ]
        );
        assert!(!tracker.unsubscribe(id));
    }
}
