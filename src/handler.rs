//! Transition notifications and the TransitionHandler trait.

use crate::event::Event;
use crate::tracker::ActivityTracker;
use std::sync::Weak;

/// A change in queue activity, delivered to subscribed handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// An event was appended to the log and registered in-flight.
    Queued(Event),
    /// A sequence number was registered in-flight directly.
    Registered(u64),
    /// An in-flight sequence was settled.
    Settled(u64),
    /// The queue was flushed; carries the number of entries cleared.
    Flushed(usize),
    /// The queue went from busy to idle.
    Idle,
}

/// Trait for receiving queue transitions.
///
/// Handlers are invoked on the thread that caused the transition, after the
/// queue lock has been released. Notices raised concurrently by different
/// threads may interleave.
pub trait TransitionHandler: Send + Sync {
    /// Called for every transition of the queue this handler is attached to.
    fn handle_transition(&self, transition: &Transition);
}

/// Implement TransitionHandler for closures.
impl<F> TransitionHandler for F
where
    F: Fn(&Transition) + Send + Sync,
{
    fn handle_transition(&self, transition: &Transition) {
        self(transition);
    }
}

/// Handle to an attached [`TransitionHandler`].
///
/// The handler is detached when this is dropped or [`cancel`](Self::cancel)led.
#[must_use = "dropping a Subscription detaches its handler"]
pub struct Subscription {
    tracker: Weak<ActivityTracker>,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(tracker: Weak<ActivityTracker>, id: u64) -> Self {
        Self { tracker, id }
    }

    /// Detach the handler now.
    pub fn cancel(self) {}

    /// Check if the handler is still attached to a live queue.
    pub fn is_active(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|tracker| tracker.is_subscribed(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.unsubscribe(self.id);
        }
    }
}
