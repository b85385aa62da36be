//! Pollable and blocking wait primitives.
//!
//! A [`WaitableHandle`] is attached to one [`ActivityTracker`]. Its descriptor
//! (Linux only) becomes readable each time the queue goes from busy to idle,
//! so it can be registered in `poll`/`epoll` loops next to sockets and timers.
//! The blocking waits park on the tracker's condition variable instead.
//!
//! # Example
//!
//! ```
//! use devqueue::handle::WaitableHandle;
//! use devqueue::tracker::{ActivityTracker, WaitOutcome};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let tracker = Arc::new(ActivityTracker::new());
//! let handle = WaitableHandle::new(tracker.clone()).unwrap();
//!
//! tracker.register_in_flight(1);
//! assert_eq!(handle.wait_until_idle(Duration::ZERO).unwrap(), WaitOutcome::TimedOut);
//!
//! tracker.settle(1);
//! assert!(handle.try_wait());
//! assert_eq!(handle.wait_until_idle(Duration::ZERO).unwrap(), WaitOutcome::Idle);
//! ```

use crate::error::Result;
use crate::handler::{Transition, TransitionHandler};
use crate::platform::Signal;
use crate::tracker::{ActivityTracker, WaitOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

/// Raises the platform signal on every busy-to-idle transition.
struct IdleSignal {
    signal: Signal,
}

impl TransitionHandler for IdleSignal {
    fn handle_transition(&self, transition: &Transition) {
        if *transition == Transition::Idle
            && let Err(e) = self.signal.notify()
        {
            log::error!("failed to signal idle transition: {}", e);
        }
    }
}

/// Wait primitive bound to one tracker.
///
/// Dropping the handle detaches it from the tracker and closes its descriptor.
pub struct WaitableHandle {
    tracker: Arc<ActivityTracker>,
    idle: Arc<IdleSignal>,
    subscription: u64,
    interrupted: Arc<AtomicBool>,
}

impl WaitableHandle {
    /// Create a handle and attach it to `tracker`.
    pub fn new(tracker: Arc<ActivityTracker>) -> Result<Self> {
        let idle = Arc::new(IdleSignal {
            signal: Signal::new()?,
        });
        let subscription = tracker.subscribe(idle.clone());
        Ok(Self {
            tracker,
            idle,
            subscription,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Block until the queue is idle, the timeout elapses, or the wait is
    /// interrupted. Returns at once when the queue is already idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> Result<WaitOutcome> {
        self.tracker.wait_idle(timeout, &self.interrupted)
    }

    /// Block until `sequence` settles, the timeout elapses, or the wait is
    /// interrupted.
    pub fn wait_for_sequence(&self, sequence: u64, timeout: Duration) -> Result<WaitOutcome> {
        self.tracker
            .wait_settled(sequence, timeout, &self.interrupted)
    }

    /// Consume a pending idle notification without blocking.
    ///
    /// Returns `true` if the queue went idle since the last call. Callers
    /// driving the descriptor from an event loop call this once it polls
    /// readable.
    ///
    /// The notification is raised after the tracker lock is dropped, so an
    /// event admitted in between can make the queue busy again before the
    /// descriptor turns readable. A `true` result means the queue *was* idle;
    /// confirm with [`is_idle`](Self::is_idle) before acting on it.
    pub fn try_wait(&self) -> bool {
        self.idle.signal.try_take()
    }

    /// Check the current idle state without touching the notification.
    pub fn is_idle(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Token that can interrupt blocked waits on this handle from any thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            tracker: Arc::downgrade(&self.tracker),
            interrupted: self.interrupted.clone(),
        }
    }
}

#[cfg(target_os = "linux")]
impl AsRawFd for WaitableHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.idle.signal.as_raw_fd()
    }
}

#[cfg(target_os = "linux")]
impl AsFd for WaitableHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.idle.signal.as_fd()
    }
}

impl Drop for WaitableHandle {
    fn drop(&mut self) {
        self.tracker.unsubscribe(self.subscription);
    }
}

/// Interrupts blocked waits on the [`WaitableHandle`] it was taken from.
///
/// An interrupt raised while nobody waits stays pending and ends the next wait
/// that would otherwise block.
#[derive(Clone)]
pub struct Interrupter {
    tracker: Weak<ActivityTracker>,
    interrupted: Arc<AtomicBool>,
}

impl Interrupter {
    /// Make a blocked (or the next blocking) wait return
    /// [`WaitOutcome::Interrupted`].
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.wake_all();
        }
    }
}
