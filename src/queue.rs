//! The queue context façade.
//!
//! A [`QueueContext`] combines the event log, the activity tracker and a
//! wait handle behind the lifecycle of a udev-style queue object: it is
//! opened from a [`LibraryContext`], explicitly retained and released, and
//! torn down exactly once when its last reference is released (or when the
//! last handle value is dropped, whichever comes first).
//!
//! # Example
//!
//! ```no_run
//! use devqueue::{EventKind, LibraryContext, QueueContext, WaitOutcome};
//! use std::time::Duration;
//!
//! let library = LibraryContext::default();
//! let queue = QueueContext::open(&library).expect("device subsystem unreachable");
//!
//! let seq = queue.submit(EventKind::Add, "/devices/virtual/block/loop0").unwrap();
//! assert!(!queue.is_empty());
//!
//! queue.settle(seq);
//! assert_eq!(queue.wait_until_idle(Duration::from_secs(1)).unwrap(), WaitOutcome::Idle);
//!
//! queue.release();
//! ```

use crate::config::Config;
use crate::context::LibraryContext;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::handle::{Interrupter, WaitableHandle};
use crate::handler::{Subscription, TransitionHandler};
use crate::journal::EventLog;
use crate::tracker::{ActivityTracker, SequenceStatus, WaitOutcome};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::os::fd::{AsRawFd, RawFd};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a shared queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);

impl QueueId {
    fn next() -> Self {
        Self(NEXT_QUEUE_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// The raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Queue state shared by every handle opened from one library context.
pub(crate) struct QueueShared {
    id: QueueId,
    log: EventLog,
    tracker: Arc<ActivityTracker>,
}

impl QueueShared {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        #[cfg(feature = "persist")]
        let log = match &config.journal_path {
            Some(path) => EventLog::open_journal(path, config.capacity)?,
            None => EventLog::new(config.capacity),
        };
        #[cfg(not(feature = "persist"))]
        let log = EventLog::new(config.capacity);

        // Journaled events from a previous run count as settled.
        let tracker = Arc::new(ActivityTracker::with_last_sequence(log.last_sequence()));

        Ok(Self {
            id: QueueId::next(),
            log,
            tracker,
        })
    }

    pub(crate) fn id(&self) -> QueueId {
        self.id
    }
}

/// Per-handle lifecycle state.
struct HandleState {
    refs: AtomicUsize,
    attachment: Mutex<Option<Attachment>>,
}

/// What a handle holds until it is torn down.
struct Attachment {
    library: LibraryContext,
    waitable: Arc<WaitableHandle>,
}

impl HandleState {
    fn attachment(&self) -> MutexGuard<'_, Option<Attachment>> {
        self.attachment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether this call performed the teardown.
    fn teardown(&self) -> bool {
        let attachment = self.attachment().take();
        // Dropped outside the lock: detaches the wait handle, closes its
        // descriptor and drops the library reference.
        attachment.is_some()
    }
}

impl Drop for HandleState {
    fn drop(&mut self) {
        if self.teardown() {
            log::debug!(
                "queue handle dropped with {} outstanding reference(s)",
                self.refs.load(Ordering::SeqCst)
            );
        }
    }
}

/// Reference-counted handle on a device event queue.
///
/// Equality and hashing follow the identity of the shared queue state:
/// two handles opened from the same library context compare equal while
/// they share state.
pub struct QueueContext {
    shared: Arc<QueueShared>,
    handle: Arc<HandleState>,
}

impl QueueContext {
    /// Open a queue on `library`.
    ///
    /// Fails with [`Error::OpenFailed`] when the device subsystem is
    /// unreachable. The returned handle holds one reference.
    pub fn open(library: &LibraryContext) -> Result<Self> {
        library.probe()?;
        let shared = library.shared_queue()?;
        let waitable = WaitableHandle::new(shared.tracker.clone())?;
        log::debug!("opened handle on {}", shared.id);

        Ok(Self {
            shared,
            handle: Arc::new(HandleState {
                refs: AtomicUsize::new(1),
                attachment: Mutex::new(Some(Attachment {
                    library: library.clone(),
                    waitable: Arc::new(waitable),
                })),
            }),
        })
    }

    /// Identity of the shared queue state.
    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    /// Take another reference. Each reference is given back with one
    /// [`release`](Self::release).
    pub fn retain(&self) -> QueueContext {
        self.handle.refs.fetch_add(1, Ordering::SeqCst);
        QueueContext {
            shared: self.shared.clone(),
            handle: self.handle.clone(),
        }
    }

    /// Give back one reference. Releasing the last one tears the handle down.
    ///
    /// Releasing more often than the handle was opened and retained is a
    /// programming error: it panics in debug builds and is logged and
    /// ignored otherwise. Other handles on the same queue are unaffected.
    pub fn release(&self) {
        let prev = self
            .handle
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match prev {
            Ok(1) => {
                if self.handle.teardown() {
                    log::debug!("released last reference on {}", self.shared.id);
                }
            }
            Ok(_) => {}
            Err(_) => {
                debug_assert!(false, "QueueContext::release called more times than retain");
                log::error!(
                    "over-release of handle on {} ignored: no references left",
                    self.shared.id
                );
            }
        }
    }

    /// Number of outstanding references on this handle.
    pub fn ref_count(&self) -> usize {
        self.handle.refs.load(Ordering::SeqCst)
    }

    /// Check if the last reference has been released.
    pub fn is_released(&self) -> bool {
        self.handle.attachment().is_none()
    }

    /// The wait handle, cloned out so blocking waits do not hold the
    /// attachment lock.
    fn waitable(&self) -> Result<Arc<WaitableHandle>> {
        self.handle
            .attachment()
            .as_ref()
            .map(|a| a.waitable.clone())
            .ok_or(Error::Released)
    }

    /// The library context this queue was opened with.
    pub fn library(&self) -> Result<LibraryContext> {
        self.handle
            .attachment()
            .as_ref()
            .map(|a| a.library.clone())
            .ok_or(Error::Released)
    }

    /// Check if the device manager is running, regardless of queue contents.
    pub fn is_subsystem_active(&self) -> Result<bool> {
        Ok(self.library()?.is_subsystem_active())
    }

    /// Append an event and register it in flight as one step.
    pub fn submit(&self, kind: EventKind, subject_id: impl Into<String>) -> Result<u64> {
        let subject_id = subject_id.into();
        let event = self
            .shared
            .tracker
            .admit(|| self.shared.log.append(kind, subject_id))?;
        Ok(event.sequence)
    }

    /// Mark an event as processed. Returns whether it was in flight.
    pub fn settle(&self, sequence: u64) -> bool {
        self.shared.tracker.settle(sequence)
    }

    /// Settle every in-flight event. Returns how many were cleared.
    pub fn flush(&self) -> usize {
        let cleared = self.shared.tracker.flush();
        if cleared > 0 {
            log::info!("flushed {} in-flight event(s) on {}", cleared, self.shared.id);
        }
        cleared
    }

    /// Check if no events are in flight.
    pub fn is_empty(&self) -> bool {
        self.shared.tracker.is_empty()
    }

    /// Check if a sequence was issued and has settled.
    pub fn is_settled(&self, sequence: u64) -> bool {
        self.shared.tracker.is_settled(sequence)
    }

    /// Classify a sequence number.
    pub fn status(&self, sequence: u64) -> SequenceStatus {
        self.shared.tracker.status(sequence)
    }

    /// Number of events in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.tracker.in_flight_count()
    }

    /// Highest sequence number issued.
    pub fn last_sequence(&self) -> u64 {
        self.shared.tracker.last_sequence()
    }

    /// Look up a logged event.
    pub fn event(&self, sequence: u64) -> Result<Event> {
        self.shared.log.lookup(sequence)
    }

    /// Logged events after `sequence`, for consumers resuming from a cursor.
    pub fn events_since(&self, sequence: u64) -> Vec<Event> {
        self.shared.log.since(sequence)
    }

    /// Block until the queue is idle. Returns at once if it already is.
    pub fn wait_until_idle(&self, timeout: Duration) -> Result<WaitOutcome> {
        self.waitable()?.wait_until_idle(timeout)
    }

    /// Block until `sequence` settles.
    pub fn wait_for_sequence(&self, sequence: u64, timeout: Duration) -> Result<WaitOutcome> {
        self.waitable()?.wait_for_sequence(sequence, timeout)
    }

    /// Consume a pending idle notification without blocking.
    pub fn try_wait(&self) -> Result<bool> {
        Ok(self.waitable()?.try_wait())
    }

    /// Token that interrupts blocked waits on this handle.
    pub fn interrupter(&self) -> Result<Interrupter> {
        Ok(self.waitable()?.interrupter())
    }

    /// Descriptor that polls readable when the queue goes idle.
    ///
    /// Valid until the handle is torn down.
    #[cfg(target_os = "linux")]
    pub fn as_raw_fd(&self) -> Result<RawFd> {
        Ok(self.waitable()?.as_raw_fd())
    }

    /// Attach a transition handler for as long as the subscription lives.
    pub fn subscribe<H: TransitionHandler + 'static>(&self, handler: H) -> Subscription {
        let id = self.shared.tracker.subscribe(Arc::new(handler));
        Subscription::new(Arc::downgrade(&self.shared.tracker), id)
    }
}

impl PartialEq for QueueContext {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for QueueContext {}

impl Hash for QueueContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl fmt::Debug for QueueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueContext")
            .field("id", &self.shared.id)
            .field("refs", &self.ref_count())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}
