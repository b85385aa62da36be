//! # devqueue
//!
//! A device event queue with sequence tracking, idle detection and pollable
//! wait handles, in the shape of the udev queue interface.
//!
//! ## Features
//!
//! - Append-only event log with monotonically increasing sequence numbers
//! - In-flight tracking with an authoritative "is the queue idle" answer
//! - Blocking waits with timeouts and interrupts, and an `eventfd` that polls
//!   readable when the queue drains (Linux)
//! - Explicit retain/release lifecycle with a single teardown per handle
//! - Optional journal persistence (`persist`), async waits (`tokio`) and
//!   statistics (`statistics`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use devqueue::{EventKind, LibraryContext, QueueContext, WaitOutcome};
//! use std::time::Duration;
//!
//! let library = LibraryContext::default();
//! let queue = QueueContext::open(&library).expect("device subsystem unreachable");
//!
//! let seq = queue.submit(EventKind::Add, "/devices/platform/serial8250/tty/ttyS0").unwrap();
//!
//! // Another thread settles the event once its rules have run.
//! let worker = queue.retain();
//! std::thread::spawn(move || {
//!     worker.settle(seq);
//!     worker.release();
//! });
//!
//! match queue.wait_until_idle(Duration::from_secs(5)).unwrap() {
//!     WaitOutcome::Idle => println!("settled"),
//!     other => println!("gave up: {:?}", other),
//! }
//! ```
//!
//! ## Architecture
//!
//! Producers append to the [`journal`] and register the new sequence in the
//! [`tracker`] in one step. Consumers query the tracker, block on a
//! [`handle`], or poll the handle's descriptor from their own event loop.
//! Every handle opened from one [`LibraryContext`] shares the same queue
//! state, and compares equal to the others by [`QueueId`].

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod handle;
pub mod handler;
pub mod journal;
pub mod queue;
#[cfg(feature = "statistics")]
pub mod statistics;
pub mod tracker;

mod platform;

// Re-exports
pub use config::Config;
pub use context::LibraryContext;
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use handle::{Interrupter, WaitableHandle};
pub use handler::{Subscription, Transition, TransitionHandler};
pub use journal::EventLog;
pub use queue::{QueueContext, QueueId};
#[cfg(feature = "statistics")]
pub use statistics::{QueueStatistics, StatisticsCollector};
pub use tracker::{ActivityTracker, QueueState, SequenceStatus, WaitOutcome};
