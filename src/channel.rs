//! Channel-based transition delivery.
//!
//! These are channel alternatives to attaching a [`TransitionHandler`]
//! directly: transitions are pushed into a channel and consumed wherever the
//! receiver lives.
//!
//! # Example (Sync)
//!
//! ```no_run
//! use devqueue::channel::subscribe_channel;
//! use devqueue::{LibraryContext, QueueContext, Transition};
//! use std::time::Duration;
//!
//! let queue = QueueContext::open(&LibraryContext::default()).unwrap();
//! let (subscription, rx) = subscribe_channel(&queue, 100);
//!
//! loop {
//!     match rx.recv_timeout(Duration::from_millis(100)) {
//!         Ok(Transition::Idle) => break,
//!         Ok(other) => println!("{:?}", other),
//!         Err(_) => {
//!             // Timeout - do other work or check exit condition
//!         }
//!     }
//! }
//!
//! subscription.cancel();
//! ```
//!
//! # Example (Async with Tokio)
//!
//! ```ignore
//! use devqueue::channel::wait_until_idle_async;
//! use devqueue::{LibraryContext, QueueContext};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = QueueContext::open(&LibraryContext::default()).unwrap();
//!     let outcome = wait_until_idle_async(&queue, Duration::from_secs(5)).await.unwrap();
//!     println!("{:?}", outcome);
//! }
//! ```

use crate::handler::{Subscription, Transition, TransitionHandler};
use crate::queue::QueueContext;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};

/// Handler that sends transitions to a bounded sync channel.
struct ChannelHandler {
    sender: SyncSender<Transition>,
}

impl TransitionHandler for ChannelHandler {
    fn handle_transition(&self, transition: &Transition) {
        // Never block the thread that settled an event; drop when full.
        let _ = self.sender.try_send(transition.clone());
    }
}

/// Handler that sends transitions to an unbounded sync channel.
struct UnboundedChannelHandler {
    sender: Sender<Transition>,
}

impl TransitionHandler for UnboundedChannelHandler {
    fn handle_transition(&self, transition: &Transition) {
        let _ = self.sender.send(transition.clone());
    }
}

/// Subscribe to a queue's transitions through a bounded channel.
///
/// # Arguments
///
/// * `capacity` - Maximum number of transitions to buffer. If the buffer is
///   full, new transitions are dropped rather than blocking producers.
pub fn subscribe_channel(
    queue: &QueueContext,
    capacity: usize,
) -> (Subscription, Receiver<Transition>) {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    let subscription = queue.subscribe(ChannelHandler { sender });
    (subscription, receiver)
}

/// Subscribe to a queue's transitions through an unbounded channel.
///
/// Nothing is dropped, so a slow consumer grows the buffer without bound.
pub fn subscribe_unbounded_channel(queue: &QueueContext) -> (Subscription, Receiver<Transition>) {
    let (sender, receiver) = mpsc::channel();
    let subscription = queue.subscribe(UnboundedChannelHandler { sender });
    (subscription, receiver)
}

// ============================================================================
// Tokio async support (behind feature flag)
// ============================================================================

#[cfg(feature = "tokio")]
pub use tokio_channel::*;

#[cfg(feature = "tokio")]
mod tokio_channel {
    use super::*;
    use crate::error::{Error, Result};
    use crate::tracker::WaitOutcome;
    use std::time::Duration;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Handler that sends transitions to a tokio async channel.
    struct TokioChannelHandler {
        sender: tokio_mpsc::Sender<Transition>,
    }

    impl TransitionHandler for TokioChannelHandler {
        fn handle_transition(&self, transition: &Transition) {
            let _ = self.sender.try_send(transition.clone());
        }
    }

    /// Forwards only idle transitions.
    struct IdleForwarder {
        sender: tokio_mpsc::UnboundedSender<()>,
    }

    impl TransitionHandler for IdleForwarder {
        fn handle_transition(&self, transition: &Transition) {
            if *transition == Transition::Idle {
                let _ = self.sender.send(());
            }
        }
    }

    /// Subscribe to a queue's transitions through a tokio channel.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of transitions to buffer
    pub fn subscribe_async_channel(
        queue: &QueueContext,
        capacity: usize,
    ) -> (Subscription, tokio_mpsc::Receiver<Transition>) {
        let (sender, receiver) = tokio_mpsc::channel(capacity);
        let subscription = queue.subscribe(TokioChannelHandler { sender });
        (subscription, receiver)
    }

    /// Wait for the queue to become idle without blocking the runtime.
    ///
    /// Returns [`WaitOutcome::Idle`] at once if the queue is already idle.
    /// Dropping the future cancels the wait.
    pub async fn wait_until_idle_async(
        queue: &QueueContext,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        if queue.is_released() {
            return Err(Error::Released);
        }

        // Subscribe before checking, so an idle transition in between is
        // not lost.
        let (sender, mut receiver) = tokio_mpsc::unbounded_channel();
        let _subscription = queue.subscribe(IdleForwarder { sender });
        if queue.is_empty() {
            return Ok(WaitOutcome::Idle);
        }

        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(())) => Ok(WaitOutcome::Idle),
            Ok(None) => Ok(WaitOutcome::Interrupted),
            Err(_) => Ok(WaitOutcome::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::LibraryContext;
    use crate::event::EventKind;

    fn queue() -> QueueContext {
        let library = LibraryContext::new(Config::new().with_sys_path(std::env::temp_dir()));
        QueueContext::open(&library).unwrap()
    }

    #[test]
    fn test_unbounded_channel_sees_all_transitions() {
        let queue = queue();
        let (_subscription, rx) = subscribe_unbounded_channel(&queue);

        let seq = queue.submit(EventKind::Remove, "sr0").unwrap();
        queue.settle(seq);

        let received: Vec<Transition> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(&received[0], Transition::Queued(e) if e.sequence == seq));
        assert_eq!(received[1], Transition::Settled(seq));
        assert_eq!(received[2], Transition::Idle);
    }

    #[test]
    fn test_bounded_channel_drops_when_full() {
        let queue = queue();
        let (_subscription, rx) = subscribe_channel(&queue, 2);

        for i in 0..5 {
            queue.submit(EventKind::Add, format!("loop{}", i)).unwrap();
        }
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_cancelled_subscription_stops_delivery() {
        let queue = queue();
        let (subscription, rx) = subscribe_unbounded_channel(&queue);
        subscription.cancel();

        queue.submit(EventKind::Add, "md0").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn test_wait_until_idle_async() {
        use crate::tracker::WaitOutcome;
        use std::time::Duration;

        let queue = queue();
        assert_eq!(
            wait_until_idle_async(&queue, Duration::ZERO).await.unwrap(),
            WaitOutcome::Idle
        );

        let seq = queue.submit(EventKind::Add, "dm-0").unwrap();
        assert_eq!(
            wait_until_idle_async(&queue, Duration::from_millis(10))
                .await
                .unwrap(),
            WaitOutcome::TimedOut
        );

        let settler = queue.retain();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            settler.settle(seq);
        });
        assert_eq!(
            wait_until_idle_async(&queue, Duration::from_secs(30))
                .await
                .unwrap(),
            WaitOutcome::Idle
        );
    }
}
