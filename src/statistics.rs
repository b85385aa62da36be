//! Queue activity statistics.
//!
//! Collects counts of queued, settled and flushed events, idle transitions
//! and in-flight depth, useful for:
//! - Spotting devices that generate event storms
//! - Checking how often the queue actually drains
//! - Sizing the event log capacity
//!
//! # Example
//!
//! ```no_run
//! use devqueue::statistics::StatisticsCollector;
//! use devqueue::{LibraryContext, QueueContext};
//!
//! let queue = QueueContext::open(&LibraryContext::default()).unwrap();
//! let mut collector = StatisticsCollector::new();
//! collector.start(&queue).unwrap();
//!
//! // ... producers submit and settle events ...
//!
//! let stats = collector.stop().unwrap();
//! println!("{}", stats.summary());
//! ```

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::handler::{Subscription, Transition};
use crate::queue::QueueContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Statistics collected from queue transitions.
#[derive(Debug, Clone, Default)]
pub struct QueueStatistics {
    // Event counts
    /// Events appended through the queue.
    pub queued_count: u64,
    /// Appended `add` events.
    pub add_count: u64,
    /// Appended `remove` events.
    pub remove_count: u64,
    /// Appended `change` events.
    pub change_count: u64,
    /// Sequences registered directly, without the event log.
    pub registered_count: u64,
    /// Sequences settled one at a time.
    pub settled_count: u64,
    /// Entries cleared by flushes.
    pub flushed_count: u64,
    /// Number of flushes that cleared anything.
    pub flush_operations: u64,
    /// Busy-to-idle transitions.
    pub idle_transitions: u64,

    // Depth
    /// In-flight entries as seen by this collector.
    pub current_in_flight: u64,
    /// Highest in-flight depth observed.
    pub peak_in_flight: u64,

    /// Events queued per device.
    pub subject_frequency: HashMap<String, u64>,

    // Timing
    /// When collection started.
    pub start_time: Option<Instant>,
    /// When collection ended.
    pub end_time: Option<Instant>,
    /// When the queue last went idle.
    pub last_idle_time: Option<Instant>,
}

impl QueueStatistics {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update statistics from one transition.
    pub fn record_transition(&mut self, transition: &Transition) {
        match transition {
            Transition::Queued(event) => {
                self.queued_count += 1;
                match event.kind {
                    EventKind::Add => self.add_count += 1,
                    EventKind::Remove => self.remove_count += 1,
                    EventKind::Change => self.change_count += 1,
                }
                *self
                    .subject_frequency
                    .entry(event.subject_id.clone())
                    .or_insert(0) += 1;
                self.enter();
            }
            Transition::Registered(_) => {
                self.registered_count += 1;
                self.enter();
            }
            Transition::Settled(_) => {
                self.settled_count += 1;
                self.current_in_flight = self.current_in_flight.saturating_sub(1);
            }
            Transition::Flushed(cleared) => {
                self.flush_operations += 1;
                self.flushed_count += *cleared as u64;
                self.current_in_flight = self.current_in_flight.saturating_sub(*cleared as u64);
            }
            Transition::Idle => {
                self.idle_transitions += 1;
                self.current_in_flight = 0;
                self.last_idle_time = Some(Instant::now());
            }
        }
    }

    fn enter(&mut self) {
        self.current_in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.current_in_flight);
    }

    /// Get the device that produced the most events.
    pub fn busiest_subject(&self) -> Option<(&str, u64)> {
        self.subject_frequency
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(subject, count)| (subject.as_str(), *count))
    }

    /// Get the duration of data collection.
    pub fn collection_duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Get queued events per minute.
    pub fn events_per_minute(&self) -> f64 {
        let duration = self.collection_duration();
        if duration.as_secs() == 0 {
            return 0.0;
        }
        self.queued_count as f64 / duration.as_secs_f64() * 60.0
    }

    /// Generate a human-readable summary.
    pub fn summary(&self) -> String {
        let duration = self.collection_duration();
        let minutes = duration.as_secs() / 60;
        let seconds = duration.as_secs() % 60;

        let mut summary = format!(
            "=== Queue Statistics ===\n\
             Duration: {:02}:{:02}\n\
             Queued: {} (add {}, remove {}, change {})\n\
             Events/min: {:.1}\n\n",
            minutes,
            seconds,
            self.queued_count,
            self.add_count,
            self.remove_count,
            self.change_count,
            self.events_per_minute()
        );

        summary.push_str(&format!(
            "Activity:\n\
             - Settled: {}\n\
             - Flushed: {} ({} flushes)\n\
             - Idle transitions: {}\n\
             - Peak in flight: {}\n",
            self.settled_count,
            self.flushed_count,
            self.flush_operations,
            self.idle_transitions,
            self.peak_in_flight
        ));

        if let Some((subject, count)) = self.busiest_subject() {
            summary.push_str(&format!("- Busiest device: {} ({} events)\n", subject, count));
        }

        summary
    }

    /// Merge another statistics object into this one.
    pub fn merge(&mut self, other: &QueueStatistics) {
        self.queued_count += other.queued_count;
        self.add_count += other.add_count;
        self.remove_count += other.remove_count;
        self.change_count += other.change_count;
        self.registered_count += other.registered_count;
        self.settled_count += other.settled_count;
        self.flushed_count += other.flushed_count;
        self.flush_operations += other.flush_operations;
        self.idle_transitions += other.idle_transitions;
        self.peak_in_flight = self.peak_in_flight.max(other.peak_in_flight);

        for (subject, count) in &other.subject_frequency {
            *self.subject_frequency.entry(subject.clone()).or_insert(0) += count;
        }
    }
}

/// Collects statistics from a queue in real time.
pub struct StatisticsCollector {
    stats: Arc<Mutex<QueueStatistics>>,
    subscription: Option<Subscription>,
}

impl StatisticsCollector {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(QueueStatistics::new())),
            subscription: None,
        }
    }

    /// Start collecting from `queue`.
    pub fn start(&mut self, queue: &QueueContext) -> Result<()> {
        if self.subscription.is_some() {
            return Err(Error::AlreadyRunning);
        }

        {
            let mut stats = self
                .stats
                .lock()
                .map_err(|_| Error::ThreadError("statistics mutex poisoned".into()))?;
            stats.start_time = Some(Instant::now());
            stats.end_time = None;
            stats.current_in_flight = queue.in_flight_count() as u64;
        }

        let stats = self.stats.clone();
        self.subscription = Some(queue.subscribe(move |transition: &Transition| {
            if let Ok(mut s) = stats.lock() {
                s.record_transition(transition);
            }
        }));
        Ok(())
    }

    /// Stop collecting and return the statistics.
    pub fn stop(&mut self) -> Result<QueueStatistics> {
        let subscription = self.subscription.take().ok_or(Error::NotRunning)?;
        subscription.cancel();

        let mut stats = self
            .stats
            .lock()
            .map_err(|_| Error::ThreadError("statistics mutex poisoned".into()))?;
        stats.end_time = Some(Instant::now());
        Ok(stats.clone())
    }

    /// Get a snapshot of current statistics without stopping.
    pub fn snapshot(&self) -> QueueStatistics {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(_) => QueueStatistics::new(),
        }
    }

    /// Check if currently collecting.
    pub fn is_collecting(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}
