//! Statistics example.
//!
//! Run with: cargo run --example statistics --features statistics

use devqueue::statistics::StatisticsCollector;
use devqueue::{EventKind, LibraryContext, QueueContext};

fn main() {
    let queue = QueueContext::open(&LibraryContext::default()).expect("Failed to open queue");

    let mut collector = StatisticsCollector::new();
    collector.start(&queue).expect("Failed to start collector");

    for i in 0..10 {
        let kind = if i % 3 == 0 {
            EventKind::Change
        } else {
            EventKind::Add
        };
        let seq = queue
            .submit(kind, format!("/devices/virtual/tty/tty{}", i % 4))
            .expect("Failed to submit event");
        if i % 2 == 0 {
            queue.settle(seq);
        }
    }
    queue.flush();

    let stats = collector.stop().expect("Failed to stop collector");
    println!("{}", stats.summary());

    queue.release();
}
