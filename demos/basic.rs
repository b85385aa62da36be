//! Basic queue example.
//!
//! Run with: cargo run --example basic
//!
//! A worker thread settles submitted events one by one while the main thread
//! waits for the queue to drain.

use devqueue::{Config, EventKind, LibraryContext, QueueContext, WaitOutcome};
use std::thread;
use std::time::Duration;

fn main() {
    println!("devqueue basic example");
    println!("======================\n");

    let library = LibraryContext::new(Config::default());
    println!("Device manager active: {}", library.is_subsystem_active());

    let queue = QueueContext::open(&library).expect("Failed to open queue");

    let sequences: Vec<u64> = ["sda", "sda1", "sda2"]
        .iter()
        .map(|dev| {
            queue
                .submit(EventKind::Add, format!("/devices/virtual/block/{}", dev))
                .expect("Failed to submit event")
        })
        .collect();
    println!("Submitted {:?}, queue empty: {}", sequences, queue.is_empty());

    let worker = queue.retain();
    let handle = thread::spawn(move || {
        for seq in sequences {
            thread::sleep(Duration::from_millis(200));
            worker.settle(seq);
            println!("  settled {}", seq);
        }
        worker.release();
    });

    match queue.wait_until_idle(Duration::from_secs(5)) {
        Ok(WaitOutcome::Idle) => println!("Queue is idle"),
        Ok(other) => println!("Wait ended: {:?}", other),
        Err(e) => eprintln!("Wait failed: {}", e),
    }

    handle.join().expect("worker panicked");
    queue.release();
}
