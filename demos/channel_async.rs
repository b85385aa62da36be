//! Async channel example with Tokio.
//!
//! Run with: cargo run --example channel_async --features tokio
//!
//! Receives queue transitions asynchronously while a background task
//! produces and settles events.

use devqueue::channel::{subscribe_async_channel, wait_until_idle_async};
use devqueue::{EventKind, LibraryContext, QueueContext, Transition};
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("devqueue channel example (async/tokio)");
    println!("======================================\n");

    let queue = QueueContext::open(&LibraryContext::default()).expect("Failed to open queue");
    let (_subscription, mut rx) = subscribe_async_channel(&queue, 100);

    let producer = queue.retain();
    tokio::spawn(async move {
        for i in 0..5 {
            let seq = producer
                .submit(EventKind::Add, format!("/devices/virtual/input/input{}", i))
                .expect("Failed to submit event");
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.settle(seq);
        }
        producer.release();
    });

    let mut settled = 0;
    while let Some(transition) = rx.recv().await {
        match transition {
            Transition::Queued(event) => {
                println!("[{}] {} {}", event.sequence, event.kind, event.subject_id);
            }
            Transition::Settled(seq) => {
                settled += 1;
                println!("[{}] settled", seq);
            }
            Transition::Idle => println!("-- idle --"),
            other => println!("{:?}", other),
        }
        if settled == 5 {
            break;
        }
    }

    match wait_until_idle_async(&queue, Duration::from_secs(2)).await {
        Ok(outcome) => println!("Final state: {:?}", outcome),
        Err(e) => eprintln!("Wait failed: {}", e),
    }

    queue.release();
}
