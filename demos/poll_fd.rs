//! Event loop integration example.
//!
//! Run with: cargo run --example poll_fd
//!
//! Registers the queue's descriptor with poll(2) and reacts when the queue
//! drains, the way an external event loop would.

#[cfg(target_os = "linux")]
fn main() {
    use devqueue::{EventKind, LibraryContext, QueueContext};
    use std::thread;
    use std::time::Duration;

    let queue = QueueContext::open(&LibraryContext::default()).expect("Failed to open queue");
    let fd = queue.as_raw_fd().expect("queue released");

    let seq = queue
        .submit(EventKind::Change, "/devices/virtual/net/lo")
        .expect("Failed to submit event");

    let worker = queue.retain();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        worker.settle(seq);
        worker.release();
    });

    let mut fds = [libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }];

    loop {
        // SAFETY: `fds` is a valid array of one pollfd.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, 100) };
        if ready > 0 && queue.try_wait().unwrap_or(false) {
            println!("Queue drained (empty: {})", queue.is_empty());
            break;
        }
        println!("... still busy ({} in flight)", queue.in_flight_count());
    }

    queue.release();
}

#[cfg(not(target_os = "linux"))]
fn main() {
    println!("This example needs an eventfd-capable platform.");
}
