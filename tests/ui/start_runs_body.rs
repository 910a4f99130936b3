use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[handoff::start]
fn main() {
    let finished = Arc::new(AtomicBool::new(false));

    let flag = finished.clone();
    let (notifier, waiter) = handoff::sync::signal::signal();
    handoff::runtime::spawn(move || {
        flag.store(true, Ordering::SeqCst);
        notifier.notify();
    });

    waiter.wait();
    assert!(finished.load(Ordering::SeqCst));
}
