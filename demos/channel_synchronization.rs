//! A controller blocks until its worker reports that the work is done.

use std::thread;
use std::time::Duration;

use handoff::runtime;
use handoff::sync::signal::{self, Notifier};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Blissfully unaware of anything but its own signal.
fn worker(done: Notifier) {
    info!("working...");
    thread::sleep(Duration::from_secs(1));
    info!("done");

    done.notify();
}

#[handoff::start]
fn main() {
    init_tracing();

    let (done, waiter) = signal::signal();
    runtime::spawn(move || worker(done));

    waiter.wait();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
