//! A producer hands three jobs to a worker, closes the stream, and waits for the worker to drain it.

use handoff::sync::job_stream;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[handoff::start]
fn main() {
    init_tracing();

    let (mut jobs, worker) = job_stream::spawn_worker(5, |job: u32| info!(job, "working on job"));

    for job in 1..=3 {
        if let Err(error) = jobs.dispatch(job) {
            panic!("worker stopped early: {error}");
        }
    }

    match jobs.finish() {
        Ok(report) => info!(dispatched = report.dispatched, more_jobs = report.more_jobs, "finished"),
        Err(error) => panic!("couldn't finish job stream: {error}"),
    }

    if let Ok(processed) = worker.join() {
        info!(processed, "worker exited");
    }
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
