#[handoff::start]
fn run() -> usize {
    let (mut dispatcher, handle) = handoff::sync::job_stream::spawn_worker(5, |_: u32| {});

    for job in 1..=3 {
        dispatcher.dispatch(job).unwrap();
    }
    dispatcher.finish().unwrap();

    handle.join().unwrap()
}

fn main() {
    assert_eq!(run(), 3);
}
