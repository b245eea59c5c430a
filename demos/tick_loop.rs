use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::executor::ThreadPool;
use tickpromise::{Promise, TickQueue};

const MIRRORS: u64 = 3;

fn main() {
    let workers = ThreadPool::new().expect("Thread pool creation failed");
    let mut frame_loop = TickQueue::new();

    // First response wins: every mirror races to settle the same promise.
    let download = Promise::<String>::new(frame_loop.handle());
    let done = Arc::new(AtomicUsize::new(0));

    let done_cl = Arc::clone(&done);
    download.on_settled(move |p| {
        match p.outcome() {
            Some(Ok(body)) => println!("Downloaded: {body}"),
            Some(Err(fault)) => println!("Download failed: {fault}"),
            None => unreachable!("subscribers only run once settled"),
        }
        done_cl.fetch_add(1, Ordering::SeqCst);
    });

    for mirror in 0..MIRRORS {
        let download = download.clone();
        workers.spawn_ok(async move {
            std::thread::sleep(Duration::from_millis(10 * (MIRRORS - mirror)));
            let won = if mirror == 1 {
                download.fault(format!("mirror {mirror} timed out"))
            } else {
                download.complete(format!("payload from mirror {mirror}"))
            };
            println!("Mirror {mirror} finished, won the race: {won}");
        });
    }

    let mut frame = 0;
    while done.load(Ordering::SeqCst) == 0 {
        frame += 1;
        let ran = frame_loop.tick();
        if ran > 0 {
            println!("Frame {frame}: ran {ran} deferred actions");
        }
        std::thread::sleep(Duration::from_millis(16));
    }
}
