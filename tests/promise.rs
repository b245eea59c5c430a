use std::{
    fmt,
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use macro_rules_attribute::apply;
use tickpromise::{Promise, PromiseError, State, TickQueue};

#[derive(Debug)]
struct DiskError {
    code: i32,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk error {}", self.code)
    }
}

impl std::error::Error for DiskError {}

#[test]
fn promise_starts_pending() {
    let queue = TickQueue::new();
    let promise = Promise::<i32>::new(queue.handle());

    assert_eq!(promise.state(), State::Pending, "New promise should be pending");
    assert!(promise.is_pending(), "New promise should be pending");
    assert!(!promise.is_completed(), "New promise should not be completed");
    assert!(!promise.is_faulted(), "New promise should not be faulted");
    assert_eq!(
        promise.result(),
        Err(PromiseError::NotCompleted(State::Pending)),
        "Pending promise should have no result"
    );
    assert!(promise.error().is_none(), "Pending promise should have no error");
    assert!(promise.outcome().is_none(), "Pending promise should have no outcome");
    assert_eq!(queue.pending(), 0, "Nothing should be scheduled yet");
}

#[test]
fn promise_complete() {
    let queue = TickQueue::new();
    let promise = Promise::new(queue.handle());

    assert!(promise.complete(42), "First completion should win");
    assert_eq!(promise.state(), State::Completed, "Promise should be completed");
    assert!(promise.is_completed(), "Promise should be completed");
    assert_eq!(promise.result(), Ok(&42), "Promise should hold the value");
    assert!(promise.error().is_none(), "Completed promise should have no error");
    assert_eq!(queue.pending(), 1, "Exactly one dispatch should be scheduled");
}

#[test]
fn promise_fault() {
    let queue = TickQueue::new();
    let promise = Promise::<String>::new(queue.handle());

    assert!(promise.fault("disk on fire"), "First fault should win");
    assert_eq!(promise.state(), State::Faulted, "Promise should be faulted");
    assert!(promise.is_faulted(), "Promise should be faulted");
    assert_eq!(
        promise.result(),
        Err(PromiseError::NotCompleted(State::Faulted)),
        "Faulted promise should have no result"
    );
    assert_eq!(
        promise.error().map(|e| e.to_string()),
        Some("disk on fire".to_string()),
        "Promise should hold the fault"
    );
}

#[test]
fn promise_fault_keeps_error_type() {
    let queue = TickQueue::new();
    let promise = Promise::<()>::new(queue.handle());

    promise.fault(DiskError { code: 5 });

    let code = promise
        .error()
        .and_then(|e| e.downcast_ref::<DiskError>())
        .map(|e| e.code);
    assert_eq!(code, Some(5), "Fault should downcast to the original error");
}

#[test]
fn promise_settles_once() {
    let queue = TickQueue::new();
    let promise = Promise::new(queue.handle());

    assert!(promise.complete(1), "First completion should win");
    assert!(!promise.complete(2), "Second completion should lose");
    assert!(!promise.fault("late"), "Fault after completion should lose");

    assert_eq!(promise.result(), Ok(&1), "Result should not change");
    assert!(promise.error().is_none(), "Error should not appear");
    assert_eq!(promise.state(), State::Completed, "State should not change");
    assert_eq!(queue.pending(), 1, "Losing calls should not schedule anything");

    let faulted = Promise::<i32>::new(queue.handle());
    assert!(faulted.fault("first"), "First fault should win");
    assert!(!faulted.complete(3), "Completion after fault should lose");
    assert!(!faulted.fault("second"), "Second fault should lose");
    assert_eq!(
        faulted.error().map(|e| e.to_string()),
        Some("first".to_string()),
        "Fault should not change"
    );
}

#[test]
fn promise_concurrent_settlement_has_one_winner() {
    const THREADS: usize = 16;

    for _ in 0..50 {
        let queue = TickQueue::new();
        let promise = Promise::<usize>::new(queue.handle());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let promise = promise.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let won = if i % 2 == 0 {
                        promise.complete(i)
                    } else {
                        promise.fault(format!("{i}"))
                    };
                    won.then_some(i)
                })
            })
            .collect();

        let winners: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1, "Exactly one call should win");

        let winner = winners[0];
        if winner % 2 == 0 {
            assert_eq!(promise.result(), Ok(&winner), "Winner's value should be stored");
        } else {
            assert_eq!(
                promise.error().map(|e| e.to_string()),
                Some(winner.to_string()),
                "Winner's fault should be stored"
            );
        }
        assert_eq!(queue.pending(), 1, "Only the winner should schedule a dispatch");
    }
}

#[test]
fn promise_simultaneous_completions_have_one_winner() {
    for _ in 0..100 {
        let queue = TickQueue::new();
        let promise = Promise::new(queue.handle());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [42, 7]
            .into_iter()
            .map(|value| {
                let promise = promise.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    promise.complete(value).then_some(value)
                })
            })
            .collect();

        let winners: Vec<i32> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1, "Exactly one thread should win");
        assert_eq!(
            promise.result(),
            Ok(&winners[0]),
            "Result should be the winning thread's value"
        );
    }
}

#[test]
fn promise_fault_with_forwards_same_fault() {
    let queue = TickQueue::new();
    let source = Promise::<u32>::new(queue.handle());
    let forwarded = Promise::<u32>::new(queue.handle());

    source.fault(DiskError { code: 3 });
    let fault = source.error().cloned().unwrap();
    assert!(forwarded.fault_with(fault), "Forwarded fault should win");
    assert!(
        !forwarded.fault_with(Arc::new(DiskError { code: 4 })),
        "Second fault should lose"
    );

    let stored = forwarded.error().unwrap();
    assert!(
        Arc::ptr_eq(stored, source.error().unwrap()),
        "Forwarded fault should be the same allocation"
    );
    assert_eq!(
        stored.downcast_ref::<DiskError>().map(|e| e.code),
        Some(3),
        "Forwarded fault should keep its error type"
    );
}

#[test]
fn promise_fault_notifies_subscriber_on_tick() {
    let mut queue = TickQueue::new();
    let promise = Promise::<i32>::new(queue.handle());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));

    let calls_cl = Arc::clone(&calls);
    let seen_cl = Arc::clone(&seen);
    promise.on_settled(move |p| {
        calls_cl.fetch_add(1, Ordering::SeqCst);
        *seen_cl.lock().unwrap() = Some((
            p.state(),
            p.error().map(|e| e.to_string()),
            thread::current().id(),
        ));
    });

    let producer = promise.clone();
    assert!(
        thread::spawn(move || producer.fault("errX")).join().unwrap(),
        "Fault should win"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0, "Callback should wait for the tick");

    assert_eq!(queue.tick(), 1, "Tick should run the dispatch");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Callback should run once");

    let (state, error, thread_id) = seen.lock().unwrap().take().unwrap();
    assert_eq!(state, State::Faulted, "Callback should see the faulted state");
    assert_eq!(error, Some("errX".to_string()), "Callback should see the fault");
    assert_eq!(
        thread_id,
        thread::current().id(),
        "Callback should run on the ticking thread"
    );

    assert_eq!(queue.tick(), 0, "Nothing should be left to run");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Callback should not run again");
}

#[test]
fn promise_subscribers_run_in_registration_order() {
    let mut queue = TickQueue::new();
    let promise = Promise::new(queue.handle());
    let order = Arc::new(Mutex::new(String::new()));

    for c in ['a', 'b', 'c', 'd'] {
        let order = Arc::clone(&order);
        promise.on_settled(move |_| order.lock().unwrap().push(c));
    }

    promise.complete(());
    // Registered after settling but before the dispatch ran.
    let order_cl = Arc::clone(&order);
    promise.on_settled(move |_| order_cl.lock().unwrap().push('e'));

    assert_eq!(queue.tick(), 1, "All subscribers should share one dispatch");
    assert_eq!(
        order.lock().unwrap().as_str(),
        "abcde",
        "Subscribers should run in registration order"
    );
}

#[test]
fn promise_late_subscriber_still_runs() {
    let mut queue = TickQueue::new();
    let promise = Promise::new(queue.handle());
    promise.complete("value");
    queue.tick();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = Arc::clone(&calls);
    promise.on_settled(move |p| {
        assert_eq!(p.result(), Ok(&"value"), "Late subscriber should see the value");
        calls_cl.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(calls.load(Ordering::SeqCst), 0, "Late subscriber should not run inline");
    assert_eq!(queue.tick(), 1, "Late subscriber should be scheduled");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Late subscriber should run once");
    queue.tick();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Late subscriber should not run again");
}

#[test]
fn promise_subscribing_from_callback_defers_to_next_tick() {
    let mut queue = TickQueue::new();
    let promise = Promise::new(queue.handle());
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_cl = Arc::clone(&calls);
    promise.on_settled(move |p| {
        let calls = Arc::clone(&calls_cl);
        p.on_settled(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    });

    promise.complete(1u8);
    assert_eq!(queue.tick(), 1, "First tick should only run the dispatch");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "Nested subscriber should wait");
    assert_eq!(queue.tick(), 1, "Second tick should run the nested subscriber");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Nested subscriber should run once");
}

#[tokio::test(flavor = "multi_thread")]
async fn promise_wait_resolves_after_tick() {
    let mut queue = TickQueue::new();
    let promise = Promise::<String>::new(queue.handle());
    let wait = promise.wait();

    let producer = promise.clone();
    tokio::task::spawn_blocking(move || producer.complete(String::from("Result")))
        .await
        .unwrap();

    queue.tick();
    let r = wait.await;
    assert_eq!(r.ok(), Some("Result".to_string()), "Wait should yield the value");
}

#[apply(smol_macros::test!)]
async fn promise_wait_yields_fault() {
    let mut queue = TickQueue::new();
    let promise = Promise::<u32>::new(queue.handle());
    let mut wait = promise.wait();

    promise.fault(DiskError { code: 9 });
    assert!(
        futures_lite::future::poll_once(&mut wait).await.is_none(),
        "Wait should stay pending until the tick"
    );
    queue.tick();

    let fault = wait.await.err().unwrap();
    assert_eq!(fault.to_string(), "disk error 9", "Wait should yield the fault");
}

#[apply(smol_macros::test!)]
async fn promise_wait_abandoned_when_dropped() {
    let queue = TickQueue::new();
    let promise = Promise::<u32>::new(queue.handle());
    let wait = promise.wait();

    drop(promise);

    let fault = wait.await.err().unwrap();
    assert_eq!(
        fault.downcast_ref::<PromiseError>(),
        Some(&PromiseError::Abandoned),
        "Dropped promise should abandon its waiters"
    );
}
