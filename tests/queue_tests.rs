use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

use vmtelemetry::config::NOTIFICATION_QUEUE_MAX;
use vmtelemetry::kernel::notify::{DispatchExit, Dispatcher, Envelope, NotificationQueue, QueueState};
use vmtelemetry::{DeliveryError, EnqueueError, InitError};

#[test]
fn overflow_keeps_first_ten_in_order() {
    let queue = NotificationQueue::new("test", NOTIFICATION_QUEUE_MAX);

    // 1. Fill past capacity without a consumer
    for i in 0..25u32 {
        let result = queue.enqueue(i);
        if i < 10 {
            assert_eq!(result, Ok(u64::from(i)));
        } else {
            assert_eq!(result, Err(EnqueueError::Full));
        }
    }
    assert_eq!(queue.state(), QueueState::HasPending(10));
    assert_eq!(queue.dropped(), 15);

    // 2. Drain: exactly the first ten, in order
    let drained: Vec<u32> = std::iter::from_fn(|| queue.try_next())
        .map(|entry| match entry.message {
            Envelope::Notify(v) => v,
            Envelope::Shutdown => panic!("unexpected sentinel"),
        })
        .collect();
    assert_eq!(drained, (0..10).collect::<Vec<_>>());
    assert_eq!(queue.state(), QueueState::Empty);
}

#[test]
fn dropped_entries_consume_no_sequence_number() {
    let queue = NotificationQueue::new("test", 2);
    assert_eq!(queue.enqueue('a'), Ok(0));
    assert_eq!(queue.enqueue('b'), Ok(1));
    assert_eq!(queue.enqueue('c'), Err(EnqueueError::Full));
    queue.try_next();
    assert_eq!(queue.enqueue('d'), Ok(2));
}

#[test]
fn state_machine_transitions() {
    let queue = NotificationQueue::new("test", 4);
    assert_eq!(queue.state(), QueueState::Empty);
    queue.enqueue(1).ok();
    assert_eq!(queue.state(), QueueState::HasPending(1));
    queue.enqueue(2).ok();
    assert_eq!(queue.state(), QueueState::HasPending(2));
    queue.try_next();
    assert_eq!(queue.state(), QueueState::HasPending(1));

    assert_eq!(queue.shutdown(), 1);
    assert_eq!(queue.state(), QueueState::ShuttingDown);
    assert_eq!(queue.pending(), 1);
    assert_eq!(queue.enqueue(3), Err(EnqueueError::Closed));

    let entry = queue.try_next().expect("sentinel");
    assert_eq!(entry.message, Envelope::Shutdown);
    assert_eq!(queue.state(), QueueState::Stopped);
    assert!(queue.try_next().is_none());

    // Repeated shutdown is a no-op
    assert_eq!(queue.shutdown(), 0);
    assert_eq!(queue.state(), QueueState::Stopped);
}

#[test]
fn shutdown_discards_queued_items_for_every_fill_level() {
    for n in 0..=NOTIFICATION_QUEUE_MAX {
        let queue = NotificationQueue::new("test", NOTIFICATION_QUEUE_MAX);
        for i in 0..n {
            queue.enqueue(i).ok();
        }

        assert_eq!(queue.shutdown(), n);

        let mut observed = Vec::new();
        while let Some(entry) = queue.try_next() {
            observed.push(entry.message);
        }
        assert_eq!(observed, vec![Envelope::Shutdown], "fill level {n}");
    }
}

#[test]
fn dispatcher_exits_on_sentinel_without_delivering_discarded_items() {
    let queue = Arc::new(NotificationQueue::new("test", NOTIFICATION_QUEUE_MAX));
    let delivered = Arc::new(Mutex::new(Vec::new()));

    // 1. Queue items before the dispatcher can run, then shut down
    for i in 0..5 {
        queue.enqueue(i).ok();
    }
    queue.shutdown();

    // 2. The dispatcher sees only the sentinel
    let sink = delivered.clone();
    let mut dispatcher = Dispatcher::spawn("test-dispatcher", queue.clone(), move |_, v: i32| {
        sink.lock().push(v);
        Ok(())
    })
    .expect("spawn");

    match dispatcher.join() {
        Some(DispatchExit::Shutdown { delivered }) => assert_eq!(delivered, 0),
        other => panic!("unexpected exit: {other:?}"),
    }
    assert!(delivered.lock().is_empty());
    assert_eq!(queue.state(), QueueState::Stopped);
    assert!(dispatcher.is_finished());
}

#[test]
fn dispatcher_stops_on_delivery_failure() {
    let queue = Arc::new(NotificationQueue::new("test", NOTIFICATION_QUEUE_MAX));
    for i in 0..4 {
        queue.enqueue(i).ok();
    }

    let mut dispatcher = Dispatcher::spawn("failing", queue.clone(), |_, v: i32| {
        if v == 2 {
            Err(DeliveryError("consumer went away".into()))
        } else {
            Ok(())
        }
    })
    .expect("spawn");

    match dispatcher.join() {
        Some(DispatchExit::DeliveryFailed { delivered, error }) => {
            assert_eq!(delivered, 2);
            assert_eq!(error.0, "consumer went away");
        }
        other => panic!("unexpected exit: {other:?}"),
    }
    // The remaining item stays queued; producers are not told
    assert_eq!(queue.pending(), 1);
    assert!(queue.enqueue(9).is_ok());
}

#[test]
fn dispatcher_rejects_nul_in_thread_name() {
    let queue = Arc::new(NotificationQueue::<u32>::new("test", NOTIFICATION_QUEUE_MAX));
    let result = Dispatcher::spawn("bad\0name", queue.clone(), |_, _| Ok(()));
    assert!(matches!(result, Err(InitError::Spawn { .. })));
    // Nothing is consuming the queue
    queue.enqueue(1).ok();
    assert_eq!(queue.state(), QueueState::HasPending(1));
}

#[test]
fn concurrent_producers_are_delivered_in_sequence_order() {
    let queue = Arc::new(NotificationQueue::new("test", NOTIFICATION_QUEUE_MAX));
    let sequences = Arc::new(Mutex::new(Vec::new()));

    let seen = sequences.clone();
    let mut dispatcher = Dispatcher::spawn("ordered", queue.clone(), move |seq, _: (usize, usize)| {
        seen.lock().push(seq);
        Ok(())
    })
    .expect("spawn");

    // 1. Four producers, 200 items each, never blocking on the consumer
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut accepted = 0;
                for i in 0..200 {
                    if queue.enqueue((p, i)).is_ok() {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();
    let accepted: usize = producers.into_iter().map(|h| h.join().expect("producer")).sum();

    // 2. Wait for the consumer to catch up, then stop it
    while queue.pending() > 0 {
        thread::yield_now();
    }
    queue.shutdown();
    dispatcher.join();

    // 3. Sequence numbers strictly increase at the consumer
    let seen = sequences.lock();
    println!("accepted {accepted}, delivered {}", seen.len());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.len(), accepted);
}

proptest! {
    #[test]
    fn fifo_holds_for_any_interleaving(ops in proptest::collection::vec(any::<bool>(), 0..100)) {
        let queue = NotificationQueue::new("prop", NOTIFICATION_QUEUE_MAX);
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u32;

        for push in ops {
            if push {
                let accepted = queue.enqueue(next).is_ok();
                prop_assert_eq!(accepted, model.len() < NOTIFICATION_QUEUE_MAX);
                if accepted {
                    model.push_back(next);
                }
                next += 1;
            } else {
                let got = queue.try_next().map(|e| e.message);
                prop_assert_eq!(got, model.pop_front().map(Envelope::Notify));
            }
        }
    }
}
