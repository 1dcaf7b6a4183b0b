//! Integration tests for senders driving a scheduler end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frame_pulse::{
    ManualClock, Priority, SchedulerConfig, Sender, SenderMultiCast, TickScheduler,
};

fn scheduler(categories: usize, default_budget: Duration) -> TickScheduler {
    let config = SchedulerConfig {
        categories,
        pool_capacity: 1024,
        default_budget,
    };
    TickScheduler::with_clock(config, Box::new(ManualClock::new()))
}

#[test]
fn test_multicast_demo_loop_drains_every_receiver() {
    // Three receivers across two categories, one of them skippable; every
    // send fans out into three tasks, and each tick drains them all within
    // the window.
    let scheduler = scheduler(2, Duration::from_micros(30));
    let hits = Arc::new(AtomicU32::new(0));

    let mut on_event = SenderMultiCast::new();
    for (category, priority) in [
        (0u16, Priority::CanWait),
        (1, Priority::CanWait),
        (0, Priority::SkipAfter16Frames),
    ] {
        let sink = Arc::clone(&hits);
        on_event.register(
            move |payload: u32| {
                std::hint::black_box(payload);
                sink.fetch_add(1, Ordering::SeqCst);
            },
            category,
            priority,
        );
    }
    assert_eq!(on_event.len(), 3);

    for round in 0..5u32 {
        assert_eq!(on_event.send(&scheduler, round), Ok(3));
        scheduler.execute_tick(Duration::from_micros(100));
    }

    assert_eq!(hits.load(Ordering::SeqCst), 15);
    assert_eq!(scheduler.pending_tasks(), 0);
    assert_eq!(scheduler.stats().dispatched_total(), 15);
}

#[test]
fn test_unregister_stops_future_fanout() {
    let scheduler = scheduler(1, Duration::from_micros(1_000));
    let hits = Arc::new(AtomicU32::new(0));

    let mut on_event = SenderMultiCast::new();
    let register = |multicast: &mut SenderMultiCast<u32>, hits: &Arc<AtomicU32>| {
        let sink = Arc::clone(hits);
        multicast.register(
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
            0,
            Priority::CanWait,
        )
    };
    let first = register(&mut on_event, &hits);
    let _second = register(&mut on_event, &hits);

    assert_eq!(on_event.send(&scheduler, 0), Ok(2));
    scheduler.execute_tick(Duration::from_micros(10_000));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    assert_eq!(on_event.unregister(first.id), 1);
    assert_eq!(on_event.send(&scheduler, 0), Ok(1));
    scheduler.execute_tick(Duration::from_micros(10_000));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn test_single_cast_sender_targets_its_category() {
    let scheduler = scheduler(3, Duration::from_micros(1_000));
    let seen = Arc::new(AtomicU32::new(0));
    let sink = Arc::clone(&seen);

    let sender = Sender::new(
        move |n: u32| sink.store(n, Ordering::SeqCst),
        2,
        Priority::CanWait,
    );
    assert!(sender.is_set());
    assert_eq!(sender.info().unwrap().category, 2);

    assert_eq!(sender.send(&scheduler, 99), Ok(true));
    scheduler.execute_tick(Duration::from_micros(10_000));
    assert_eq!(seen.load(Ordering::SeqCst), 99);
}

#[test]
fn test_receiver_unregistering_itself_from_its_own_task() {
    // A delegate may cancel its sender's pending work mid-tick; the posted
    // cancellation is deferred, so the tick that is running is unaffected
    // and the next tick applies it.
    let scheduler = Arc::new(scheduler(1, Duration::from_micros(1_000)));
    let hits = Arc::new(AtomicU32::new(0));

    let sink = Arc::clone(&hits);
    let cancel_target = Arc::new(parking_lot::Mutex::new(None::<Sender<u32>>));
    let cancel_from_task = Arc::clone(&cancel_target);
    let scheduler_from_task = Arc::clone(&scheduler);

    let sender = Sender::new(
        move |_: u32| {
            sink.fetch_add(1, Ordering::SeqCst);
            if let Some(sender) = cancel_from_task.lock().as_ref() {
                sender.remove_pending_task(&scheduler_from_task);
            }
        },
        0,
        Priority::CanWait,
    );
    *cancel_target.lock() = Some(sender.clone());

    // Two sends: the first task runs and posts a cancellation that removes
    // the second before the following tick dispatches it.
    sender.send(&scheduler, 1).unwrap();
    scheduler.execute_tick(Duration::from_micros(10_000));
    sender.send(&scheduler, 2).unwrap();
    scheduler.execute_tick(Duration::from_micros(10_000));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.pending_tasks(), 0);
    assert_eq!(scheduler.stats().cancelled, 1);
}
