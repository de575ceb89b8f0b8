use std::ops::ControlFlow;

use tracing_subscriber::fmt;
use wasmzx::{Event, EventKind, EventQueue};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

fn drain(queue: &mut EventQueue, now: u32) -> Vec<Event> {
    let mut fired = Vec::new();
    let _ = queue.pump(now, |_, event| {
        fired.push(event);
        ControlFlow::Continue(())
    });
    fired
}

#[test]
fn test_fires_in_time_order() {
    let mut queue = EventQueue::new();
    for (time, drive) in [(300, 0), (100, 1), (200, 2), (100, 3)] {
        queue.schedule(time, EventKind::FddIndex, Some(drive)).unwrap();
    }

    let fired: Vec<(u32, Option<usize>)> = drain(&mut queue, 1_000)
        .iter()
        .map(|e| (e.time, e.payload))
        .collect();
    assert_eq!(
        fired,
        vec![(100, Some(1)), (100, Some(3)), (200, Some(2)), (300, Some(0))]
    );
    assert!(queue.is_empty());
}

#[test]
fn test_nothing_fires_early() {
    let mut queue = EventQueue::new();
    queue.schedule(50, EventKind::FdcCommand, None).unwrap();
    queue.schedule(51, EventKind::FdcCommand, None).unwrap();

    assert_eq!(drain(&mut queue, 49).len(), 0);
    assert_eq!(drain(&mut queue, 50).len(), 1);
    assert_eq!(queue.next_time(), Some(51));
}

#[test]
fn test_cancelled_events_never_fire() {
    let mut queue = EventQueue::new();
    queue.schedule(10, EventKind::FddMotor, Some(0)).unwrap();
    queue.schedule(20, EventKind::FddMotor, Some(1)).unwrap();
    queue.schedule(30, EventKind::FdcCommand, None).unwrap();

    queue.cancel_matching(|e| e.kind == EventKind::FddMotor && e.payload == Some(1));
    queue.cancel_kind(EventKind::FdcCommand);

    let fired = drain(&mut queue, 100);
    assert_eq!(fired, vec![Event::new(10, EventKind::FddMotor, Some(0))]);
    assert_eq!(queue.next_time(), None);
}

#[test]
fn test_events_scheduled_during_pump_fire_in_same_pass() {
    let mut queue = EventQueue::new();
    queue.schedule(10, EventKind::FdcCommand, None).unwrap();

    let mut fired = Vec::new();
    let _ = queue.pump(100, |queue, event| {
        fired.push(event.time);
        if event.time < 40 {
            queue
                .schedule(event.time + 10, EventKind::FdcCommand, None)
                .unwrap();
        }
        ControlFlow::Continue(())
    });

    assert_eq!(fired, vec![10, 20, 30, 40]);
}

#[test]
fn test_break_leaves_the_rest_queued() {
    let mut queue = EventQueue::new();
    queue.schedule(5, EventKind::Breakpoint, None).unwrap();
    queue.schedule(6, EventKind::FdcCommand, None).unwrap();

    let result = queue.pump(10, |_, event| {
        if event.kind == EventKind::Breakpoint {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    assert!(result.is_break());
    assert_eq!(queue.len(), 1);
    assert_eq!(drain(&mut queue, 10).len(), 1);
}

#[test]
fn test_rebase_preserves_order() {
    const FRAME: u32 = 69_888;
    let times = [FRAME + 500, FRAME, FRAME + 12, FRAME + 500, 3 * FRAME];

    let mut plain = EventQueue::new();
    let mut rebased = EventQueue::new();
    for (n, time) in times.iter().enumerate() {
        plain.schedule(*time, EventKind::FddIndex, Some(n)).unwrap();
        rebased.schedule(*time, EventKind::FddIndex, Some(n)).unwrap();
    }
    rebased.rebase(FRAME);

    let expected: Vec<(u32, Option<usize>)> = drain(&mut plain, 4 * FRAME)
        .iter()
        .map(|e| (e.time - FRAME, e.payload))
        .collect();
    let actual: Vec<(u32, Option<usize>)> = drain(&mut rebased, 3 * FRAME)
        .iter()
        .map(|e| (e.time, e.payload))
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(actual[0], (0, Some(1)));
}

#[test]
fn test_from_events_restores_order() {
    let events = vec![
        Event::new(40, EventKind::FddIndex, Some(0)),
        Event::new(10, EventKind::Frame, None),
        Event::new(40, EventKind::FdcCommand, None),
        Event::new(20, EventKind::Null, None),
    ];
    let queue = EventQueue::from_events(events);

    let kinds: Vec<EventKind> = queue.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Frame, EventKind::FddIndex, EventKind::FdcCommand]
    );
}
