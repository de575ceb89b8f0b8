use std::{collections::VecDeque, fmt, ops::ControlFlow};

use serde::{Deserialize, Serialize};

use crate::error::SchedulingError;

/// Event types that can be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A cancelled slot waiting to be compacted away.
    Null,
    /// End of the video frame; the clock wraps here.
    Frame,
    /// The ULA stops asserting INT.
    InterruptEnd,
    /// Debugger time breakpoint, stops the current pump pass.
    Breakpoint,
    /// Continuation of the floppy controller's current command.
    FdcCommand,
    /// A drive motor finished spinning up or down. Payload: drive number.
    FddMotor,
    /// A drive's index hole entered or left the sensor. Payload: drive number.
    FddIndex,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Null => "null",
            EventKind::Frame => "frame",
            EventKind::InterruptEnd => "interrupt end",
            EventKind::Breakpoint => "breakpoint",
            EventKind::FdcCommand => "fdc command",
            EventKind::FddMotor => "fdd motor",
            EventKind::FddIndex => "fdd index",
        };
        f.write_str(name)
    }
}

/// Scheduled event with timing information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Trigger time in tstates since the start of the current frame.
    pub time: u32,
    pub kind: EventKind,
    pub payload: Option<usize>,
}

impl Event {
    pub fn new(time: u32, kind: EventKind, payload: Option<usize>) -> Self {
        Self {
            time,
            kind,
            payload,
        }
    }
}

/// Time-ordered queue of pending events.
///
/// The queue is kept sorted by trigger time; an event is inserted after every
/// event with the same time, so ties fire in scheduling order. Cancelled
/// events become `EventKind::Null` and are dropped lazily.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from a list of events, e.g. a restored snapshot.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut events: Vec<Event> = events
            .into_iter()
            .filter(|e| e.kind != EventKind::Null)
            .collect();
        // stable: ties keep their recorded order
        events.sort_by_key(|e| e.time);
        Self {
            events: events.into(),
        }
    }

    pub fn schedule(
        &mut self,
        time: u32,
        kind: EventKind,
        payload: Option<usize>,
    ) -> Result<(), SchedulingError> {
        if kind == EventKind::Null {
            debug_assert!(false, "scheduling a null event");
            tracing::error!("[EVENT] Refusing to schedule a null event at {}", time);
            return Ok(());
        }

        self.events.try_reserve(1)?;
        let index = self.events.partition_point(|e| e.time <= time);
        self.events.insert(index, Event::new(time, kind, payload));

        tracing::trace!("[EVENT] Scheduled {} at {} ({:?})", kind, time, payload);
        Ok(())
    }

    /// Cancel every pending event of `kind`.
    pub fn cancel_kind(&mut self, kind: EventKind) {
        self.cancel_matching(|e| e.kind == kind);
    }

    /// Cancel every pending event the predicate accepts.
    pub fn cancel_matching(&mut self, mut predicate: impl FnMut(&Event) -> bool) {
        for event in self.events.iter_mut() {
            if event.kind != EventKind::Null && predicate(event) {
                tracing::trace!(
                    "[EVENT] Cancelled {} at {} ({:?})",
                    event.kind,
                    event.time,
                    event.payload
                );
                event.kind = EventKind::Null;
            }
        }
    }

    pub fn for_each(&self, mut visitor: impl FnMut(&Event)) {
        self.iter().for_each(|e| visitor(e));
    }

    /// Pending events in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.kind != EventKind::Null)
    }

    pub fn events(&self) -> Vec<Event> {
        self.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Trigger time of the earliest pending event.
    pub fn next_time(&self) -> Option<u32> {
        self.iter().next().map(|e| e.time)
    }

    /// Remove and return the earliest pending event due at or before `now`.
    pub fn pop_due(&mut self, now: u32) -> Option<Event> {
        while let Some(front) = self.events.front() {
            if front.kind == EventKind::Null {
                self.events.pop_front();
                continue;
            }
            if front.time > now {
                return None;
            }
            return self.events.pop_front();
        }
        None
    }

    /// Fire every event due at or before `now`.
    ///
    /// The handler gets the queue back so it can schedule follow-up events;
    /// anything it schedules at or before `now` fires in this same pass.
    /// Returns `Break` if the handler asked to stop early.
    pub fn pump<F>(&mut self, now: u32, mut handler: F) -> ControlFlow<()>
    where
        F: FnMut(&mut Self, Event) -> ControlFlow<()>,
    {
        while let Some(event) = self.pop_due(now) {
            if handler(self, event).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Move every pending event back by one frame.
    pub fn rebase(&mut self, frame_length: u32) {
        self.compact();
        for event in self.events.iter_mut() {
            if event.time < frame_length {
                debug_assert!(
                    false,
                    "{} event at {} outlived the frame boundary {}",
                    event.kind, event.time, frame_length
                );
                tracing::error!(
                    "[EVENT] {} event at {} outlived the frame boundary {}",
                    event.kind,
                    event.time,
                    frame_length
                );
                event.time = 0;
            } else {
                event.time -= frame_length;
            }
        }
    }

    fn compact(&mut self) {
        self.events.retain(|e| e.kind != EventKind::Null);
    }
}
