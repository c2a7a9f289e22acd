//! Discrete-event clock.
//!
//! A priority queue of scheduled wakes ordered by simulated time, with a
//! monotonically increasing sequence number so wakes scheduled for the same
//! instant pop in FIFO order. Processes are resumable state machines owned
//! by the caller; the clock only knows when to hand each token back.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::fixed::SimTime;

/// A due wake: the instant it fires and the process token to resume.
#[derive(Debug)]
pub struct Wake<P> {
    pub at: SimTime,
    pub process: P,
}

#[derive(Debug)]
struct Entry<P> {
    at: SimTime,
    seq: u64,
    process: P,
}

// Ordering ignores the process payload: (at, seq) is already total because
// seq is unique.
impl<P> PartialEq for Entry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<P> Eq for Entry<P> {}

impl<P> PartialOrd for Entry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Entry<P> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// The event clock driving one simulation instance.
#[derive(Debug)]
pub struct EventClock<P> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Entry<P>>>,
}

impl<P> Default for EventClock<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventClock<P> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Schedule a process to wake `delay` simulated seconds from now.
    pub fn schedule(&mut self, delay: SimTime, process: P) {
        self.schedule_at(self.now + delay, process);
    }

    /// Schedule a process to wake at an absolute instant. Instants in the
    /// past fire on the next step without rewinding the clock.
    pub fn schedule_at(&mut self, at: SimTime, process: P) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { at, seq, process }));
    }

    /// Pop the earliest wake and advance `now` to it. The single-step
    /// primitive the control gate loops on.
    pub fn step(&mut self) -> Option<Wake<P>> {
        let Reverse(entry) = self.queue.pop()?;
        if entry.at > self.now {
            self.now = entry.at;
        }
        Some(Wake {
            at: entry.at,
            process: entry.process,
        })
    }
}
