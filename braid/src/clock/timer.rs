use std::cmp::Ordering;
use std::time::Duration;

/// Position of a pending callback in the loop's heap.
///
/// Only the firing position is kept here. The callback sits in the loop's
/// slab under `key`; cancelling it empties the slot and the heap entry is
/// skipped when popped.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Duration,

    /// Scheduling order, used to break deadline ties.
    pub(crate) sequence: u64,

    /// Slot of the callback in the event loop slab.
    pub(crate) key: usize,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    /// Same deadline and same sequence number.
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Ord for TimerEntry {
    /// Earlier deadlines rank higher, and among equal deadlines the lower
    /// sequence number does, so the max-heap pops callbacks in the order
    /// they are due and, on ties, the order they were scheduled.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
