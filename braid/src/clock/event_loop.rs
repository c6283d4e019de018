use super::timer::TimerEntry;
use super::{Callback, Clock, TimerHandle};
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// How an [`EventLoop`] lets time pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Time jumps straight to the next deadline. Deterministic and instant.
    Virtual,

    /// The thread sleeps until the next deadline.
    RealTime,
}

/// The single-threaded event loop driving the runtime.
///
/// The loop owns two queues:
/// - an immediate queue, run one callback per turn in FIFO order,
/// - a timer heap ordered by deadline, run once the immediate queue is empty.
///
/// Callbacks may freely schedule or cancel other callbacks while running.
pub struct EventLoop {
    /// How time advances between deadlines.
    mode: ClockMode,

    /// Reference point for real-time deadlines.
    origin: Instant,

    /// Current virtual time, measured from the origin.
    elapsed: Cell<Duration>,

    /// Callbacks waiting for the next turn.
    immediate: RefCell<VecDeque<Callback>>,

    /// Min-heap of pending timers ordered by deadline.
    timers: RefCell<BinaryHeap<TimerEntry>>,

    /// Live timer callbacks, tagged with their scheduling sequence.
    callbacks: RefCell<Slab<(u64, Callback)>>,

    /// Next scheduling sequence number.
    sequence: Cell<u64>,
}

impl EventLoop {
    /// Creates an idle event loop.
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            immediate: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BinaryHeap::new()),
            callbacks: RefCell::new(Slab::new()),
            sequence: Cell::new(0),
        }
    }

    /// Returns the clock mode.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Time elapsed since the loop was created.
    pub fn now(&self) -> Duration {
        match self.mode {
            ClockMode::Virtual => self.elapsed.get(),
            ClockMode::RealTime => self.origin.elapsed(),
        }
    }

    /// Number of callbacks still waiting to run, timers included.
    pub fn pending(&self) -> usize {
        self.immediate.borrow().len() + self.callbacks.borrow().len()
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Runs a single callback.
    ///
    /// Immediate callbacks take priority; otherwise the loop waits for the
    /// earliest timer and runs it. Returns `false` if nothing was pending.
    pub fn turn(&self) -> bool {
        if self.run_immediate() {
            return true;
        }

        let Some((deadline, callback)) = self.next_due(None) else {
            return false;
        };

        self.wait_until(deadline);
        callback();

        true
    }

    /// Runs callbacks until nothing is pending.
    pub fn run_until_idle(&self) {
        while self.turn() {}
    }

    /// Lets `by` pass, running every callback that falls due meanwhile.
    ///
    /// Timers scheduled during the advance are run too if their deadline
    /// lies within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;

        loop {
            while self.run_immediate() {}

            let Some((deadline, callback)) = self.next_due(Some(target)) else {
                break;
            };

            self.wait_until(deadline);
            callback();
        }

        self.wait_until(target);
    }

    /// Pops and runs the oldest immediate callback.
    fn run_immediate(&self) -> bool {
        let callback = self.immediate.borrow_mut().pop_front();

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Pops the earliest live timer, unless it lies beyond `limit`.
    ///
    /// Stale heap entries left behind by canceled timers are discarded on
    /// the way.
    fn next_due(&self, limit: Option<Duration>) -> Option<(Duration, Callback)> {
        loop {
            let (deadline, key, sequence) = {
                let timers = self.timers.borrow();
                let entry = timers.peek()?;
                (entry.deadline, entry.key, entry.sequence)
            };

            let live = self
                .callbacks
                .borrow()
                .get(key)
                .is_some_and(|(tag, _)| *tag == sequence);

            if !live {
                self.timers.borrow_mut().pop();
                continue;
            }

            if limit.is_some_and(|limit| deadline > limit) {
                return None;
            }

            self.timers.borrow_mut().pop();
            let (_, callback) = self.callbacks.borrow_mut().remove(key)?;

            trace!(?deadline, "timer fired");
            return Some((deadline, callback));
        }
    }

    /// Lets time pass up to `deadline`.
    fn wait_until(&self, deadline: Duration) {
        match self.mode {
            ClockMode::Virtual => {
                if deadline > self.elapsed.get() {
                    self.elapsed.set(deadline);
                }
            }
            ClockMode::RealTime => {
                let now = self.origin.elapsed();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
        }
    }

    fn next_sequence(&self) -> u64 {
        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        sequence
    }
}

impl Clock for EventLoop {
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let sequence = self.next_sequence();
        let deadline = self.now() + delay;
        let key = self.callbacks.borrow_mut().insert((sequence, callback));

        self.timers.borrow_mut().push(TimerEntry {
            deadline,
            sequence,
            key,
        });

        trace!(?delay, key, "timer scheduled");
        TimerHandle { key, sequence }
    }

    fn schedule_immediate(&self, callback: Callback) {
        self.immediate.borrow_mut().push_back(callback);
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        let mut callbacks = self.callbacks.borrow_mut();

        let live = callbacks
            .get(handle.key)
            .is_some_and(|(sequence, _)| *sequence == handle.sequence);

        if live {
            callbacks.remove(handle.key);
            trace!(key = handle.key, "timer canceled");
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(ClockMode::RealTime)
    }
}
