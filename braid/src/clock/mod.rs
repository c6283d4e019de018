//! Host timer primitives.
//!
//! The runtime never reads wall-clock time on its own. Every delay and every
//! "next turn" callback goes through a [`Clock`], which makes the whole
//! runtime drivable by a deterministic virtual clock in tests.
//!
//! [`EventLoop`] is the clock shipped with the runtime: a timer heap plus an
//! immediate queue, running in either virtual or real time.

mod event_loop;
mod timer;

use std::time::Duration;

#[doc(inline)]
pub use event_loop::{ClockMode, EventLoop};

/// A callback run by the clock.
pub type Callback = Box<dyn FnOnce()>;

/// Handle to a timer scheduled with [`Clock::schedule`].
///
/// Handles stay valid after the timer fired or was canceled; canceling
/// them again is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    /// Slot of the callback in the clock's table.
    pub(crate) key: usize,

    /// Sequence number distinguishing reuses of the same slot.
    pub(crate) sequence: u64,
}

/// Scheduling capability consumed by the runtime.
pub trait Clock {
    /// Runs `callback` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle;

    /// Runs `callback` on the next turn of the event loop.
    fn schedule_immediate(&self, callback: Callback);

    /// Prevents a scheduled timer from firing.
    fn cancel_timer(&self, handle: TimerHandle);
}
