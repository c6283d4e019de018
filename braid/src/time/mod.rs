//! Time utilities.
//!
//! This module provides the time-related combinators, all driven by the
//! runtime's [`Clock`](crate::clock::Clock).
//!
//! It includes:
//! - [`wait`] for suspending a branch, cancelable above a threshold,
//! - [`yield_for`] and [`yield_now`] for cooperative rescheduling,
//! - [`timeout`] for bounding a computation's running time.

mod timeout;
mod wait;

#[doc(inline)]
pub use timeout::timeout;

#[doc(inline)]
pub use wait::{wait, yield_for, yield_now};
