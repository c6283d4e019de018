//! Runtime task primitives.
//!
//! A task is one branch of computation: a boxed future plus the bookkeeping
//! the dispatcher needs to poll it reentrantly, abandon it, and report its
//! end to the join point that forked it.

mod core;

pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use core::{SettleHook, Task};
