//! Core runtime components.
//!
//! This module contains the pieces every combinator is built on:
//! - the [`Cx`] capability and its suspension futures,
//! - the dispatcher owning tasks and the root registry,
//! - context tokens capturing the scope nesting,
//! - the [`Runtime`] entry point and its builder.
//!
//! Most users only touch [`Runtime`], [`Cx`] and the higher-level
//! combinators of [`task`](crate::task), [`cancel`](crate::cancel) and
//! [`time`](crate::time).

mod core;
mod cx;
mod suspend;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod dispatcher;
pub(crate) mod task;

pub use self::core::Runtime;
pub use cx::{Abandon, Cx};
pub use suspend::{Resumer, Suspend, Wakeups};

pub(crate) use suspend::{Continuation, Delivery};
