//! # Braid
//!
//! **Braid** is a cooperative, single-threaded async runtime built around
//! explicit suspension, broadcast cancellation and fork/join combinators.
//!
//! Every computation receives a [`Cx`], the async capability. Everything
//! else is built from its four primitives: suspend, request-cancel, abandon
//! and context-depth. On top of them the runtime offers:
//!
//! - **Cancellation scopes** that resume every suspension inside them with
//!   [`Error::Cancel`], one after another, when canceled
//! - **Interleaving joins** over two or many branches, whose results never
//!   depend on the order branches finish in
//! - **Timeouts** racing a computation against a timer
//! - **Waits and yields** driven by a pluggable [`Clock`](clock::Clock),
//!   in real or virtual time
//! - **Attribute macros** `#[braid::main]` and `#[braid::test]`
//!
//! Late wake-ups are tolerated everywhere: a timer firing after its
//! suspension was canceled is silently ignored, and every timer is released
//! on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use braid::Cx;
//! use braid::task::interleaved;
//! use braid::time::{timeout, wait};
//! use std::time::Duration;
//!
//! #[braid::main]
//! async fn main(cx: Cx) {
//!     let (a, b) = interleaved(
//!         &cx,
//!         |cx| async move { wait(&cx, Duration::from_millis(20)).await?; Ok(1) },
//!         |cx| async move { wait(&cx, Duration::from_millis(10)).await?; Ok(2) },
//!     )
//!     .await?;
//!
//!     let late = timeout(&cx, Duration::from_millis(5), |cx| async move {
//!         wait(&cx, Duration::from_secs(1)).await?;
//!         Ok(a + b)
//!     })
//!     .await?;
//!
//!     assert_eq!(late, None);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cancel`]: Cancellation scopes
//! - [`task`]: Fork and join combinators
//! - [`time`]: Waits, yields and timeouts
//! - [`clock`]: The clock abstraction and the event loop
//! - [`registry`]: Bookkeeping for suspended continuations
//!
//! ## Logging
//!
//! The runtime emits [`tracing`] events (task lifecycle, suspensions,
//! cancellation broadcasts, timers) but never installs a subscriber.

mod runtime;
mod utils;

pub mod cancel;
pub mod clock;
pub mod error;
pub mod registry;
pub mod task;
pub mod time;

pub use error::{Error, Result};
pub use runtime::builder::RuntimeBuilder;
pub use runtime::context::ContextToken;
pub use runtime::{Abandon, Cx, Resumer, Runtime, Suspend, Wakeups};

pub use braid_macros::{main, test};
