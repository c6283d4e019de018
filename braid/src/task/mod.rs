//! Fork and join combinators.
//!
//! Every combinator here forks explicit branches with a [`ForkSite`] and
//! collects them at a join point made of per-branch slots and a countdown,
//! so the outcome never depends on the order branches finish in.
//!
//! - [`interleaved`]: two branches, joined into a pair.
//! - [`interleaved_all`]: any number of branches, joined in input order.
//! - [`fork`]: a detached branch whose outcome is discarded.
//! - [`synchronous`]: disables interleaving for a dynamic extent.

mod fork;
mod interleave;

pub use fork::{ForkSite, Settled, fork};
pub use interleave::{interleaved, interleaved_all};

use crate::error::Result;
use crate::runtime::Cx;

use std::future::Future;

/// Runs `action` with interleaving disabled.
///
/// For the dynamic extent of `action`, every fork runs its branches one
/// after another, each to completion, so at most one asynchronous operation
/// of the extent is outstanding at any time.
///
/// # Examples
///
/// ```rust,ignore
/// let order = synchronous(&cx, |cx| async move {
///     interleaved(&cx, slow, fast).await
/// })
/// .await?;
/// ```
pub async fn synchronous<F, Fut, T>(cx: &Cx, action: F) -> Result<T>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    action(cx.with_synchronous()).await
}
