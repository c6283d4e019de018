//! Cancellation scopes.
//!
//! [`cancelable`] runs a computation under a fresh scope. Calling
//! [`Cx::request_cancel`] from inside resumes every suspension registered
//! with the scope with [`Error::Cancel`], and the computation's result
//! becomes `None`.
//!
//! Cancellation is cooperative: code running between two suspension points
//! is never interrupted. Waits too short to be cancelable (see
//! [`wait`](crate::time::wait)) are not cut short either, but the branch is
//! abandoned as soon as one of them resumes in a canceled scope.

mod scope;

pub(crate) use scope::Scope;

use crate::error::{Error, Result};
use crate::runtime::{Cx, Resumer};
use crate::task::{ForkSite, Settled};

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use tracing::debug;

/// Runs `action` under a new cancellation scope.
///
/// Returns `Some(value)` if `action` completes before the scope is
/// canceled, and `None` once it is canceled, whatever `action` then
/// produced or whether it was abandoned. Any other error is returned as
/// is, as is a cancellation that came from an enclosing scope.
///
/// # Examples
///
/// ```rust,ignore
/// let result = cancelable(&cx, |cx| async move {
///     cx.request_cancel();
///     wait(&cx, Duration::from_secs(1)).await?;
///     Ok(1)
/// })
/// .await?;
///
/// assert_eq!(result, None);
/// ```
pub async fn cancelable<F, Fut, T>(cx: &Cx, action: F) -> Result<Option<T>>
where
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    let (inner, scope) = cx.enter_scope();
    run_scoped(cx, inner, scope, action).await
}

/// Runs `handler` if `action` fails with [`Error::Cancel`].
///
/// The cancellation is returned again once `handler` has run. Every other
/// outcome is passed through untouched.
///
/// The handler runs while the scope is canceled, so any suspension it
/// makes abandons it. Cleanup belongs in the synchronous part of the
/// handler.
pub async fn on_cancel<H, HFut, F, Fut, T>(cx: &Cx, handler: H, action: F) -> Result<T>
where
    H: FnOnce(Cx) -> HFut,
    HFut: Future<Output = ()>,
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match action(cx.clone()).await {
        Err(Error::Cancel) => {
            debug!(depth = cx.depth(), "running cancellation handler");
            handler(cx.clone()).await;
            Err(Error::Cancel)
        }
        outcome => outcome,
    }
}

/// Runs `action` as a branch of its own under `inner`, whose innermost
/// scope is `scope`, and waits for it from `cx`.
///
/// The branch is separate so that abandoning it leaves the caller alive.
pub(crate) async fn run_scoped<F, Fut, T>(cx: &Cx, inner: Cx, scope: Rc<Scope>, action: F) -> Result<Option<T>>
where
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    let action = RefCell::new(Some(action));

    cx.suspend_detached(move |resumer: Resumer<Option<T>>| {
        let slot: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));
        let sink = slot.clone();

        ForkSite::new(1).spawn(
            &inner,
            move |cx, _| {
                let action = action.borrow_mut().take();
                let sink = sink.clone();

                async move {
                    if let Some(action) = action {
                        let outcome = action(cx).await;
                        *sink.borrow_mut() = Some(outcome);
                    }
                }
            },
            move |_, settled| {
                let outcome = slot.borrow_mut().take();

                match scoped_outcome(&scope, outcome, settled) {
                    Some(outcome) => resumer.resume(outcome),
                    None => resumer.abandon(None),
                }
            },
        );

        None
    })
    .await
}

/// Decides what a scoped computation evaluates to.
///
/// `None` means the branch vanished without the scope being canceled, in
/// which case the caller is abandoned too.
fn scoped_outcome<T>(scope: &Scope, outcome: Option<Result<T>>, settled: Settled) -> Option<Result<Option<T>>> {
    let canceled = scope.is_canceled();

    let outcome = match (outcome, settled) {
        (Some(outcome), _) => outcome,
        (None, Settled::Abandoned(Some(error))) => Err(error),
        (None, _) if canceled => return Some(Ok(None)),
        (None, _) => return None,
    };

    match outcome {
        Ok(_) | Err(Error::Cancel) if canceled => Some(Ok(None)),
        Ok(value) => Some(Ok(Some(value))),
        Err(error) => Some(Err(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_actions_produce_their_value() {
        let scope = Scope::new(None);

        let outcome = scoped_outcome(&scope, Some(Ok(7)), Settled::Completed);
        assert_eq!(outcome, Some(Ok(Some(7))));
    }

    #[test]
    fn values_produced_after_cancellation_are_dropped() {
        let scope = Scope::new(None);
        scope.request_cancel();

        let outcome = scoped_outcome(&scope, Some(Ok(7)), Settled::Completed);
        assert_eq!(outcome, Some(Ok(None)));
    }

    #[test]
    fn own_cancellation_becomes_none() {
        let scope = Scope::new(None);
        scope.request_cancel();

        let raised = scoped_outcome::<u8>(&scope, Some(Err(Error::Cancel)), Settled::Completed);
        let abandoned = scoped_outcome::<u8>(&scope, None, Settled::Abandoned(None));
        let surfaced = scoped_outcome::<u8>(&scope, None, Settled::Abandoned(Some(Error::Cancel)));

        assert_eq!(raised, Some(Ok(None)));
        assert_eq!(abandoned, Some(Ok(None)));
        assert_eq!(surfaced, Some(Ok(None)));
    }

    #[test]
    fn foreign_cancellation_is_reraised() {
        let scope = Scope::new(None);

        let outcome = scoped_outcome::<u8>(&scope, Some(Err(Error::Cancel)), Settled::Completed);
        assert_eq!(outcome, Some(Err(Error::Cancel)));
    }

    #[test]
    fn user_errors_survive_cancellation() {
        let scope = Scope::new(None);
        scope.request_cancel();

        let error = Error::new("io", "broken pipe");
        let outcome = scoped_outcome::<u8>(&scope, Some(Err(error.clone())), Settled::Completed);

        assert_eq!(outcome, Some(Err(error)));
    }

    #[test]
    fn silent_abandonment_outside_cancellation_drops_the_caller() {
        let scope = Scope::new(None);

        assert_eq!(scoped_outcome::<u8>(&scope, None, Settled::Abandoned(None)), None);
    }
}
