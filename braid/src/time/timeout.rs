use crate::cancel::{Scope, run_scoped};
use crate::clock::{Clock, TimerHandle};
use crate::error::Result;
use crate::runtime::{Cx, Resumer};
use crate::task::interleaved;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

/// Shared state of the race between an action and its timer.
#[derive(Default)]
struct Race {
    /// Set by whichever side finishes first.
    decided: bool,

    /// Armed timer and the resumer of the branch waiting for it.
    timer: Option<(TimerHandle, Resumer<bool>)>,
}

/// Settles the race in favor of the action when dropped.
///
/// Held by the action's branch, so the timer is released whether the
/// action completes, fails or is abandoned.
struct Disarm {
    race: Rc<RefCell<Race>>,
    clock: Rc<dyn Clock>,
}

impl Drop for Disarm {
    fn drop(&mut self) {
        let timer = {
            let mut race = self.race.borrow_mut();
            race.decided = true;
            race.timer.take()
        };

        if let Some((handle, resumer)) = timer {
            self.clock.cancel_timer(handle);
            resumer.resume(Ok(false));
        }
    }
}

/// Runs `action` for at most `duration`.
///
/// `action` runs under a new cancellation scope, raced against a timer.
/// If the action finishes first, the timer is canceled and its outcome is
/// returned. If the timer fires first, the action's scope is canceled and
/// the result is `None`. Errors raised by the action are returned as is.
///
/// # Examples
///
/// ```rust,ignore
/// let answer = timeout(&cx, Duration::from_millis(10), |cx| async move {
///     wait(&cx, Duration::from_millis(1)).await?;
///     Ok(42)
/// })
/// .await?;
///
/// assert_eq!(answer, Some(42));
/// ```
pub async fn timeout<F, Fut, T>(cx: &Cx, duration: Duration, action: F) -> Result<Option<T>>
where
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    let (inner, scope) = cx.enter_scope();
    let race = Rc::new(RefCell::new(Race::default()));

    let guard = race.clone();
    let target = scope.clone();

    let (outcome, fired) = interleaved(
        cx,
        move |cx| async move {
            let _disarm = Disarm {
                race: guard,
                clock: cx.clock(),
            };

            run_scoped(&cx, inner, scope, action).await
        },
        move |cx| expire(cx, duration, race, target),
    )
    .await?;

    if fired {
        return Ok(None);
    }

    Ok(outcome)
}

/// Timer side of the race. Resolves to `true` if the timer won.
async fn expire(cx: Cx, duration: Duration, race: Rc<RefCell<Race>>, scope: Rc<Scope>) -> Result<bool> {
    if race.borrow().decided {
        return Ok(false);
    }

    let clock = cx.clock();
    let armed = race.clone();

    let fired = cx
        .suspend_detached(move |resumer: Resumer<bool>| {
            let fire = resumer.clone();
            let handle = clock.schedule(duration, Box::new(move || fire.resume(Ok(true))));

            armed.borrow_mut().timer = Some((handle, resumer));
            Some(handle)
        })
        .await?;

    if !fired {
        return Ok(false);
    }

    {
        let mut race = race.borrow_mut();
        race.decided = true;
        race.timer = None;
    }

    debug!(?duration, depth = scope.depth(), "timeout elapsed, canceling action");
    scope.request_cancel();

    Ok(true)
}
