use crate::clock::{Clock, TimerHandle};
use crate::error::Result;
use crate::runtime::{Cx, Resumer};

use std::rc::Rc;
use std::time::Duration;

/// Suspends the current branch for `duration`.
///
/// Waits longer than the runtime's wait threshold (200 ms by default) are
/// cancelable: canceling an enclosing scope ends them early with
/// [`Error::Cancel`](crate::Error::Cancel). Shorter waits are never cut
/// short, but once their time is up they abandon the branch if a scope was
/// canceled meanwhile. A zero duration yields once.
///
/// # Examples
///
/// ```rust,ignore
/// wait(&cx, Duration::from_secs(1)).await?;
/// ```
pub async fn wait(cx: &Cx, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return yield_now(cx).await;
    }

    let setup = arm(cx.clock(), duration);

    if duration > cx.wait_threshold() {
        cx.suspend(setup).await
    } else {
        cx.suspend_uninterruptible(setup).await
    }
}

/// Suspends the current branch for `duration` without being interruptible.
///
/// This is the building block for cooperative rescheduling: the branch
/// gives way to everything else ready to run and comes back once
/// `duration` has elapsed, unless an enclosing scope was canceled in the
/// meantime, in which case the branch is abandoned. A zero duration resumes
/// on the next turn of the event loop.
pub async fn yield_for(cx: &Cx, duration: Duration) -> Result<()> {
    cx.suspend_uninterruptible(arm(cx.clock(), duration)).await
}

/// Lets every other ready branch run before continuing.
pub async fn yield_now(cx: &Cx) -> Result<()> {
    yield_for(cx, Duration::ZERO).await
}

/// Setup resuming a suspension once `duration` has elapsed.
fn arm(clock: Rc<dyn Clock>, duration: Duration) -> impl FnOnce(Resumer<()>) -> Option<TimerHandle> + 'static {
    move |resumer| {
        let resume = Box::new(move || resumer.resume(Ok(())));

        if duration.is_zero() {
            clock.schedule_immediate(resume);
            return None;
        }

        Some(clock.schedule(duration, resume))
    }
}
