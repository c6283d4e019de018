use super::fork::{ForkSite, Settled, Verdict};
use crate::error::Result;
use crate::runtime::{Cx, Resumer};

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

/// Join point of [`interleaved`].
struct PairJoin<A, B> {
    first: Option<Result<A>>,
    second: Option<Result<B>>,
    settled: usize,
}

impl<A, B> PairJoin<A, B> {
    fn settle(&mut self, index: usize, settled: Settled) -> Verdict<(A, B)> {
        self.settled += 1;

        if let Settled::Abandoned(Some(error)) = settled {
            match index {
                0 => {
                    self.first.get_or_insert(Err(error));
                }
                _ => {
                    self.second.get_or_insert(Err(error));
                }
            }
        }

        if self.settled < 2 {
            return Verdict::Waiting;
        }

        match (self.first.take(), self.second.take()) {
            (Some(first), Some(second)) => Verdict::Deliver(first.and_then(|a| second.map(|b| (a, b)))),
            _ => Verdict::Vanished,
        }
    }
}

/// Runs `a` and `b` as two interleaved branches and joins their results.
///
/// The branches make progress independently, and the pair is built once
/// both have finished, whatever order they finish in. Errors are deferred
/// to the join: if both branches fail, the error of `a` wins.
///
/// A branch abandoned without an error never fills its slot, so the join
/// never produces a value and the caller is abandoned as well.
///
/// # Examples
///
/// ```rust,ignore
/// let (a, b) = interleaved(
///     &cx,
///     |cx| async move { wait(&cx, Duration::from_millis(20)).await?; Ok(1) },
///     |cx| async move { wait(&cx, Duration::from_millis(10)).await?; Ok("two") },
/// )
/// .await?;
/// ```
pub async fn interleaved<FA, FutA, A, FB, FutB, B>(cx: &Cx, a: FA, b: FB) -> Result<(A, B)>
where
    FA: FnOnce(Cx) -> FutA + 'static,
    FutA: Future<Output = Result<A>> + 'static,
    A: 'static,
    FB: FnOnce(Cx) -> FutB + 'static,
    FutB: Future<Output = Result<B>> + 'static,
    B: 'static,
{
    let site = cx.clone();
    let actions = RefCell::new((Some(a), Some(b)));

    cx.suspend_detached(move |resumer: Resumer<(A, B)>| {
        let join = Rc::new(RefCell::new(PairJoin {
            first: None,
            second: None,
            settled: 0,
        }));
        let slots = join.clone();

        ForkSite::new(2).spawn(
            &site,
            move |cx, index| {
                let (a, b) = {
                    let mut actions = actions.borrow_mut();
                    match index {
                        0 => (actions.0.take(), None),
                        _ => (None, actions.1.take()),
                    }
                };
                let slots = slots.clone();

                async move {
                    if let Some(a) = a {
                        let outcome = a(cx.clone()).await;
                        slots.borrow_mut().first = Some(outcome);
                    }

                    if let Some(b) = b {
                        let outcome = b(cx).await;
                        slots.borrow_mut().second = Some(outcome);
                    }
                }
            },
            move |index, settled| {
                let verdict = join.borrow_mut().settle(index, settled);
                verdict.apply(&resumer);
            },
        );

        None
    })
    .await
}

/// Join point of [`interleaved_all`].
struct ManyJoin<T> {
    slots: Vec<Option<Result<T>>>,
    remaining: usize,
}

impl<T> ManyJoin<T> {
    fn settle(&mut self, index: usize, settled: Settled) -> Verdict<Vec<T>> {
        self.remaining -= 1;

        if let Settled::Abandoned(Some(error)) = settled {
            if let Some(slot) = self.slots.get_mut(index) {
                slot.get_or_insert(Err(error));
            }
        }

        if self.remaining > 0 {
            return Verdict::Waiting;
        }

        let slots = std::mem::take(&mut self.slots);

        if slots.iter().any(Option::is_none) {
            return Verdict::Vanished;
        }

        Verdict::Deliver(slots.into_iter().flatten().collect())
    }
}

/// Runs every action of `xs` as an interleaved branch and joins the results.
///
/// The result has the order of `xs`, whatever order the branches finish
/// in. If several branches fail, the error of the earliest one in `xs`
/// wins. An empty input returns right away without forking.
///
/// A branch abandoned without an error never fills its slot, so the join
/// never produces a value and the caller is abandoned as well.
pub async fn interleaved_all<F, Fut, T>(cx: &Cx, xs: Vec<F>) -> Result<Vec<T>>
where
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: Future<Output = Result<T>> + 'static,
    T: 'static,
{
    if xs.is_empty() {
        return Ok(Vec::new());
    }

    let n = xs.len();
    let site = cx.clone();
    let actions: RefCell<Vec<Option<F>>> = RefCell::new(xs.into_iter().map(Some).collect());

    cx.suspend_detached(move |resumer: Resumer<Vec<T>>| {
        let join = Rc::new(RefCell::new(ManyJoin {
            slots: (0..n).map(|_| None).collect(),
            remaining: n,
        }));
        let slots = join.clone();

        ForkSite::new(n).spawn(
            &site,
            move |cx, index| {
                let action = actions.borrow_mut().get_mut(index).and_then(Option::take);
                let slots = slots.clone();

                async move {
                    if let Some(action) = action {
                        let outcome = action(cx).await;

                        if let Some(slot) = slots.borrow_mut().slots.get_mut(index) {
                            *slot = Some(outcome);
                        }
                    }
                }
            },
            move |index, settled| {
                let verdict = join.borrow_mut().settle(index, settled);
                verdict.apply(&resumer);
            },
        );

        None
    })
    .await
}
