use crate::error::Error;
use crate::runtime::context::ContextToken;
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::task::SettleHook;
use crate::runtime::{Cx, Resumer};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, trace};

/// How a forked branch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The branch ran to completion.
    Completed,

    /// The branch was abandoned, surfacing the given error if any.
    Abandoned(Option<Error>),
}

/// What a join point does once a branch has settled.
pub(crate) enum Verdict<T> {
    /// Other branches are still running.
    Waiting,

    /// Resume the waiting caller with this outcome.
    Deliver(crate::Result<T>),

    /// A branch vanished; the waiting caller is abandoned as well.
    Vanished,
}

impl<T: 'static> Verdict<T> {
    pub(crate) fn apply(self, resumer: &Resumer<T>) {
        match self {
            Verdict::Waiting => {}
            Verdict::Deliver(outcome) => resumer.resume(outcome),
            Verdict::Vanished => resumer.abandon(None),
        }
    }
}

/// An explicit fan-out point.
///
/// `ForkSite::new(k).spawn(..)` creates `k` independent branches tagged
/// `0..k`, each a task of its own. Branches `1..k` are scheduled through the
/// clock, one per turn in index order, and branch `0` starts right away on
/// the current stack. Every index is handed to exactly one branch, once.
///
/// Inside [`synchronous`](super::synchronous) the branches run one after
/// another instead: each starts only once the previous one has settled.
///
/// Every branch re-enters the scope nesting captured at the fork, whatever
/// callback ends up resuming it.
#[derive(Debug, Clone, Copy)]
pub struct ForkSite {
    k: usize,
}

impl ForkSite {
    /// Creates a fork into `k` branches. A `k` of zero is treated as one.
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1) }
    }

    /// Number of branches.
    pub fn branches(&self) -> usize {
        self.k
    }

    /// Spawns the branches.
    ///
    /// `branch` builds the computation of each index under the [`Cx`]
    /// restored from the fork's context. `on_settle` is told, once per
    /// index, how that branch ended.
    pub fn spawn<B, Fut, S>(self, cx: &Cx, branch: B, on_settle: S)
    where
        B: Fn(Cx, usize) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
        S: Fn(usize, Settled) + 'static,
    {
        let token = cx.context_depth();
        let synchronous = token.is_synchronous();

        trace!(k = self.k, depth = token.depth(), synchronous, "forking");

        let branches = Rc::new(Branches {
            k: self.k,
            token,
            dispatcher: cx.dispatcher().clone(),
            branch,
            on_settle,
            next: Cell::new(None),
            driving: Cell::new(false),
        });

        if synchronous {
            branches.next.set(Some(0));
            branches.drive();
            return;
        }

        for index in 1..self.k {
            let key = branches.spawn_branch(index, false);
            branches.dispatcher.schedule(key);
        }

        let key = branches.spawn_branch(0, false);
        branches.dispatcher.run_task(key);
    }
}

/// State shared by the branches of one fork.
struct Branches<B, S> {
    k: usize,

    /// Context every branch re-enters.
    token: ContextToken,

    dispatcher: Rc<Dispatcher>,

    branch: B,

    on_settle: S,

    /// Next branch of a synchronous chain, waiting to be started.
    next: Cell<Option<usize>>,

    /// Set while a frame is starting chained branches.
    driving: Cell<bool>,
}

impl<B, Fut, S> Branches<B, S>
where
    B: Fn(Cx, usize) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
    S: Fn(usize, Settled) + 'static,
{
    /// Adds branch `index` to the task table.
    ///
    /// With `chain` set, the next branch is started once this one settles.
    fn spawn_branch(self: &Rc<Self>, index: usize, chain: bool) -> usize {
        let cx = self.token.restore(&self.dispatcher);
        let future = (self.branch)(cx, index);

        let branches = self.clone();
        let hook: SettleHook = Box::new(move |settled| {
            (branches.on_settle)(index, settled);

            if chain && index + 1 < branches.k {
                branches.next.set(Some(index + 1));
                branches.drive();
            }
        });

        self.dispatcher.spawn(future, self.token.clone(), Some(hook))
    }

    /// Starts chained branches until one of them suspends.
    ///
    /// A branch settling while the chain is already being driven further up
    /// the stack only records its successor, so the chain runs in a loop
    /// instead of nesting one frame per branch.
    fn drive(self: &Rc<Self>) {
        if self.driving.replace(true) {
            return;
        }

        while let Some(index) = self.next.take() {
            let key = self.spawn_branch(index, true);
            self.dispatcher.run_task(key);
        }

        self.driving.set(false);
    }
}

/// Runs `action` detached from the caller.
///
/// Returns right away; `action` starts on the next turn of the event loop.
/// Its outcome is discarded, errors included. Inside
/// [`synchronous`](super::synchronous), the call returns only once `action`
/// has settled.
pub async fn fork<F, Fut>(cx: &Cx, action: F)
where
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: Future<Output = crate::Result<()>> + 'static,
{
    let action = RefCell::new(Some(action));

    let detached = move |cx: Cx, index: usize| {
        let action = match index {
            1 => action.borrow_mut().take(),
            _ => None,
        };

        async move {
            if let Some(action) = action {
                if let Err(error) = action(cx).await {
                    debug!(%error, "forked computation failed");
                }
            }
        }
    };

    if !cx.is_synchronous() {
        ForkSite::new(2).spawn(cx, detached, |_, _| {});
        return;
    }

    let site = cx.clone();
    let joined = cx
        .suspend_detached(move |resumer: Resumer<()>| {
            ForkSite::new(2).spawn(&site, detached, move |index, _| {
                if index == 1 {
                    resumer.resume(Ok(()));
                }
            });

            None
        })
        .await;

    if let Err(error) = joined {
        debug!(%error, "synchronous fork interrupted");
    }
}
