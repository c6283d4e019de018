use super::state::State;
use crate::error::Error;
use crate::runtime::context::ContextToken;
use crate::task::Settled;

use std::cell::{Cell, RefCell};

use futures::future::LocalBoxFuture;

/// Callback told how a task ended.
pub(crate) type SettleHook = Box<dyn FnOnce(Settled)>;

/// A branch of computation managed by the dispatcher.
///
/// A `Task` owns its future, the context token it was forked under, and the
/// hook of the join point collecting it. The future is taken out while being
/// polled, so a task that is resumed reentrantly only records the request in
/// its [`State`].
pub(crate) struct Task {
    /// The underlying future; `None` while it is being polled.
    future: RefCell<Option<LocalBoxFuture<'static, ()>>>,

    /// The current lifecycle state of the task.
    pub(crate) state: Cell<State>,

    /// Scope nesting re-entered whenever the task is polled.
    pub(crate) token: ContextToken,

    /// Distinguishes this task from earlier holders of its key.
    pub(crate) generation: u64,

    /// Set once the branch asked to be abandoned, with the error to surface.
    abandoned: RefCell<Option<Option<Error>>>,

    /// Join point notified when the task settles.
    on_settle: RefCell<Option<SettleHook>>,
}

impl Task {
    /// Creates an idle task.
    pub(crate) fn new(
        future: LocalBoxFuture<'static, ()>,
        token: ContextToken,
        generation: u64,
        on_settle: Option<SettleHook>,
    ) -> Self {
        Self {
            future: RefCell::new(Some(future)),
            state: Cell::new(State::Idle),
            token,
            generation,
            abandoned: RefCell::new(None),
            on_settle: RefCell::new(on_settle),
        }
    }

    /// Takes the future out for polling.
    pub(crate) fn take_future(&self) -> Option<LocalBoxFuture<'static, ()>> {
        self.future.borrow_mut().take()
    }

    /// Puts the future back after a pending poll.
    pub(crate) fn store_future(&self, future: LocalBoxFuture<'static, ()>) {
        *self.future.borrow_mut() = Some(future);
    }

    /// Marks the branch as abandoned. The first request wins.
    pub(crate) fn abandon(&self, error: Option<Error>) {
        let mut abandoned = self.abandoned.borrow_mut();

        if abandoned.is_none() {
            *abandoned = Some(error);
        }
    }

    /// Takes the pending abandonment request, if any.
    pub(crate) fn take_abandoned(&self) -> Option<Option<Error>> {
        self.abandoned.borrow_mut().take()
    }

    /// Notifies the collecting join point.
    pub(crate) fn settle(&self, settled: Settled) {
        let hook = self.on_settle.borrow_mut().take();

        if let Some(hook) = hook {
            hook(settled);
        }
    }

    /// Drops the future and the hook without notifying anyone.
    pub(crate) fn discard(&self) {
        let future = self.future.borrow_mut().take();
        let hook = self.on_settle.borrow_mut().take();

        self.state.set(State::Completed);

        drop(future);
        drop(hook);
    }
}
