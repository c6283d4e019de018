use super::context::ContextToken;
use super::dispatcher::Dispatcher;
use super::suspend::{Reach, Resumer, Suspend, Wakeups};
use crate::cancel::Scope;
use crate::clock::{Clock, TimerHandle};
use crate::error::Error;

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

/// The async capability.
///
/// Every computation running on a [`Runtime`](crate::Runtime) receives a
/// `Cx`. It exposes the four primitives everything else is built from:
///
/// - [`suspend`](Self::suspend): wait for an external event,
/// - [`request_cancel`](Self::request_cancel): cancel the innermost scope,
/// - [`abandon`](Self::abandon): terminate the current branch,
/// - [`context_depth`](Self::context_depth): capture the scope nesting.
///
/// A `Cx` is an explicit handle on one position in the scope nesting: the
/// combinators hand a fresh one to the closures they run, and suspensions
/// made through it are visible to the scopes it was created under.
#[derive(Clone)]
pub struct Cx {
    dispatcher: Rc<Dispatcher>,
    scope: Option<Rc<Scope>>,
    synchronous: bool,
}

impl Cx {
    pub(crate) fn new(dispatcher: Rc<Dispatcher>, scope: Option<Rc<Scope>>, synchronous: bool) -> Self {
        Self {
            dispatcher,
            scope,
            synchronous,
        }
    }

    /// Suspends the current branch until `setup`'s resumer is invoked.
    ///
    /// `setup` runs on first poll, after the suspension has been registered
    /// with every enclosing scope. It must arrange for the [`Resumer`] to be
    /// invoked eventually, typically from a [`Clock`] callback, and may
    /// return the handle of the timer it armed; that timer is canceled if
    /// the suspension ends any other way.
    ///
    /// If an enclosing scope is canceled while suspended, the future
    /// resolves with [`Error::Cancel`]. If a scope was already canceled
    /// when the suspension is reached, the branch is abandoned and `setup`
    /// never runs.
    ///
    /// # Panics
    ///
    /// Panics if polled outside of a task of the runtime owning this `Cx`.
    pub fn suspend<T, F>(&self, setup: F) -> Suspend<T>
    where
        T: 'static,
        F: FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    {
        Suspend::new(self.dispatcher.clone(), self.scope.clone(), Reach::Broadcast, setup)
    }

    /// Suspends until up to `budget` outcomes have been delivered.
    ///
    /// The returned stream yields each outcome as it arrives and ends once
    /// the budget is spent. Deliveries beyond the budget are ignored. A
    /// `budget` of zero is treated as one.
    pub fn suspend_many<T, F>(&self, budget: usize, setup: F) -> Wakeups<T>
    where
        T: 'static,
        F: FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    {
        Wakeups::new(self.dispatcher.clone(), self.scope.clone(), budget, setup)
    }

    /// Like [`suspend`](Self::suspend), but never interrupted early.
    ///
    /// A cancellation broadcast skips the suspension, so it always waits for
    /// its own resumer. It still belongs to the enclosing scopes: if one of
    /// them is canceled by the time it is reached or resumed, the branch is
    /// abandoned instead of continuing. Used for short waits and
    /// rescheduling.
    pub fn suspend_uninterruptible<T, F>(&self, setup: F) -> Suspend<T>
    where
        T: 'static,
        F: FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    {
        Suspend::new(self.dispatcher.clone(), self.scope.clone(), Reach::Shielded, setup)
    }

    /// Suspends outside of every scope.
    ///
    /// Only the dispatcher knows about the suspension. Join points use it to
    /// wait for their branches whatever happens to the scopes around them.
    pub(crate) fn suspend_detached<T, F>(&self, setup: F) -> Suspend<T>
    where
        T: 'static,
        F: FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    {
        Suspend::new(self.dispatcher.clone(), None, Reach::Shielded, setup)
    }

    /// Cancels the innermost enclosing scope.
    ///
    /// Every suspension currently registered with the scope is resumed with
    /// [`Error::Cancel`], one after another in registration order, each
    /// resumed branch running up to its next suspension point before the
    /// next one is resumed. Returns `false` if there is no enclosing scope
    /// or it was already canceled.
    pub fn request_cancel(&self) -> bool {
        match &self.scope {
            Some(scope) => scope.request_cancel(),
            None => false,
        }
    }

    /// Terminates the current branch without producing a value.
    ///
    /// The returned future never completes. `error`, if any, is surfaced to
    /// the join point collecting the branch; otherwise the branch is
    /// silently dropped.
    pub fn abandon(&self, error: Option<Error>) -> Abandon {
        Abandon {
            dispatcher: self.dispatcher.clone(),
            error: Some(error),
        }
    }

    /// Captures the current scope nesting.
    ///
    /// Increments the innermost scope's tag counter, so every capture gets a
    /// distinct tag.
    pub fn context_depth(&self) -> ContextToken {
        let tag = match &self.scope {
            Some(scope) => scope.next_tag(),
            None => self.dispatcher.next_root_tag(),
        };

        ContextToken::new(self.scope.clone(), self.synchronous, tag)
    }

    /// Number of cancellation scopes enclosing this handle.
    pub fn depth(&self) -> usize {
        self.scope.as_ref().map_or(0, |scope| scope.depth())
    }

    /// Number of suspensions registered with the innermost scope.
    ///
    /// Only suspensions a cancellation broadcast can reach are counted.
    /// Always zero outside of any scope.
    pub fn outstanding(&self) -> usize {
        self.scope.as_ref().map_or(0, |scope| scope.outstanding())
    }

    /// Returns `true` if any enclosing scope has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.scope.as_ref().is_some_and(|scope| scope.chain_canceled())
    }

    /// The clock driving the runtime.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.dispatcher.clock().clone()
    }

    /// Opens a new cancellation scope nested in this one.
    pub(crate) fn enter_scope(&self) -> (Cx, Rc<Scope>) {
        let scope = Scope::new(self.scope.clone());
        let cx = Cx::new(self.dispatcher.clone(), Some(scope.clone()), self.synchronous);

        (cx, scope)
    }

    pub(crate) fn with_synchronous(&self) -> Cx {
        Cx::new(self.dispatcher.clone(), self.scope.clone(), true)
    }

    pub(crate) fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    pub(crate) fn wait_threshold(&self) -> Duration {
        self.dispatcher.wait_threshold()
    }

    pub(crate) fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("depth", &self.depth())
            .field("synchronous", &self.synchronous)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`Cx::abandon`]. Never completes.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Abandon {
    dispatcher: Rc<Dispatcher>,
    error: Option<Option<Error>>,
}

impl Future for Abandon {
    type Output = Infallible;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(error) = this.error.take() {
            if let Some(task) = this.dispatcher.current_task() {
                this.dispatcher.abandon(task, error);
            }
        }

        Poll::Pending
    }
}
