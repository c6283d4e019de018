use super::dispatcher::Dispatcher;
use crate::cancel::Scope;
use crate::clock::TimerHandle;
use crate::error::{Error, Result};
use crate::registry::Id;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::Stream;
use tracing::trace;

/// Type-erased value delivered to a suspension.
pub(crate) type Outcome = Result<Box<dyn Any>>;

/// What a continuation receives.
pub(crate) enum Delivery {
    /// Resume the suspended branch with a value or an error.
    Resume(Outcome),

    /// Terminate the suspended branch without resuming it.
    Abandon(Option<Error>),
}

/// A registered continuation.
///
/// Registries across the runtime store these. Invoking one delivers to the
/// suspension it was created for and runs the suspended task.
pub(crate) type Continuation = Rc<dyn Fn(Delivery)>;

/// Type-erased setup callback of a suspension.
type Setup = Box<dyn FnOnce(Continuation) -> Option<TimerHandle>>;

/// Deliveries received by one suspension, waiting to be observed.
struct Slot {
    /// Task polling the suspension.
    task: usize,

    /// How many more deliveries are accepted.
    remaining: Cell<usize>,

    queue: RefCell<VecDeque<Delivery>>,
}

impl Slot {
    /// Queues `delivery` unless the budget is spent.
    fn accept(&self, delivery: Delivery) -> bool {
        let remaining = self.remaining.get();

        if remaining == 0 {
            return false;
        }

        match delivery {
            Delivery::Abandon(_) => self.remaining.set(0),
            Delivery::Resume(_) => self.remaining.set(remaining - 1),
        }

        self.queue.borrow_mut().push_back(delivery);
        true
    }

    fn exhausted(&self) -> bool {
        self.remaining.get() == 0 && self.queue.borrow().is_empty()
    }
}

/// How a suspension is exposed to the scopes enclosing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reach {
    /// Registered with every enclosing scope, so a cancellation broadcast
    /// resumes it early with [`Error::Cancel`].
    Broadcast,

    /// Left out of broadcasts. The branch is still abandoned if a scope of
    /// the chain is canceled by the time the suspension registers or
    /// resumes.
    Shielded,
}

/// A registration owned by a suspension, released when it ends.
enum Link {
    Root(Id, Continuation),
    Scope(Rc<Scope>, Id, Continuation),
}

/// State shared by every kind of suspension.
///
/// Registration happens on first poll: the continuation is registered with
/// each enclosing scope, innermost first, then with the dispatcher's root
/// registry, and only then is the setup called with the resulting gate.
/// Shielded suspensions skip the scopes and check the chain themselves.
struct SuspendCore {
    dispatcher: Rc<Dispatcher>,

    /// Innermost enclosing scope; `None` for the runtime's own join points.
    scope: Option<Rc<Scope>>,

    reach: Reach,

    budget: usize,

    setup: Option<Setup>,

    /// Set once registered.
    slot: Option<Rc<Slot>>,

    links: Vec<Link>,

    timer: Option<TimerHandle>,
}

impl SuspendCore {
    fn new(dispatcher: Rc<Dispatcher>, scope: Option<Rc<Scope>>, reach: Reach, budget: usize, setup: Setup) -> Self {
        Self {
            dispatcher,
            scope,
            reach,
            budget: budget.max(1),
            setup: Some(setup),
            slot: None,
            links: Vec::new(),
            timer: None,
        }
    }

    /// Returns the next delivery, registering the suspension first if
    /// needed. `Ready(None)` means the budget is spent.
    fn poll_outcome(&mut self) -> Poll<Option<Outcome>> {
        if self.slot.is_none() && !self.register() {
            return Poll::Pending;
        }

        let Some(slot) = self.slot.clone() else {
            return Poll::Pending;
        };

        let delivery = slot.queue.borrow_mut().pop_front();

        match delivery {
            Some(Delivery::Resume(_)) if self.reach == Reach::Shielded && self.chain_canceled() => {
                trace!(task = slot.task, "resumed inside a canceled scope, abandoning");
                self.release();
                self.dispatcher.abandon(slot.task, None);
                Poll::Pending
            }
            Some(Delivery::Resume(outcome)) => {
                if slot.exhausted() {
                    self.release();
                }
                Poll::Ready(Some(outcome))
            }
            Some(Delivery::Abandon(error)) => {
                self.release();
                self.dispatcher.abandon(slot.task, error);
                Poll::Pending
            }
            None if slot.exhausted() => {
                self.release();
                Poll::Ready(None)
            }
            None => Poll::Pending,
        }
    }

    /// Registers the suspension and runs its setup.
    ///
    /// Returns `false` if the branch was abandoned instead because an
    /// enclosing scope is already canceled.
    fn register(&mut self) -> bool {
        let Some(task) = self.dispatcher.current_task() else {
            panic!("suspension polled outside of a braid task");
        };

        let Some(setup) = self.setup.take() else {
            return false;
        };

        if self.chain_canceled() {
            trace!(task, "suspension inside a canceled scope, abandoning");
            self.dispatcher.abandon(task, None);
            return false;
        }

        trace!(
            task,
            depth = self.dispatcher.current_depth(),
            budget = self.budget,
            reach = ?self.reach,
            "suspending"
        );

        let slot = Rc::new(Slot {
            task,
            remaining: Cell::new(self.budget),
            queue: RefCell::new(VecDeque::new()),
        });

        let mut continuation = deliver_to(&slot, &self.dispatcher);
        let mut next = match self.reach {
            Reach::Broadcast => self.scope.clone(),
            Reach::Shielded => None,
        };

        while let Some(scope) = next {
            let (id, wrapper) = scope.intercept(continuation.clone(), self.budget);
            next = scope.parent().cloned();

            self.links.push(Link::Scope(scope, id, continuation));
            continuation = wrapper;
        }

        let (id, gate) = self.dispatcher.register(continuation.clone(), self.budget);
        self.links.push(Link::Root(id, continuation));
        self.slot = Some(slot);

        self.timer = setup(gate);
        true
    }

    fn chain_canceled(&self) -> bool {
        self.scope.as_ref().is_some_and(|scope| scope.chain_canceled())
    }

    /// Releases every registration and the armed timer.
    fn release(&mut self) {
        for link in self.links.drain(..) {
            match link {
                Link::Root(id, continuation) => self.dispatcher.release(id, &continuation),
                Link::Scope(scope, id, continuation) => scope.release(id, &continuation),
            }
        }

        if let Some(timer) = self.timer.take() {
            self.dispatcher.clock().cancel_timer(timer);
        }
    }
}

impl Drop for SuspendCore {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds the innermost continuation of a suspension.
///
/// It queues the delivery in `slot` and runs the suspended task right away.
fn deliver_to(slot: &Rc<Slot>, dispatcher: &Rc<Dispatcher>) -> Continuation {
    let slot = Rc::downgrade(slot);
    let dispatcher = Rc::downgrade(dispatcher);

    Rc::new(move |delivery: Delivery| {
        let (Some(slot), Some(dispatcher)) = (slot.upgrade(), dispatcher.upgrade()) else {
            return;
        };

        if slot.accept(delivery) {
            dispatcher.run_task(slot.task);
        }
    })
}

fn erase<T: 'static>(setup: impl FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static) -> Setup {
    Box::new(move |gate| setup(Resumer::new(gate)))
}

fn unerase<T: 'static>(outcome: Outcome) -> Result<T> {
    outcome.map(|value| match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => panic!("suspension resumed with a value of the wrong type"),
    })
}

/// Callback resuming a suspension.
///
/// Handed to the setup of [`Cx::suspend`](crate::Cx::suspend) and its
/// variants. A resumer may be cloned and invoked from any callback running
/// on the runtime's thread. Invocations beyond the suspension's budget, or
/// arriving after the suspension ended (it was canceled, abandoned or
/// dropped), are ignored.
pub struct Resumer<T> {
    gate: Continuation,
    _marker: PhantomData<fn(T)>,
}

impl<T: 'static> Resumer<T> {
    fn new(gate: Continuation) -> Self {
        Self {
            gate,
            _marker: PhantomData,
        }
    }

    /// Resumes the suspension with `outcome`.
    pub fn resume(&self, outcome: Result<T>) {
        let outcome = outcome.map(|value| Box::new(value) as Box<dyn Any>);
        (self.gate)(Delivery::Resume(outcome));
    }

    /// Terminates the suspended branch instead of resuming it.
    ///
    /// `error`, if any, is surfaced to the join point collecting the branch.
    pub fn abandon(&self, error: Option<Error>) {
        (self.gate)(Delivery::Abandon(error));
    }
}

impl<T> Clone for Resumer<T> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Resumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resumer").finish_non_exhaustive()
    }
}

/// Future returned by [`Cx::suspend`](crate::Cx::suspend).
///
/// Resolves with the first outcome delivered to its [`Resumer`]. Dropping
/// it before that releases its registrations and its timer.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Suspend<T> {
    core: SuspendCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Suspend<T> {
    pub(crate) fn new(
        dispatcher: Rc<Dispatcher>,
        scope: Option<Rc<Scope>>,
        reach: Reach,
        setup: impl FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    ) -> Self {
        Self {
            core: SuspendCore::new(dispatcher, scope, reach, 1, erase(setup)),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Future for Suspend<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().core.poll_outcome() {
            Poll::Ready(Some(outcome)) => Poll::Ready(unerase(outcome)),
            Poll::Ready(None) => panic!("`Suspend` polled after completion"),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Stream returned by [`Cx::suspend_many`](crate::Cx::suspend_many).
///
/// Yields every outcome delivered to its [`Resumer`], up to the budget the
/// suspension was registered with, then ends.
#[must_use = "streams do nothing unless polled"]
pub struct Wakeups<T> {
    core: SuspendCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Wakeups<T> {
    pub(crate) fn new(
        dispatcher: Rc<Dispatcher>,
        scope: Option<Rc<Scope>>,
        budget: usize,
        setup: impl FnOnce(Resumer<T>) -> Option<TimerHandle> + 'static,
    ) -> Self {
        Self {
            core: SuspendCore::new(dispatcher, scope, Reach::Broadcast, budget, erase(setup)),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Stream for Wakeups<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .core
            .poll_outcome()
            .map(|outcome| outcome.map(unerase))
    }
}
