use super::context::ContextToken;
use super::suspend::{Continuation, Delivery};
use super::task::state::State;
use super::task::waker::{WokenQueue, make_waker};
use super::task::{SettleHook, Task};
use crate::clock::Clock;
use crate::error::Error;
use crate::registry::{Id, Registry};
use crate::task::Settled;
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex};
use std::task::Context;
use std::time::Duration;

use futures::FutureExt;
use tracing::{trace, trace_span};

/// The task currently being polled, together with its context.
struct Current {
    key: usize,
    token: ContextToken,
}

/// The top-level interpreter of the async capability.
///
/// The dispatcher is responsible for:
/// - owning every live task and polling them when resumed,
/// - keeping the root [`Registry`] of outstanding suspensions,
/// - wiring suspensions to the [`Clock`],
/// - re-entering a task's context before polling it.
///
/// Polling is reentrant: resuming a suspended task runs it immediately on
/// the current stack, even from inside another task's poll. That is what
/// makes cancellation delivery sequential.
pub(crate) struct Dispatcher {
    /// Weak self-reference handed to callbacks.
    this: Weak<Dispatcher>,

    /// Host scheduling primitive.
    clock: Rc<dyn Clock>,

    /// Live tasks.
    tasks: RefCell<Slab<Rc<Task>>>,

    /// Root registry of outstanding suspensions.
    registry: RefCell<Registry<Continuation>>,

    /// Context of the task being polled.
    current: RefCell<Option<Current>>,

    /// Tasks woken through their `Waker`.
    woken: WokenQueue,

    /// Tag counter for contexts outside of any scope.
    root_tags: Cell<u64>,

    /// Generation handed to the next spawned task.
    generations: Cell<u64>,

    /// Waits longer than this are cancelable.
    wait_threshold: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher driven by `clock`.
    pub(crate) fn new(clock: Rc<dyn Clock>, wait_threshold: Duration) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            clock,
            tasks: RefCell::new(Slab::new()),
            registry: RefCell::new(Registry::new()),
            current: RefCell::new(None),
            woken: Arc::new(Mutex::new(VecDeque::new())),
            root_tags: Cell::new(0),
            generations: Cell::new(0),
            wait_threshold,
        })
    }

    pub(crate) fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn wait_threshold(&self) -> Duration {
        self.wait_threshold
    }

    /// Increments and returns the tag counter of the root context.
    pub(crate) fn next_root_tag(&self) -> u64 {
        let tag = self.root_tags.get() + 1;
        self.root_tags.set(tag);
        tag
    }

    /// Number of live tasks.
    pub(crate) fn live_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Number of suspensions registered with the root registry.
    pub(crate) fn outstanding(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Key of the task being polled.
    pub(crate) fn current_task(&self) -> Option<usize> {
        self.current.borrow().as_ref().map(|current| current.key)
    }

    /// Depth of the context installed for the task being polled.
    pub(crate) fn current_depth(&self) -> Option<usize> {
        self.current
            .borrow()
            .as_ref()
            .map(|current| current.token.depth())
    }

    /// Registers a suspension with the root registry.
    ///
    /// Returns the id and the gate handed to the suspension's setup. The
    /// gate delivers to `continuation` at most `budget` times; any further
    /// invocation, or one arriving after the entry was released, is ignored.
    pub(crate) fn register(&self, continuation: Continuation, budget: usize) -> (Id, Continuation) {
        let id = self
            .registry
            .borrow_mut()
            .register(continuation.clone(), budget);
        let dispatcher = self.this.clone();

        trace!(%id, budget, "suspension registered");

        let gate: Continuation = Rc::new(move |delivery: Delivery| {
            let Some(dispatcher) = dispatcher.upgrade() else {
                return;
            };

            let live = dispatcher
                .registry
                .borrow()
                .get(id)
                .is_some_and(|registered| Rc::ptr_eq(registered, &continuation));

            if !live {
                trace!(%id, "late resumption ignored");
                return;
            }

            dispatcher.registry.borrow_mut().unregister(id, false);
            continuation(delivery);
        });

        (id, gate)
    }

    /// Releases a root registration if it is still owned by `continuation`.
    pub(crate) fn release(&self, id: Id, continuation: &Continuation) {
        self.registry
            .borrow_mut()
            .unregister_if(id, true, |registered| Rc::ptr_eq(registered, continuation));
    }

    /// Adds a task to the table without running it.
    pub(crate) fn spawn<F>(&self, future: F, token: ContextToken, on_settle: Option<SettleHook>) -> usize
    where
        F: Future<Output = ()> + 'static,
    {
        let depth = token.depth();
        let generation = self.generations.get();
        self.generations.set(generation + 1);

        let task = Rc::new(Task::new(future.boxed_local(), token, generation, on_settle));
        let key = self.tasks.borrow_mut().insert(task);

        trace!(key, generation, depth, "task spawned");
        key
    }

    /// Runs the task on the next turn of the event loop.
    pub(crate) fn schedule(&self, key: usize) {
        let dispatcher = self.this.clone();

        self.clock.schedule_immediate(Box::new(move || {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.run_task(key);
            }
        }));
    }

    /// Marks a task as abandoned. It is dropped when its poll returns.
    pub(crate) fn abandon(&self, key: usize, error: Option<Error>) {
        let task = self.tasks.borrow().get(key).cloned();

        if let Some(task) = task {
            task.abandon(error);
        }
    }

    /// Polls a task until it suspends, completes, or is abandoned.
    ///
    /// If the task is already being polled further up the stack, it is only
    /// flagged and polled again once that poll returns. Unknown keys are
    /// ignored.
    pub(crate) fn run_task(&self, key: usize) {
        let Some(task) = self.tasks.borrow().get(key).cloned() else {
            return;
        };

        match task.state.get() {
            State::Running | State::Notified => {
                task.state.set(State::Notified);
                return;
            }
            State::Completed => return,
            State::Idle => {}
        }

        let Some(mut future) = task.take_future() else {
            return;
        };

        let waker = make_waker(key, task.generation, self.woken.clone());
        let mut cx = Context::from_waker(&waker);
        let _span = trace_span!("task", key, depth = task.token.depth()).entered();

        loop {
            task.state.set(State::Running);

            let poll = self.enter(key, &task.token, || future.as_mut().poll(&mut cx));

            if poll.is_ready() {
                task.state.set(State::Completed);
                self.tasks.borrow_mut().remove(key);
                drop(future);

                trace!(key, "task completed");
                task.settle(Settled::Completed);
                return;
            }

            if let Some(error) = task.take_abandoned() {
                task.state.set(State::Completed);
                self.tasks.borrow_mut().remove(key);
                drop(future);

                trace!(key, surfaced = error.is_some(), "task abandoned");
                task.settle(Settled::Abandoned(error));
                return;
            }

            if task.state.get() == State::Notified {
                continue;
            }

            task.state.set(State::Idle);
            task.store_future(future);
            return;
        }
    }

    /// Runs every task woken through its `Waker`.
    ///
    /// Wake-ups addressed to a task that has since settled are dropped, even
    /// if its key now belongs to another task.
    pub(crate) fn drain_woken(&self) {
        loop {
            let woken = self.woken.lock().ok().and_then(|mut woken| woken.pop_front());

            let Some((key, generation)) = woken else {
                break;
            };

            let live = self
                .tasks
                .borrow()
                .get(key)
                .is_some_and(|task| task.generation == generation);

            if live {
                self.run_task(key);
            } else {
                trace!(key, generation, "stale wake-up ignored");
            }
        }
    }

    /// Returns `true` if wakers queued work that has not run yet.
    pub(crate) fn has_woken(&self) -> bool {
        self.woken.lock().map(|woken| !woken.is_empty()).unwrap_or(false)
    }

    /// Drops every task without notifying join points.
    ///
    /// Dropping futures may resume or spawn other tasks; the table is drained
    /// until it stays empty.
    pub(crate) fn shutdown(&self) {
        loop {
            let tasks = self.tasks.borrow_mut().drain();

            if tasks.is_empty() {
                break;
            }

            for task in tasks {
                task.discard();
            }
        }

        self.registry.borrow_mut().clear();
    }

    /// Installs the context of task `key` for the duration of `f`.
    ///
    /// The previous context is restored afterwards, so nested reentrant
    /// polls unwind to the right task.
    fn enter<R>(&self, key: usize, token: &ContextToken, f: impl FnOnce() -> R) -> R {
        let previous = self.current.replace(Some(Current {
            key,
            token: token.clone(),
        }));

        let out = f();

        self.current.replace(previous);
        out
    }
}
