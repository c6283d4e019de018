use super::cx::Cx;
use super::dispatcher::Dispatcher;
use crate::clock::{ClockMode, EventLoop};
use crate::error::{Error, Result};
use crate::task::Settled;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

/// The main runtime handle.
///
/// `Runtime` is responsible for:
/// - owning the [`EventLoop`] every delay goes through,
/// - owning the dispatcher that runs tasks and tracks suspensions,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// Everything runs on the thread that owns the runtime. Dropping the runtime
/// drops every task that is still suspended.
pub struct Runtime {
    /// Event loop driving every delay and rescheduling.
    clock: Rc<EventLoop>,

    /// Task table and root registry.
    dispatcher: Rc<Dispatcher>,
}

impl Runtime {
    /// Creates a new runtime instance.
    ///
    /// # Arguments
    ///
    /// * `mode` - How the event loop lets time pass.
    /// * `wait_threshold` - Waits longer than this are cancelable.
    pub(crate) fn new(mode: ClockMode, wait_threshold: Duration) -> Self {
        let clock = Rc::new(EventLoop::new(mode));
        let dispatcher = Dispatcher::new(clock.clone(), wait_threshold);

        Self { clock, dispatcher }
    }

    /// Runs a computation to completion on the current thread.
    ///
    /// `f` receives the root [`Cx`]. The returned future runs as the main
    /// task and the event loop is turned until it produces its result.
    ///
    /// # Errors
    ///
    /// Returns the computation's own error, [`Error::Abandoned`] if the main
    /// task was abandoned without an error, or [`Error::Stalled`] if the
    /// event loop ran out of work first.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = runtime.block_on(|cx| async move {
    ///     wait(&cx, Duration::from_millis(10)).await?;
    ///     Ok(42)
    /// });
    /// assert_eq!(result, Ok(42));
    /// ```
    pub fn block_on<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let result: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));

        let cx = self.root();
        let token = cx.context_depth();
        let future = f(cx);

        let sink = result.clone();
        let on_abandon = result.clone();

        let key = self.dispatcher.spawn(
            async move {
                let output = future.await;
                *sink.borrow_mut() = Some(output);
            },
            token,
            Some(Box::new(move |settled| {
                if let Settled::Abandoned(error) = settled {
                    on_abandon
                        .borrow_mut()
                        .get_or_insert(Err(error.unwrap_or(Error::Abandoned)));
                }
            })),
        );

        self.dispatcher.run_task(key);

        loop {
            self.dispatcher.drain_woken();

            if let Some(output) = result.borrow_mut().take() {
                return output;
            }

            if !self.clock.turn() && !self.dispatcher.has_woken() {
                warn!(
                    live_tasks = self.dispatcher.live_tasks(),
                    outstanding = self.dispatcher.outstanding(),
                    "event loop went idle before the main task finished"
                );
                return Err(Error::Stalled);
            }
        }
    }

    /// Spawns a detached computation.
    ///
    /// The computation starts on the next turn of the event loop. Its error,
    /// if any, is logged and discarded.
    pub fn spawn<F, Fut>(&self, f: F)
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let cx = self.root();
        let token = cx.context_depth();
        let future = f(cx);

        let key = self.dispatcher.spawn(
            async move {
                if let Err(error) = future.await {
                    debug!(%error, "detached computation failed");
                }
            },
            token,
            None,
        );

        self.dispatcher.schedule(key);
    }

    /// Turns the event loop until nothing is pending.
    pub fn run_until_idle(&self) {
        loop {
            self.dispatcher.drain_woken();

            if !self.clock.turn() && !self.dispatcher.has_woken() {
                break;
            }
        }
    }

    /// Lets `by` pass, running everything that falls due meanwhile.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
        self.dispatcher.drain_woken();
    }

    /// The event loop driving this runtime.
    pub fn clock(&self) -> &EventLoop {
        &self.clock
    }

    /// Number of suspensions still registered with the dispatcher.
    ///
    /// Drops back to zero once every suspension has been resumed, canceled
    /// or abandoned.
    pub fn outstanding(&self) -> usize {
        self.dispatcher.outstanding()
    }

    /// Number of tasks that have neither completed nor been abandoned.
    pub fn live_tasks(&self) -> usize {
        self.dispatcher.live_tasks()
    }

    fn root(&self) -> Cx {
        Cx::new(self.dispatcher.clone(), None, false)
    }
}

impl Drop for Runtime {
    /// Shuts down the runtime.
    ///
    /// Every task still suspended is dropped without notifying the join
    /// point waiting for it.
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}
