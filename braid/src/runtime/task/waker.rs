use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::{Wake, Waker};

/// Queue of tasks woken through a [`Waker`], as `(key, generation)` pairs.
///
/// `Waker` must be `Send + Sync`, so foreign futures may wake a task from
/// anywhere. Those wake-ups are parked here and picked up by the runtime
/// between event loop turns. Task keys are recycled, so the generation
/// tells a stale wake-up apart from one meant for the task now holding the
/// key.
pub(crate) type WokenQueue = Arc<Mutex<VecDeque<(usize, u64)>>>;

/// Waker backing a single runtime task.
struct TaskWaker {
    /// Key of the task in the dispatcher's task table.
    key: usize,

    /// Generation of the task the waker was made for.
    generation: u64,

    /// Queue shared with the dispatcher.
    woken: WokenQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    /// Records the task as woken.
    ///
    /// A poisoned queue only means another thread panicked mid-push; the
    /// wake-up is dropped in that case.
    fn wake_by_ref(self: &Arc<Self>) {
        if let Ok(mut woken) = self.woken.lock() {
            woken.push_back((self.key, self.generation));
        }
    }
}

/// Creates a [`Waker`] associated with a runtime task.
///
/// Runtime-owned suspensions never go through the waker: they resume their
/// task directly. The waker exists so futures from other crates can be
/// awaited inside a task.
pub(crate) fn make_waker(key: usize, generation: u64, woken: WokenQueue) -> Waker {
    Waker::from(Arc::new(TaskWaker { key, generation, woken }))
}
