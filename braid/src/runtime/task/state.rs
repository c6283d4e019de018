/// Lifecycle state of a runtime task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Task is suspended and waits for a resumption.
    Idle,

    /// Task is currently being polled.
    ///
    /// Since polling is reentrant (a resumption may run another task
    /// inline), at most one frame on the stack observes this state per task.
    Running,

    /// Task has been resumed while running.
    ///
    /// The task is polled again as soon as the current poll returns.
    Notified,

    /// Task has completed or was abandoned; it will not be polled again.
    Completed,
}
