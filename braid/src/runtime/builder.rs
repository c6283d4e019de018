use super::Runtime;
use crate::clock::ClockMode;

use std::time::Duration;

/// Waits longer than this are cancelable by default.
pub(crate) const DEFAULT_WAIT_THRESHOLD: Duration = Duration::from_millis(200);

/// Builder for configuring and creating a runtime.
///
/// `RuntimeBuilder` allows customizing runtime parameters before
/// constructing the runtime: how the event loop lets time pass, and above
/// which duration [`wait`](crate::time::wait) becomes cancelable.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .virtual_time()
///     .wait_threshold(Duration::from_millis(50))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    /// How the event loop lets time pass.
    mode: ClockMode,

    /// Cancelable-wait threshold.
    wait_threshold: Duration,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    ///
    /// By default the runtime runs in real time and waits longer than
    /// 200 ms are cancelable.
    pub fn new() -> Self {
        Self {
            mode: ClockMode::RealTime,
            wait_threshold: DEFAULT_WAIT_THRESHOLD,
        }
    }

    /// Drives the runtime with a virtual clock.
    ///
    /// Time jumps straight to the next deadline instead of sleeping, which
    /// makes timer-heavy code deterministic and instant. This is what
    /// `#[braid::test]` uses.
    pub fn virtual_time(mut self) -> Self {
        self.mode = ClockMode::Virtual;
        self
    }

    /// Drives the runtime with the wall clock.
    pub fn real_time(mut self) -> Self {
        self.mode = ClockMode::RealTime;
        self
    }

    /// Sets the duration above which waits become cancelable.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let builder = RuntimeBuilder::new()
    ///     .wait_threshold(Duration::from_secs(1));
    /// ```
    pub fn wait_threshold(mut self, threshold: Duration) -> Self {
        self.wait_threshold = threshold;
        self
    }

    /// Builds the runtime with the configured options.
    pub fn build(self) -> Runtime {
        Runtime::new(self.mode, self.wait_threshold)
    }
}

impl Default for RuntimeBuilder {
    /// Creates a default `RuntimeBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
