#![allow(dead_code)]

use braid::task::fork;
use braid::time::yield_for;
use braid::{Cx, Runtime, RuntimeBuilder};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A virtual-time runtime with tracing enabled.
pub fn runtime() -> Runtime {
    init_tracing();
    RuntimeBuilder::new().virtual_time().build()
}

/// Shared event log.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Cancels the innermost scope of `cx` once `delay` has elapsed.
pub async fn cancel_after(cx: &Cx, delay: Duration) {
    fork(cx, move |cx| async move {
        yield_for(&cx, delay).await?;
        cx.request_cancel();
        Ok(())
    })
    .await;
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
