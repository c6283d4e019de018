mod common;

use braid::cancel::cancelable;
use braid::task::interleaved;
use braid::time::{wait, yield_for, yield_now};
use braid::{Cx, RuntimeBuilder};
use common::{cancel_after, entries, ms, push};

use std::cell::Cell;
use std::rc::Rc;

#[test]
fn waits_above_the_threshold_are_cancelable() {
    common::init_tracing();
    let runtime = RuntimeBuilder::new().virtual_time().wait_threshold(ms(20)).build();

    let result = runtime.block_on(|cx| async move {
        cancelable(&cx, |cx| async move {
            cancel_after(&cx, ms(10)).await;
            wait(&cx, ms(50)).await?;
            Ok(1)
        })
        .await
    });

    assert_eq!(result, Ok(None));
    assert_eq!(runtime.clock().now(), ms(10));
}

#[test]
fn short_waits_are_not_cut_short() {
    let runtime = common::runtime();
    let resumed = Rc::new(Cell::new(false));
    let flag = resumed.clone();

    let result = runtime.block_on(|cx| async move {
        cancelable(&cx, move |cx| async move {
            cancel_after(&cx, ms(10)).await;
            wait(&cx, ms(100)).await?;
            flag.set(true);
            Ok(1)
        })
        .await
    });

    // The wait ran its full course, then gave up on the canceled scope.
    assert_eq!(result, Ok(None));
    assert!(!resumed.get());
    assert_eq!(runtime.clock().now(), ms(100));
    assert_eq!(runtime.outstanding(), 0);
}

#[braid::test]
async fn short_waits_abandon_a_canceled_scope(cx: Cx) {
    let reached = Rc::new(Cell::new(false));
    let flag = reached.clone();

    let result = cancelable(&cx, move |cx| async move {
        cx.request_cancel();
        wait(&cx, ms(5)).await?;
        flag.set(true);
        Ok("finished")
    })
    .await?;

    assert_eq!(result, None);
    assert!(!reached.get());
}

#[braid::test]
async fn yields_abandon_a_canceled_scope(cx: Cx) {
    let reached = Rc::new(Cell::new(false));
    let flag = reached.clone();

    let result = cancelable(&cx, move |cx| async move {
        cx.request_cancel();
        yield_now(&cx).await?;
        flag.set(true);
        Ok(())
    })
    .await?;

    assert_eq!(result, None);
    assert!(!reached.get());
}

#[test]
fn zero_waits_yield_to_ready_branches() {
    let runtime = common::runtime();
    let log = common::log();
    let (a, b) = (log.clone(), log.clone());

    let result = runtime.block_on(|cx| async move {
        interleaved(
            &cx,
            move |cx| async move {
                wait(&cx, ms(0)).await?;
                push(&a, "a");
                Ok(())
            },
            move |_| async move {
                push(&b, "b");
                Ok(())
            },
        )
        .await
    });

    assert_eq!(result, Ok(((), ())));
    assert_eq!(entries(&log), vec!["b", "a"]);
    assert_eq!(runtime.clock().now(), ms(0));
}

#[test]
fn yields_let_time_pass() {
    let runtime = common::runtime();

    let result = runtime.block_on(|cx| async move {
        yield_for(&cx, ms(30)).await?;
        yield_for(&cx, ms(0)).await?;
        wait(&cx, ms(5)).await
    });

    assert_eq!(result, Ok(()));
    assert_eq!(runtime.clock().now(), ms(35));
    assert_eq!(runtime.clock().pending(), 0);
}

#[test]
fn real_time_waits_sleep() {
    common::init_tracing();
    let runtime = RuntimeBuilder::new().build();

    let result = runtime.block_on(|cx| async move { wait(&cx, ms(5)).await });

    assert_eq!(result, Ok(()));
    assert!(runtime.clock().now() >= ms(5));
}
