mod common;

use braid::time::wait;
use braid::{Cx, Error};
use common::{entries, ms, push};

#[test]
fn spawned_computations_run_on_the_loop() {
    let runtime = common::runtime();
    let log = common::log();

    let sink = log.clone();
    runtime.spawn(move |cx| async move {
        wait(&cx, ms(5)).await?;
        push(&sink, "spawned");
        Ok(())
    });

    assert!(entries(&log).is_empty());

    runtime.run_until_idle();
    assert_eq!(entries(&log), vec!["spawned"]);
    assert_eq!(runtime.clock().now(), ms(5));
    assert_eq!(runtime.live_tasks(), 0);
}

#[test]
fn spawned_errors_are_discarded() {
    let runtime = common::runtime();

    runtime.spawn(|_| async move { Err(Error::new("io", "ignored")) });
    runtime.run_until_idle();

    assert_eq!(runtime.live_tasks(), 0);
    assert_eq!(runtime.block_on(|_| async move { Ok(3) }), Ok(3));
}

#[test]
fn advance_only_runs_what_falls_due() {
    let runtime = common::runtime();
    let log = common::log();

    for (delay, name) in [(10, "early"), (50, "late")] {
        let sink = log.clone();

        runtime.spawn(move |cx| async move {
            wait(&cx, ms(delay)).await?;
            push(&sink, name);
            Ok(())
        });
    }

    runtime.advance(ms(20));
    assert_eq!(entries(&log), vec!["early"]);
    assert_eq!(runtime.clock().now(), ms(20));
    assert_eq!(runtime.live_tasks(), 1);

    runtime.advance(ms(30));
    assert_eq!(entries(&log), vec!["early", "late"]);
    assert_eq!(runtime.outstanding(), 0);
}

#[test]
fn block_on_can_be_called_repeatedly() {
    let runtime = common::runtime();

    let first = runtime.block_on(|cx| async move {
        wait(&cx, ms(10)).await?;
        Ok(1)
    });
    let second = runtime.block_on(|cx| async move {
        wait(&cx, ms(10)).await?;
        Ok(2)
    });

    assert_eq!((first, second), (Ok(1), Ok(2)));
    assert_eq!(runtime.clock().now(), ms(20));
}

#[braid::test]
async fn test_bodies_may_return_results(cx: Cx) -> braid::Result<()> {
    wait(&cx, ms(1)).await?;
    Ok(())
}

#[braid::test]
async fn test_bodies_may_use_the_question_mark(cx: Cx) {
    let value: u32 = "7".parse().map_err(|_| Error::new("parse", "not a number"))?;
    wait(&cx, ms(1)).await?;

    assert_eq!(value, 7);
}
