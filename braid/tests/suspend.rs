mod common;

use braid::clock::Clock;
use braid::time::wait;
use braid::{Cx, Error, Resumer};
use common::ms;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::StreamExt;

#[test]
fn excess_resumptions_are_ignored() {
    let runtime = common::runtime();

    let value = runtime.block_on(|cx| async move {
        cx.suspend(|resumer: Resumer<u32>| {
            resumer.resume(Ok(1));
            resumer.resume(Ok(2));
            resumer.resume(Err(Error::new("late", "ignored")));
            None
        })
        .await
    });

    assert_eq!(value, Ok(1));
    assert_eq!(runtime.outstanding(), 0);
}

#[test]
fn wakeups_stop_at_the_budget() {
    let runtime = common::runtime();

    let values = runtime.block_on(|cx| async move {
        let clock = cx.clock();

        let wakeups = cx.suspend_many(3, move |resumer: Resumer<u64>| {
            for n in 1..=5 {
                let resumer = resumer.clone();
                clock.schedule(ms(n), Box::new(move || resumer.resume(Ok(n))));
            }
            None
        });

        wakeups.collect::<Vec<_>>().await.into_iter().collect::<braid::Result<Vec<_>>>()
    });

    assert_eq!(values, Ok(vec![1, 2, 3]));

    runtime.run_until_idle();
    assert_eq!(runtime.outstanding(), 0);
    assert_eq!(runtime.clock().pending(), 0);
}

#[test]
fn stale_resumers_are_harmless() {
    let runtime = common::runtime();
    let stale: Rc<RefCell<Option<Resumer<u32>>>> = Rc::new(RefCell::new(None));
    let keep = stale.clone();

    let value = runtime.block_on(|cx| async move {
        let clock = cx.clock();

        let first = cx
            .suspend(move |resumer: Resumer<u32>| {
                *keep.borrow_mut() = Some(resumer.clone());
                Some(clock.schedule(ms(5), Box::new(move || resumer.resume(Ok(7)))))
            })
            .await?;

        let stale = stale.borrow_mut().take();
        if let Some(stale) = stale {
            stale.resume(Ok(99));
            stale.abandon(Some(Error::new("late", "ignored")));
        }

        wait(&cx, ms(1)).await?;
        Ok(first)
    });

    assert_eq!(value, Ok(7));
    assert_eq!(runtime.outstanding(), 0);
}

#[test]
fn dropped_suspensions_release_their_timer() {
    let runtime = common::runtime();

    let value = runtime.block_on(|cx| async move {
        let clock = cx.clock();
        let pending = cx.suspend(move |resumer: Resumer<()>| {
            Some(clock.schedule(ms(1_000), Box::new(move || resumer.resume(Ok(())))))
        });

        // Poll it once so that it registers, then drop it.
        let mut pending = Box::pin(pending);
        let registered = futures::poll!(pending.as_mut()).is_pending();
        drop(pending);

        Ok(registered)
    });

    assert_eq!(value, Ok(true));
    assert_eq!(runtime.outstanding(), 0);
    assert_eq!(runtime.clock().pending_timers(), 0);
}

async fn give_up(cx: Cx, error: Option<Error>) -> braid::Result<u32> {
    match cx.abandon(error).await {}
}

#[test]
fn abandoning_the_main_task_surfaces_its_error() {
    let runtime = common::runtime();

    let failed = runtime.block_on(|cx| give_up(cx, Some(Error::new("fatal", "gave up"))));
    let silent = runtime.block_on(|cx| give_up(cx, None));

    assert_eq!(failed, Err(Error::new("fatal", "gave up")));
    assert_eq!(silent, Err(Error::Abandoned));
    assert_eq!(runtime.live_tasks(), 0);
}

#[test]
fn block_on_reports_a_stalled_loop() {
    let runtime = common::runtime();

    let setups = Rc::new(Cell::new(0));
    let counter = setups.clone();

    let value = runtime.block_on(|cx| async move {
        cx.suspend_uninterruptible(move |_: Resumer<()>| {
            counter.set(counter.get() + 1);
            None
        })
        .await
    });

    assert_eq!(value, Err(Error::Stalled));
    assert_eq!(setups.get(), 1);
    assert_eq!(runtime.outstanding(), 1);
}
