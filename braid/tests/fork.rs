mod common;

use braid::cancel::cancelable;
use braid::task::{ForkSite, Settled, fork};
use braid::time::{wait, yield_now};
use braid::{Cx, Error, Resumer};
use common::{entries, ms, push};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[braid::test]
async fn fork_returns_before_the_branch_runs(cx: Cx) {
    let log = common::log();
    let sink = log.clone();

    fork(&cx, move |cx| async move {
        push(&sink, "forked");
        wait(&cx, ms(1)).await?;
        Err(Error::new("ignored", "discarded by fork"))
    })
    .await;

    push(&log, "caller");
    wait(&cx, ms(5)).await?;

    assert_eq!(entries(&log), vec!["caller", "forked"]);
}

#[braid::test]
async fn forked_branches_keep_the_enclosing_scope(cx: Cx) {
    let depth = Rc::new(Cell::new(None));
    let seen = depth.clone();

    cancelable(&cx, move |cx| async move {
        fork(&cx, move |cx| async move {
            wait(&cx, ms(1)).await?;
            seen.set(Some(cx.depth()));
            Ok(())
        })
        .await;

        wait(&cx, ms(5)).await
    })
    .await?;

    assert_eq!(depth.get(), Some(1));
}

#[braid::test]
async fn fork_sites_hand_out_each_index_once(cx: Cx) {
    let site = cx.clone();

    let indices = cx
        .suspend_uninterruptible(move |resumer: Resumer<Vec<usize>>| {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let record = seen.clone();

            ForkSite::new(4).spawn(
                &site,
                move |cx, index| {
                    let record = record.clone();

                    async move {
                        if index % 2 == 1 {
                            let _ = yield_now(&cx).await;
                        }
                        record.borrow_mut().push(index);
                    }
                },
                move |_, settled| {
                    assert_eq!(settled, Settled::Completed);

                    let indices = seen.borrow().clone();
                    if indices.len() == 4 {
                        resumer.resume(Ok(indices));
                    }
                },
            );

            None
        })
        .await?;

    assert_eq!(indices, vec![0, 2, 1, 3]);
}

async fn give_up(cx: Cx) {
    match cx.abandon(Some(Error::new("branch", "gave up"))).await {}
}

#[braid::test]
async fn fork_sites_report_abandoned_branches(cx: Cx) {
    let site = cx.clone();

    let settled = cx
        .suspend_uninterruptible(move |resumer: Resumer<Settled>| {
            ForkSite::new(1).spawn(
                &site,
                |cx, _| give_up(cx),
                move |_, settled| resumer.resume(Ok(settled)),
            );

            None
        })
        .await?;

    assert_eq!(settled, Settled::Abandoned(Some(Error::new("branch", "gave up"))));
}

#[test]
fn fork_sites_have_at_least_one_branch() {
    assert_eq!(ForkSite::new(0).branches(), 1);
    assert_eq!(ForkSite::new(3).branches(), 3);
}

#[test]
fn detached_branches_are_dropped_with_the_runtime() {
    let runtime = common::runtime();
    let marker = Rc::new(());
    let held = marker.clone();

    runtime.spawn(move |cx| async move {
        let _held = held;
        wait(&cx, ms(1_000)).await
    });

    runtime.advance(ms(1));
    assert_eq!(Rc::strong_count(&marker), 2);
    assert_eq!(runtime.live_tasks(), 1);

    drop(runtime);
    assert_eq!(Rc::strong_count(&marker), 1);
}
