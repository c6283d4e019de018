mod common;

use braid::cancel::cancelable;
use braid::task::{interleaved, synchronous};
use braid::time::wait;
use braid::{ContextToken, Cx};
use common::ms;

#[braid::test]
async fn depth_counts_enclosing_scopes(cx: Cx) {
    assert_eq!(cx.context_depth().depth(), 0);

    let depths = cancelable(&cx, |cx| async move {
        let first = cx.context_depth().depth();

        let second = cancelable(&cx, |cx| async move { Ok(cx.context_depth().depth()) }).await?;

        Ok((first, second))
    })
    .await?;

    assert_eq!(depths, Some((1, Some(2))));
}

#[braid::test]
async fn every_capture_gets_a_new_tag(cx: Cx) {
    let first = cx.context_depth();
    let second = cx.context_depth();

    assert_eq!(second.tag(), first.tag() + 1);
    assert!(first.same_scope(&second));
}

#[braid::test]
async fn suspended_branches_come_back_to_their_scope(cx: Cx) {
    let outer = cx.context_depth();

    let (before, after) = cancelable(&cx, |cx| async move {
        let before = cx.context_depth();
        wait(&cx, ms(10)).await?;
        Ok((before, cx.context_depth()))
    })
    .await?
    .unwrap_or_else(|| panic!("scope was canceled"));

    assert!(before.same_scope(&after));
    assert!(!before.same_scope(&outer));
    assert_eq!(after.depth(), 1);
    assert!(after.tag() > before.tag());
}

#[braid::test]
async fn interleaved_branches_capture_the_fork_scope(cx: Cx) {
    let tokens = cancelable(&cx, |cx| async move {
        let site = cx.context_depth();

        let (a, b) = interleaved(
            &cx,
            |cx| async move {
                wait(&cx, ms(20)).await?;
                Ok(cx.context_depth())
            },
            |cx| async move {
                wait(&cx, ms(10)).await?;
                Ok(cx.context_depth())
            },
        )
        .await?;

        Ok::<[ContextToken; 3], _>([site, a, b])
    })
    .await?;

    let Some([site, a, b]) = tokens else {
        panic!("scope was canceled");
    };

    assert!(site.same_scope(&a));
    assert!(site.same_scope(&b));
    assert_eq!(a.depth(), 1);
    assert_eq!(b.depth(), 1);
}

#[braid::test]
async fn synchronous_mode_is_captured(cx: Cx) {
    assert!(!cx.context_depth().is_synchronous());

    let inside = synchronous(&cx, |cx| async move {
        let nested = cancelable(&cx, |cx| async move { Ok(cx.context_depth().is_synchronous()) }).await?;
        Ok((cx.context_depth().is_synchronous(), nested))
    })
    .await?;

    assert_eq!(inside, (true, Some(true)));
    assert!(!cx.context_depth().is_synchronous());
}
