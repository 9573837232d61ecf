mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use jobpilot_core::browser::{BrowserError, BrowserSessionManager, SessionKey, SessionState};

use common::{FakeLauncher, LaunchBehavior, PageScript};

fn manager(behavior: LaunchBehavior) -> (BrowserSessionManager, common::SharedLog) {
    let (launcher, log) = FakeLauncher::new(PageScript::default(), behavior);
    (
        BrowserSessionManager::new(Box::new(launcher), Duration::from_secs(30)),
        log,
    )
}

#[tokio::test]
async fn scoped_page_is_ready_inside_and_closed_after() {
    let (manager, log) = manager(LaunchBehavior::Succeed);
    let key = SessionKey::new("boss", "u1");
    assert_eq!(manager.state(&key), SessionState::Uninitialized);

    let seen = manager
        .with_page(&key, |mut page| {
            let manager = &manager;
            let key = &key;
            async move {
                let state = manager.state(key);
                let _ = page.goto("https://www.zhipin.com/").await;
                (page, state)
            }
        })
        .await
        .unwrap();

    assert_eq!(seen, SessionState::Ready);
    assert_eq!(manager.state(&key), SessionState::Closed);
    assert_eq!(log.borrow().launches, 1);
    assert_eq!(log.borrow().closes, 1);
    assert_eq!(log.borrow().visited, vec!["https://www.zhipin.com/".to_string()]);
}

#[tokio::test]
async fn failed_launch_never_runs_work() {
    let (manager, log) = manager(LaunchBehavior::Fail);
    let key = SessionKey::new("zhilian", "u1");
    let ran = RefCell::new(false);

    let result = manager
        .with_page(&key, |page| {
            let ran = &ran;
            async move {
                *ran.borrow_mut() = true;
                (page, ())
            }
        })
        .await;

    assert!(matches!(result, Err(BrowserError::Launch(_))));
    assert!(!*ran.borrow());
    assert_eq!(manager.state(&key), SessionState::Uninitialized);
    assert_eq!(log.borrow().closes, 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_launch_times_out() {
    let (manager, _) = manager(LaunchBehavior::Hang);
    let key = SessionKey::new("linkedin", "u1");

    let result = manager.with_page(&key, |page| async move { (page, ()) }).await;

    assert!(matches!(result, Err(BrowserError::Timeout(_))));
    assert_eq!(manager.state(&key), SessionState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn acquisitions_for_one_key_run_one_after_another() {
    let (manager, log) = manager(LaunchBehavior::Succeed);
    let key = SessionKey::new("boss", "u1");
    let events = Rc::new(RefCell::new(Vec::new()));

    let first = manager.with_page(&key, |page| {
        let events = Rc::clone(&events);
        async move {
            events.borrow_mut().push("first:start");
            tokio::time::sleep(Duration::from_secs(2)).await;
            events.borrow_mut().push("first:end");
            (page, ())
        }
    });
    let second = manager.with_page(&key, |page| {
        let events = Rc::clone(&events);
        async move {
            events.borrow_mut().push("second");
            (page, ())
        }
    });
    let (a, b) = tokio::join!(first, second);

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(*events.borrow(), vec!["first:start", "first:end", "second"]);
    assert_eq!(log.borrow().launches, 2);
    assert_eq!(log.borrow().closes, 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_work_still_closes_the_session() {
    let (manager, log) = manager(LaunchBehavior::Succeed);
    let key = SessionKey::new("boss", "u1");

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        manager.with_page(&key, |page| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            (page, ())
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(manager.state(&key), SessionState::Closed);
    assert_eq!(log.borrow().launches, 1);
    assert_eq!(log.borrow().abandoned, 1);

    let again = manager.with_page(&key, |page| async move { (page, 7) }).await;
    assert_eq!(again.unwrap(), 7);
    assert_eq!(log.borrow().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_launch_resets_to_uninitialized() {
    let (manager, _) = manager(LaunchBehavior::Hang);
    let key = SessionKey::new("zhilian", "u1");

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        manager.with_page(&key, |page| async move { (page, ()) }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(manager.state(&key), SessionState::Uninitialized);
}

#[tokio::test]
async fn panicking_work_still_closes_the_session() {
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;

    let (manager, log) = manager(LaunchBehavior::Succeed);
    let key = SessionKey::new("linkedin", "u1");

    let outcome = AssertUnwindSafe(manager.with_page(&key, |page| async move {
        if page.user_agent().is_empty() {
            return (page, ());
        }
        panic!("form handler crashed");
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(manager.state(&key), SessionState::Closed);
    assert_eq!(log.borrow().abandoned, 1);
}
