mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{manager, FakeProvider, LoadGate, Stats};
use speech_trainer_lib::{ErrorKind, ModelStatus, Subscription};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_load() {
    let stats = Arc::new(Stats::default());
    let gate = Arc::new(LoadGate::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).gated(Arc::clone(&gate)));

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request_model().await })
        })
        .collect();

    assert!(common::eventually(WAIT, || Stats::get(&stats.loads) == 1).await);
    assert_eq!(manager.status(), ModelStatus::Loading);
    gate.open();

    let mut handles = Vec::new();
    for waiter in waiters {
        handles.push(waiter.await.unwrap().unwrap());
    }

    assert_eq!(Stats::get(&stats.loads), 1);
    assert!(handles.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
    assert_eq!(handles[0].serial, 1);
    assert_eq!(manager.status(), ModelStatus::Loaded);
}

#[tokio::test]
async fn loaded_model_is_returned_without_reloading() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)));

    let first = manager.request_model().await.unwrap();
    let second = manager.request_model().await.unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(Stats::get(&stats.loads), 1);
}

#[tokio::test]
async fn failed_load_is_retried_on_next_request() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).failing(1));

    let err = manager.request_model().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(matches!(manager.status(), ModelStatus::Failed(ref msg) if msg.contains("corrupt")));
    assert_eq!(manager.progress(), 0);

    let handle = manager.request_model().await.unwrap();
    assert_eq!(handle.serial, 2);
    assert_eq!(Stats::get(&stats.loads), 2);
    assert_eq!(manager.status(), ModelStatus::Loaded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_fails_pending_requests_instead_of_hanging() {
    let stats = Arc::new(Stats::default());
    let gate = Arc::new(LoadGate::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).gated(Arc::clone(&gate)));

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.request_model().await })
    };
    assert!(common::eventually(WAIT, || Stats::get(&stats.loads) == 1).await);

    manager.teardown();
    let outcome = tokio::time::timeout(WAIT, pending)
        .await
        .expect("pending request must resolve after teardown")
        .unwrap();
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Aborted);
    assert_eq!(manager.status(), ModelStatus::NotLoaded);

    // the abandoned load finishes in the background and must not resurrect the model
    gate.open();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.status(), ModelStatus::NotLoaded);

    let handle = manager.request_model().await.unwrap();
    assert_eq!(handle.serial, 2);
}

#[tokio::test]
async fn teardown_is_idempotent() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)));
    manager.teardown();

    manager.request_model().await.unwrap();
    manager.teardown();
    manager.teardown();
    assert_eq!(manager.status(), ModelStatus::NotLoaded);
}

#[tokio::test]
async fn subscribers_see_updates_from_subscription_onward() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).with_progress(&[10, 60, 40, 90]));

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let progress = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&statuses);
    let _status_sub = manager.subscribe_status(move |s| sink.lock().unwrap().push(s.clone()));
    let sink = Arc::clone(&progress);
    let _progress_sub = manager.subscribe_progress(move |p| sink.lock().unwrap().push(*p));

    manager.request_model().await.unwrap();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![ModelStatus::Loading, ModelStatus::Loaded]
    );
    // out-of-order values are passed through; consumers keep the latest
    assert_eq!(*progress.lock().unwrap(), vec![0, 10, 60, 40, 90, 100]);

    let late = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&late);
    let _late_sub = manager.subscribe_status(move |s| sink.lock().unwrap().push(s.clone()));
    assert!(late.lock().unwrap().is_empty());

    manager.teardown();
    assert_eq!(*late.lock().unwrap(), vec![ModelStatus::NotLoaded]);
}

#[tokio::test]
async fn failure_is_broadcast_with_error_marker() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).failing(1));

    let last = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last);
    let _sub = manager.subscribe_status(move |s| *sink.lock().unwrap() = Some(s.clone()));

    let _ = manager.request_model().await;
    let status = last.lock().unwrap().clone().unwrap();
    assert!(matches!(status, ModelStatus::Failed(ref msg) if !msg.is_empty()));
}

#[tokio::test]
async fn unsubscribing_inside_a_callback_stops_delivery() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)).with_progress(&[25, 50, 75]));

    let calls = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&calls);
    let own = Arc::clone(&slot);
    let sub = manager.subscribe_progress(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = own.lock().unwrap().as_ref() {
            sub.unsubscribe();
            sub.unsubscribe();
        }
    });
    *slot.lock().unwrap() = Some(sub);

    manager.request_model().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!slot.lock().unwrap().as_ref().unwrap().is_active());
}

#[tokio::test]
async fn dropped_subscription_receives_nothing() {
    let stats = Arc::new(Stats::default());
    let manager = manager(FakeProvider::new(Arc::clone(&stats)));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    drop(manager.subscribe_status(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    manager.request_model().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
