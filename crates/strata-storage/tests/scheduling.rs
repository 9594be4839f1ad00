// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling and lifecycle tests against the in-memory engine.

use std::time::Duration;

use strata_core::{Event, OpenMode, Phase, Snapshot, StrataError};
use strata_storage::{Database, DatabaseBuilder};
use strata_test_utils::{poll_until, serial_runtime, EngineCall, Gate, MockEngine, MockHandle};
use tokio::sync::{broadcast::error::TryRecvError, oneshot};

type Reply<T> = oneshot::Receiver<Result<T, StrataError>>;

fn mock_db(engine: &MockEngine) -> Database<MockEngine> {
    DatabaseBuilder::new("mock.db").engine(engine.clone()).open()
}

async fn connect(engine: &MockEngine) -> Database<MockEngine> {
    DatabaseBuilder::new("mock.db")
        .engine(engine.clone())
        .connect()
        .await
        .expect("mock open should succeed")
}

/// Queue a query that records `label` and returns the handle id.
fn query(db: &Database<MockEngine>, label: &str) -> Reply<usize> {
    let label = label.to_string();
    let (tx, rx) = oneshot::channel();
    db.call_with(
        move |handle: &MockHandle| {
            handle.record(label);
            Ok(handle.id())
        },
        move |result| {
            let _ = tx.send(result);
        },
    );
    rx
}

/// Like [`query`], but the worker blocks on `gate` before recording.
fn gated_query(db: &Database<MockEngine>, label: &str, gate: &Gate) -> Reply<usize> {
    let label = label.to_string();
    let gate = gate.clone();
    let (tx, rx) = oneshot::channel();
    db.call_with(
        move |handle: &MockHandle| {
            gate.pass();
            handle.record(label);
            Ok(handle.id())
        },
        move |result| {
            let _ = tx.send(result);
        },
    );
    rx
}

fn close(db: &Database<MockEngine>) -> Reply<()> {
    let (tx, rx) = oneshot::channel();
    db.close_with(move |result| {
        let _ = tx.send(result);
    });
    rx
}

async fn snapshot_when(
    db: &Database<MockEngine>,
    what: &str,
    pred: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = db.snapshot().await.expect("event loop should be running");
        if pred(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}; last snapshot: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn assert_misuse<T: std::fmt::Debug>(result: Result<T, StrataError>) {
    match result {
        Err(StrataError::Misuse { message }) => assert_eq!(message, "Database is closed"),
        other => panic!("expected Misuse, got {other:?}"),
    }
}

#[test]
fn shared_requests_before_open_run_in_submission_order() {
    serial_runtime().block_on(async {
        let engine = MockEngine::new();
        let gate = engine.gate_open();
        let db = mock_db(&engine);

        let replies: Vec<_> = ["q0", "q1", "q2"]
            .iter()
            .map(|label| query(&db, label))
            .collect();

        let snapshot = snapshot_when(&db, "queued queries", |s| s.queued == 3).await;
        assert_eq!(snapshot.phase, Phase::Opening);
        assert_eq!(snapshot.pending, 0);
        assert!(engine.journal().is_empty());

        gate.open();
        for reply in replies {
            assert_eq!(reply.await.unwrap(), Ok(0));
        }
        assert_eq!(engine.query_labels(), ["q0", "q1", "q2"]);
        assert!(matches!(engine.journal()[0], EngineCall::Open { ok: true, .. }));
    });
}

#[tokio::test]
async fn close_waits_for_pending_shared_requests() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let gate = Gate::new();

    let replies: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|label| gated_query(&db, label, &gate))
        .collect();
    let closing = close(&db);
    let late = query(&db, "late");

    let snapshot = snapshot_when(&db, "close queued behind three queries", |s| {
        s.pending == 3 && s.queued == 2
    })
    .await;
    assert_eq!(snapshot.phase, Phase::Open);
    assert!(!snapshot.locked);
    assert_eq!(engine.close_attempts(), 0);

    gate.open();
    for reply in replies {
        reply.await.unwrap().unwrap();
    }
    closing.await.unwrap().unwrap();
    assert_misuse(late.await.unwrap());

    let journal = engine.journal();
    let close_at = journal
        .iter()
        .position(|call| matches!(call, EngineCall::Close { ok: true, .. }))
        .expect("close should be journaled");
    assert_eq!(close_at, journal.len() - 1);
    let mut labels = engine.query_labels();
    labels.sort();
    assert_eq!(labels, ["a", "b", "c"]);
}

/// open, three queries, close, one late query: the late query is post-close.
#[test]
fn late_request_queued_behind_close_is_misuse() {
    serial_runtime().block_on(async {
        let engine = MockEngine::new();
        let db = connect(&engine).await;

        let replies: Vec<_> = ["op1", "op2", "op3"]
            .iter()
            .map(|label| query(&db, label))
            .collect();
        let closing = close(&db);
        let late = query(&db, "late");

        for reply in replies {
            reply.await.unwrap().unwrap();
        }
        closing.await.unwrap().unwrap();
        assert_misuse(late.await.unwrap());

        assert_eq!(
            engine.journal(),
            vec![
                EngineCall::Open {
                    path: "mock.db".into(),
                    mode: OpenMode::default(),
                    ok: true
                },
                EngineCall::Query {
                    handle: 0,
                    label: "op1".into()
                },
                EngineCall::Query {
                    handle: 0,
                    label: "op2".into()
                },
                EngineCall::Query {
                    handle: 0,
                    label: "op3".into()
                },
                EngineCall::Close { handle: 0, ok: true },
            ]
        );
    });
}

#[tokio::test]
async fn requests_after_close_never_reach_the_engine() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let mut events = db.subscribe();
    assert_eq!(events.recv().await.unwrap(), Event::Open);

    db.close().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Close);

    assert_misuse(query(&db, "after").await.unwrap());
    assert_misuse(db.close().await);

    db.call_detached(|handle: &MockHandle| {
        handle.record("detached");
        Ok(())
    });
    match events.recv().await.unwrap() {
        Event::Error(err) => assert!(err.is_misuse(), "got {err:?}"),
        other => panic!("expected error event, got {other:?}"),
    }

    assert!(engine.query_labels().is_empty());
    assert_eq!(engine.close_attempts(), 1);
    assert_eq!(db.snapshot().await.unwrap().phase, Phase::Closed);
}

#[tokio::test]
async fn explicit_close_then_drop_closes_once() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let dispatcher = db.dispatcher().clone();

    db.close().await.unwrap();
    drop(db);
    dispatcher.wait().await;

    assert_eq!(engine.close_attempts(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn dropping_an_open_connection_closes_in_background() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let dispatcher = db.dispatcher().clone();
    query(&db, "q").await.unwrap().unwrap();

    drop(db);
    dispatcher.wait().await;

    assert_eq!(engine.closes(), 1);
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(dispatcher.outstanding(), 0);
}

#[tokio::test]
async fn drop_with_close_in_flight_closes_once() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let dispatcher = db.dispatcher().clone();
    let gate = engine.gate_close();

    db.request_close();
    let snapshot = snapshot_when(&db, "close dispatched", |s| s.locked).await;
    assert_eq!(snapshot.phase, Phase::Closing);
    assert_eq!(snapshot.refs, 1);

    drop(db);
    gate.open();
    dispatcher.wait().await;

    assert_eq!(engine.close_attempts(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn drop_during_open_closes_after_open_completes() {
    let engine = MockEngine::new();
    let gate = engine.gate_open();
    let db = mock_db(&engine);
    let dispatcher = db.dispatcher().clone();

    drop(db);
    gate.open();
    dispatcher.wait().await;

    assert_eq!(engine.opens(), 1);
    assert_eq!(engine.closes(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn drop_after_failed_close_retries_in_background() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let dispatcher = db.dispatcher().clone();

    engine.fail_next_close(StrataError::engine(5, "database is locked"));
    let err = db.close().await.unwrap_err();
    assert_eq!(err.code(), 5);

    drop(db);
    dispatcher.wait().await;

    assert_eq!(engine.close_attempts(), 2);
    assert_eq!(engine.closes(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn refs_return_to_zero_after_dispatch_completes() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    assert_eq!(db.snapshot().await.unwrap().refs, 0);

    let gate = Gate::new();
    let reply = gated_query(&db, "held", &gate);
    let snapshot = snapshot_when(&db, "query in flight", |s| s.pending == 1).await;
    assert_eq!(snapshot.refs, 1);

    gate.open();
    reply.await.unwrap().unwrap();
    let snapshot = db.snapshot().await.unwrap();
    assert_eq!(snapshot.refs, 0);
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test]
async fn failed_open_is_permanent() {
    let engine = MockEngine::new();
    engine.fail_open(StrataError::engine(14, "unable to open database file"));
    let gate = engine.gate_open();

    let (tx, rx) = oneshot::channel();
    let db = DatabaseBuilder::new("missing/mock.db")
        .engine(engine.clone())
        .open_with(move |result| {
            let _ = tx.send(result);
        });
    let mut events = db.subscribe();
    let straggler = query(&db, "straggler");
    snapshot_when(&db, "straggler queued", |s| s.queued == 1).await;

    gate.open();
    match rx.await.unwrap() {
        Err(StrataError::Engine { code, .. }) => assert_eq!(code, 14),
        other => panic!("expected engine error, got {other:?}"),
    }
    assert_misuse(straggler.await.unwrap());
    assert_misuse(db.close().await);
    assert_misuse(query(&db, "later").await.unwrap());

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(db.snapshot().await.unwrap().phase, Phase::Closed);
    assert!(engine.query_labels().is_empty());
    assert_eq!(engine.close_attempts(), 0);
}

#[tokio::test]
async fn failed_open_without_completion_emits_error_event() {
    let engine = MockEngine::new();
    engine.fail_open(StrataError::engine(14, "unable to open database file"));
    let db = mock_db(&engine);
    let mut events = db.subscribe();

    match events.recv().await.unwrap() {
        Event::Error(StrataError::Engine { code, .. }) => assert_eq!(code, 14),
        other => panic!("expected engine error event, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_close_leaves_connection_usable() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let mut events = db.subscribe();
    assert_eq!(events.recv().await.unwrap(), Event::Open);

    engine.fail_next_close(StrataError::engine(5, "database is locked"));
    db.request_close();
    match events.recv().await.unwrap() {
        Event::Error(err) => assert_eq!(err.code(), 5),
        other => panic!("expected error event, got {other:?}"),
    }

    let snapshot = db.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Open);
    assert!(!snapshot.locked);
    assert_eq!(query(&db, "retry-window").await.unwrap(), Ok(0));

    db.close().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Close);
    assert_eq!(engine.close_attempts(), 2);
    assert_eq!(engine.closes(), 1);
}

#[tokio::test]
async fn panicking_query_reports_dispatch_error() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;

    let err = db
        .call(|_: &MockHandle| -> Result<(), StrataError> { panic!("query blew up") })
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Dispatch(_)), "got {err:?}");

    assert_eq!(query(&db, "after-panic").await.unwrap(), Ok(0));
    db.close().await.unwrap();
}

#[tokio::test]
async fn panicking_completion_keeps_the_connection_running() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let mut events = db.subscribe();
    assert_eq!(events.recv().await.unwrap(), Event::Open);

    db.call_with(
        |handle: &MockHandle| Ok(handle.id()),
        |_| panic!("completion blew up"),
    );
    match events.recv().await.unwrap() {
        Event::Error(StrataError::Dispatch(message)) => {
            assert!(message.contains("completion blew up"), "{message}");
        }
        other => panic!("expected dispatch error event, got {other:?}"),
    }

    assert_eq!(query(&db, "after-panic").await.unwrap(), Ok(0));

    let dispatcher = db.dispatcher().clone();
    drop(db);
    dispatcher.wait().await;
    assert_eq!(engine.close_attempts(), 1);
    assert_eq!(engine.closes(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn panicking_close_completion_still_closes_once() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;

    db.close_with(|_| panic!("close completion blew up"));
    snapshot_when(&db, "close applied", |s| s.phase == Phase::Closed).await;
    assert_misuse(query(&db, "late").await.unwrap());

    let dispatcher = db.dispatcher().clone();
    drop(db);
    dispatcher.wait().await;
    assert_eq!(engine.close_attempts(), 1);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn later_subscribers_only_see_new_events() {
    let engine = MockEngine::new();
    let db = connect(&engine).await;
    let mut first = db.subscribe();
    let mut second = db.subscribe();

    assert_eq!(first.recv().await.unwrap(), Event::Open);
    db.close().await.unwrap();
    assert_eq!(second.recv().await.unwrap(), Event::Close);
    assert_eq!(first.recv().await.unwrap(), Event::Close);
}

#[tokio::test]
async fn open_mode_reaches_the_engine() {
    let engine = MockEngine::new();
    let db = DatabaseBuilder::new("ro.db")
        .engine(engine.clone())
        .mode(OpenMode::READ_ONLY)
        .connect()
        .await
        .unwrap();
    assert_eq!(db.mode(), OpenMode::READ_ONLY);
    assert_eq!(db.filename(), "ro.db");

    poll_until("open journaled", || engine.opens() == 1).await;
    assert_eq!(
        engine.journal()[0],
        EngineCall::Open {
            path: "ro.db".into(),
            mode: OpenMode::READ_ONLY,
            ok: true
        }
    );
}
