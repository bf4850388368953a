//! Lifecycle and concurrency tests for the engine adapter.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use inference_gateway::inference::engine::{EngineAdapter, EngineError};
use inference_gateway::inference::lifecycle::LifecyclePhase;
use inference_gateway::inference::sampling::SamplingConfig;

fn sampling() -> SamplingConfig {
    SamplingConfig {
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 64,
        stop: vec![],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handles_are_unique_and_correlated() {
    let backend = Arc::new(ScriptedBackend::new(Reply::EchoPrompt).with_delay(Duration::from_millis(5)));
    let engine = adapter(ScriptedFactory::new(backend.clone()));
    engine.initialize().await.unwrap();

    let tasks = (0..200).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let prompt = format!("prompt number {i}");
            let result = engine.submit(&prompt, &sampling()).await.unwrap();
            (prompt, result)
        })
    });
    let results = futures::future::join_all(tasks).await;

    let mut ids = HashSet::new();
    for joined in results {
        let (prompt, result) = joined.unwrap();
        // Each caller gets back the output of its own computation.
        assert_eq!(result.text, prompt);
        assert!(ids.insert(result.request_id));
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(engine.handles_issued(), 200);

    let seen: HashSet<String> = backend.handles.lock().unwrap().iter().cloned().collect();
    assert_eq!(seen, ids);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_submissions_do_not_wait_on_each_other() {
    // Every generation blocks until all of them have been admitted; a
    // serialized adapter would never get past the first one.
    const N: usize = 16;
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let backend = Arc::new(ScriptedBackend::text("ok").with_gate(gate.clone()));
    let engine = adapter(ScriptedFactory::new(backend.clone()));
    engine.initialize().await.unwrap();

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit("p", &sampling()).await })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.call_count() < N {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all submissions should reach the engine concurrently");
    assert_eq!(engine.in_flight(), N);

    gate.add_permits(N);
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().text, "ok");
    }
}

#[tokio::test]
async fn test_no_submission_succeeds_before_initialize() {
    let backend = Arc::new(ScriptedBackend::text("x"));
    let engine = adapter(ScriptedFactory::new(backend.clone()));

    let err = engine.submit("p", &sampling()).await.unwrap_err();
    assert_eq!(err, EngineError::Unavailable(LifecyclePhase::Uninitialized));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_fatal_init_failure() {
    let engine = adapter(ScriptedFactory::failing("weights not found"));

    let err = engine.initialize().await.unwrap_err();
    match err {
        EngineError::FatalInit(msg) => assert!(msg.contains("weights not found")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);
    assert!(matches!(
        engine.submit("p", &sampling()).await,
        Err(EngineError::Unavailable(LifecyclePhase::Stopped))
    ));
}

#[tokio::test]
async fn test_submit_timeout() {
    let backend = Arc::new(ScriptedBackend::text("late").with_delay(Duration::from_millis(500)));
    let engine = Arc::new(
        EngineAdapter::new(test_config().engine, Arc::new(ScriptedFactory::new(backend)))
            .with_submit_timeout(Some(Duration::from_millis(30))),
    );
    engine.initialize().await.unwrap();

    let err = engine.submit("p", &sampling()).await.unwrap_err();
    assert_eq!(err, EngineError::Timeout(Duration::from_millis(30)));
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_draining_rejects_new_work_and_waits_for_in_flight() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let backend = Arc::new(ScriptedBackend::text("finished").with_gate(gate.clone()));
    let engine = adapter(ScriptedFactory::new(backend.clone()));
    engine.initialize().await.unwrap();

    let in_flight = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit("p", &sampling()).await }
    });
    while engine.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let shutdown = tokio::spawn({
        let engine = engine.clone();
        async move { engine.shutdown(Duration::from_secs(5)).await }
    });
    while engine.phase() != LifecyclePhase::Draining {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let err = engine.submit("late", &sampling()).await.unwrap_err();
    assert_eq!(err, EngineError::Unavailable(LifecyclePhase::Draining));
    assert_eq!(backend.call_count(), 1);

    gate.add_permits(1);
    assert_eq!(in_flight.await.unwrap().unwrap().text, "finished");
    shutdown.await.unwrap();
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_drain_timeout_abandons_stuck_work() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let backend = Arc::new(ScriptedBackend::text("never").with_gate(gate));
    let engine = adapter(ScriptedFactory::new(backend));
    engine.initialize().await.unwrap();

    let _stuck = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit("p", &sampling()).await }
    });
    while engine.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    engine.shutdown(Duration::from_millis(50)).await;
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);
    assert_eq!(engine.in_flight(), 1);
}

#[tokio::test]
async fn test_shutdown_during_initialize_stays_stopped() {
    let backend = Arc::new(ScriptedBackend::text("served"));
    let (factory, release) = ScriptedFactory::gated(backend.clone());
    let engine = adapter(factory);

    let init = tokio::spawn({
        let engine = engine.clone();
        async move { engine.initialize().await }
    });
    while engine.phase() != LifecyclePhase::Initializing {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    engine.shutdown(Duration::from_millis(10)).await;
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);

    // Construction finishes after shutdown; the backend must not be served.
    release.send(()).unwrap();
    let err = init.await.unwrap().unwrap_err();
    assert_eq!(err, EngineError::Unavailable(LifecyclePhase::Stopped));
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);

    let err = engine.submit("p", &sampling()).await.unwrap_err();
    assert_eq!(err, EngineError::Unavailable(LifecyclePhase::Stopped));
    assert_eq!(backend.call_count(), 0);
}
