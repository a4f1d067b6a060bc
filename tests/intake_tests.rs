mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common::{
    harness, request, wait_for_status, FailingTransformer, GatedTransformer, PanickingTransformer,
};
use transform_intake::config::settings::AppConfig;
use transform_intake::error::IntakeError;
use transform_intake::modules::jobs::model::JobStatus;
use transform_intake::modules::jobs::registry::{InMemoryJobRegistry, JobRegistry};
use transform_intake::modules::transform::service::{IntakeService, TransformationService};
use transform_intake::runtime::Runtime;
use transform_intake::workers::dispatch::ChannelDispatcher;
use transform_intake::workers::pool::{PassthroughTransformer, WorkerPool};

#[tokio::test]
async fn test_accept_resubmit_and_lifecycle() {
    let h = harness();

    let first = h.intake.transform(request("obj://A", Some("K1"))).await.unwrap();
    assert_eq!(first.status, JobStatus::Pending);
    assert!(!first.duplicate);
    assert_eq!(first.location, format!("/api/v1/jobs/{}", first.job_id));

    let again = h.intake.transform(request("obj://A", Some("K1"))).await.unwrap();
    assert_eq!(again.job_id, first.job_id);
    assert_eq!(again.status, JobStatus::Pending);
    assert!(again.duplicate);
    assert_eq!(h.dispatcher.dispatched().len(), 1);

    let id = first.job_id;
    h.intake.report(id, JobStatus::Running, None).await.unwrap();
    assert_eq!(h.intake.job(id).await.unwrap().status, JobStatus::Running);

    h.intake
        .report(id, JobStatus::Completed, Some("R".to_string()))
        .await
        .unwrap();
    let job = h.intake.job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.as_deref(), Some("R"));

    let err = h.intake.report(id, JobStatus::Running, None).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_invalid_request_creates_no_job() {
    let h = harness();

    let err = h.intake.transform(request("", Some("K1"))).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidRequest(_)));
    assert!(h.registry.is_empty());
    assert!(h.dispatcher.dispatched().is_empty());

    let guessed = Uuid::new_v4();
    assert_eq!(h.intake.job(guessed).await, Err(IntakeError::NotFound(guessed)));
}

#[tokio::test]
async fn test_dispatch_carries_callback_and_outputs() {
    let h = harness();
    let mut req = request("obj://bucket/scene.ntf", None);
    req.outputs = Some(vec!["thumbnail".to_string(), "discovery_metadata".to_string()]);

    let res = h.intake.transform(req).await.unwrap();
    let tasks = h.dispatcher.dispatched();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].job_id, res.job_id);
    assert_eq!(tasks[0].input, "obj://bucket/scene.ntf");
    assert_eq!(tasks[0].outputs.len(), 2);
    assert_eq!(
        tasks[0].callback.as_deref(),
        Some(format!("http://intake.test/api/v1/jobs/{}/status", res.job_id).as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_same_key_dispatches_once() {
    let h = harness();
    let mut handles = Vec::new();
    for _ in 0..50 {
        let intake = h.intake.clone();
        handles.push(tokio::spawn(async move {
            intake.transform(request("obj://A", Some("burst"))).await.unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().job_id);
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.dispatcher.dispatched().len(), 1);
}

#[tokio::test]
async fn test_dispatch_failure_fails_job_and_frees_key() {
    let h = harness();
    h.dispatcher.set_failing(true);

    let err = h.intake.transform(request("obj://A", Some("K1"))).await.unwrap_err();
    assert!(matches!(err, IntakeError::DispatchUnavailable(_)));
    assert_eq!(h.registry.len(), 1);

    h.dispatcher.set_failing(false);
    let retry = h.intake.transform(request("obj://A", Some("K1"))).await.unwrap();
    assert!(!retry.duplicate);
    assert_eq!(h.registry.len(), 2);
    assert_eq!(h.dispatcher.dispatched().len(), 1);
}

#[tokio::test]
async fn test_transform_does_not_wait_for_workers() {
    let registry = Arc::new(InMemoryJobRegistry::new());
    let (dispatcher, rx) = ChannelDispatcher::bounded(16);
    let transformer = Arc::new(GatedTransformer::default());
    let pool = WorkerPool::start(2, rx, registry.clone(), transformer.clone());
    let intake = IntakeService::new(
        registry.clone(),
        Arc::new(dispatcher.clone()),
        url::Url::parse("http://intake.test/").unwrap(),
    );

    let res = tokio::time::timeout(
        Duration::from_secs(1),
        intake.transform(request("obj://slow", None)),
    )
    .await
    .expect("transform blocked on the worker")
    .unwrap();
    assert_eq!(res.status, JobStatus::Pending);

    let timeout = Duration::from_secs(2);
    wait_for_status(registry.as_ref(), res.job_id, JobStatus::Running, timeout).await;
    transformer.gate.notify_one();
    let job = wait_for_status(registry.as_ref(), res.job_id, JobStatus::Completed, timeout).await;
    assert_eq!(job.result.as_deref(), Some("obj://slow#metadata"));

    dispatcher.close();
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_worker_pool_reports_outcomes() {
    let registry = Arc::new(InMemoryJobRegistry::new());

    let (ok_dispatcher, ok_rx) = ChannelDispatcher::bounded(4);
    let ok_pool = WorkerPool::start(
        1,
        ok_rx,
        registry.clone(),
        Arc::new(PassthroughTransformer),
    );
    let ok_intake = IntakeService::new(
        registry.clone(),
        Arc::new(ok_dispatcher.clone()),
        url::Url::parse("http://intake.test/").unwrap(),
    );

    let (bad_dispatcher, bad_rx) = ChannelDispatcher::bounded(4);
    let bad_pool = WorkerPool::start(1, bad_rx, registry.clone(), Arc::new(FailingTransformer));
    let bad_intake = IntakeService::new(
        registry.clone(),
        Arc::new(bad_dispatcher.clone()),
        url::Url::parse("http://intake.test/").unwrap(),
    );

    let ok = ok_intake.transform(request("obj://good", None)).await.unwrap();
    let bad = bad_intake.transform(request("obj://bad", None)).await.unwrap();

    let timeout = Duration::from_secs(2);
    let done = wait_for_status(registry.as_ref(), ok.job_id, JobStatus::Completed, timeout).await;
    assert_eq!(done.result.as_deref(), Some("obj://good"));

    let failed = wait_for_status(registry.as_ref(), bad.job_id, JobStatus::Failed, timeout).await;
    assert_eq!(failed.error.as_deref(), Some("unreadable product"));
    assert!(failed.result.is_none());

    ok_dispatcher.close();
    bad_dispatcher.close();
    assert_eq!(ok_pool.shutdown(Duration::from_secs(1)).await, 0);
    assert_eq!(bad_pool.shutdown(Duration::from_secs(1)).await, 0);
}

#[tokio::test]
async fn test_worker_panic_is_reported_at_shutdown() {
    let registry = Arc::new(InMemoryJobRegistry::new());
    let (dispatcher, rx) = ChannelDispatcher::bounded(4);
    let pool = WorkerPool::start(2, rx, registry.clone(), Arc::new(PanickingTransformer));
    let intake = IntakeService::new(
        registry.clone(),
        Arc::new(dispatcher.clone()),
        url::Url::parse("http://intake.test/").unwrap(),
    );

    let res = intake.transform(request("obj://corrupt", None)).await.unwrap();
    let timeout = Duration::from_secs(2);
    wait_for_status(registry.as_ref(), res.job_id, JobStatus::Running, timeout).await;

    dispatcher.close();
    assert_eq!(pool.shutdown(timeout).await, 1);
}

#[tokio::test]
async fn test_runtime_shutdown_fails_in_flight_jobs() {
    let config = AppConfig {
        local_workers: 1,
        shutdown_drain: Duration::from_millis(100),
        ..AppConfig::default()
    };
    let runtime = Runtime::start_with(config, Arc::new(GatedTransformer::default()))
        .await
        .unwrap();
    let intake = runtime.state.intake.clone();
    let registry = intake.registry();

    let running = intake.transform(request("obj://one", None)).await.unwrap();
    let queued = intake.transform(request("obj://two", None)).await.unwrap();
    let timeout = Duration::from_secs(2);
    wait_for_status(registry.as_ref(), running.job_id, JobStatus::Running, timeout).await;

    runtime.shutdown().await.unwrap();

    for id in [running.job_id, queued.job_id] {
        let job = registry.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("shut down"));
    }

    // late worker callback after teardown is rejected, not applied
    let late = intake.report(running.job_id, JobStatus::Completed, Some("R".into())).await;
    assert!(matches!(late, Err(IntakeError::InvalidTransition { .. })));
}
