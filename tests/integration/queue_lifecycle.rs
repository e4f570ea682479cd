//! Integration tests for the orchestration queue
//!
//! Tests cover:
//! - Draining an enqueued plan through a mock endpoint
//! - Template contents and prompt resolution seen by the endpoint
//! - Model affinity across several endpoints
//! - Failure, timeout and malformed output handling
//! - Cancellation of pending and in-flight jobs

use super::test_utils::*;
use mosaic::endpoint::{EndpointConfig, ModelEndpoint, DEFAULT_PROMPT};
use mosaic::error::ApiError;
use mosaic::grid::Coord;
use mosaic::planner::{PlanKind, TargetArea};
use mosaic::queue::{EnqueueOptions, GenerationQueue, JobStatus};
use std::sync::Arc;
use std::time::Duration;

const GREEN: [u8; 4] = [0, 200, 0, 255];
const TIMEOUT: Option<Duration> = Some(Duration::from_secs(30));

#[tokio::test]
async fn test_plan_drains_to_completion() {
    let (service, _temp_dir) = create_test_service();
    let area = rect((0, 0), (3, 3));
    seed_references(&service, area);

    let plan = service
        .plan(&TargetArea::new(PlanKind::Rectangle, area.tl, area.br).unwrap())
        .unwrap();
    let ids = service
        .enqueue_plan(&plan, EnqueueOptions::default())
        .unwrap();
    assert_eq!(ids.len(), plan.batches.len());
    assert_eq!(service.grid_summary().unwrap().reserved, 16);

    let painter = PaintEndpoint::new("painter", GREEN);
    let queue = create_queue(&service, vec![painter.clone() as Arc<dyn ModelEndpoint>]);
    let stats = queue.run_until_idle(TIMEOUT).await.unwrap();

    assert_eq!(stats.complete, ids.len());
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.error, 0);
    assert_eq!(painter.calls(), ids.len());
    assert!(!queue.is_running());

    let summary = service.grid_summary().unwrap();
    assert_eq!(summary.generated, 16);
    assert_eq!(summary.reserved, 0);
    assert_eq!(summary.bounds, Some(area));

    for coord in area.points() {
        let tile = service.export_generation(coord).unwrap();
        assert_eq!(tile, solid(QUADRANT, GREEN));
    }

    let first = service.status(ids[0]).unwrap();
    assert_eq!(first.status, JobStatus::Complete);
    assert_eq!(first.endpoint.as_deref(), Some("painter"));
    assert!(first.started_at.is_some());
    assert!(first.completed_at.is_some());
}

#[tokio::test]
async fn test_endpoint_sees_outlined_template_and_prompts() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (1, 1)));

    let first = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();
    let second = service
        .enqueue_batch(
            vec![c(1, 1)],
            EnqueueOptions {
                model_id: None,
                prompt: Some("paint a harbor".to_string()),
                negative_prompt: Some("text".to_string()),
            },
        )
        .unwrap();

    let echo = EchoEndpoint::new("echo");
    let queue = create_queue(&service, vec![echo.clone() as Arc<dyn ModelEndpoint>]);
    queue.run_until_idle(TIMEOUT).await.unwrap();

    assert_eq!(service.status(first).unwrap().status, JobStatus::Complete);
    assert_eq!(service.status(second).unwrap().status, JobStatus::Complete);

    let requests = echo.requests.lock();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].prompt, DEFAULT_PROMPT);
    assert_eq!(requests[0].negative_prompt, None);
    assert_eq!(requests[0].num_inference_steps, 28);
    assert_eq!(requests[1].prompt, "paint a harbor");
    assert_eq!(requests[1].negative_prompt.as_deref(), Some("text"));
    assert_eq!(requests[0].template.dimensions(), (QUADRANT * 2, QUADRANT * 2));

    // Echoed output keeps the reference interior and the painted outline
    let tile = service.export_generation(c(0, 0)).unwrap();
    assert_eq!(tile.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(tile.get_pixel(QUADRANT / 2, QUADRANT / 2).0, REFERENCE_COLOR);
}

#[tokio::test]
async fn test_jobs_run_only_on_their_model() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (9, 0)));

    let for_b = |coord: Coord| {
        service
            .enqueue_batch(
                vec![coord],
                EnqueueOptions {
                    model_id: Some("b".to_string()),
                    ..EnqueueOptions::default()
                },
            )
            .unwrap()
    };
    let b_jobs = vec![for_b(c(0, 0)), for_b(c(4, 0))];
    let any_job = service
        .enqueue_batch(vec![c(8, 0)], EnqueueOptions::default())
        .unwrap();
    let orphan = service
        .enqueue_batch(
            vec![c(2, 0)],
            EnqueueOptions {
                model_id: Some("unknown".to_string()),
                ..EnqueueOptions::default()
            },
        )
        .unwrap();

    let a = PaintEndpoint::new("a", GREEN);
    let b = PaintEndpoint::new("b", [0, 0, 200, 255]);
    let queue = create_queue(
        &service,
        vec![
            a.clone() as Arc<dyn ModelEndpoint>,
            b.clone() as Arc<dyn ModelEndpoint>,
        ],
    );

    // The orphaned job never runs, yet the queue still reaches idle
    let stats = queue.run_until_idle(TIMEOUT).await.unwrap();
    assert_eq!(stats.complete, 3);
    assert_eq!(stats.pending, 1);

    for id in b_jobs {
        let job = service.status(id).unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.endpoint.as_deref(), Some("b"));
    }
    assert_eq!(service.status(any_job).unwrap().status, JobStatus::Complete);
    assert_eq!(service.status(orphan).unwrap().status, JobStatus::Pending);
    assert!(b.calls() >= 2);
    assert_eq!(a.calls() + b.calls(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_endpoints_share_independent_work() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (12, 0)));
    for x in [0, 4, 8, 12] {
        service
            .enqueue_batch(vec![c(x, 0)], EnqueueOptions::default())
            .unwrap();
    }

    let delay = Duration::from_millis(200);
    let a = PaintEndpoint::with_delay("a", GREEN, delay);
    let b = PaintEndpoint::with_delay("b", GREEN, delay);
    let queue = create_queue(
        &service,
        vec![
            a.clone() as Arc<dyn ModelEndpoint>,
            b.clone() as Arc<dyn ModelEndpoint>,
        ],
    );
    let stats = queue.run_until_idle(TIMEOUT).await.unwrap();

    assert_eq!(stats.complete, 4);
    assert_eq!(a.calls() + b.calls(), 4);
    assert!(a.calls() > 0);
    assert!(b.calls() > 0);
}

#[tokio::test]
async fn test_failure_blocks_plan_until_retry() {
    let (service, _temp_dir) = create_test_service();
    let area = rect((0, 0), (3, 3));
    seed_references(&service, area);

    let plan = service
        .plan(&TargetArea::new(PlanKind::Rectangle, area.tl, area.br).unwrap())
        .unwrap();
    let ids = service
        .enqueue_plan(&plan, EnqueueOptions::default())
        .unwrap();

    let queue = create_queue(&service, vec![FailingEndpoint::new("broken") as Arc<dyn ModelEndpoint>]);
    let stats = queue.run_until_idle(TIMEOUT).await.unwrap();
    assert_eq!(stats.error, 1);
    assert_eq!(stats.pending, ids.len() - 1);

    let failed = service.status(ids[0]).unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("model crashed"));
    assert_eq!(service.grid_summary().unwrap().generated, 0);

    let retried = service.retry(ids[0]).unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.error_message.is_none());

    let queue = create_queue(&service, vec![PaintEndpoint::new("painter", GREEN) as Arc<dyn ModelEndpoint>]);
    let stats = queue.run_until_idle(TIMEOUT).await.unwrap();
    assert_eq!(stats.complete, ids.len());
    assert_eq!(service.grid_summary().unwrap().generated, 16);
}

#[tokio::test]
async fn test_retry_rejects_unfailed_job() {
    let (service, _temp_dir) = create_test_service();
    let id = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();
    let result = service.retry(id);
    assert!(matches!(
        result,
        Err(ApiError::InvalidJobState {
            status: JobStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn test_wrong_size_output_is_malformed() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (0, 0)));
    let id = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();

    let queue = create_queue(&service, vec![Arc::new(WrongSizeEndpoint) as Arc<dyn ModelEndpoint>]);
    queue.run_until_idle(TIMEOUT).await.unwrap();

    let job = service.status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Malformed output"));
    assert!(service.store().generation_png(c(0, 0)).unwrap().is_none());
}

#[tokio::test]
async fn test_missing_reference_fails_job() {
    let (service, _temp_dir) = create_test_service();
    let id = service
        .enqueue_batch(vec![c(3, 3)], EnqueueOptions::default())
        .unwrap();

    let painter = PaintEndpoint::new("painter", GREEN);
    let queue = create_queue(&service, vec![painter.clone() as Arc<dyn ModelEndpoint>]);
    queue.run_until_idle(TIMEOUT).await.unwrap();

    let job = service.status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .contains("Missing reference"));
    assert_eq!(painter.calls(), 0);
}

#[tokio::test]
async fn test_batch_made_illegal_after_enqueue_fails() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (1, 0)));
    let id = service
        .enqueue_batch(vec![c(0, 0), c(1, 0)], EnqueueOptions::default())
        .unwrap();

    // Generated out of band while the job waits
    service
        .import_generation(c(1, 0), &solid(QUADRANT, GREEN))
        .unwrap();

    let painter = PaintEndpoint::new("painter", GREEN);
    let queue = create_queue(&service, vec![painter.clone() as Arc<dyn ModelEndpoint>]);
    queue.run_until_idle(TIMEOUT).await.unwrap();

    let job = service.status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Illegal batch"));
    assert_eq!(painter.calls(), 0);
    assert!(!service.store().load_grid().unwrap().is_generated(c(0, 0)));
}

#[tokio::test]
async fn test_invocation_timeout() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (0, 0)));
    let id = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();

    let queue = GenerationQueue::new(
        Arc::clone(service.store()),
        template_config(),
        service.config().queue.clone(),
    );
    queue
        .register_endpoint(
            PaintEndpoint::with_delay("slow", GREEN, Duration::from_secs(5)),
            EndpointConfig {
                timeout_secs: Some(1),
                ..EndpointConfig::default()
            },
        )
        .unwrap();
    queue.run_until_idle(TIMEOUT).await.unwrap();

    let job = service.status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.as_deref().unwrap().contains("timed out"));
    assert_eq!(service.grid_summary().unwrap().generated, 0);
}

#[tokio::test]
async fn test_cancel_pending_and_in_flight() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (4, 0)));
    let running = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();
    let waiting = service
        .enqueue_batch(vec![c(4, 0)], EnqueueOptions::default())
        .unwrap();

    let gated = GatedEndpoint::new();
    let queue = create_queue(&service, vec![gated.clone() as Arc<dyn ModelEndpoint>]);
    queue.start().unwrap();
    queue.notify();
    gated.entered.notified().await;

    assert_eq!(service.status(running).unwrap().status, JobStatus::Processing);
    assert!(service.cancel(running).unwrap());
    assert!(service.status(running).unwrap().cancel_requested);

    assert!(service.cancel(waiting).unwrap());
    assert!(matches!(
        service.status(waiting),
        Err(ApiError::JobNotFound(_))
    ));

    gated.release.notify_one();
    let stats = queue.wait_for_idle(TIMEOUT).await.unwrap();
    queue.stop().await.unwrap();

    assert_eq!(stats.processing, 0);
    let job = service.status(running).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_message.as_deref(), Some("cancelled"));
    assert!(!service.store().load_grid().unwrap().is_generated(c(0, 0)));

    // Finished jobs cannot be cancelled again
    assert!(!service.cancel(running).unwrap());
}

#[tokio::test]
async fn test_start_requires_endpoints() {
    let (service, _temp_dir) = create_test_service();
    let queue = create_queue(&service, Vec::new());
    assert!(matches!(
        queue.start(),
        Err(ApiError::EndpointNotConfigured(_))
    ));
}

#[tokio::test]
async fn test_duplicate_endpoint_rejected() {
    let (service, _temp_dir) = create_test_service();
    let queue = create_queue(&service, vec![PaintEndpoint::new("a", GREEN) as Arc<dyn ModelEndpoint>]);
    let result = queue.register_endpoint(PaintEndpoint::new("a", GREEN), EndpointConfig::default());
    assert!(matches!(result, Err(ApiError::ConfigError(_))));
    assert_eq!(queue.endpoint_names(), vec!["a".to_string()]);
}
