//! Enqueue validation, job management and endpoint selection

use super::test_utils::*;
use mosaic::endpoint::{EndpointConfig, ModelEndpoint};
use mosaic::error::ApiError;
use mosaic::planner::{PlanKind, TargetArea};
use mosaic::queue::{EnqueueOptions, JobStatus, PlanRef, QueueConfig};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_enqueue_plan_assigns_sequence() {
    let (service, _temp_dir) = create_test_service();
    let plan = service
        .plan(&TargetArea::new(PlanKind::Rectangle, c(0, 0), c(3, 1)).unwrap())
        .unwrap();
    let ids = service
        .enqueue_plan(
            &plan,
            EnqueueOptions {
                model_id: Some("local".to_string()),
                ..EnqueueOptions::default()
            },
        )
        .unwrap();

    let jobs: Vec<_> = ids.iter().map(|id| service.status(*id).unwrap()).collect();
    let plan_id = jobs[0].plan.unwrap().plan_id;
    for (seq, job) in jobs.iter().enumerate() {
        assert_eq!(
            job.plan,
            Some(PlanRef {
                plan_id,
                seq: seq as u32
            })
        );
        assert_eq!(job.batch, plan.batches[seq]);
        assert_eq!(job.model_id.as_deref(), Some("local"));
        assert_eq!(job.status, JobStatus::Pending);
    }
}

#[test]
fn test_enqueue_batch_validation() {
    let (service, _temp_dir) = create_test_service();
    service
        .import_generation(c(0, 0), &solid(QUADRANT, [1, 1, 1, 255]))
        .unwrap();
    service
        .import_generation(c(3, 0), &solid(QUADRANT, [1, 1, 1, 255]))
        .unwrap();

    // Not a valid shape
    assert!(matches!(
        service.enqueue_batch(vec![c(5, 5), c(7, 5)], EnqueueOptions::default()),
        Err(ApiError::IllegalBatch(_))
    ));
    // Already generated
    assert!(matches!(
        service.enqueue_batch(vec![c(0, 0)], EnqueueOptions::default()),
        Err(ApiError::IllegalBatch(_))
    ));
    // Pair wedged between generated quadrants
    assert!(matches!(
        service.enqueue_batch(vec![c(1, 0), c(2, 0)], EnqueueOptions::default()),
        Err(ApiError::IllegalBatch(_))
    ));
    // Square touching generated context
    assert!(matches!(
        service.enqueue_batch(
            vec![c(0, 1), c(1, 1), c(0, 2), c(1, 2)],
            EnqueueOptions::default()
        ),
        Err(ApiError::IllegalBatch(_))
    ));

    let id = service
        .enqueue_batch(vec![c(1, 0)], EnqueueOptions::default())
        .unwrap();
    assert_eq!(service.status(id).unwrap().plan, None);

    // Overlaps the queued single
    assert!(matches!(
        service.enqueue_batch(vec![c(1, 0), c(1, 1)], EnqueueOptions::default()),
        Err(ApiError::IllegalBatch(_))
    ));
    assert_eq!(service.stats().unwrap().pending, 1);
}

#[test]
fn test_concurrent_plans_over_one_area_admit_only_one() {
    let (service, _temp_dir) = create_test_service();
    let target = TargetArea::new(PlanKind::Rectangle, c(0, 0), c(5, 5)).unwrap();
    let plans: Vec<_> = (0..8).map(|_| service.plan(&target).unwrap()).collect();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = plans
            .iter()
            .map(|plan| {
                let service = &service;
                scope.spawn(move || service.enqueue_plan(plan, EnqueueOptions::default()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ApiError::IllegalBatch(_))));
    assert_eq!(service.grid_summary().unwrap().reserved, 36);
    assert_eq!(service.stats().unwrap().pending, plans[0].batches.len());
}

#[test]
fn test_plan_area_limit_and_coordinate_range() {
    let mut config = test_config();
    config.planner.max_area = 16;
    let (service, _temp_dir) = create_test_service_with_config(config);

    assert!(service
        .plan(&TargetArea::new(PlanKind::Rectangle, c(0, 0), c(3, 3)).unwrap())
        .is_ok());
    assert!(matches!(
        service.plan(&TargetArea::new(PlanKind::Rectangle, c(0, 0), c(4, 3)).unwrap()),
        Err(ApiError::InvalidArea(_))
    ));

    // Near the i32 limits every entry point answers with an error
    assert!(matches!(
        TargetArea::new(PlanKind::Rectangle, c(i32::MAX - 1, 0), c(i32::MAX, 1)),
        Err(ApiError::InvalidArea(_))
    ));
    assert!(matches!(
        service.enqueue_batch(vec![c(i32::MAX, 0)], EnqueueOptions::default()),
        Err(ApiError::InvalidArea(_))
    ));
    assert!(matches!(
        service.import_generation(c(0, i32::MIN), &solid(QUADRANT, [1, 1, 1, 255])),
        Err(ApiError::InvalidArea(_))
    ));
    assert_eq!(service.stats().unwrap().total(), 0);
}

#[test]
fn test_queue_capacity_is_enforced() {
    let mut config = test_config();
    config.queue = QueueConfig {
        max_queue_size: 3,
        ..config.queue
    };
    let (service, _temp_dir) = create_test_service_with_config(config);

    let plan = service
        .plan(&TargetArea::new(PlanKind::Rectangle, c(0, 0), c(3, 3)).unwrap())
        .unwrap();
    assert!(matches!(
        service.enqueue_plan(&plan, EnqueueOptions::default()),
        Err(ApiError::QueueFull(3))
    ));
    assert_eq!(service.stats().unwrap().total(), 0);

    for x in [0, 2, 4] {
        service
            .enqueue_batch(vec![c(x, 0)], EnqueueOptions::default())
            .unwrap();
    }
    assert!(matches!(
        service.enqueue_batch(vec![c(6, 0)], EnqueueOptions::default()),
        Err(ApiError::QueueFull(3))
    ));
}

#[test]
fn test_unknown_job_operations() {
    let (service, _temp_dir) = create_test_service();
    let missing = mosaic::queue::JobId(404);
    assert!(matches!(
        service.status(missing),
        Err(ApiError::JobNotFound(_))
    ));
    assert!(matches!(
        service.cancel(missing),
        Err(ApiError::JobNotFound(_))
    ));
    assert!(matches!(
        service.retry(missing),
        Err(ApiError::JobNotFound(_))
    ));
}

#[test]
fn test_import_and_export_generation() {
    let (service, _temp_dir) = create_test_service();
    let tile = solid(QUADRANT, [10, 20, 30, 255]);
    service.import_generation(c(4, 4), &tile).unwrap();
    assert_eq!(service.export_generation(c(4, 4)).unwrap(), tile);

    assert!(matches!(
        service.import_generation(c(4, 4), &tile),
        Err(ApiError::Conflict(_))
    ));
    assert!(matches!(
        service.export_generation(c(0, 0)),
        Err(ApiError::InvalidArea(_))
    ));
}

#[tokio::test]
async fn test_list_and_prune_finished_jobs() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (4, 0)));
    for x in [0, 2, 4] {
        service
            .enqueue_batch(vec![c(x, 0)], EnqueueOptions::default())
            .unwrap();
    }
    let queue = create_queue(
        &service,
        vec![PaintEndpoint::new("painter", [5, 5, 5, 255]) as Arc<dyn ModelEndpoint>],
    );
    queue
        .run_until_idle(Some(Duration::from_secs(30)))
        .await
        .unwrap();
    service
        .enqueue_batch(vec![c(1, 0)], EnqueueOptions::default())
        .unwrap();

    assert_eq!(service.list_jobs(None).unwrap().len(), 4);
    assert_eq!(service.list_jobs(Some(JobStatus::Complete)).unwrap().len(), 3);
    assert_eq!(service.list_jobs(Some(JobStatus::Pending)).unwrap().len(), 1);

    assert_eq!(service.prune(Duration::from_secs(3600)).unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.prune(Duration::ZERO).unwrap(), 3);

    let remaining = service.list_jobs(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, JobStatus::Pending);
    // Pruning jobs does not forget generated quadrants
    assert_eq!(service.grid_summary().unwrap().generated, 3);
}

#[test]
fn test_queue_selects_configured_endpoints() {
    let mut config = test_config();
    config.endpoints.insert(
        "alpha".to_string(),
        EndpointConfig {
            url: "http://localhost:9000/generate".to_string(),
            ..EndpointConfig::default()
        },
    );
    config.endpoints.insert(
        "beta".to_string(),
        EndpointConfig {
            url: "http://localhost:9001/generate".to_string(),
            ..EndpointConfig::default()
        },
    );
    config.endpoints.insert(
        "off".to_string(),
        EndpointConfig {
            url: "http://localhost:9002/generate".to_string(),
            enabled: false,
            ..EndpointConfig::default()
        },
    );

    let (service, _temp_dir) = create_test_service_with_config(config.clone());
    assert_eq!(
        service.queue(None).unwrap().endpoint_names(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
    assert_eq!(
        service.queue(Some("beta")).unwrap().endpoint_names(),
        vec!["beta".to_string()]
    );
    assert!(matches!(
        service.queue(Some("off")),
        Err(ApiError::EndpointNotConfigured(_))
    ));
    drop(service);

    config.default_endpoint = Some("alpha".to_string());
    let (service, _temp_dir) = create_test_service_with_config(config);
    assert_eq!(
        service.queue(None).unwrap().endpoint_names(),
        vec!["alpha".to_string()]
    );
}

#[test]
fn test_queue_without_endpoints_is_a_config_error() {
    let (service, _temp_dir) = create_test_service();
    assert!(matches!(
        service.queue(None),
        Err(ApiError::EndpointNotConfigured(_))
    ));
}
