//! Recovery of jobs interrupted by a process exit

use super::test_utils::*;
use mosaic::api::GenerationService;
use mosaic::endpoint::ModelEndpoint;
use mosaic::queue::{EnqueueOptions, JobStatus};
use mosaic::store::{GenerationStore, SledGenerationStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Enqueue two jobs and leave both processing, one with a cancel request,
/// as if the process died mid-invocation.
fn interrupted_workspace() -> (TempDir, Vec<mosaic::queue::JobId>) {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config();
    let store_path = config.storage.resolve_store_path(temp_dir.path());
    let store = Arc::new(SledGenerationStore::new(&store_path).unwrap());
    let service = GenerationService::with_store(store.clone(), config);

    seed_references(&service, rect((0, 0), (4, 0)));
    let resumed = service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();
    let cancelled = service
        .enqueue_batch(vec![c(4, 0)], EnqueueOptions::default())
        .unwrap();

    assert_eq!(store.claim_next("painter").unwrap().unwrap().id, resumed);
    assert_eq!(store.claim_next("painter").unwrap().unwrap().id, cancelled);
    assert!(service.cancel(cancelled).unwrap());
    store.flush().unwrap();

    (temp_dir, vec![resumed, cancelled])
}

#[tokio::test]
async fn test_processing_jobs_resume_after_restart() {
    let (temp_dir, ids) = interrupted_workspace();
    let (resumed, cancelled) = (ids[0], ids[1]);

    let service = GenerationService::open(temp_dir.path(), test_config()).unwrap();
    assert_eq!(service.status(resumed).unwrap().status, JobStatus::Processing);
    assert_eq!(service.stats().unwrap().processing, 2);

    let painter = PaintEndpoint::new("painter", [9, 9, 9, 255]);
    let queue = create_queue(&service, vec![painter.clone() as Arc<dyn ModelEndpoint>]);
    let stats = queue
        .run_until_idle(Some(Duration::from_secs(30)))
        .await
        .unwrap();

    assert_eq!(stats.complete, 1);
    assert_eq!(stats.error, 1);
    assert_eq!(painter.calls(), 1);

    let job = service.status(resumed).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(service.store().load_grid().unwrap().is_generated(c(0, 0)));

    let job = service.status(cancelled).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_message.as_deref(), Some("cancelled"));
    assert!(!service.store().load_grid().unwrap().is_generated(c(4, 0)));
}

#[test]
fn test_reset_processing_reports_resumed_count() {
    let (temp_dir, ids) = interrupted_workspace();
    let service = GenerationService::open(temp_dir.path(), test_config()).unwrap();

    assert_eq!(service.store().reset_processing().unwrap(), 1);
    let job = service.status(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.started_at.is_none());
    assert!(job.endpoint.is_none());

    // Nothing left to reset on a second pass
    assert_eq!(service.store().reset_processing().unwrap(), 0);
}
