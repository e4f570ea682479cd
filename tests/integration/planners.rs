//! Planning through the service against stored grid state

use super::test_utils::*;
use mosaic::batch::{Batch, BatchShape};
use mosaic::error::ApiError;
use mosaic::planner::{PlanKind, TargetArea};
use mosaic::queue::EnqueueOptions;
use std::collections::BTreeSet;

fn target(kind: PlanKind, tl: (i32, i32), br: (i32, i32)) -> TargetArea {
    TargetArea::new(kind, c(tl.0, tl.1), c(br.0, br.1)).unwrap()
}

fn import_row(service: &mosaic::api::GenerationService, y: i32, x0: i32, x1: i32) {
    for x in x0..=x1 {
        service
            .import_generation(c(x, y), &solid(QUADRANT, [1, 1, 1, 255]))
            .unwrap();
    }
}

#[test]
fn test_strip_plan_along_imported_row() {
    let (service, _temp_dir) = create_test_service();
    import_row(&service, 0, 0, 7);

    let plan = service.plan(&target(PlanKind::Strip, (0, 1), (7, 1))).unwrap();
    assert_eq!(plan.kind, PlanKind::Strip);
    assert_eq!(
        plan.batches[0],
        Batch::with_shape(c(0, 1), BatchShape::Horizontal)
    );
    let covered: BTreeSet<_> = plan.coords().collect();
    assert_eq!(covered.len(), 8);
    plan.verify(&service.planning_grid().unwrap()).unwrap();
}

#[test]
fn test_strip_requires_generated_edge() {
    let (service, _temp_dir) = create_test_service();
    let result = service.plan(&target(PlanKind::Strip, (0, 0), (5, 0)));
    assert!(matches!(result, Err(ApiError::NoGenerationEdge(_))));
}

#[test]
fn test_rectangle_plan_skips_generated_cells() {
    let (service, _temp_dir) = create_test_service();
    import_row(&service, 1, 1, 2);

    let plan = service
        .plan(&target(PlanKind::Rectangle, (0, 0), (3, 3)))
        .unwrap();
    let covered: BTreeSet<_> = plan.coords().collect();
    assert_eq!(covered.len(), 14);
    assert!(!covered.contains(&c(1, 1)));
    assert!(!covered.contains(&c(2, 1)));
    plan.verify(&service.store().load_grid().unwrap()).unwrap();
}

#[test]
fn test_outward_grows_from_seed() {
    let (service, _temp_dir) = create_test_service();
    service
        .import_generation(c(2, 2), &solid(QUADRANT, [1, 1, 1, 255]))
        .unwrap();

    let plan = service
        .plan(&target(PlanKind::Outward, (0, 0), (4, 4)))
        .unwrap();
    assert_eq!(plan.kind, PlanKind::Outward);
    assert_eq!(plan.coords().count(), 24);
    plan.verify(&service.store().load_grid().unwrap()).unwrap();

    let (empty, _temp_dir) = create_test_service();
    assert!(matches!(
        empty.plan(&target(PlanKind::Outward, (0, 0), (4, 4))),
        Err(ApiError::NoGenerationEdge(_))
    ));
}

#[test]
fn test_planning_treats_queued_cells_as_generated() {
    let (service, _temp_dir) = create_test_service();
    let first = service
        .plan(&target(PlanKind::Rectangle, (0, 0), (3, 3)))
        .unwrap();
    service
        .enqueue_plan(&first, EnqueueOptions::default())
        .unwrap();

    let second = service
        .plan(&target(PlanKind::Rectangle, (0, 0), (5, 3)))
        .unwrap();
    let covered: BTreeSet<_> = second.coords().collect();
    assert_eq!(covered.len(), 8);
    assert!(covered.iter().all(|coord| coord.x >= 4));

    // Any square in the remaining columns would touch queued cells
    assert!(second
        .batches
        .iter()
        .all(|b| b.shape() != BatchShape::Square));
    service
        .enqueue_plan(&second, EnqueueOptions::default())
        .unwrap();
    assert_eq!(service.grid_summary().unwrap().reserved, 24);
}

#[test]
fn test_stale_plan_is_rejected() {
    let (service, _temp_dir) = create_test_service();
    let plan = service
        .plan(&target(PlanKind::Rectangle, (0, 0), (3, 3)))
        .unwrap();
    service
        .enqueue_batch(vec![c(0, 0)], EnqueueOptions::default())
        .unwrap();

    let result = service.enqueue_plan(&plan, EnqueueOptions::default());
    assert!(matches!(result, Err(ApiError::IllegalBatch(_))));
    assert_eq!(service.stats().unwrap().pending, 1);
}

#[test]
fn test_plan_of_generated_area_is_empty() {
    let (service, _temp_dir) = create_test_service();
    import_row(&service, 0, 0, 2);
    let plan = service
        .plan(&target(PlanKind::Rectangle, (0, 0), (2, 0)))
        .unwrap();
    assert!(plan.is_empty());
    assert!(service
        .enqueue_plan(&plan, EnqueueOptions::default())
        .unwrap()
        .is_empty());
}
