//! Template rendering over stored pixels

use super::test_utils::*;
use mosaic::batch::{Batch, BatchShape};
use mosaic::error::ApiError;
use mosaic::store::StorePixels;
use mosaic::template::{build_template, extract_outputs, Placement};

const CONTEXT: [u8; 4] = [200, 200, 0, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

#[test]
fn test_template_uses_generations_for_context() {
    let (service, _temp_dir) = create_test_service();
    seed_references(&service, rect((0, 0), (1, 1)));
    service
        .import_generation(c(0, 0), &solid(QUADRANT, CONTEXT))
        .unwrap();
    service
        .import_generation(c(1, 0), &solid(QUADRANT, CONTEXT))
        .unwrap();

    let grid = service.store().load_grid().unwrap();
    let batch = Batch::with_shape(c(0, 1), BatchShape::Horizontal);
    let template = build_template(
        &batch,
        &grid,
        &StorePixels(service.store().as_ref()),
        &template_config(),
    )
    .unwrap();

    assert_eq!(template.placement, Placement { origin: c(0, 0) });
    let image = &template.image;
    let q = QUADRANT;

    // Top row is generated context
    assert_eq!(image.get_pixel(1, 1).0, CONTEXT);
    assert_eq!(image.get_pixel(q + 3, q - 1).0, CONTEXT);
    // Bottom row is reference pixels outlined in red
    assert_eq!(image.get_pixel(0, q).0, RED);
    assert_eq!(image.get_pixel(2 * q - 1, 2 * q - 1).0, RED);
    assert_eq!(image.get_pixel(q, q + q / 2).0, REFERENCE_COLOR);

    let outputs = extract_outputs(image, &batch, &template.placement, &template_config()).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[&c(0, 1)].dimensions(), (q, q));
}

#[test]
fn test_reference_grid_import_splits_tiles() {
    let (service, _temp_dir) = create_test_service();
    let mut render = image::RgbaImage::new(QUADRANT * 3, QUADRANT * 2 + 3);
    for (x, y, pixel) in render.enumerate_pixels_mut() {
        *pixel = image::Rgba([(x / QUADRANT) as u8, (y / QUADRANT) as u8, 0, 255]);
    }

    let imported = service.import_reference_grid(c(10, 20), &render).unwrap();
    assert_eq!(imported.len(), 6);

    let png = service.store().reference_png(c(12, 21)).unwrap().unwrap();
    let tile = mosaic::template::decode_image(&png).unwrap();
    assert_eq!(tile.dimensions(), (QUADRANT, QUADRANT));
    assert_eq!(tile.get_pixel(0, 0).0, [2, 1, 0, 255]);
    assert!(service.store().reference_png(c(10, 22)).unwrap().is_none());
}

#[test]
fn test_batch_without_reference_is_rejected() {
    let (service, _temp_dir) = create_test_service();
    let grid = service.store().load_grid().unwrap();
    let result = build_template(
        &Batch::single(c(5, 5)),
        &grid,
        &StorePixels(service.store().as_ref()),
        &template_config(),
    );
    assert!(matches!(result, Err(ApiError::MissingReference(coord)) if coord == c(5, 5)));
}
