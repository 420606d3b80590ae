mod helpers;

use std::sync::atomic::Ordering;

use helpers::{fake_service, record, test_db, write_corrupt, write_image, BrokenText, FakeImage};
use tempfile::TempDir;
use vitrine::catalog::indexer::CatalogIndexer;
use vitrine::catalog::store::{count_products, get_product};
use vitrine::db::migrations::{get_meta, LAST_INDEXED_KEY};
use vitrine::embedding::locator::{ImageLocator, BATCH_PROBE_ORDER};
use vitrine::embedding::normalize::l2_norm;
use vitrine::embedding::service::EmbeddingService;
use vitrine::error::EmbedError;

#[test]
fn missing_and_corrupt_images_leave_image_vector_empty() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "1.png", 10);
    write_corrupt(images.path(), "3.jpg");

    let (service, text_calls, image_calls) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut conn = test_db();
    let records = vec![record(1, "Shirt"), record(2, "Belt"), record(3, "Cap")];
    let outcome = indexer.index_batch(&mut conn, &records).unwrap();

    assert_eq!(outcome.rows, 3);
    assert_eq!(outcome.with_image, 1);
    assert_eq!(text_calls.load(Ordering::SeqCst), 1, "one text call per batch");
    assert_eq!(image_calls.load(Ordering::SeqCst), 1, "one image call per batch");

    for id in 1..=3 {
        let p = get_product(&conn, id).unwrap().unwrap();
        let text = p.text_embedding.expect("every row gets a text vector");
        assert!((l2_norm(&text) - 1.0).abs() < 1e-5);
    }
    let with_image = get_product(&conn, 1).unwrap().unwrap();
    assert!((l2_norm(&with_image.image_embedding.unwrap()) - 1.0).abs() < 1e-5);
    assert!(get_product(&conn, 2).unwrap().unwrap().image_embedding.is_none());
    assert!(get_product(&conn, 3).unwrap().unwrap().image_embedding.is_none());
}

#[test]
fn batch_with_no_images_skips_image_encoder() {
    let images = TempDir::new().unwrap();
    let (service, _, image_calls) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut conn = test_db();
    let outcome = indexer
        .index_batch(&mut conn, &[record(1, "Shirt"), record(2, "Belt")])
        .unwrap();

    assert_eq!(outcome.with_image, 0);
    assert_eq!(image_calls.load(Ordering::SeqCst), 0);
    assert_eq!(count_products(&conn).unwrap(), 2);
}

#[test]
fn named_image_file_wins_over_probe() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "7.jpg", 10);
    write_image(images.path(), "alt-7.png", 99);

    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut r = record(7, "Scarf");
    r.image_file = Some("alt-7.png".into());
    let products = indexer.embed_batch(&[r]).unwrap();

    let image = products[0].image_embedding.as_ref().unwrap();
    let peak = image
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(peak, 99);
}

#[test]
fn reindexing_same_catalog_is_idempotent() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "1.png", 10);

    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 2);

    let mut conn = test_db();
    let records = vec![record(1, "Shirt"), record(2, "Belt"), record(3, "Cap")];

    indexer.run(&mut conn, &records, |_| {}).unwrap();
    let first: Vec<_> = (1..=3).map(|id| get_product(&conn, id).unwrap()).collect();

    indexer.run(&mut conn, &records, |_| {}).unwrap();
    let second: Vec<_> = (1..=3).map(|id| get_product(&conn, id).unwrap()).collect();

    assert_eq!(first, second);
    assert_eq!(count_products(&conn).unwrap(), 3);
}

#[test]
fn run_reports_batches_and_builds_indexes() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "1.png", 10);
    write_image(images.path(), "4.jpeg", 20);

    let (service, text_calls, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 2);

    let mut conn = test_db();
    let records: Vec<_> = (1..=5).map(|id| record(id, &format!("Item {id}"))).collect();

    let mut seen = Vec::new();
    let report = indexer
        .run(&mut conn, &records, |batch| seen.push(batch.rows))
        .unwrap();

    assert_eq!(seen, vec![2, 2, 1]);
    assert_eq!(text_calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.rows, 5);
    assert_eq!(report.with_image, 2);
    assert_eq!(report.without_image, 3);
    assert_eq!(report.text_index_rows, 5);
    assert_eq!(report.image_index_rows, 2);
    assert!(get_meta(&conn, LAST_INDEXED_KEY).unwrap().is_some());
}

#[test]
fn encoder_failure_aborts_batch_without_writes() {
    let images = TempDir::new().unwrap();
    let service = EmbeddingService::new(Box::new(BrokenText), Box::new(FakeImage::new()));
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut conn = test_db();
    let err = indexer
        .index_batch(&mut conn, &[record(1, "Shirt")])
        .unwrap_err();
    assert!(matches!(err, EmbedError::Inference(_)));
    assert_eq!(count_products(&conn).unwrap(), 0);
}

#[test]
fn row_failure_rolls_back_whole_batch() {
    let images = TempDir::new().unwrap();
    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut conn = test_db();
    conn.execute_batch(
        "CREATE TRIGGER reject_two BEFORE INSERT ON products WHEN NEW.id = 2
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();

    let err = indexer
        .index_batch(&mut conn, &[record(1, "Shirt"), record(2, "Belt"), record(3, "Cap")])
        .unwrap_err();
    assert!(matches!(err, EmbedError::Persistence(_)));
    assert_eq!(count_products(&conn).unwrap(), 0, "row 1 must be rolled back");
}

#[test]
fn blank_text_is_embedded_as_zero_vector() {
    let images = TempDir::new().unwrap();
    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 100);

    let mut r = record(5, "Nameless");
    r.text_for_embedding = None;
    let products = indexer.embed_batch(&[r]).unwrap();

    let text = products[0].text_embedding.as_ref().unwrap();
    assert_eq!(text.len(), 384);
    assert!(text.iter().all(|x| *x == 0.0));
}
