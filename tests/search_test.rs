mod helpers;

use helpers::{fake_service, png_bytes, record, test_db, write_image};
use tempfile::TempDir;
use vitrine::catalog::indexer::CatalogIndexer;
use vitrine::catalog::search::{search_by_image_embedding, search_by_text_embedding};
use vitrine::embedding::locator::{ImageLocator, BATCH_PROBE_ORDER};

#[test]
fn indexed_catalog_answers_text_and_image_queries() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "1.png", 10);
    write_image(images.path(), "2.png", 200);

    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 10);

    let mut conn = test_db();
    let records = vec![record(1, "Navy Shirt"), record(2, "Red Dress"), record(3, "Belt")];
    indexer.run(&mut conn, &records, |_| {}).unwrap();

    // same text as the stored row -> same vector -> similarity 1
    let query = service.embed_text(records[1].embedding_text()).unwrap();
    let hits = search_by_text_embedding(&conn, &query, 3).unwrap();
    assert_eq!(hits[0].id, 2);
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].master_category, "Apparel");

    let query = service.embed_image(&png_bytes(200)).unwrap();
    let hits = search_by_image_embedding(&conn, &query, 10).unwrap();
    assert_eq!(hits.len(), 2, "product 3 has no image vector");
    assert_eq!(hits[0].id, 2);
    assert!(hits[0].similarity > hits[1].similarity);
}

#[test]
fn limit_caps_result_count() {
    let images = TempDir::new().unwrap();
    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 10);

    let mut conn = test_db();
    let records: Vec<_> = (1..=6).map(|id| record(id, &format!("Item {id}"))).collect();
    indexer.run(&mut conn, &records, |_| {}).unwrap();

    let query = service.embed_text("item").unwrap();
    assert_eq!(search_by_text_embedding(&conn, &query, 4).unwrap().len(), 4);
}

#[test]
fn blank_text_row_does_not_break_search() {
    let images = TempDir::new().unwrap();
    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
    let indexer = CatalogIndexer::new(&service, &locator, 10);

    let mut blank = record(1, "Nameless");
    blank.text_for_embedding = None;
    let records = vec![blank, record(2, "Red Dress")];

    let mut conn = test_db();
    let report = indexer.run(&mut conn, &records, |_| {}).unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(report.text_index_rows, 1, "zero text vector stays out of the index");

    let query = service.embed_text(records[1].embedding_text()).unwrap();
    let hits = search_by_text_embedding(&conn, &query, 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);
}
