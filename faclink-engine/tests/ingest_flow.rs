//! CSV ingestion flows against a mock registry

mod support;

use faclink_common::events::{InvalidationBus, ProgressBoard};
use faclink_engine::cache::BundleCache;
use faclink_engine::ingest::{ColumnMapping, CsvImporter, ImportError};
use faclink_engine::store::LocationStore;
use std::io::Write;
use std::sync::Arc;
use support::{test_settings, MockRegistry};
use tempfile::NamedTempFile;

fn mapping() -> ColumnMapping {
    ColumnMapping {
        levels: vec![
            Some("level1".to_string()),
            Some("level2".to_string()),
            None,
            None,
        ],
        facility: "facility".to_string(),
        code: "code".to_string(),
        latitude: Some("lat".to_string()),
        longitude: Some("long".to_string()),
    }
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write csv");
    file.flush().expect("flush csv");
    file
}

struct Harness {
    registry: MockRegistry,
    importer: CsvImporter,
    progress: ProgressBoard,
}

async fn harness() -> Harness {
    support::init_tracing();
    let registry = MockRegistry::new();
    let base_url = registry.spawn().await;
    let settings = test_settings(&base_url);

    let cache = Arc::new(BundleCache::new(InvalidationBus::default()));
    let store = Arc::new(LocationStore::new(&settings, cache).expect("store"));
    let progress = ProgressBoard::new();
    let importer = CsvImporter::new(store, settings, progress.clone());

    Harness {
        registry,
        importer,
        progress,
    }
}

const TWO_CLINICS: &str = "level1,level2,facility,code,lat,long\n\
    Kenya,Nairobi,Clinic A,C1,-1.3,36.8\n\
    Kenya,Nairobi,Clinic B,C2,-1.28,36.82\n";

#[tokio::test]
async fn shared_jurisdictions_collapse_to_single_nodes() {
    let h = harness().await;
    let file = csv_file(TWO_CLINICS);

    let report = h
        .importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-1")
        .await
        .expect("import succeeds");

    assert_eq!(report.rows, 2);
    assert_eq!(report.skipped, 0);
    // root + Kenya + Nairobi
    assert_eq!(report.jurisdictions, 3);
    assert_eq!(report.buildings, 2);

    // 3 jurisdictions + 2 buildings in the registry
    assert_eq!(h.registry.count("Mohalice").await, 5);

    let clinic_a = h
        .registry
        .location("Mohalice", "C1")
        .await
        .expect("building written under its code");
    let clinic_b = h.registry.location("Mohalice", "C2").await.expect("second building");
    assert!(clinic_a.is_building());
    assert_eq!(clinic_a.position.map(|p| p.latitude), Some(-1.3));

    // both rows derived the same Nairobi parent
    assert_eq!(clinic_a.parent_id(), clinic_b.parent_id());
    let nairobi_id = clinic_a.parent_id().expect("parent set").to_string();
    let nairobi = h
        .registry
        .location("Mohalice", &nairobi_id)
        .await
        .expect("Nairobi node written");
    assert_eq!(nairobi.name, "Nairobi");

    let kenya_id = nairobi.parent_id().expect("Kenya parent").to_string();
    let kenya = h
        .registry
        .location("Mohalice", &kenya_id)
        .await
        .expect("Kenya node written");
    assert_eq!(kenya.name, "Kenya");

    let done = h.progress.get("upload-1").await.expect("progress tracked");
    assert_eq!(done.status.as_deref(), Some("Done"));
    assert_eq!(done.percent, Some(100.0));
}

#[tokio::test]
async fn reimport_is_idempotent() {
    let h = harness().await;
    let file = csv_file(TWO_CLINICS);

    h.importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-1")
        .await
        .expect("first import");
    let first_count = h.registry.count("Mohalice").await;

    let report = h
        .importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-2")
        .await
        .expect("second import");

    assert_eq!(h.registry.count("Mohalice").await, first_count);
    assert_eq!(report.jurisdictions, 3);
}

#[tokio::test]
async fn invalid_file_writes_nothing() {
    let h = harness().await;
    let file = csv_file(
        "level1,level2,facility,code,lat,long\n\
         Kenya,Nairobi,Clinic A,C1,-1.3,36.8\n\
         Kenya,Nairobi,Clinic B,C1,-1.28,36.82\n",
    );

    let result = h
        .importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-1")
        .await;

    match result {
        Err(ImportError::Invalid(violations)) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].reason, "Duplicate ID");
        }
        other => panic!("expected validation rejection, got {:?}", other.map(|_| ())),
    }

    assert_eq!(h.registry.count("Mohalice").await, 0);
    assert_eq!(h.registry.upserts().await, 0);

    let snapshot = h.progress.get("upload-1").await.expect("progress tracked");
    assert!(snapshot.error.is_some());
}

#[tokio::test]
async fn blank_facility_rows_are_skipped_by_the_writer() {
    let h = harness().await;
    let csv = "level1,level2,facility,code,lat,long\n\
               Kenya,Nairobi,Clinic A,C1,-1.3,36.8\n\
               Kenya,Nairobi,,C9,-1.0,36.0\n";

    let report = h
        .importer
        .import_stream(csv.as_bytes(), &mapping(), "Mohalice", "upload-1")
        .await
        .expect("import succeeds");

    assert_eq!(report.rows, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.buildings, 1);
    assert!(h.registry.location("Mohalice", "C9").await.is_none());
}

#[tokio::test]
async fn small_batches_flush_repeatedly() {
    let registry = MockRegistry::new();
    let base_url = registry.spawn().await;
    let mut settings = test_settings(&base_url);
    settings.import.batch_size = 3;

    let cache = Arc::new(BundleCache::new(InvalidationBus::default()));
    let store = Arc::new(LocationStore::new(&settings, cache).expect("store"));
    let progress = ProgressBoard::new();
    let importer = CsvImporter::new(store, settings, progress.clone());

    let file = csv_file(TWO_CLINICS);
    let report = importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-1")
        .await
        .expect("import succeeds");

    // 5 records at batch size 3: one full flush plus the remainder
    assert_eq!(report.flushes, 2);
    assert_eq!(registry.upserts().await, 2);
    assert_eq!(registry.count("Mohalice").await, 5);
}

#[tokio::test]
async fn unreachable_registry_fails_the_import_and_reports_it() {
    let mut settings = test_settings("http://127.0.0.1:1");
    settings.registry.request_timeout_secs = 1;

    let cache = Arc::new(BundleCache::new(InvalidationBus::default()));
    let store = Arc::new(LocationStore::new(&settings, cache).expect("store"));
    let progress = ProgressBoard::new();
    let importer = CsvImporter::new(store, settings, progress.clone());

    let file = csv_file(TWO_CLINICS);
    let result = importer
        .import_file(file.path(), &mapping(), "Mohalice", "upload-1")
        .await;
    assert!(matches!(result, Err(ImportError::Registry(_))));

    let snapshot = progress.get("upload-1").await.expect("progress tracked");
    assert!(snapshot.error.is_some());
}
