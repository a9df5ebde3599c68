//! Reconcile a detector run against the image catalog.
//!
//! A run always replaces the previous one:
//! 1. prepare (create or clear) the detection tables
//! 2. write run info and both category vocabularies
//! 3. index the catalog by `(file_name, relative_path)`
//! 4. walk the detector's images, collecting detection and classification rows
//! 5. bulk-insert both batches, then build the foreign-key indices
//!
//! Images outside the truncation prefix or missing from the catalog are
//! skipped and only show up in the returned [`IngestSummary`].

pub mod categories;
pub mod index;
pub mod keys;
pub mod paths;
pub mod schema;

use serde::Serialize;

use crate::db::{
    Catalog, ClassificationRow, DetectionRow, DetectionStore, Rows, RunInfoRow, CATALOG_TABLE,
};
use crate::detector::{DetectorImage, DetectorInfo, DetectorResults};
use crate::error::{IngestError, Result};

pub use categories::{NO_DETECTION_CODE, NO_DETECTION_LABEL};
pub use index::CatalogIndex;
pub use keys::SequentialIds;

/// What happened to the detector's images during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub images_reported: usize,
    /// Outside the truncation prefix.
    pub images_out_of_scope: usize,
    /// In scope but no longer in the catalog.
    pub images_unmatched: usize,
    pub images_matched: usize,
    /// Matched images with no detections, given a no-detection row.
    pub placeholder_detections: usize,
    pub detections: usize,
    pub classifications: usize,
}

impl IngestSummary {
    pub fn images_skipped(&self) -> usize {
        self.images_out_of_scope + self.images_unmatched
    }
}

/// Rows accumulated over the whole run.
#[derive(Debug, Default)]
pub struct Batch {
    pub detections: Vec<DetectionRow>,
    pub classifications: Vec<ClassificationRow>,
}

fn run_info_row(info: Option<&DetectorInfo>) -> RunInfoRow {
    let Some(info) = info else {
        return RunInfoRow::default();
    };
    RunInfoRow {
        detector: info.detector.clone().unwrap_or_default(),
        detection_completion_time: info.detection_completion_time.clone().unwrap_or_default(),
        classifier: info.classifier.clone().unwrap_or_default(),
        classification_completion_time: info
            .classification_completion_time
            .clone()
            .unwrap_or_default(),
    }
}

/// Append the rows for one matched image. Returns true if the image had no
/// detections and got a placeholder row.
pub fn reconcile_image(
    image: &DetectorImage,
    image_id: i64,
    ids: &mut SequentialIds,
    batch: &mut Batch,
) -> bool {
    let detections = image.detections();

    if detections.is_empty() {
        batch.detections.push(DetectionRow {
            id: ids.next_detection(),
            category: NO_DETECTION_CODE.to_string(),
            conf: 0.0,
            bbox: String::new(),
            image_id,
        });
        return true;
    }

    for detection in detections {
        let detection_id = ids.next_detection();
        batch.detections.push(DetectionRow {
            id: detection_id,
            category: detection.category.clone(),
            conf: detection.conf,
            bbox: keys::serialize_bbox(detection.bbox.as_deref()),
            image_id,
        });

        for (category, conf) in detection.classifications() {
            batch.classifications.push(ClassificationRow {
                id: ids.next_classification(),
                category: category.clone(),
                conf: *conf as f32,
                detection_id,
            });
        }
    }

    false
}

/// Replace the detection tables with the contents of `results`.
///
/// `truncation_prefix` is stripped from each detector path before lookup;
/// paths that do not start with it are skipped. An empty prefix matches
/// every path unchanged.
pub fn ingest<S>(
    store: &mut S,
    results: &DetectorResults,
    truncation_prefix: &str,
) -> Result<IngestSummary>
where
    S: Catalog + DetectionStore + ?Sized,
{
    // Argument checks come before any table is touched.
    let images = results.images.as_deref().ok_or(IngestError::MissingImages)?;
    if !store.catalog_exists()? {
        return Err(IngestError::MissingCatalog(CATALOG_TABLE.to_string()));
    }

    schema::prepare_schema(store)?;

    store.bulk_insert(Rows::RunInfo(&run_info_row(results.info.as_ref())))?;

    let detection_categories =
        categories::reconcile_detection_categories(results.detection_categories.as_ref());
    let classification_categories = categories::reconcile_classification_categories(
        results.classification_categories.as_ref(),
    );
    store.bulk_insert(Rows::DetectionCategories(&detection_categories))?;
    store.bulk_insert(Rows::ClassificationCategories(&classification_categories))?;
    tracing::debug!(
        "Wrote {} detection and {} classification categories",
        detection_categories.len(),
        classification_categories.len()
    );

    let index = CatalogIndex::build(store.query_all()?);
    tracing::debug!("Indexed {} catalog files", index.len());

    let mut summary = IngestSummary {
        images_reported: images.len(),
        ..Default::default()
    };
    let mut ids = SequentialIds::new();
    let mut batch = Batch::default();

    for image in images {
        let Some((file_name, relative_path)) = paths::normalize(&image.file, truncation_prefix)
        else {
            tracing::trace!("Out of scope: {}", image.file);
            summary.images_out_of_scope += 1;
            continue;
        };

        let Some(image_id) = index.lookup(&file_name, &relative_path) else {
            tracing::debug!("Not in catalog: {}", image.file);
            summary.images_unmatched += 1;
            continue;
        };

        if let Some(ref failure) = image.failure {
            tracing::debug!("Detector failed on {}: {}", image.file, failure);
        }

        summary.images_matched += 1;
        if reconcile_image(image, image_id, &mut ids, &mut batch) {
            summary.placeholder_detections += 1;
        }
    }

    summary.detections = store.bulk_insert(Rows::Detections(&batch.detections))?;
    summary.classifications = store.bulk_insert(Rows::Classifications(&batch.classifications))?;

    schema::finalize_indices(store)?;

    tracing::info!(
        "Ingested {} of {} images: {} detections, {} classifications \
         ({} out of scope, {} not in catalog)",
        summary.images_matched,
        summary.images_reported,
        summary.detections,
        summary.classifications,
        summary.images_out_of_scope,
        summary.images_unmatched
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CategoryRow, Database, MemoryDb, Table};
    use std::collections::HashSet;

    const SCENARIO: &str = r#"{
        "info": {"detector": "md_v5a.0.0.pt", "detection_completion_time": "2024-03-01 10:22:31"},
        "detection_categories": {"1": "animal"},
        "images": [
            {"file": "/data/set1/a/IMG_A.JPG", "max_detection_conf": 0.0, "detections": []},
            {
                "file": "/data/set1/b/IMG_B.JPG",
                "max_detection_conf": 0.9,
                "detections": [
                    {
                        "category": "1",
                        "conf": 0.9,
                        "bbox": [1.0, 2.0, 3.5, 4.25],
                        "classifications": [["elk", 0.8]]
                    },
                    {"category": "1", "conf": 0.4, "bbox": [0.1, 0.2, 0.3]}
                ]
            }
        ]
    }"#;

    fn scenario_store() -> (MemoryDb, i64, i64) {
        let mut db = MemoryDb::new();
        let a = db.add_file("IMG_A.JPG", "a");
        let b = db.add_file("IMG_B.JPG", "b");
        (db, a, b)
    }

    fn assert_contiguous(ids: impl IntoIterator<Item = i64>) {
        let ids: Vec<i64> = ids.into_iter().collect();
        let expected: Vec<i64> = (1..=ids.len() as i64).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let (mut db, a, b) = scenario_store();
        let results = DetectorResults::from_json(SCENARIO).unwrap();

        let summary = ingest(&mut db, &results, "/data/set1/").unwrap();

        assert_eq!(summary.images_matched, 2);
        assert_eq!(summary.placeholder_detections, 1);
        assert_eq!(summary.detections, 3);
        assert_eq!(summary.classifications, 1);
        assert_eq!(serde_json::to_value(&summary).unwrap()["images_reported"], 2);

        assert_eq!(
            db.select_categories(Table::DetectionCategories).unwrap(),
            vec![CategoryRow::new("0", "empty"), CategoryRow::new("1", "animal")]
        );
        assert!(db.select_categories(Table::ClassificationCategories).unwrap().is_empty());

        let detections = db.select_detections().unwrap();
        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].image_id, a);
        assert_eq!(detections[0].category, NO_DETECTION_CODE);
        assert_eq!(detections[0].conf, 0.0);
        assert_eq!(detections[0].bbox, "");
        assert_eq!(detections[1].image_id, b);
        assert_eq!(detections[1].bbox, "1, 2, 3.5, 4.25");
        assert_eq!(detections[2].image_id, b);
        assert_eq!(detections[2].bbox, "");

        let classifications = db.select_classifications().unwrap();
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].detection_id, detections[1].id);
        assert_eq!(classifications[0].category, "elk");
        assert_eq!(classifications[0].conf, 0.8f32);

        let info = db.select_run_info().unwrap().unwrap();
        assert_eq!(info.detector, "md_v5a.0.0.pt");
        assert_eq!(info.classifier, "");
    }

    #[test]
    fn test_end_to_end_on_sqlite() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_file("IMG_A.JPG", "a", None).unwrap();
        db.insert_file("IMG_B.JPG", "b", None).unwrap();
        let results = DetectorResults::from_json(SCENARIO).unwrap();

        let summary = ingest(&mut db, &results, "/data/set1/").unwrap();
        assert_eq!(summary.detections, 3);

        let records = db.detection_records(&Default::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].file_name, "IMG_A.JPG");
        assert_eq!(records[0].label.as_deref(), Some("empty"));
        assert_eq!(records[1].bbox, Some([1.0, 2.0, 3.5, 4.25]));

        let classifications = db.classification_records().unwrap();
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].detection_id, records[1].detection_id);
    }

    #[test]
    fn test_out_of_scope_and_deleted_images_skipped() {
        let json = r#"{
            "detection_categories": {"0": "empty", "1": "animal"},
            "images": [
                {"file": "/data/set1/sub/img001.jpg", "detections": [{"category": "1", "conf": 0.7}]},
                {"file": "/data/set2/img002.jpg", "detections": [{"category": "1", "conf": 0.9}]},
                {"file": "/data/set1/sub/deleted.jpg", "detections": [{"category": "1", "conf": 0.9}]}
            ]
        }"#;
        let mut db = MemoryDb::new();
        let kept = db.add_file("img001.jpg", "sub");
        db.add_file("img002.jpg", "");

        let results = DetectorResults::from_json(json).unwrap();
        let summary = ingest(&mut db, &results, "/data/set1/").unwrap();

        assert_eq!(summary.images_reported, 3);
        assert_eq!(summary.images_out_of_scope, 1);
        assert_eq!(summary.images_unmatched, 1);
        assert_eq!(summary.images_skipped(), 2);
        assert_eq!(summary.images_matched, 1);

        let detections = db.select_detections().unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].image_id, kept);

        // Supplied reserved category is not duplicated.
        let categories = db.select_categories(Table::DetectionCategories).unwrap();
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn test_ids_contiguous_across_images() {
        let json = r#"{
            "images": [
                {"file": "c.jpg", "detections": [
                    {"category": "1", "conf": 0.9, "classifications": [["3", 0.5], ["4", 0.2]]},
                    {"category": "2", "conf": 0.8}
                ]},
                {"file": "missing.jpg", "detections": [{"category": "1", "conf": 0.9}]},
                {"file": "a.jpg", "detections": []},
                {"file": "b.jpg", "detections": [
                    {"category": "1", "conf": 0.6, "classifications": [["3", 0.9]]}
                ]}
            ]
        }"#;
        let mut db = MemoryDb::new();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            db.add_file(name, "");
        }

        let results = DetectorResults::from_json(json).unwrap();
        ingest(&mut db, &results, "").unwrap();

        let detections = db.select_detections().unwrap();
        let classifications = db.select_classifications().unwrap();
        assert_contiguous(detections.iter().map(|d| d.id));
        assert_contiguous(classifications.iter().map(|c| c.id));
        assert_eq!(detections.len(), 4);
        assert_eq!(classifications.len(), 3);

        // No dangling classification references.
        let detection_ids: HashSet<i64> = detections.iter().map(|d| d.id).collect();
        assert!(classifications.iter().all(|c| detection_ids.contains(&c.detection_id)));

        // Every matched file has at least one detection.
        let covered: HashSet<i64> = detections.iter().map(|d| d.image_id).collect();
        for row in db.query_all().unwrap() {
            assert!(covered.contains(&row.id), "{} has no detections", row.file_name);
        }
    }

    #[test]
    fn test_rerun_replaces_previous_run() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_file("IMG_A.JPG", "a", None).unwrap();
        db.insert_file("IMG_B.JPG", "b", None).unwrap();
        let results = DetectorResults::from_json(SCENARIO).unwrap();

        let first = ingest(&mut db, &results, "/data/set1/").unwrap();
        let detections = db.select_detections().unwrap();
        let classifications = db.select_classifications().unwrap();
        let categories = db.select_categories(Table::DetectionCategories).unwrap();

        let second = ingest(&mut db, &results, "/data/set1/").unwrap();
        assert_eq!(first, second);
        assert_eq!(db.select_detections().unwrap(), detections);
        assert_eq!(db.select_classifications().unwrap(), classifications);
        assert_eq!(db.select_categories(Table::DetectionCategories).unwrap(), categories);
    }

    #[test]
    fn test_missing_images_rejected_before_mutation() {
        let mut db = MemoryDb::new();
        let results =
            DetectorResults::from_json(r#"{"detection_categories": {"1": "animal"}}"#).unwrap();

        let err = ingest(&mut db, &results, "").unwrap_err();
        assert!(matches!(err, IngestError::MissingImages));
        assert!(!db.table_exists(Table::DetectionInfo).unwrap());
    }

    #[test]
    fn test_missing_catalog_rejected_before_mutation() {
        let mut db = MemoryDb::without_catalog();
        let results = DetectorResults::from_json(r#"{"images": []}"#).unwrap();

        let err = ingest(&mut db, &results, "").unwrap_err();
        assert!(matches!(err, IngestError::MissingCatalog(_)));
        assert!(!db.table_exists(Table::DetectionInfo).unwrap());

        let mut sqlite = Database::open_in_memory().unwrap();
        let err = ingest(&mut sqlite, &results, "").unwrap_err();
        assert!(matches!(err, IngestError::MissingCatalog(_)));
        assert!(!sqlite.table_exists(Table::DetectionInfo).unwrap());
    }

    #[test]
    fn test_failed_image_gets_placeholder() {
        let json = r#"{"images": [{"file": "a.jpg", "failure": "Failure image access", "detections": null}]}"#;
        let mut db = MemoryDb::new();
        db.add_file("a.jpg", "");

        let results = DetectorResults::from_json(json).unwrap();
        let summary = ingest(&mut db, &results, "").unwrap();
        assert_eq!(summary.placeholder_detections, 1);

        let detections = db.select_detections().unwrap();
        assert_eq!(detections[0].category, NO_DETECTION_CODE);
    }

    #[test]
    fn test_reconcile_image_threads_counters() {
        let image = DetectorImage {
            file: "x.jpg".to_string(),
            detections: Some(vec![crate::detector::DetectorDetection {
                category: "1".to_string(),
                conf: 0.5,
                bbox: None,
                classifications: Some(vec![("elk".to_string(), 0.25)]),
            }]),
            ..Default::default()
        };
        let mut ids = SequentialIds::new();
        ids.next_detection();
        ids.next_classification();
        let mut batch = Batch::default();

        assert!(!reconcile_image(&image, 7, &mut ids, &mut batch));
        assert_eq!(batch.detections[0].id, 2);
        assert_eq!(batch.detections[0].image_id, 7);
        assert_eq!(batch.classifications[0].id, 2);
        assert_eq!(batch.classifications[0].detection_id, 2);
    }

    #[test]
    fn test_categories_stored_in_document_order() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let results = DetectorResults::from_json(
            r#"{
                "detection_categories": {"2": "person", "1": "animal", "10": "vehicle"},
                "classification_categories": {"9": "elk", "11": "deer"},
                "images": []
            }"#,
        )
        .unwrap();

        ingest(&mut db, &results, "").unwrap();

        let codes = |table: Table| -> Vec<String> {
            db.select_categories(table).unwrap().into_iter().map(|row| row.code).collect()
        };
        assert_eq!(codes(Table::DetectionCategories), ["0", "2", "1", "10"]);
        assert_eq!(codes(Table::ClassificationCategories), ["9", "11"]);
    }
}
