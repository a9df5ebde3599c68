use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::{ClassificationRecord, Database, DetectionFilter, DetectionStore};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportedRun {
    detector: String,
    detection_completion_time: String,
    classifier: String,
    classification_completion_time: String,
}

#[derive(Debug, Serialize)]
struct ExportedClassification {
    category: String,
    label: Option<String>,
    conf: f32,
}

/// One detection with everything needed to read it without the database.
#[derive(Debug, Serialize)]
struct ExportedDetection {
    detection_id: i64,
    file_name: String,
    relative_path: String,
    category: String,
    label: Option<String>,
    conf: f64,
    bbox: Option<[f64; 4]>,
    classifications: Vec<ExportedClassification>,
}

#[derive(Debug, Serialize)]
struct ExportDocument {
    exported_at: String,
    run: Option<ExportedRun>,
    detections: Vec<ExportedDetection>,
}

/// Export reconciled detections to a file. Returns the number of detections written.
pub fn export_detections(db: &Database, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let detections = get_detections_for_export(db)?;
    let count = detections.len();

    match format {
        ExportFormat::Json => export_json(db, detections, output_path)?,
        ExportFormat::Csv => export_csv(&detections, output_path)?,
    }

    tracing::info!("Exported {} detections to {:?}", count, output_path);
    Ok(count)
}

fn get_detections_for_export(db: &Database) -> Result<Vec<ExportedDetection>> {
    let mut by_detection: HashMap<i64, Vec<ClassificationRecord>> = HashMap::new();
    for record in db.classification_records()? {
        by_detection.entry(record.detection_id).or_default().push(record);
    }

    let detections = db
        .detection_records(&DetectionFilter::default())?
        .into_iter()
        .map(|record| ExportedDetection {
            classifications: by_detection
                .remove(&record.detection_id)
                .unwrap_or_default()
                .into_iter()
                .map(|c| ExportedClassification {
                    category: c.category,
                    label: c.label,
                    conf: c.conf,
                })
                .collect(),
            detection_id: record.detection_id,
            file_name: record.file_name,
            relative_path: record.relative_path,
            category: record.category,
            label: record.label,
            conf: record.conf,
            bbox: record.bbox,
        })
        .collect();

    Ok(detections)
}

fn export_json(
    db: &Database,
    detections: Vec<ExportedDetection>,
    output_path: &Path,
) -> Result<()> {
    let run = db.select_run_info()?.map(|info| ExportedRun {
        detector: info.detector,
        detection_completion_time: info.detection_completion_time,
        classifier: info.classifier,
        classification_completion_time: info.classification_completion_time,
    });

    let document = ExportDocument {
        exported_at: Local::now().to_rfc3339(),
        run,
        detections,
    };

    let json = serde_json::to_string_pretty(&document)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(detections: &[ExportedDetection], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "detection_id",
        "relative_path",
        "file_name",
        "category",
        "label",
        "conf",
        "bbox",
        "classifications",
    ])?;

    for detection in detections {
        let bbox = detection
            .bbox
            .map(|b| crate::ingest::keys::serialize_bbox(Some(&b)))
            .unwrap_or_default();
        let classifications = detection
            .classifications
            .iter()
            .map(|c| format!("{}:{}", c.label.as_deref().unwrap_or(&c.category), c.conf))
            .collect::<Vec<_>>()
            .join("; ");

        wtr.write_record([
            &detection.detection_id.to_string(),
            &detection.relative_path,
            &detection.file_name,
            &detection.category,
            detection.label.as_deref().unwrap_or(""),
            &detection.conf.to_string(),
            &bbox,
            &classifications,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
