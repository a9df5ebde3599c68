//! Data model for the detector's JSON report.
//!
//! Field names are fixed by the detector tool, so every field is bound to its
//! external name explicitly rather than relying on naming conventions.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Category code -> label, in the order the detector wrote them.
pub type CategoryMap = IndexMap<String, String>;

/// Top level of a detector results file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorResults {
    #[serde(rename = "info", default)]
    pub info: Option<DetectorInfo>,

    #[serde(rename = "detection_categories", default)]
    pub detection_categories: Option<CategoryMap>,

    #[serde(rename = "classification_categories", default)]
    pub classification_categories: Option<CategoryMap>,

    #[serde(rename = "images", default)]
    pub images: Option<Vec<DetectorImage>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorInfo {
    #[serde(rename = "detector", default)]
    pub detector: Option<String>,

    #[serde(rename = "detection_completion_time", default)]
    pub detection_completion_time: Option<String>,

    #[serde(rename = "classifier", default)]
    pub classifier: Option<String>,

    #[serde(rename = "classification_completion_time", default)]
    pub classification_completion_time: Option<String>,
}

/// One image entry as reported by the detector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorImage {
    #[serde(rename = "file")]
    pub file: String,

    #[serde(rename = "max_detection_conf", default)]
    pub max_detection_conf: Option<f64>,

    /// `null` for images the detector failed on.
    #[serde(rename = "detections", default)]
    pub detections: Option<Vec<DetectorDetection>>,

    #[serde(rename = "failure", default)]
    pub failure: Option<String>,
}

impl DetectorImage {
    pub fn detections(&self) -> &[DetectorDetection] {
        self.detections.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorDetection {
    #[serde(rename = "category")]
    pub category: String,

    #[serde(rename = "conf")]
    pub conf: f64,

    /// Normalized x, y, width, height.
    #[serde(rename = "bbox", default)]
    pub bbox: Option<Vec<f64>>,

    /// `[category, conf]` pairs.
    #[serde(rename = "classifications", default)]
    pub classifications: Option<Vec<(String, f64)>>,
}

impl DetectorDetection {
    pub fn classifications(&self) -> &[(String, f64)] {
        self.classifications.as_deref().unwrap_or(&[])
    }
}

impl DetectorResults {
    /// Load a results file written by the detector.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open detector results {:?}", path))?;
        let results = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse detector results {:?}", path))?;
        Ok(results)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
