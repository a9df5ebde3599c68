/// Catalog of known image files. Owned by the catalog; the ingest pipeline
/// only reads it and references it from `detections`.
pub const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL,
    relative_path TEXT NOT NULL DEFAULT '',
    size_bytes INTEGER,
    added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (relative_path, file_name)
);
"#;

pub const CATALOG_TABLE: &str = "files";

pub const DETECTION_INFO_SCHEMA: &str = r#"
CREATE TABLE detection_info (
    info_id INTEGER PRIMARY KEY CHECK (info_id = 1),
    detector TEXT NOT NULL DEFAULT '',
    detection_completion_time TEXT NOT NULL DEFAULT '',
    classifier TEXT NOT NULL DEFAULT '',
    classification_completion_time TEXT NOT NULL DEFAULT ''
);
"#;

pub const DETECTION_CATEGORIES_SCHEMA: &str = r#"
CREATE TABLE detection_categories (
    category TEXT PRIMARY KEY,
    label TEXT NOT NULL
);
"#;

pub const CLASSIFICATION_CATEGORIES_SCHEMA: &str = r#"
CREATE TABLE classification_categories (
    category TEXT PRIMARY KEY,
    label TEXT NOT NULL
);
"#;

pub const DETECTIONS_SCHEMA: &str = r#"
CREATE TABLE detections (
    detection_id INTEGER PRIMARY KEY,
    category TEXT NOT NULL,
    conf REAL NOT NULL,
    bbox TEXT NOT NULL DEFAULT '',  -- "x, y, w, h" or empty
    file_id INTEGER NOT NULL,
    FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
);
"#;

pub const CLASSIFICATIONS_SCHEMA: &str = r#"
CREATE TABLE classifications (
    classification_id INTEGER PRIMARY KEY,
    category TEXT NOT NULL,
    conf REAL NOT NULL,
    detection_id INTEGER NOT NULL,
    FOREIGN KEY (detection_id) REFERENCES detections(detection_id) ON DELETE CASCADE
);
"#;
