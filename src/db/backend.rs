//! Store abstraction used by the ingest pipeline.
//!
//! The pipeline talks to two collaborators: the catalog of image files it
//! reconciles against, and the relational store the detection tables live in.
//! Both the SQLite `Database` and the in-memory `MemoryDb` implement them.

use anyhow::Result;

use super::schema;

/// The five tables written by an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    DetectionInfo,
    DetectionCategories,
    ClassificationCategories,
    Detections,
    Classifications,
}

impl Table {
    /// Creation order: referenced tables come before the tables that point at them.
    pub const ALL: [Table; 5] = [
        Table::DetectionInfo,
        Table::DetectionCategories,
        Table::ClassificationCategories,
        Table::Detections,
        Table::Classifications,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::DetectionInfo => "detection_info",
            Table::DetectionCategories => "detection_categories",
            Table::ClassificationCategories => "classification_categories",
            Table::Detections => "detections",
            Table::Classifications => "classifications",
        }
    }

    pub fn create_sql(&self) -> &'static str {
        match self {
            Table::DetectionInfo => schema::DETECTION_INFO_SCHEMA,
            Table::DetectionCategories => schema::DETECTION_CATEGORIES_SCHEMA,
            Table::ClassificationCategories => schema::CLASSIFICATION_CATEGORIES_SCHEMA,
            Table::Detections => schema::DETECTIONS_SCHEMA,
            Table::Classifications => schema::CLASSIFICATIONS_SCHEMA,
        }
    }
}

/// Single row of `detection_info`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunInfoRow {
    pub detector: String,
    pub detection_completion_time: String,
    pub classifier: String,
    pub classification_completion_time: String,
}

/// Row of `detection_categories` or `classification_categories`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub code: String,
    pub label: String,
}

impl CategoryRow {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    pub id: i64,
    pub category: String,
    pub conf: f64,
    /// Serialized box, empty when absent.
    pub bbox: String,
    pub image_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRow {
    pub id: i64,
    pub category: String,
    pub conf: f32,
    pub detection_id: i64,
}

/// A batch of rows for exactly one table.
#[derive(Debug, Clone, Copy)]
pub enum Rows<'a> {
    RunInfo(&'a RunInfoRow),
    DetectionCategories(&'a [CategoryRow]),
    ClassificationCategories(&'a [CategoryRow]),
    Detections(&'a [DetectionRow]),
    Classifications(&'a [ClassificationRow]),
}

impl Rows<'_> {
    pub fn table(&self) -> Table {
        match self {
            Rows::RunInfo(_) => Table::DetectionInfo,
            Rows::DetectionCategories(_) => Table::DetectionCategories,
            Rows::ClassificationCategories(_) => Table::ClassificationCategories,
            Rows::Detections(_) => Table::Detections,
            Rows::Classifications(_) => Table::Classifications,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Rows::RunInfo(_) => 1,
            Rows::DetectionCategories(rows) | Rows::ClassificationCategories(rows) => rows.len(),
            Rows::Detections(rows) => rows.len(),
            Rows::Classifications(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A catalog row as seen by the pipeline: id plus the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub id: i64,
    pub file_name: String,
    pub relative_path: String,
}

/// Secondary index to build once the detection tables are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: Table,
    pub column: &'static str,
}

impl IndexSpec {
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            self.name,
            self.table.name(),
            self.column
        )
    }
}

/// The pre-existing catalog of image files.
pub trait Catalog {
    /// Whether the catalog table is present at all.
    fn catalog_exists(&self) -> Result<bool>;

    /// All catalog rows with a usable integer id.
    fn query_all(&self) -> Result<Vec<CatalogRow>>;

    /// Build secondary indices over tables that reference the catalog.
    fn build_indices(&mut self, indices: &[IndexSpec]) -> Result<()>;
}

/// Relational store holding the detection tables.
pub trait DetectionStore {
    fn table_exists(&self, table: Table) -> Result<bool>;

    fn create_table(&mut self, table: Table) -> Result<()>;

    /// Delete every row of the given tables, keeping the tables themselves.
    fn clear_rows(&mut self, tables: &[Table]) -> Result<()>;

    /// Write a whole batch in one call. Returns the number of rows written.
    fn bulk_insert(&mut self, rows: Rows<'_>) -> Result<usize>;

    fn select_run_info(&self) -> Result<Option<RunInfoRow>>;

    fn select_categories(&self, table: Table) -> Result<Vec<CategoryRow>>;

    /// Detections ordered by id.
    fn select_detections(&self) -> Result<Vec<DetectionRow>>;

    /// Classifications ordered by id.
    fn select_classifications(&self) -> Result<Vec<ClassificationRow>>;
}
