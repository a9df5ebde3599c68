//! In-memory store without store-level foreign keys.
//!
//! Rows live in id-keyed arenas. Ownership is tracked explicitly: each catalog
//! file owns the ids of its detections, each detection owns the ids of its
//! classifications. Deleting an owner removes what it owns.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::backend::{
    Catalog, CatalogRow, CategoryRow, ClassificationRow, DetectionRow, DetectionStore, IndexSpec,
    Rows, RunInfoRow, Table,
};

#[derive(Debug, Default)]
pub struct MemoryDb {
    catalog_present: bool,
    files: BTreeMap<i64, CatalogRow>,
    next_file_id: i64,

    tables: HashSet<Table>,
    run_info: Option<RunInfoRow>,
    detection_categories: Vec<CategoryRow>,
    classification_categories: Vec<CategoryRow>,
    detections: BTreeMap<i64, DetectionRow>,
    classifications: BTreeMap<i64, ClassificationRow>,

    file_detections: HashMap<i64, Vec<i64>>,
    detection_classifications: HashMap<i64, Vec<i64>>,

    indices: Vec<IndexSpec>,
}

impl MemoryDb {
    /// An empty store with an empty catalog.
    pub fn new() -> Self {
        Self {
            catalog_present: true,
            next_file_id: 1,
            ..Default::default()
        }
    }

    /// A store whose catalog table has never been created.
    pub fn without_catalog() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file_name: &str, relative_path: &str) -> i64 {
        let id = self.next_file_id.max(1);
        self.next_file_id = id + 1;
        self.files.insert(
            id,
            CatalogRow {
                id,
                file_name: file_name.to_string(),
                relative_path: relative_path.to_string(),
            },
        );
        id
    }

    /// Remove a catalog file and everything it owns.
    pub fn delete_file(&mut self, id: i64) -> bool {
        if self.files.remove(&id).is_none() {
            return false;
        }
        for detection_id in self.file_detections.remove(&id).unwrap_or_default() {
            self.delete_detection(detection_id);
        }
        true
    }

    /// Remove a detection and its classifications.
    pub fn delete_detection(&mut self, id: i64) -> bool {
        let Some(detection) = self.detections.remove(&id) else {
            return false;
        };
        if let Some(owned) = self.file_detections.get_mut(&detection.image_id) {
            owned.retain(|d| *d != id);
        }
        for classification_id in self.detection_classifications.remove(&id).unwrap_or_default() {
            self.classifications.remove(&classification_id);
        }
        true
    }

    pub fn indices(&self) -> &[IndexSpec] {
        &self.indices
    }

    fn require_table(&self, table: Table) -> Result<()> {
        if !self.tables.contains(&table) {
            bail!("no such table: {}", table.name());
        }
        Ok(())
    }

    fn insert_categories(
        target: &mut Vec<CategoryRow>,
        rows: &[CategoryRow],
        table: Table,
    ) -> Result<()> {
        {
            let mut seen: HashSet<&str> = target.iter().map(|c| c.code.as_str()).collect();
            for row in rows {
                if !seen.insert(row.code.as_str()) {
                    bail!("duplicate category {:?} in {}", row.code, table.name());
                }
            }
        }
        target.extend_from_slice(rows);
        Ok(())
    }
}

impl Catalog for MemoryDb {
    fn catalog_exists(&self) -> Result<bool> {
        Ok(self.catalog_present)
    }

    fn query_all(&self) -> Result<Vec<CatalogRow>> {
        Ok(self.files.values().cloned().collect())
    }

    fn build_indices(&mut self, indices: &[IndexSpec]) -> Result<()> {
        for index in indices {
            if !self.indices.contains(index) {
                self.indices.push(*index);
            }
        }
        Ok(())
    }
}

impl DetectionStore for MemoryDb {
    fn table_exists(&self, table: Table) -> Result<bool> {
        Ok(self.tables.contains(&table))
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        if !self.tables.insert(table) {
            bail!("table {} already exists", table.name());
        }
        Ok(())
    }

    fn clear_rows(&mut self, tables: &[Table]) -> Result<()> {
        for table in tables {
            self.require_table(*table)?;
            match table {
                Table::DetectionInfo => self.run_info = None,
                Table::DetectionCategories => self.detection_categories.clear(),
                Table::ClassificationCategories => self.classification_categories.clear(),
                Table::Detections => {
                    self.detections.clear();
                    self.file_detections.clear();
                    self.classifications.clear();
                    self.detection_classifications.clear();
                }
                Table::Classifications => {
                    self.classifications.clear();
                    self.detection_classifications.clear();
                }
            }
        }
        Ok(())
    }

    fn bulk_insert(&mut self, rows: Rows<'_>) -> Result<usize> {
        self.require_table(rows.table())?;

        match rows {
            Rows::RunInfo(info) => self.run_info = Some(info.clone()),
            Rows::DetectionCategories(categories) => Self::insert_categories(
                &mut self.detection_categories,
                categories,
                Table::DetectionCategories,
            )?,
            Rows::ClassificationCategories(categories) => Self::insert_categories(
                &mut self.classification_categories,
                categories,
                Table::ClassificationCategories,
            )?,
            Rows::Detections(detections) => {
                // Validate the whole batch before touching the arena.
                let mut batch_ids = HashSet::new();
                for row in detections {
                    if !self.files.contains_key(&row.image_id) {
                        bail!("detection {} references missing file {}", row.id, row.image_id);
                    }
                    if self.detections.contains_key(&row.id) || !batch_ids.insert(row.id) {
                        bail!("duplicate detection id {}", row.id);
                    }
                }
                for row in detections {
                    self.file_detections.entry(row.image_id).or_default().push(row.id);
                    self.detections.insert(row.id, row.clone());
                }
            }
            Rows::Classifications(classifications) => {
                let mut batch_ids = HashSet::new();
                for row in classifications {
                    if !self.detections.contains_key(&row.detection_id) {
                        bail!(
                            "classification {} references missing detection {}",
                            row.id,
                            row.detection_id
                        );
                    }
                    if self.classifications.contains_key(&row.id) || !batch_ids.insert(row.id) {
                        bail!("duplicate classification id {}", row.id);
                    }
                }
                for row in classifications {
                    self.detection_classifications
                        .entry(row.detection_id)
                        .or_default()
                        .push(row.id);
                    self.classifications.insert(row.id, row.clone());
                }
            }
        }

        Ok(rows.len())
    }

    fn select_run_info(&self) -> Result<Option<RunInfoRow>> {
        Ok(self.run_info.clone())
    }

    fn select_categories(&self, table: Table) -> Result<Vec<CategoryRow>> {
        self.require_table(table)?;
        match table {
            Table::DetectionCategories => Ok(self.detection_categories.clone()),
            Table::ClassificationCategories => Ok(self.classification_categories.clone()),
            other => bail!("{} is not a category table", other.name()),
        }
    }

    fn select_detections(&self) -> Result<Vec<DetectionRow>> {
        Ok(self.detections.values().cloned().collect())
    }

    fn select_classifications(&self) -> Result<Vec<ClassificationRow>> {
        Ok(self.classifications.values().cloned().collect())
    }
}
