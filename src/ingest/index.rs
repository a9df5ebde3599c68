use std::collections::HashMap;

use crate::db::CatalogRow;

/// Lookup from `(file_name, relative_path)` to catalog id, built once per run.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    ids: HashMap<(String, String), i64>,
}

impl CatalogIndex {
    pub fn build(rows: impl IntoIterator<Item = CatalogRow>) -> Self {
        let ids = rows
            .into_iter()
            .map(|row| ((row.file_name, row.relative_path), row.id))
            .collect();
        Self { ids }
    }

    /// A miss means the file left the catalog after the detector ran.
    pub fn lookup(&self, file_name: &str, relative_path: &str) -> Option<i64> {
        // The key is owned, so probing needs an owned tuple.
        self.ids
            .get(&(file_name.to_string(), relative_path.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
