//! Catalog of image files: the `files` table.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};

use super::backend::{Catalog, CatalogRow, IndexSpec};
use super::{Database, CATALOG_TABLE};

impl Database {
    /// Add a file to the catalog. Returns false if it was already cataloged.
    pub fn insert_file(
        &self,
        file_name: &str,
        relative_path: &str,
        size_bytes: Option<i64>,
    ) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO files (file_name, relative_path, size_bytes) VALUES (?, ?, ?)",
            params![file_name, relative_path, size_bytes],
        )?;
        Ok(inserted > 0)
    }

    pub fn find_file_id(&self, file_name: &str, relative_path: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE file_name = ? AND relative_path = ?",
                params![file_name, relative_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Remove a file from the catalog; its detections go with it.
    pub fn delete_file(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM files WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    pub fn count_files(&self) -> Result<i64> {
        let count = self.conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Read a catalog id, accepting integers and integer-valued text.
fn catalog_id(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(id) => Some(*id),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl Catalog for Database {
    fn catalog_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [CATALOG_TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query_all(&self) -> Result<Vec<CatalogRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, file_name, relative_path FROM files")?;

        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Value>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, file_name, relative_path) in raw {
            match catalog_id(&id) {
                Some(id) => rows.push(CatalogRow {
                    id,
                    file_name,
                    relative_path,
                }),
                None => tracing::warn!(
                    "Skipping catalog row {:?}/{:?} with unusable id {:?}",
                    relative_path,
                    file_name,
                    id
                ),
            }
        }

        Ok(rows)
    }

    fn build_indices(&mut self, indices: &[IndexSpec]) -> Result<()> {
        for index in indices {
            self.conn.execute(&index.create_sql(), [])?;
        }
        Ok(())
    }
}
