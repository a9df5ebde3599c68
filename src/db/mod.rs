mod schema;
pub mod backend;
pub mod catalog;
pub mod detections;
pub mod memory;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

pub use schema::{CATALOG_SCHEMA, CATALOG_TABLE};
pub use backend::{
    Catalog, CatalogRow, CategoryRow, ClassificationRow, DetectionRow, DetectionStore, IndexSpec,
    Rows, RunInfoRow, Table,
};
pub use detections::{CategoryCount, ClassificationRecord, DetectionFilter, DetectionRecord};
pub use memory::MemoryDb;

/// SQLite database holding the image catalog and the detection tables.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        // Cascades on files -> detections -> classifications rely on this.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create the catalog table if it does not exist yet.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(())
    }
}
