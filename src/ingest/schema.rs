//! Lifecycle of the detection tables.

use anyhow::Result;

use crate::db::{Catalog, DetectionStore, IndexSpec, Table};

/// Indices over the detection foreign keys, built after the bulk load.
pub const DETECTION_INDICES: [IndexSpec; 2] = [
    IndexSpec {
        name: "idx_detections_file_id",
        table: Table::Detections,
        column: "file_id",
    },
    IndexSpec {
        name: "idx_classifications_detection_id",
        table: Table::Classifications,
        column: "detection_id",
    },
];

/// Create the five detection tables, or empty them if they already exist.
///
/// `detection_info` is the marker: if it exists the tables are kept and only
/// their rows are deleted, children before parents.
pub fn prepare_schema<S: DetectionStore + ?Sized>(store: &mut S) -> Result<()> {
    if store.table_exists(Table::DetectionInfo)? {
        let mut tables = Table::ALL;
        tables.reverse();
        store.clear_rows(&tables)?;
        tracing::debug!("Cleared existing detection tables");
    } else {
        for table in Table::ALL {
            store.create_table(table)?;
        }
        tracing::debug!("Created detection tables");
    }
    Ok(())
}

/// Ask the catalog to index the freshly loaded foreign keys.
pub fn finalize_indices<C: Catalog + ?Sized>(catalog: &mut C) -> Result<()> {
    catalog.build_indices(&DETECTION_INDICES)?;
    tracing::debug!("Built {} detection indices", DETECTION_INDICES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryDb, Rows, RunInfoRow};

    #[test]
    fn test_prepare_creates_then_clears() {
        let mut db = MemoryDb::new();
        prepare_schema(&mut db).unwrap();
        for table in Table::ALL {
            assert!(db.table_exists(table).unwrap());
        }

        db.bulk_insert(Rows::RunInfo(&RunInfoRow::default())).unwrap();
        assert!(db.select_run_info().unwrap().is_some());

        // Second call must not try to recreate the tables.
        prepare_schema(&mut db).unwrap();
        assert!(db.select_run_info().unwrap().is_none());
    }

    #[test]
    fn test_prepare_on_sqlite() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        prepare_schema(&mut db).unwrap();
        db.bulk_insert(Rows::RunInfo(&RunInfoRow::default())).unwrap();
        prepare_schema(&mut db).unwrap();

        assert!(db.table_exists(Table::Classifications).unwrap());
        assert!(db.select_run_info().unwrap().is_none());
    }

    #[test]
    fn test_finalize_indices() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        prepare_schema(&mut db).unwrap();

        finalize_indices(&mut db).unwrap();
        // Idempotent.
        finalize_indices(&mut db).unwrap();

        let count: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        let mut memory = MemoryDb::new();
        finalize_indices(&mut memory).unwrap();
        assert_eq!(memory.indices(), &DETECTION_INDICES[..]);
    }
}
