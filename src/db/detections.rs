//! Detection tables: run info, categories, detections and classifications.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

use super::backend::{
    CategoryRow, ClassificationRow, DetectionRow, DetectionStore, Rows, RunInfoRow, Table,
};
use super::Database;
use crate::ingest::keys::parse_bbox;

/// A detection joined with its catalog file and category label.
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    pub detection_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub relative_path: String,
    pub category: String,
    pub label: Option<String>,
    pub conf: f64,
    pub bbox: Option<[f64; 4]>,
}

#[derive(Debug, Clone)]
pub struct ClassificationRecord {
    pub classification_id: i64,
    pub detection_id: i64,
    pub category: String,
    pub label: Option<String>,
    pub conf: f32,
}

/// Detections per detection category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub code: String,
    pub label: String,
    pub detections: i64,
    pub images: i64,
}

/// Selects detections by category and confidence range.
#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
    pub category: Option<String>,
    pub min_conf: Option<f64>,
    pub max_conf: Option<f64>,
    pub limit: Option<usize>,
}

impl DetectionFilter {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(ref category) = self.category {
            clauses.push("d.category = ?");
            values.push(Value::Text(category.clone()));
        }
        if let Some(min) = self.min_conf {
            clauses.push("d.conf >= ?");
            values.push(Value::Real(min));
        }
        if let Some(max) = self.max_conf {
            clauses.push("d.conf <= ?");
            values.push(Value::Real(max));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

fn insert_categories(tx: &Transaction, table: Table, rows: &[CategoryRow]) -> Result<usize> {
    let sql = format!("INSERT INTO {} (category, label) VALUES (?, ?)", table.name());
    let mut stmt = tx.prepare_cached(&sql)?;
    for row in rows {
        stmt.execute(params![row.code, row.label])?;
    }
    Ok(rows.len())
}

fn insert_detections(tx: &Transaction, rows: &[DetectionRow]) -> Result<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO detections (detection_id, category, conf, bbox, file_id) VALUES (?, ?, ?, ?, ?)",
    )?;
    for row in rows {
        stmt.execute(params![row.id, row.category, row.conf, row.bbox, row.image_id])?;
    }
    Ok(rows.len())
}

fn insert_classifications(tx: &Transaction, rows: &[ClassificationRow]) -> Result<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO classifications (classification_id, category, conf, detection_id) VALUES (?, ?, ?, ?)",
    )?;
    for row in rows {
        stmt.execute(params![row.id, row.category, f64::from(row.conf), row.detection_id])?;
    }
    Ok(rows.len())
}

impl DetectionStore for Database {
    fn table_exists(&self, table: Table) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table.name()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        self.conn.execute_batch(table.create_sql())?;
        Ok(())
    }

    fn clear_rows(&mut self, tables: &[Table]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in tables {
            tx.execute(&format!("DELETE FROM {}", table.name()), [])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_insert(&mut self, rows: Rows<'_>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let written = match rows {
            Rows::RunInfo(info) => tx.execute(
                r#"
                INSERT OR REPLACE INTO detection_info
                    (info_id, detector, detection_completion_time, classifier, classification_completion_time)
                VALUES (1, ?, ?, ?, ?)
                "#,
                params![
                    info.detector,
                    info.detection_completion_time,
                    info.classifier,
                    info.classification_completion_time,
                ],
            )?,
            Rows::DetectionCategories(categories) => {
                insert_categories(&tx, Table::DetectionCategories, categories)?
            }
            Rows::ClassificationCategories(categories) => {
                insert_categories(&tx, Table::ClassificationCategories, categories)?
            }
            Rows::Detections(detections) => insert_detections(&tx, detections)?,
            Rows::Classifications(classifications) => {
                insert_classifications(&tx, classifications)?
            }
        };
        tx.commit()?;

        Ok(written)
    }

    fn select_run_info(&self) -> Result<Option<RunInfoRow>> {
        if !self.table_exists(Table::DetectionInfo)? {
            return Ok(None);
        }
        let info = self
            .conn
            .query_row(
                r#"
                SELECT detector, detection_completion_time, classifier, classification_completion_time
                FROM detection_info
                WHERE info_id = 1
                "#,
                [],
                |row| {
                    Ok(RunInfoRow {
                        detector: row.get(0)?,
                        detection_completion_time: row.get(1)?,
                        classifier: row.get(2)?,
                        classification_completion_time: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    fn select_categories(&self, table: Table) -> Result<Vec<CategoryRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT category, label FROM {} ORDER BY rowid", table.name()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CategoryRow::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn select_detections(&self) -> Result<Vec<DetectionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT detection_id, category, conf, bbox, file_id FROM detections ORDER BY detection_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DetectionRow {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    conf: row.get(2)?,
                    bbox: row.get(3)?,
                    image_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn select_classifications(&self) -> Result<Vec<ClassificationRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT classification_id, category, conf, detection_id
            FROM classifications
            ORDER BY classification_id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ClassificationRow {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    conf: row.get::<_, f64>(2)? as f32,
                    detection_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl Database {
    /// Detections with their file and category label, ordered by file then detection.
    pub fn detection_records(&self, filter: &DetectionFilter) -> Result<Vec<DetectionRecord>> {
        let (where_clause, mut values) = filter.where_clause();
        let limit_clause = match filter.limit {
            Some(limit) => {
                values.push(Value::Integer(limit as i64));
                "LIMIT ?"
            }
            None => "",
        };

        let sql = format!(
            r#"
            SELECT d.detection_id, d.file_id, f.file_name, f.relative_path,
                   d.category, c.label, d.conf, d.bbox
            FROM detections d
            JOIN files f ON f.id = d.file_id
            LEFT JOIN detection_categories c ON c.category = d.category
            {}
            ORDER BY f.relative_path, f.file_name, d.detection_id
            {}
            "#,
            where_clause, limit_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), |row| {
                let bbox: String = row.get(7)?;
                Ok(DetectionRecord {
                    detection_id: row.get(0)?,
                    file_id: row.get(1)?,
                    file_name: row.get(2)?,
                    relative_path: row.get(3)?,
                    category: row.get(4)?,
                    label: row.get(5)?,
                    conf: row.get(6)?,
                    bbox: parse_bbox(&bbox),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn classification_records(&self) -> Result<Vec<ClassificationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT cl.classification_id, cl.detection_id, cl.category, cc.label, cl.conf
            FROM classifications cl
            LEFT JOIN classification_categories cc ON cc.category = cl.category
            ORDER BY cl.classification_id
            "#,
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(ClassificationRecord {
                    classification_id: row.get(0)?,
                    detection_id: row.get(1)?,
                    category: row.get(2)?,
                    label: row.get(3)?,
                    conf: row.get::<_, f64>(4)? as f32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Detection and image counts for every detection category, including unused ones.
    pub fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.category, c.label, COUNT(d.detection_id), COUNT(DISTINCT d.file_id)
            FROM detection_categories c
            LEFT JOIN detections d ON d.category = c.category
            GROUP BY c.category
            ORDER BY c.rowid
            "#,
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    code: row.get(0)?,
                    label: row.get(1)?,
                    detections: row.get(2)?,
                    images: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
