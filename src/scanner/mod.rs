//! Catalog import: walks an image folder and records each file under its
//! root-relative key.

pub mod discovery;

use anyhow::Result;
use std::path::Path;
use std::sync::mpsc;

use crate::config::ScannerConfig;
use crate::db::Database;
use crate::ingest::paths::split_catalog_key;

pub use discovery::discover_images;

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_files: usize },
    Scanning { current: usize, total: usize, path: String },
    Completed { added: usize, existing: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub total_found: usize,
    pub added: usize,
    pub existing: usize,
    pub failed: usize,
}

pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn scan_directory(
        &self,
        root: &Path,
        db: &Database,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<ScanResult> {
        let image_paths = discover_images(root, &self.config.image_extensions)?;

        let total = image_paths.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started { total_files: total });
        }

        let mut result = ScanResult {
            total_found: total,
            ..Default::default()
        };

        for (index, path) in image_paths.iter().enumerate() {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(ScanProgress::Scanning {
                    current: index + 1,
                    total,
                    path: path.to_string_lossy().to_string(),
                });
            }

            match self.catalog_file(root, path, db) {
                Ok(true) => result.added += 1,
                Ok(false) => result.existing += 1,
                Err(e) => {
                    tracing::warn!("Failed to catalog {:?}: {}", path, e);
                    result.failed += 1;
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(ScanProgress::Error {
                            message: format!("Error scanning {}: {}", path.display(), e),
                        });
                    }
                }
            }
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed {
                added: result.added,
                existing: result.existing,
            });
        }

        tracing::info!(
            "Scanned {:?}: {} found, {} added, {} already cataloged",
            root,
            result.total_found,
            result.added,
            result.existing
        );

        Ok(result)
    }

    fn catalog_file(&self, root: &Path, path: &Path, db: &Database) -> Result<bool> {
        let size_bytes = std::fs::metadata(path)?.len() as i64;
        let relative = path.strip_prefix(root)?;
        let (file_name, relative_path) = split_catalog_key(&relative.to_string_lossy());
        db.insert_file(&file_name, &relative_path, Some(size_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_scan_directory_catalogs_relative_keys() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("site1/cam2")).unwrap();
        File::create(dir.path().join("IMG_0001.JPG")).unwrap();
        File::create(dir.path().join("site1/cam2/IMG_0002.JPG")).unwrap();
        File::create(dir.path().join("site1/readme.txt")).unwrap();

        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let (tx, rx) = mpsc::channel();
        let scanner = Scanner::new(ScannerConfig::default());
        let result = scanner.scan_directory(dir.path(), &db, Some(tx)).unwrap();

        assert_eq!(result.total_found, 2);
        assert_eq!(result.added, 2);
        assert!(db.find_file_id("IMG_0001.JPG", "").unwrap().is_some());
        assert!(db.find_file_id("IMG_0002.JPG", "site1/cam2").unwrap().is_some());

        let updates: Vec<ScanProgress> = rx.try_iter().collect();
        assert!(matches!(updates.first(), Some(ScanProgress::Started { total_files: 2 })));
        assert!(matches!(updates.last(), Some(ScanProgress::Completed { added: 2, existing: 0 })));

        // Rescanning adds nothing new.
        let again = scanner.scan_directory(dir.path(), &db, None).unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.existing, 2);
        assert_eq!(db.count_files().unwrap(), 2);
    }
}
