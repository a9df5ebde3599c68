use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// All files under `root` whose extension is in `extensions`, case-insensitively.
pub fn discover_images(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                images.push(path.to_path_buf());
            }
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_images() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("IMG_0001.JPG")).unwrap();
        File::create(dir.path().join("IMG_0002.png")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        fs::create_dir(dir.path().join("cam2")).unwrap();
        File::create(dir.path().join("cam2/IMG_0003.jpeg")).unwrap();

        let extensions = vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()];
        let images = discover_images(dir.path(), &extensions).unwrap();

        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|p| p.extension().unwrap() != "txt"));
    }
}
