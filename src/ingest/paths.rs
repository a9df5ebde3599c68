//! Mapping detector-reported paths onto catalog keys.

/// Split a root-relative path into `(file_name, relative_path)`.
///
/// Both `/` and `\` count as separators; the directory part is re-joined with
/// `/`. The catalog importer stores rows through this same function, so keys
/// built here compare equal to catalog keys.
pub fn split_catalog_key(path: &str) -> (String, String) {
    match path.rfind(|c| c == '/' || c == '\\') {
        Some(pos) => {
            let file_name = path[pos + 1..].to_string();
            let directory = path[..pos].replace('\\', "/");
            (file_name, directory)
        }
        None => (path.to_string(), String::new()),
    }
}

/// Compute the catalog key for a detector path, or `None` when the path lies
/// outside `truncation_prefix` (an image from another dataset).
///
/// An empty prefix keeps every path as-is. Prefix matching is ordinal.
pub fn normalize(raw_path: &str, truncation_prefix: &str) -> Option<(String, String)> {
    if truncation_prefix.is_empty() {
        return Some(split_catalog_key(raw_path));
    }
    let remainder = raw_path.strip_prefix(truncation_prefix)?;
    Some(split_catalog_key(remainder))
}
