use crate::db::CategoryRow;
use crate::detector::CategoryMap;

/// Detection category code reserved for images with no detections.
pub const NO_DETECTION_CODE: &str = "0";

/// Label given to the reserved category when the detector supplies none.
pub const NO_DETECTION_LABEL: &str = "empty";

/// Rows for `detection_categories`. The reserved no-detection category is
/// always present; when the detector omits it, it is synthesized and placed
/// first.
pub fn reconcile_detection_categories(categories: Option<&CategoryMap>) -> Vec<CategoryRow> {
    let mut rows = Vec::with_capacity(categories.map_or(0, |c| c.len()) + 1);

    let has_reserved = categories.is_some_and(|c| c.contains_key(NO_DETECTION_CODE));
    if !has_reserved {
        rows.push(CategoryRow::new(NO_DETECTION_CODE, NO_DETECTION_LABEL));
    }

    if let Some(categories) = categories {
        rows.extend(
            categories
                .iter()
                .map(|(code, label)| CategoryRow::new(code.as_str(), label.as_str())),
        );
    }

    rows
}

/// Rows for `classification_categories`, exactly as supplied. A missing map
/// yields no rows.
pub fn reconcile_classification_categories(
    categories: Option<&CategoryMap>,
) -> Vec<CategoryRow> {
    categories
        .map(|categories| {
            categories
                .iter()
                .map(|(code, label)| CategoryRow::new(code.as_str(), label.as_str()))
                .collect()
        })
        .unwrap_or_default()
}
