//! Row keys and bounding box encoding for detection output.

/// Run-scoped id counters for detection and classification rows.
///
/// Both sequences start at 1 and advance by one per row, across the whole
/// run rather than per image.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next_detection: i64,
    next_classification: i64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self {
            next_detection: 1,
            next_classification: 1,
        }
    }

    pub fn next_detection(&mut self) -> i64 {
        let id = self.next_detection;
        self.next_detection += 1;
        id
    }

    pub fn next_classification(&mut self) -> i64 {
        let id = self.next_classification;
        self.next_classification += 1;
        id
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a box as `"x, y, w, h"`. Anything other than exactly four values
/// encodes as the empty string.
pub fn serialize_bbox(bbox: Option<&[f64]>) -> String {
    match bbox {
        Some(values) if values.len() == 4 => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

/// Decode a box written by [`serialize_bbox`].
pub fn parse_bbox(text: &str) -> Option<[f64; 4]> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    values.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let mut ids = SequentialIds::new();
        assert_eq!(ids.next_detection(), 1);
        assert_eq!(ids.next_detection(), 2);
        assert_eq!(ids.next_classification(), 1);
        assert_eq!(ids.next_detection(), 3);
        assert_eq!(ids.next_classification(), 2);
    }

    #[test]
    fn test_fresh_counters_per_run() {
        let mut first = SequentialIds::new();
        first.next_detection();
        first.next_detection();

        let mut second = SequentialIds::default();
        assert_eq!(second.next_detection(), 1);
    }

    #[test]
    fn test_bbox_serialization() {
        let bbox = [1.0, 2.0, 3.5, 4.25];
        let text = serialize_bbox(Some(&bbox));
        assert_eq!(text, "1, 2, 3.5, 4.25");
        assert_eq!(parse_bbox(&text), Some(bbox));
    }

    #[test]
    fn test_partial_bbox_is_absent() {
        assert_eq!(serialize_bbox(Some(&[0.1, 0.2, 0.3])), "");
        assert_eq!(serialize_bbox(Some(&[0.1, 0.2, 0.3, 0.4, 0.5])), "");
        assert_eq!(serialize_bbox(Some(&[])), "");
        assert_eq!(serialize_bbox(None), "");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_bbox(""), None);
        assert_eq!(parse_bbox("1, 2, 3"), None);
        assert_eq!(parse_bbox("1, 2, x, 4"), None);
        assert_eq!(parse_bbox("0.0123, 0.5, 0.25, 0.125"), Some([0.0123, 0.5, 0.25, 0.125]));
    }
}
