//! Import accounting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One document rejected by a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Index the document was destined for.
    pub index: Option<String>,
    /// Document identifier, absent for backend-generated ids.
    pub id: Option<String>,
    /// HTTP-like status reported for the item.
    pub status: u16,
    /// Error object as returned by the backend.
    pub error: Value,
}

/// Averaged throughput samples, in documents per second.
///
/// A field is `None` when no batch produced a measurable sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Speed of turning records into bulk descriptors.
    pub transform_docs_per_sec: Option<f64>,
    /// Speed of the bulk write as seen by the caller (round trip).
    pub bulk_request_docs_per_sec: Option<f64>,
    /// Speed of the bulk write as reported by the backend (`took`).
    pub indexing_docs_per_sec: Option<f64>,
}

/// Accumulated outcome of one import call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Index the records were written to.
    pub index: String,
    /// Records sent to the backend.
    pub total: usize,
    /// Records the backend rejected.
    pub errors: usize,
    /// Details of every rejected record.
    pub error_items: Vec<BulkItemError>,
    /// Number of bulk calls issued.
    pub batches: usize,
    /// Averaged throughput.
    pub measurements: Measurements,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ImportResult {
    /// Create an empty result for the given index.
    pub fn new(index: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            index: index.into(),
            total: 0,
            errors: 0,
            error_items: Vec::new(),
            batches: 0,
            measurements: Measurements::default(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Records that were written without an error.
    pub fn succeeded(&self) -> usize {
        self.total.saturating_sub(self.errors)
    }

    /// Check if every record was written.
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_result_is_clean() {
        let result = ImportResult::new("articles");

        assert_eq!(result.index, "articles");
        assert_eq!(result.total, 0);
        assert!(result.is_clean());
        assert_eq!(result.measurements, Measurements::default());
    }

    #[test]
    fn test_succeeded() {
        let mut result = ImportResult::new("articles");
        result.total = 10;
        result.errors = 3;

        assert_eq!(result.succeeded(), 7);
        assert!(!result.is_clean());
    }
}
