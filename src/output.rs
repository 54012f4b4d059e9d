//! Output types returned by the top-level entry points.
//!
//! Everything here is `Serialize` so the CLI's `--json` mode and any host
//! application can persist run results without conversion glue.

use crate::error::BatchError;
use crate::grid::SheetGrid;
use serde::{Deserialize, Serialize};

/// A four-level account classification for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub account_type: String,
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

impl Classification {
    pub fn new(
        account_type: impl Into<String>,
        primary: impl Into<String>,
        secondary: impl Into<String>,
        tertiary: impl Into<String>,
    ) -> Self {
        Classification {
            account_type: account_type.into(),
            primary: primary.into(),
            secondary: secondary.into(),
            tertiary: tertiary.into(),
        }
    }

    /// True when every level is empty (a padded placeholder row).
    pub fn is_empty(&self) -> bool {
        self.account_type.is_empty()
            && self.primary.is_empty()
            && self.secondary.is_empty()
            && self.tertiary.is_empty()
    }
}

/// Result of one classification batch.
///
/// `row_offset` is the absolute 0-based index of the batch's first entry
/// within the full entry list; batches completing out of order re-align
/// through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// 0-based batch index.
    pub batch_index: usize,
    /// Absolute index of the first row covered by this batch.
    pub row_offset: usize,
    /// One classification per entry, input order. Padded with empty
    /// classifications when the response was short.
    pub rows: Vec<Classification>,
    /// Prompt tokens reported by the API (0 when unreported).
    pub input_tokens: u32,
    /// Completion tokens reported by the API (0 when unreported).
    pub output_tokens: u32,
    /// Wall-clock duration of the batch including retries.
    pub duration_ms: u64,
    /// Retries consumed before success or giving up.
    pub retries: u8,
    /// Set when the batch failed or the response was misaligned.
    pub error: Option<BatchError>,
}

/// Aggregate statistics for a classification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Data rows found after the header.
    pub total_rows: usize,
    /// Rows that received a non-empty classification.
    pub classified_rows: usize,
    /// Rows left unclassified by failed or short batches.
    pub failed_rows: usize,
    /// Batches issued.
    pub total_batches: usize,
    /// Batches that failed after retries.
    pub failed_batches: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// End-to-end duration including reshape and write-back.
    pub total_duration_ms: u64,
    /// Time spent in classification API calls.
    pub llm_duration_ms: u64,
}

/// Output of [`crate::process::classify`].
pub struct ClassifyOutput {
    /// The workbook with classification columns filled, serialised to xlsx.
    pub workbook: Vec<u8>,
    /// One classification per data row, aligned to sheet order.
    pub classifications: Vec<Classification>,
    /// Per-batch results, sorted by `batch_index`.
    pub batches: Vec<BatchResult>,
    /// Grid of the first worksheet after write-back.
    pub grid: SheetGrid,
    pub stats: RunStats,
}

/// Output of [`crate::process::reshape`].
pub struct ReshapeOutput {
    /// The reshaped workbook serialised to xlsx.
    pub workbook: Vec<u8>,
    /// Grids of every worksheet after the transform.
    pub sheets: Vec<SheetGrid>,
    /// Header row index (0-based) found in each source sheet, by name.
    pub header_rows: Vec<(String, usize)>,
}

/// Output of [`crate::process::extract_tables`].
pub struct ExtractOutput {
    /// Workbook holding the extracted table, serialised to xlsx.
    pub workbook: Vec<u8>,
    /// The extracted table as a grid.
    pub grid: SheetGrid,
    /// Raw OCR text, kept for debugging extraction heuristics.
    pub raw_text: String,
}

/// Workbook metadata returned by [`crate::process::inspect`].
///
/// Produced without any remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookInfo {
    pub sheet_names: Vec<String>,
    /// (rows, cols) per sheet, same order as `sheet_names`.
    pub dimensions: Vec<(usize, usize)>,
    /// Merged-region count per sheet.
    pub merge_counts: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_classification() {
        assert!(Classification::default().is_empty());
        assert!(!Classification::new("Asset", "", "", "").is_empty());
    }

    #[test]
    fn batch_result_serialises() {
        let b = BatchResult {
            batch_index: 1,
            row_offset: 40,
            rows: vec![Classification::new("Asset", "A", "B", "C")],
            input_tokens: 100,
            output_tokens: 20,
            duration_ms: 1500,
            retries: 0,
            error: None,
        };
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("\"row_offset\":40"));
        assert!(json.contains("Asset"));
    }
}
