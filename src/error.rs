//! Error types for the tb-classify library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TbClassifyError`] — **Fatal**: the run cannot proceed at all
//!   (bad input file, unrecognised sheet layout, missing API key). Returned
//!   as `Err(TbClassifyError)` from the top-level entry points.
//!
//! * [`BatchError`] — **Non-fatal**: a single classification batch failed
//!   (transient API error, malformed response) but the other batches are
//!   fine. Stored inside [`crate::output::BatchResult`] so callers can
//!   inspect partial success rather than losing the whole workbook to one
//!   bad batch.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first batch failure, log and continue, or collect all errors for a
//! post-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tb-classify library.
///
/// Batch-level failures use [`BatchError`] and are stored in
/// [`crate::output::BatchResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum TbClassifyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Workbook not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not an xlsx workbook.
    #[error("File is not a valid xlsx workbook: '{path}'\nFirst bytes: {magic:?}")]
    NotAWorkbook { path: PathBuf, magic: [u8; 4] },

    /// PDF extraction was asked to process a local path.
    ///
    /// The OCR service fetches the document itself, so the input must be a
    /// URL it can reach (typically a signed storage URL).
    #[error("PDF extraction requires an HTTP/HTTPS URL the OCR service can fetch, got '{input}'")]
    UrlRequired { input: String },

    // ── Workbook errors ───────────────────────────────────────────────────
    /// The workbook could not be parsed.
    #[error("Failed to parse workbook '{path}': {detail}")]
    WorkbookParse { path: PathBuf, detail: String },

    /// The workbook could not be re-serialised after editing.
    #[error("Failed to write workbook: {detail}")]
    WorkbookWrite { detail: String },

    /// No row matched the header keywords during reshape.
    #[error(
        "No header row found in sheet '{sheet}'.\n\
         Expected a row containing one of: {keywords}.\n\
         Pass custom keywords via the config if this layout uses different headers."
    )]
    HeaderNotFound { sheet: String, keywords: String },

    /// A sheet contained no data at all.
    #[error("Sheet '{sheet}' is empty — nothing to {operation}")]
    EmptySheet { sheet: String, operation: String },

    /// The workbook has no worksheets.
    #[error("Workbook has no worksheets")]
    NoWorksheets,

    // ── Service errors ────────────────────────────────────────────────────
    /// No API key for the classification service.
    #[error("Classification service is not configured.\nSet OPENAI_API_KEY or provide an api_key in the config.")]
    ClassifierNotConfigured,

    /// No API key for the OCR service.
    #[error("OCR service is not configured.\nSet JIGSAWSTACK_API_KEY or provide an ocr_api_key in the config.")]
    OcrNotConfigured,

    /// The classification API returned a non-retryable error.
    #[error("Classification API error: {message}")]
    ClassifierApiError { message: String },

    /// The OCR API returned an error or an empty extraction.
    #[error("OCR extraction failed for '{url}': {detail}")]
    OcrFailed { url: String, detail: String },

    /// Every batch failed after all retries; output would be empty.
    #[error("All {total} batches failed after {retries} retries each.\nFirst error: {first_error}")]
    AllBatchesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// The API rate-limited us — caller should back off.
    ///
    /// Check `retry_after_secs` for a server-specified delay, or use
    /// exponential backoff if `None`.
    #[error("Rate limit exceeded by the classification service")]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    // ── Taxonomy errors ───────────────────────────────────────────────────
    /// The taxonomy JSON could not be parsed.
    #[error("Invalid taxonomy JSON: {detail}\nExpected {{account type: {{primary: {{secondary: [tertiary]}}}}}}")]
    InvalidTaxonomy { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single classification batch.
///
/// Stored alongside [`crate::output::BatchResult`] when a batch fails.
/// The overall run continues unless ALL batches fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    /// The API call failed after all retries.
    #[error("Batch {batch}: classification call failed after {retries} retries: {detail}")]
    CallFailed {
        batch: usize,
        retries: u8,
        detail: String,
    },

    /// The API call timed out.
    #[error("Batch {batch}: classification call timed out after {secs}s")]
    Timeout { batch: usize, secs: u64 },

    /// The response line count did not match the entry count.
    ///
    /// The aligned prefix is kept; rows past the shorter side get an empty
    /// classification.
    #[error("Batch {batch}: expected {expected} classification lines, got {got}")]
    CountMismatch {
        batch: usize,
        expected: usize,
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_not_found_display() {
        let e = TbClassifyError::HeaderNotFound {
            sheet: "Sheet1".into(),
            keywords: "Account Code, Account".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Sheet1"), "got: {msg}");
        assert!(msg.contains("Account Code"));
    }

    #[test]
    fn all_batches_failed_display() {
        let e = TbClassifyError::AllBatchesFailed {
            total: 4,
            retries: 3,
            first_error: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 batches"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn count_mismatch_display() {
        let e = BatchError::CountMismatch {
            batch: 2,
            expected: 40,
            got: 38,
        };
        let msg = e.to_string();
        assert!(msg.contains("expected 40"));
        assert!(msg.contains("got 38"));
    }

    #[test]
    fn url_required_display() {
        let e = TbClassifyError::UrlRequired {
            input: "/tmp/scan.pdf".into(),
        };
        assert!(e.to_string().contains("/tmp/scan.pdf"));
    }
}
