//! # tb-classify
//!
//! Reshape trial-balance spreadsheets into a canonical layout and classify
//! every account line into a four-level chart-of-accounts hierarchy using an
//! LLM, with OCR-backed table extraction for scanned PDFs.
//!
//! ## Why this crate?
//!
//! Trial balances arrive as whatever the accounting package exported:
//! title rows above the data, legacy header names, columns in arbitrary
//! order, decorative merges. Hand-mapping each account line to a reporting
//! hierarchy is slow and error-prone. This crate normalises the layout
//! mechanically, then lets a chat-completion model do the account mapping
//! against a fixed taxonomy — and writes the result back into the workbook
//! with the original styling intact.
//!
//! ## Pipeline Overview
//!
//! ```text
//! workbook (.xlsx, path or URL)
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Reshape   header detection, canonical columns, style-preserving
//!  ├─ 3. Read      typed grid with merge metadata (calamine)
//!  ├─ 4. Classify  concurrent batched chat-completion calls, CSV response
//!  ├─ 5. Write     fill the four classification columns by row index
//!  └─ 6. Output    xlsx bytes + per-row classifications + run stats
//!
//! PDF (URL) ── OCR service ── pipe-framed text ── padded table ── .xlsx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tb_classify::{classify, ClassifyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key taken from OPENAI_API_KEY when not set in the config
//!     let config = ClassifyConfig::default();
//!     let output = classify("trial_balance.xlsx", &config).await?;
//!     std::fs::write("classified.xlsx", &output.workbook)?;
//!     eprintln!(
//!         "{} of {} rows classified, {} tokens",
//!         output.stats.classified_rows,
//!         output.stats.total_rows,
//!         output.stats.total_input_tokens + output.stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tbclassify` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tb-classify = { version = "0.3", default-features = false }
//! ```
//!
//! ## Error model
//!
//! Fatal problems (unreadable workbook, unrecognised layout, missing API
//! key) return [`TbClassifyError`]. A single failed classification batch is
//! *not* fatal: it is recorded as a [`BatchError`] inside the output and the
//! remaining batches still land in the workbook.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod grid;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod taxonomy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClassifyConfig, ClassifyConfigBuilder, ProgressCallback};
pub use error::{BatchError, TbClassifyError};
pub use grid::{Cell, CellValue, MergeRange, SheetGrid};
pub use output::{
    BatchResult, Classification, ClassifyOutput, ExtractOutput, ReshapeOutput, RunStats,
    WorkbookInfo,
};
pub use process::{
    classify, classify_from_bytes, extract_tables, inspect, reshape, reshape_from_bytes,
};
pub use progress::ProcessProgressCallback;
pub use stream::{classify_stream, classify_stream_from_bytes, BatchStream};
pub use taxonomy::Taxonomy;
