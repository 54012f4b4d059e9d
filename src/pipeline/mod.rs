//! Pipeline stages for trial-balance processing.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the OCR provider) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! classify:  input ──▶ reader ──▶ reshape ──▶ classify ──▶ writer
//!            (URL/path) (grid)    (canonical)  (LLM CSV)    (xlsx bytes)
//!
//! extract:   url ──▶ extract ──▶ writer-side workbook build
//!                    (OCR text → padded rows)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local file
//! 2. [`reader`]   — parse xlsx bytes into typed [`crate::grid::SheetGrid`]s
//! 3. [`reshape`]  — header detection and canonical column layout, in place
//!    on the workbook so styles travel with their cells
//! 4. [`classify`] — drive the classification call with retry/backoff; the
//!    only stage with LLM network I/O
//! 5. [`writer`]   — fill the four classification columns by row index
//! 6. [`extract`]  — OCR a PDF URL and parse the pipe-framed text to a table

pub mod classify;
pub mod extract;
pub mod input;
pub mod reader;
pub mod reshape;
pub mod writer;
