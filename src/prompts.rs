//! Prompts for the classification and OCR services.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the default behaviour (e.g.
//!    tightening the CSV output rules) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without any live API call, making prompt regressions easy to catch.
//!
//! Callers can override both via [`crate::config::ClassifyConfig`]; the
//! functions here are used only when no override is provided.

use crate::taxonomy::Taxonomy;

/// Build the classification system prompt with the taxonomy embedded.
///
/// Used when `ClassifyConfig::system_prompt` is `None`.
pub fn classification_system_prompt(taxonomy: &Taxonomy) -> String {
    format!(
        "You are a professional accountant with expertise in financial statement \
         classification. You have access to a comprehensive classification structure \
         for trial balance entries. The structure is organized hierarchically as: \
         {{<account type>: {{<primary classification>: {{<secondary classification>: \
         [<tertiary classification>]}}}}}}.\n\n\
         Classification Structure:\n{}",
        taxonomy.to_json_pretty()
    )
}

/// Build the user prompt for one batch of entries.
///
/// Demands a CSV-only response so the parser in
/// [`crate::pipeline::classify`] never has to strip prose. One line per
/// entry, in input order — the row-alignment invariant depends on it.
pub fn classification_user_prompt(entries: &[String]) -> String {
    format!(
        "Using the provided classification structure, classify each entry into its \
         account type, primary, secondary, and tertiary classification. Return a \
         response of ONLY a valid comma-separated (CSV) list of classifications \
         (in the format <account type>, <primary classification>, \
         <secondary classification>, <tertiary classification>), one line per entry, \
         maintaining the exact order of the input. Do not add commentary, headers, \
         or numbering.\n\nEntries to classify:\n{}",
        entries.join("\n")
    )
}

/// Default prompt sent to the vision-OCR service for PDF table extraction.
///
/// The pipe/newline framing is what [`crate::pipeline::extract`] parses; if
/// you override this prompt, keep the same framing.
pub const OCR_TABLE_PROMPT: &str =
    "Extract all text without any AI note by each row seperated by '\n' and each column seperated by | ";
