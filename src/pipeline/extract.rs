//! PDF table extraction through a remote vision-OCR service.
//!
//! The OCR service fetches the document itself, so the input must be a URL
//! it can reach (the caller typically passes a signed storage URL). The
//! service is prompted to frame the text as pipe-separated rows; parsing
//! that framing back into a rectangular table happens here, offline.

use crate::config::ClassifyConfig;
use crate::error::TbClassifyError;
use crate::grid::SheetGrid;
use crate::pipeline::reshape::serialize;
use crate::prompts::OCR_TABLE_PROMPT;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use umya_spreadsheet::new_file_empty_worksheet;

/// Sheet name of the extraction output workbook.
pub const EXTRACTED_SHEET_NAME: &str = "Extracted Data";

/// Separator lines like `|---|---|` or `-----` carry no data.
static SEPARATOR_LINE: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a literal character class; it cannot fail to compile.
    Regex::new(r"^[-|\s]+$").unwrap()
});

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    url: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Run OCR on a document URL and return the raw extracted text.
pub async fn ocr_document(url: &str, config: &ClassifyConfig) -> Result<String, TbClassifyError> {
    let api_key = config.resolve_ocr_api_key()?;
    let prompt = config.ocr_prompt.as_deref().unwrap_or(OCR_TABLE_PROMPT);

    info!("Requesting OCR extraction for: {}", url);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api_timeout_secs))
        .build()
        .map_err(|e| TbClassifyError::Internal(format!("http client: {e}")))?;

    let response = http
        .post(&config.ocr_endpoint)
        .header("x-api-key", &api_key)
        .json(&OcrRequest { url, prompt })
        .send()
        .await
        .map_err(|e| TbClassifyError::OcrFailed {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TbClassifyError::OcrFailed {
            url: url.to_string(),
            detail: format!("HTTP {status}: {body}"),
        });
    }

    let parsed: OcrResponse = response.json().await.map_err(|e| TbClassifyError::OcrFailed {
        url: url.to_string(),
        detail: format!("malformed response body: {e}"),
    })?;

    match parsed.context {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(TbClassifyError::OcrFailed {
            url: url.to_string(),
            detail: parsed
                .message
                .unwrap_or_else(|| "empty extraction".to_string()),
        }),
    }
}

/// Parse pipe-framed OCR text into rectangular rows.
///
/// Lines are trimmed; empty and separator lines are dropped. A line wrapped
/// in pipes is split into cells; any other line becomes a one-cell row.
/// Rows are right-padded to the widest row, and exact duplicate rows are
/// dropped (first occurrence wins).
pub fn parse_table_text(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || SEPARATOR_LINE.is_match(line) {
            continue;
        }

        let cells: Vec<String> = if line.starts_with('|') && line.ends_with('|') && line.len() > 1 {
            line.trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect()
        } else {
            vec![line.to_string()]
        };
        rows.push(cells);
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let mut seen = std::collections::HashSet::new();
    rows.retain(|row| seen.insert(row.clone()));

    debug!(rows = rows.len(), cols = width, "parsed OCR table");
    rows
}

/// Build an xlsx workbook holding the extracted rows.
pub fn rows_to_workbook(rows: &[Vec<String>]) -> Result<(Vec<u8>, SheetGrid), TbClassifyError> {
    let mut book = new_file_empty_worksheet();
    let sheet = book
        .new_sheet(EXTRACTED_SHEET_NAME)
        .map_err(|e| TbClassifyError::Internal(format!("new sheet: {e}")))?;

    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet
                    .get_cell_mut((c as u32 + 1, r as u32 + 1))
                    .set_value(value.clone());
            }
        }
    }

    let grid = SheetGrid::from_text_rows(EXTRACTED_SHEET_NAME, rows.to_vec());
    Ok((serialize(&book)?, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_lines_split_into_cells() {
        let rows = parse_table_text("| Account | Debit | Credit |\n| Cash | 2500 | |");
        assert_eq!(rows[0], vec!["Account", "Debit", "Credit"]);
        assert_eq!(rows[1], vec!["Cash", "2500", ""]);
    }

    #[test]
    fn separator_and_blank_lines_dropped() {
        let rows = parse_table_text("| a | b |\n|---|---|\n\n   \n| c | d |");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn plain_lines_become_one_cell_rows_padded() {
        let rows = parse_table_text("Trial Balance 2024\n| Cash | 2500 |");
        assert_eq!(rows[0], vec!["Trial Balance 2024", ""]);
        assert_eq!(rows[1], vec!["Cash", "2500"]);
    }

    #[test]
    fn duplicate_rows_dropped_first_wins() {
        let rows = parse_table_text("| a | b |\n| c | d |\n| a | b |");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b"]);
    }

    #[test]
    fn empty_text_yields_no_rows() {
        assert!(parse_table_text("").is_empty());
        assert!(parse_table_text("\n----\n").is_empty());
    }

    #[test]
    fn workbook_round_trip() {
        let rows = vec![
            vec!["Account".to_string(), "Debit".to_string()],
            vec!["Cash".to_string(), "2500".to_string()],
        ];
        let (bytes, grid) = rows_to_workbook(&rows).unwrap();
        assert_eq!(grid.name, EXTRACTED_SHEET_NAME);
        assert_eq!(grid.row_count(), 2);

        let book = crate::pipeline::reshape::parse(&bytes).unwrap();
        let sheet = book.get_sheet_by_name(EXTRACTED_SHEET_NAME).unwrap();
        assert_eq!(sheet.get_value((1, 2)), "Cash");
    }
}
