//! Batched account classification against an OpenAI-compatible
//! chat-completions API.
//!
//! The client never returns `Err` for a single batch: every failure mode
//! (exhausted retries, timeout, misaligned response) is folded into the
//! [`BatchResult`] so the driver can keep going and the caller sees partial
//! success instead of losing the whole run to one bad batch.
//!
//! ## Response parsing
//!
//! The model answers one CSV line per entry. Taxonomy labels themselves
//! contain commas ("Property, plant and equipment"), so a naive four-way
//! split corrupts them. Parsing is therefore taxonomy-guided: comma segments
//! are greedily re-joined and matched against the known labels level by
//! level, falling back to a plain first-three-commas split only when the
//! taxonomy has no matching path.

use crate::config::ClassifyConfig;
use crate::error::{BatchError, TbClassifyError};
use crate::grid::SheetGrid;
use crate::output::{BatchResult, Classification};
use crate::prompts;
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One classification work unit.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 0-based batch index.
    pub index: usize,
    /// Absolute index of the first entry in this batch.
    pub row_offset: usize,
    /// Entry texts, in sheet order.
    pub entries: Vec<String>,
}

/// One account entry extracted from a reshaped grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 0-based data-row index (Excel row = `row + 2`).
    pub row: usize,
    pub text: String,
}

/// Extract classification entries from a reshaped grid.
///
/// Row 0 is the header. For each data row, the Account Description cell is
/// used; when blank, the first visible non-blank cell of the row. Rows with
/// no visible value at all are skipped (and keep no classification slot).
pub fn extract_entries(grid: &SheetGrid) -> Vec<Entry> {
    let description_col = grid
        .rows
        .first()
        .and_then(|header| {
            header.iter().position(|c| {
                c.value
                    .to_display()
                    .trim()
                    .eq_ignore_ascii_case("Account Description")
            })
        });

    let mut entries = Vec::new();
    for (i, row) in grid.rows.iter().enumerate().skip(1) {
        let described = description_col
            .and_then(|c| row.get(c))
            .filter(|c| !c.hidden && !c.value.is_blank())
            .map(|c| c.value.to_display());

        let text = described.or_else(|| {
            row.iter()
                .find(|c| !c.hidden && !c.value.is_blank())
                .map(|c| c.value.to_display())
        });

        if let Some(text) = text {
            entries.push(Entry { row: i - 1, text });
        }
    }
    entries
}

/// Split entries into fixed-size batches carrying their absolute offsets.
pub fn split_batches(entries: &[Entry], batch_size: usize) -> Vec<Batch> {
    entries
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            row_offset: index * batch_size.max(1),
            entries: chunk.iter().map(|e| e.text.clone()).collect(),
        })
        .collect()
}

// ── Wire types (OpenAI chat-completions) ─────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// A classification API client bound to one config.
pub struct ClassifierClient {
    http: reqwest::Client,
    config: ClassifyConfig,
    api_key: String,
    system_prompt: String,
}

impl ClassifierClient {
    /// Build a client, resolving the API key from config or environment.
    pub fn new(config: &ClassifyConfig) -> Result<Self, TbClassifyError> {
        let api_key = config.resolve_api_key()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| TbClassifyError::Internal(format!("http client: {e}")))?;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::classification_system_prompt(&config.taxonomy));
        Ok(Self {
            http,
            config: config.clone(),
            api_key,
            system_prompt,
        })
    }

    /// Classify one batch. Failures are recorded in the result, never raised.
    pub async fn classify_batch(&self, batch: Batch) -> BatchResult {
        let start = Instant::now();
        let expected = batch.entries.len();
        let user_prompt = prompts::classification_user_prompt(&batch.entries);

        let mut retries: u8 = 0;
        let mut last_error = String::new();
        let mut attempt: u32 = 0;

        loop {
            match self.call_api(&user_prompt).await {
                Ok((content, usage)) => {
                    let (rows, error) =
                        parse_batch_response(&content, expected, batch.index, &self.config.taxonomy);
                    if error.is_some() {
                        warn!(batch = batch.index, "response line count mismatch");
                    }
                    return BatchResult {
                        batch_index: batch.index,
                        row_offset: batch.row_offset,
                        rows,
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries,
                        error,
                    };
                }
                Err(CallError::Permanent(msg)) => {
                    last_error = msg;
                    break;
                }
                Err(CallError::Timeout) if attempt >= self.config.max_retries => {
                    let error = BatchError::Timeout {
                        batch: batch.index,
                        secs: self.config.api_timeout_secs,
                    };
                    return self.failed(batch, start, retries, error);
                }
                Err(CallError::Transient(msg)) if attempt >= self.config.max_retries => {
                    last_error = msg;
                    break;
                }
                Err(CallError::Timeout) | Err(CallError::Transient(_)) => {
                    let delay = backoff_delay(self.config.retry_backoff_ms, attempt);
                    debug!(
                        batch = batch.index,
                        attempt, delay_ms = delay, "retrying classification call"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                    retries = retries.saturating_add(1);
                }
            }
        }

        let error = BatchError::CallFailed {
            batch: batch.index,
            retries,
            detail: last_error,
        };
        self.failed(batch, start, retries, error)
    }

    fn failed(
        &self,
        batch: Batch,
        start: Instant,
        retries: u8,
        error: BatchError,
    ) -> BatchResult {
        BatchResult {
            batch_index: batch.index,
            row_offset: batch.row_offset,
            rows: vec![Classification::default(); batch.entries.len()],
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
            error: Some(error),
        }
    }

    /// One raw API call. Distinguishes transient from permanent failures so
    /// the retry loop never hammers a bad request.
    async fn call_api(&self, user_prompt: &str) -> Result<(String, ChatUsage), CallError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Timeout
                } else {
                    CallError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let msg = format!("HTTP {status}: {}", truncate(&body, 300));
            // 429 and 5xx are worth retrying; other 4xx are not.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(CallError::Transient(msg))
            } else {
                Err(CallError::Permanent(msg))
            };
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transient(format!("malformed response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::Transient("response had no choices".to_string()))?;

        Ok((content, parsed.usage.unwrap_or_default()))
    }
}

/// Exponential backoff delay for a retry attempt.
///
/// The exponent is capped: `max_retries` is user-settable with no upper
/// bound, and an unchecked `base << attempt` overflows once the attempt
/// count reaches the shift width. Past the cap the delay saturates instead
/// of growing.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64 << attempt.min(10))
}

enum CallError {
    /// Worth retrying (network, timeout, 429, 5xx).
    Transient(String),
    Timeout,
    /// Retrying would fail identically (bad key, 400).
    Permanent(String),
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
///
/// Error bodies echoed into batch details can contain multi-byte text; a
/// byte-index slice would panic on a straddled character.
pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

/// Parse the full batch response into aligned classifications.
///
/// Returns the rows (always `expected` long, padded with empties) and the
/// `CountMismatch` error when the line count was off.
pub fn parse_batch_response(
    content: &str,
    expected: usize,
    batch_index: usize,
    taxonomy: &Taxonomy,
) -> (Vec<Classification>, Option<BatchError>) {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .collect();

    let error = if lines.len() != expected {
        Some(BatchError::CountMismatch {
            batch: batch_index,
            expected,
            got: lines.len(),
        })
    } else {
        None
    };

    let mut rows: Vec<Classification> = lines
        .iter()
        .take(expected)
        .map(|l| parse_classification_line(l, taxonomy))
        .collect();
    rows.resize_with(expected, Classification::default);

    (rows, error)
}

/// Parse one CSV line into a four-level classification.
pub fn parse_classification_line(line: &str, taxonomy: &Taxonomy) -> Classification {
    let segments: Vec<&str> = line.split(',').map(str::trim).collect();
    if segments.is_empty() {
        return Classification::default();
    }

    if let Some(c) = parse_guided(&segments, taxonomy) {
        return c;
    }
    parse_plain(&segments)
}

/// Greedy taxonomy-guided parse. Each level consumes as many comma
/// segments as needed to reconstruct a known label; longest match wins so
/// "Accounting, Audit, Tax and Secretarial Expenses" stays intact.
fn parse_guided(segments: &[&str], taxonomy: &Taxonomy) -> Option<Classification> {
    let (account_type, mut pos) = match_level(segments, 0, |s| {
        taxonomy.canonical_account_type(s).map(str::to_string)
    })?;
    let (primary, next) = match_level(segments, pos, |s| {
        taxonomy.canonical_primary(&account_type, s).map(str::to_string)
    })?;
    pos = next;
    let (secondary, next) = match_level(segments, pos, |s| {
        taxonomy
            .canonical_secondary(&account_type, &primary, s)
            .map(str::to_string)
    })?;
    pos = next;

    // Everything left is the tertiary; normalise to the canonical spelling
    // when the taxonomy recognises it, keep the raw text otherwise.
    let raw_tertiary = join(segments, pos, segments.len());
    let tertiary = taxonomy
        .canonical_tertiary(&account_type, &primary, &secondary, &raw_tertiary)
        .map(str::to_string)
        .unwrap_or(raw_tertiary);

    Some(Classification {
        account_type,
        primary,
        secondary,
        tertiary,
    })
}

/// Match one taxonomy level starting at `pos`, preferring the longest
/// segment run that forms a known label. Returns the canonical label and
/// the next unconsumed position.
fn match_level<F>(segments: &[&str], pos: usize, lookup: F) -> Option<(String, usize)>
where
    F: Fn(&str) -> Option<String>,
{
    for end in (pos + 1..=segments.len()).rev() {
        let candidate = join(segments, pos, end);
        if let Some(canonical) = lookup(&candidate) {
            return Some((canonical, end));
        }
    }
    None
}

fn join(segments: &[&str], start: usize, end: usize) -> String {
    segments[start..end.min(segments.len())].join(", ")
}

/// Fallback: first three segments are the first three levels, the rest is
/// the tertiary. Missing trailing levels stay empty.
fn parse_plain(segments: &[&str]) -> Classification {
    let get = |i: usize| segments.get(i).map(|s| s.to_string()).unwrap_or_default();
    Classification {
        account_type: get(0),
        primary: get(1),
        secondary: get(2),
        tertiary: if segments.len() > 3 {
            join(segments, 3, segments.len())
        } else {
            String::new()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SheetGrid;

    fn grid(rows: &[&[&str]]) -> SheetGrid {
        SheetGrid::from_text_rows(
            "Sheet1",
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn entries_prefer_description_column() {
        let g = grid(&[
            &["Account Code", "Account Description", "Debit Amount"],
            &["1001", "Cash at bank", "2500"],
            &["1002", "", "100"],
            &["", "", ""],
        ]);
        let entries = extract_entries(&g);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], Entry { row: 0, text: "Cash at bank".into() });
        // blank description falls back to the first non-blank cell
        assert_eq!(entries[1], Entry { row: 1, text: "1002".into() });
    }

    #[test]
    fn batches_carry_absolute_offsets() {
        let entries: Vec<Entry> = (0..95)
            .map(|i| Entry { row: i, text: format!("acct {i}") })
            .collect();
        let batches = split_batches(&entries, 40);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].row_offset, 0);
        assert_eq!(batches[1].row_offset, 40);
        assert_eq!(batches[2].row_offset, 80);
        assert_eq!(batches[2].entries.len(), 15);
    }

    #[test]
    fn guided_parse_survives_comma_labels() {
        let t = Taxonomy::default();
        let c = parse_classification_line(
            "Asset, Property, plant and equipment, Office Machine and Equipment, Office Equipment",
            &t,
        );
        assert_eq!(c.account_type, "Asset");
        assert_eq!(c.primary, "Property, plant and equipment");
        assert_eq!(c.secondary, "Office Machine and Equipment");
        assert_eq!(c.tertiary, "Office Equipment");
    }

    #[test]
    fn guided_parse_survives_comma_tertiary() {
        let t = Taxonomy::default();
        let c = parse_classification_line(
            "Cost/Expense, Administration and Other Expenses, Professional Service Charges, \
             Accounting, Audit, Tax and Secretarial Expenses",
            &t,
        );
        assert_eq!(c.account_type, "Cost/Expense");
        assert_eq!(c.tertiary, "Accounting, Audit, Tax and Secretarial Expenses");
    }

    #[test]
    fn unknown_labels_fall_back_to_plain_split() {
        let t = Taxonomy::default();
        let c = parse_classification_line("Widget, Gadget, Sprocket, Doohickey, Extra", &t);
        assert_eq!(c.account_type, "Widget");
        assert_eq!(c.primary, "Gadget");
        assert_eq!(c.secondary, "Sprocket");
        assert_eq!(c.tertiary, "Doohickey, Extra");
    }

    #[test]
    fn short_line_leaves_trailing_levels_empty() {
        let t = Taxonomy::default();
        let c = parse_classification_line("Mystery, Something", &t);
        assert_eq!(c.account_type, "Mystery");
        assert_eq!(c.primary, "Something");
        assert_eq!(c.secondary, "");
        assert_eq!(c.tertiary, "");
    }

    #[test]
    fn response_count_mismatch_pads_and_reports() {
        let t = Taxonomy::default();
        let (rows, err) = parse_batch_response("Asset, Cash and Cash Equivalents, Bank Balances, Bank Balances", 3, 7, &t);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].account_type, "Asset");
        assert!(rows[1].is_empty());
        assert!(rows[2].is_empty());
        assert!(matches!(
            err,
            Some(BatchError::CountMismatch { batch: 7, expected: 3, got: 1 })
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // multi-byte characters straddling the cut must not panic
        let s = "é".repeat(100);
        assert_eq!(truncate(&s, 79).chars().count(), 79);
        assert_eq!(truncate("short", 79), "short");
        assert_eq!(truncate("", 5), "");
    }

    #[test]
    fn backoff_caps_the_exponent() {
        assert_eq!(backoff_delay(500, 0), 500);
        assert_eq!(backoff_delay(500, 2), 2000);
        // attempts at or past the shift width must not overflow
        assert_eq!(backoff_delay(500, 64), backoff_delay(500, 10));
        assert_eq!(backoff_delay(u64::MAX, 10), u64::MAX);
    }

    #[test]
    fn code_fences_are_ignored() {
        let t = Taxonomy::default();
        let content = "```csv\nAsset, Cash and Cash Equivalents, Bank Balances, Bank Balances\n```";
        let (rows, err) = parse_batch_response(content, 1, 0, &t);
        assert!(err.is_none());
        assert_eq!(rows[0].secondary, "Bank Balances");
    }
}
