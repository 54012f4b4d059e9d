//! Eager top-level entry points: reshape, classify, extract, inspect.
//!
//! These drive the [`crate::pipeline`] stages end to end and return complete
//! outputs. For incremental batch results use [`crate::stream::classify_stream`].

use crate::config::ClassifyConfig;
use crate::error::TbClassifyError;
use crate::output::{
    ClassifyOutput, Classification, ExtractOutput, ReshapeOutput, RunStats, WorkbookInfo,
};
use crate::pipeline::{classify, extract, input, reader, reshape, writer};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Reshape every sheet of a workbook (local path or URL) into the canonical
/// trial-balance layout.
pub async fn reshape(
    input_str: impl AsRef<str>,
    config: &ClassifyConfig,
) -> Result<ReshapeOutput, TbClassifyError> {
    let input_str = input_str.as_ref();
    info!("Starting reshape: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let bytes = read_file(resolved.path()).await?;
    reshape_from_bytes(&bytes, config).await
}

/// In-memory variant of [`reshape`].
pub async fn reshape_from_bytes(
    bytes: &[u8],
    config: &ClassifyConfig,
) -> Result<ReshapeOutput, TbClassifyError> {
    let (workbook, header_rows) = reshape::reshape_with_report(bytes, config)?;
    let sheets = reader::read_workbook(&workbook, Path::new("<reshaped>"))?;
    Ok(ReshapeOutput {
        workbook,
        sheets,
        header_rows,
    })
}

/// Classify a trial balance end to end: optional reshape, batched LLM
/// classification, column write-back.
///
/// Per-batch failures are non-fatal and surface in
/// [`ClassifyOutput::batches`]; the call only fails when every batch failed.
pub async fn classify(
    input_str: impl AsRef<str>,
    config: &ClassifyConfig,
) -> Result<ClassifyOutput, TbClassifyError> {
    let input_str = input_str.as_ref();
    info!("Starting classification: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let bytes = read_file(resolved.path()).await?;
    classify_from_bytes(&bytes, config).await
}

/// In-memory variant of [`classify`].
pub async fn classify_from_bytes(
    bytes: &[u8],
    config: &ClassifyConfig,
) -> Result<ClassifyOutput, TbClassifyError> {
    let run_start = Instant::now();

    // ── Reshape ──────────────────────────────────────────────────────────
    let workbook = if config.reshape_first {
        reshape::reshape_with_report(bytes, config)?.0
    } else {
        bytes.to_vec()
    };

    // ── Extract entries ──────────────────────────────────────────────────
    let grids = reader::read_workbook(&workbook, Path::new("<workbook>"))?;
    let first = grids.first().ok_or(TbClassifyError::NoWorksheets)?;
    let entries = classify::extract_entries(first);
    if entries.is_empty() {
        return Err(TbClassifyError::EmptySheet {
            sheet: first.name.clone(),
            operation: "classify".to_string(),
        });
    }

    let batches = classify::split_batches(&entries, config.batch_size);
    let total_batches = batches.len();
    info!(
        rows = entries.len(),
        batches = total_batches,
        "classifying entries"
    );

    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total_batches, entries.len());
    }

    // ── Run batches concurrently ─────────────────────────────────────────
    let client = Arc::new(classify::ClassifierClient::new(config)?);
    let callback = config.progress_callback.clone();

    let mut results: Vec<_> = stream::iter(batches.into_iter().map(|batch| {
        let client = Arc::clone(&client);
        let callback = callback.clone();
        async move {
            let index = batch.index;
            let rows = batch.entries.len();
            if let Some(cb) = &callback {
                cb.on_batch_start(index, total_batches, rows);
            }
            let result = client.classify_batch(batch).await;
            if let Some(cb) = &callback {
                match &result.error {
                    None => cb.on_batch_complete(index, total_batches, rows),
                    Some(e) => cb.on_batch_error(index, total_batches, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    results.sort_by_key(|r| r.batch_index);

    let succeeded = results.iter().filter(|r| r.error.is_none()).count();
    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(total_batches, succeeded);
    }

    // All batches down means nothing to write back; treat as fatal.
    let failed_batches = total_batches - succeeded;
    if succeeded == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return Err(TbClassifyError::AllBatchesFailed {
            total: total_batches,
            retries: config.max_retries,
            first_error,
        });
    }
    if failed_batches > 0 {
        warn!(failed = failed_batches, total = total_batches, "some batches failed");
    }

    // ── Align classifications to entries ─────────────────────────────────
    let mut classifications = vec![Classification::default(); entries.len()];
    for result in &results {
        for (j, c) in result.rows.iter().enumerate() {
            if let Some(slot) = classifications.get_mut(result.row_offset + j) {
                *slot = c.clone();
            }
        }
    }

    // ── Write back ───────────────────────────────────────────────────────
    let workbook = writer::fill_classifications(&workbook, &entries, &classifications)?;
    let grid = reader::read_workbook(&workbook, Path::new("<workbook>"))?
        .into_iter()
        .next()
        .ok_or(TbClassifyError::NoWorksheets)?;

    // ── Stats ────────────────────────────────────────────────────────────
    let classified_rows = classifications.iter().filter(|c| !c.is_empty()).count();
    let stats = RunStats {
        total_rows: entries.len(),
        classified_rows,
        failed_rows: entries.len() - classified_rows,
        total_batches,
        failed_batches,
        total_input_tokens: results.iter().map(|r| u64::from(r.input_tokens)).sum(),
        total_output_tokens: results.iter().map(|r| u64::from(r.output_tokens)).sum(),
        total_duration_ms: run_start.elapsed().as_millis() as u64,
        llm_duration_ms: results.iter().map(|r| r.duration_ms).sum(),
    };
    info!(
        classified = stats.classified_rows,
        failed = stats.failed_rows,
        duration_ms = stats.total_duration_ms,
        "classification complete"
    );

    Ok(ClassifyOutput {
        workbook,
        classifications,
        batches: results,
        grid,
        stats,
    })
}

/// Extract tabular data from a PDF behind a URL via the OCR service.
///
/// Local paths are rejected: the OCR service fetches the document itself,
/// so it must be given a URL it can reach.
pub async fn extract_tables(
    url: impl AsRef<str>,
    config: &ClassifyConfig,
) -> Result<ExtractOutput, TbClassifyError> {
    let url = url.as_ref();
    if !input::is_url(url) {
        return Err(TbClassifyError::UrlRequired {
            input: url.to_string(),
        });
    }

    let raw_text = extract::ocr_document(url, config).await?;
    let rows = extract::parse_table_text(&raw_text);
    if rows.is_empty() {
        return Err(TbClassifyError::OcrFailed {
            url: url.to_string(),
            detail: "no table rows found in extracted text".to_string(),
        });
    }

    let (workbook, grid) = extract::rows_to_workbook(&rows)?;
    info!(rows = grid.row_count(), cols = grid.col_count(), "extraction complete");

    Ok(ExtractOutput {
        workbook,
        grid,
        raw_text,
    })
}

/// Workbook metadata (sheet names, dimensions, merge counts) without any
/// remote call.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<WorkbookInfo, TbClassifyError> {
    let input_str = input_str.as_ref();
    let config = ClassifyConfig::default();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let bytes = read_file(resolved.path()).await?;
    reader::inspect_workbook(&bytes, resolved.path())
}

async fn read_file(path: &Path) -> Result<Vec<u8>, TbClassifyError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| TbClassifyError::Internal(format!("read {}: {e}", path.display())))
}
