//! Streaming classification API: emit batches as they complete.
//!
//! The eager [`crate::process::classify`] returns only after every batch
//! settles and the workbook is rewritten. For long trial balances, callers
//! that want live progress (a UI table filling in, rows persisted as they
//! arrive) can consume this stream instead and do their own write-back.
//!
//! Batches are emitted in completion order; sort by
//! [`BatchResult::batch_index`] (or use `row_offset`) if order matters.

use crate::config::ClassifyConfig;
use crate::error::{BatchError, TbClassifyError};
use crate::output::BatchResult;
use crate::pipeline::{classify, input, reader, reshape};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of batch results.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<BatchResult, BatchError>> + Send>>;

/// Classify a trial balance, streaming batch results as they are ready.
///
/// The reshape (when `config.reshape_first` is set) and entry extraction
/// happen before the stream is returned, so layout problems surface as a
/// fatal `Err` here rather than mid-stream. A batch whose call failed
/// outright arrives as `Err(BatchError)`; the stream continues with the
/// remaining batches. A batch with a misaligned response arrives as `Ok`
/// with [`BatchResult::error`] set — its aligned prefix is still usable,
/// so it is not demoted to `Err`.
pub async fn classify_stream(
    input_str: impl AsRef<str>,
    config: &ClassifyConfig,
) -> Result<BatchStream, TbClassifyError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming classification: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let bytes = tokio::fs::read(resolved.path())
        .await
        .map_err(|e| TbClassifyError::Internal(format!("read input: {e}")))?;

    classify_stream_from_bytes(&bytes, config).await
}

/// In-memory variant of [`classify_stream`].
pub async fn classify_stream_from_bytes(
    bytes: &[u8],
    config: &ClassifyConfig,
) -> Result<BatchStream, TbClassifyError> {
    let workbook = if config.reshape_first {
        reshape::reshape_with_report(bytes, config)?.0
    } else {
        bytes.to_vec()
    };

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
    info!(rows = entries.len(), batches = batches.len(), "streaming batches");

    let client = Arc::new(classify::ClassifierClient::new(config)?);

    let s = stream::iter(batches.into_iter().map(move |batch| {
        let client = Arc::clone(&client);
        async move {
            let result = client.classify_batch(batch).await;
            batch_to_stream_item(result)
        }
    }))
    .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

/// Map a finished batch to a stream item.
///
/// `CallFailed` and `Timeout` carry only empty placeholder rows, so the
/// `BatchResult` adds nothing over the error itself. A `CountMismatch`
/// batch still holds its aligned classification prefix; dropping those rows
/// would make them unrecoverable for consumers doing their own write-back,
/// so the result is kept and the error travels inside it.
fn batch_to_stream_item(mut result: BatchResult) -> Result<BatchResult, BatchError> {
    match result.error.take() {
        Some(err @ (BatchError::CallFailed { .. } | BatchError::Timeout { .. })) => Err(err),
        other => {
            result.error = other;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Classification;
    use crate::pipeline::reshape::serialize;
    use umya_spreadsheet::new_file;

    fn batch_result(error: Option<BatchError>, rows: Vec<Classification>) -> BatchResult {
        BatchResult {
            batch_index: 0,
            row_offset: 0,
            rows,
            input_tokens: 10,
            output_tokens: 5,
            duration_ms: 100,
            retries: 0,
            error,
        }
    }

    #[test]
    fn count_mismatch_keeps_aligned_prefix_in_stream() {
        // a short response classified the first row; the prefix must
        // survive to stream consumers doing their own write-back
        let rows = vec![
            Classification::new("Asset", "Cash and Cash Equivalents", "Bank Balances", "Bank Balances"),
            Classification::default(),
        ];
        let result = batch_result(
            Some(BatchError::CountMismatch {
                batch: 0,
                expected: 2,
                got: 1,
            }),
            rows,
        );

        let item = batch_to_stream_item(result).expect("mismatch batch must stay Ok");
        assert_eq!(item.rows[0].account_type, "Asset");
        assert!(item.rows[1].is_empty());
        assert!(matches!(
            item.error,
            Some(BatchError::CountMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn call_failures_surface_as_stream_errors() {
        let failed = batch_result(
            Some(BatchError::CallFailed {
                batch: 0,
                retries: 3,
                detail: "HTTP 503".into(),
            }),
            vec![Classification::default(); 2],
        );
        assert!(matches!(
            batch_to_stream_item(failed),
            Err(BatchError::CallFailed { .. })
        ));

        let timed_out = batch_result(
            Some(BatchError::Timeout { batch: 0, secs: 60 }),
            vec![Classification::default(); 2],
        );
        assert!(matches!(
            batch_to_stream_item(timed_out),
            Err(BatchError::Timeout { .. })
        ));
    }

    #[test]
    fn clean_batches_pass_through() {
        let ok = batch_result(None, vec![Classification::new("Asset", "a", "b", "c")]);
        let item = batch_to_stream_item(ok).unwrap();
        assert!(item.error.is_none());
        assert_eq!(item.rows.len(), 1);
    }

    #[tokio::test]
    async fn empty_sheet_fails_before_streaming() {
        let book = new_file();
        let bytes = serialize(&book).unwrap();
        let config = ClassifyConfig::builder()
            .api_key("test-key")
            .reshape_first(false)
            .build()
            .unwrap();
        let err = classify_stream_from_bytes(&bytes, &config).await;
        assert!(matches!(
            err,
            Err(TbClassifyError::EmptySheet { .. }) | Err(TbClassifyError::NoWorksheets)
        ));
    }
}
