//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! ## Why download to a temp file?
//!
//! The workbook is opened twice on the classify path (once read-only for the
//! grid, once read-write for the reshape), so a local copy avoids fetching a
//! signed URL twice before it expires. Downloading to a `TempDir` ensures
//! cleanup happens automatically when `ResolvedInput` is dropped, even if
//! the process panics. We validate the xlsx magic bytes (`PK\x03\x04`)
//! before returning so callers get a meaningful error rather than a zip
//! parser crash.

use crate::error::TbClassifyError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Zip local-file-header magic; every xlsx starts with it.
const XLSX_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// The resolved input — either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; workbook downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the workbook regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local xlsx file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, TbClassifyError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and xlsx magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, TbClassifyError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(TbClassifyError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && magic != XLSX_MAGIC {
                return Err(TbClassifyError::NotAWorkbook { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TbClassifyError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TbClassifyError::FileNotFound { path });
        }
    }

    debug!("Resolved local workbook: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TbClassifyError> {
    info!("Downloading workbook from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TbClassifyError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TbClassifyError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TbClassifyError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TbClassifyError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    let temp_dir = TempDir::new().map_err(|e| TbClassifyError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TbClassifyError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if bytes.len() >= 4 && bytes[..4] != XLSX_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(TbClassifyError::NotAWorkbook {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TbClassifyError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Extract a reasonable filename from the URL path.
///
/// Signed storage URLs carry the object name in the path; query parameters
/// (token, expiry) are ignored.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.xlsx".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/tb.xlsx"));
        assert!(is_url("http://example.com/tb.xlsx"));
        assert!(!is_url("/tmp/tb.xlsx"));
        assert!(!is_url("tb.xlsx"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(
            extract_filename("https://example.com/files/trial_balance.xlsx?token=abc"),
            "trial_balance.xlsx"
        );
        assert_eq!(extract_filename("https://example.com/"), "downloaded.xlsx");
    }

    #[tokio::test]
    async fn rejects_non_workbook_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7 not a workbook").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await;
        assert!(matches!(err, Err(TbClassifyError::NotAWorkbook { .. })));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.xlsx", 5).await;
        assert!(matches!(err, Err(TbClassifyError::FileNotFound { .. })));
    }
}
