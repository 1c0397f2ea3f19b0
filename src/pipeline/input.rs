//! Input resolution: turn a path, URL, or byte buffer into a local PDF file.
//!
//! pdfium opens files by path, so URLs are downloaded into a `TempDir` and
//! in-memory uploads are spooled to a `NamedTempFile`. Both are cleaned up
//! when the [`ResolvedInput`] is dropped. The `%PDF` magic is checked before
//! returning so an empty or foreign upload fails as an input error instead
//! of reaching pdfium.

use crate::error::SlideGenError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: a local path plus whatever keeps temp files alive.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was an in-memory buffer written to a temp file.
    Spooled { file: NamedTempFile },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Spooled { file } => file.path(),
        }
    }

    /// Short human-readable name for messages and the deck title fallback.
    pub fn display_name(&self) -> String {
        match self {
            ResolvedInput::Spooled { .. } => "upload.pdf".to_string(),
            _ => self
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path().display().to_string()),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists, is readable, and
/// starts with the PDF magic.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, SlideGenError> {
    if input.trim().is_empty() {
        return Err(SlideGenError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write an in-memory PDF to a managed temp file after validating it.
pub fn spool_bytes(bytes: &[u8]) -> Result<ResolvedInput, SlideGenError> {
    let label = PathBuf::from("upload.pdf");
    check_magic(bytes, &label)?;

    let mut file = NamedTempFile::new()
        .map_err(|e| SlideGenError::Internal(format!("tempfile: {e}")))?;
    file.write_all(bytes)
        .map_err(|e| SlideGenError::Internal(format!("tempfile write: {e}")))?;
    debug!("Spooled {} bytes to {}", bytes.len(), file.path().display());
    Ok(ResolvedInput::Spooled { file })
}

/// Validate that `head` begins with `%PDF`.
///
/// Zero bytes is reported separately from "some other file type" because
/// the fix differs (re-upload vs. convert the file).
pub fn check_magic(head: &[u8], path: &Path) -> Result<(), SlideGenError> {
    if head.is_empty() {
        return Err(SlideGenError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    if head.len() < PDF_MAGIC.len() || &head[..PDF_MAGIC.len()] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = head.len().min(4);
        magic[..n].copy_from_slice(&head[..n]);
        return Err(SlideGenError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, SlideGenError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(SlideGenError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(SlideGenError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    match std::fs::File::open(&path) {
        Ok(f) => {
            use std::io::Read;
            let mut head = Vec::with_capacity(4);
            f.take(4)
                .read_to_end(&mut head)
                .map_err(|e| SlideGenError::Internal(format!("read '{}': {e}", path.display())))?;
            check_magic(&head, &path)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SlideGenError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(SlideGenError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, SlideGenError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SlideGenError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SlideGenError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SlideGenError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(SlideGenError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let temp_dir = TempDir::new().map_err(|e| SlideGenError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SlideGenError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| SlideGenError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment when it looks like a file name, else a fixed name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
