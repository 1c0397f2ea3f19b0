//! Error types for the edgequake-pdf2slides library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SlideGenError`] — **Fatal**: no deck can be produced (unreadable input,
//!   document with nothing to summarise, every remote call failed, provider
//!   not configured). Returned as `Err(SlideGenError)` from the top-level
//!   `generate*` functions.
//!
//! * [`ChunkError`] — **Non-fatal**: one chunk could not be summarised but
//!   the rest of the deck is fine. Stored inside
//!   [`crate::model::SummaryUnit`] so the composer can render a placeholder
//!   and the caller can see exactly which part of the paper is missing.
//!
//! Every fatal error maps onto a coarse [`ErrorKind`] so a front-end can tell
//! "upload a different file" apart from "try again later".

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`SlideGenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The input is missing, unreadable, or not a PDF.
    Input,
    /// The summarisation service failed or is not configured.
    RemoteService,
    /// The PDF is valid but yielded nothing to put on a slide.
    EmptyContent,
    /// The deck could not be serialised or written.
    Output,
    /// Invalid configuration.
    Config,
    /// A bug or an unexpected runtime failure.
    Internal,
}

/// All fatal errors returned by the edgequake-pdf2slides library.
///
/// Chunk-level failures use [`ChunkError`] and are stored on the summary
/// unit rather than propagated here.
#[derive(Debug, Error)]
pub enum SlideGenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
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

    /// The file exists but has no bytes at all.
    #[error("File '{path}' is empty (0 bytes)\nUpload the PDF again; the transfer may have been cut short.")]
    EmptyFile { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matches no page of the document.
    #[error("Page selection '{selection}' is out of range (document has {total} pages)")]
    PageOutOfRange { selection: String, total: usize },

    // ── Content errors ────────────────────────────────────────────────────
    /// The PDF parsed fine but contains no extractable text, table or figure.
    #[error(
        "No usable content found in '{source_name}' ({pages} pages, {flagged} unreadable)\n\
Scanned PDFs need OCR before they can be summarised."
    )]
    EmptyContent {
        source_name: String,
        pages: usize,
        flagged: usize,
    },

    // ── Remote service errors ─────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every chunk failed after all retries; the deck would be empty.
    #[error("All {total} chunks failed to summarise after {retries} retries each.\nFirst error: {first_error}")]
    AllChunksFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// Strict mode: at least one chunk could not be summarised.
    #[error("{failed}/{total} chunks failed to summarise (strict mode)\nFirst error: {first_error}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first_error: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building the deck archive or document failed.
    #[error("Failed to serialise the deck as {format}: {detail}")]
    SerializationFailed { format: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium must be available as a shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or place libpdfium next to the binary / in the working directory.\n\
  • Or install it system-wide so the loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlideGenError {
    /// Classify this error for callers that only care about the broad cause.
    pub fn kind(&self) -> ErrorKind {
        use SlideGenError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | EmptyFile { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | WrongPassword { .. }
            | PageOutOfRange { .. } => ErrorKind::Input,
            EmptyContent { .. } => ErrorKind::EmptyContent,
            ProviderNotConfigured { .. } | AllChunksFailed { .. } | PartialFailure { .. } => {
                ErrorKind::RemoteService
            }
            OutputWriteFailed { .. } | SerializationFailed { .. } => ErrorKind::Output,
            InvalidConfig(_) => ErrorKind::Config,
            PdfiumBindingFailed(_) | Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when running the same request again may succeed.
    ///
    /// Only transient remote failures qualify; a missing API key will not
    /// fix itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SlideGenError::AllChunksFailed { .. }
                | SlideGenError::PartialFailure { .. }
                | SlideGenError::DownloadFailed { .. }
                | SlideGenError::DownloadTimeout { .. }
        )
    }
}

/// A non-fatal error for a single chunk.
///
/// The overall generation continues unless ALL chunks fail (or strict mode
/// is on).
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// The summariser returned an error after exhausting retries.
    #[error("Chunk {chunk}: summarisation failed after {retries} retries: {detail}")]
    SummarizeFailed {
        chunk: usize,
        retries: u32,
        detail: String,
    },

    /// The summariser answered, but with nothing usable.
    #[error("Chunk {chunk}: summariser returned an empty response")]
    EmptyResponse { chunk: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_input_error() {
        let e = SlideGenError::EmptyFile {
            path: PathBuf::from("paper.pdf"),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("0 bytes"));
    }

    #[test]
    fn empty_content_is_distinct_from_input() {
        let e = SlideGenError::EmptyContent {
            source_name: "scan.pdf".into(),
            pages: 3,
            flagged: 0,
        };
        assert_eq!(e.kind(), ErrorKind::EmptyContent);
        assert!(e.to_string().contains("3 pages"));
    }

    #[test]
    fn all_chunks_failed_is_retryable_remote_error() {
        let e = SlideGenError::AllChunksFailed {
            total: 4,
            retries: 2,
            first_error: "503".into(),
        };
        assert_eq!(e.kind(), ErrorKind::RemoteService);
        assert!(e.is_retryable());
        assert!(e.to_string().contains("All 4 chunks"));
    }

    #[test]
    fn provider_not_configured_is_not_retryable() {
        let e = SlideGenError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert_eq!(e.kind(), ErrorKind::RemoteService);
        assert!(!e.is_retryable());
    }

    #[test]
    fn chunk_error_display() {
        let e = ChunkError::SummarizeFailed {
            chunk: 3,
            retries: 2,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 3"), "got: {msg}");
        assert!(msg.contains("timeout"));
    }
}
