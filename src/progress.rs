//! Progress-callback trait for generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts the paper and summarises each chunk.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2slides::{GenerationProgressCallback, GenerationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, bullets: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chunk {}/{} done ({} bullets)", chunk, total_chunks, bullets);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the generation pipeline as it moves through its stages.
///
/// Implementations must be `Send + Sync`: chunk events fire from concurrent
/// summariser calls. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once the PDF has been opened and the page selection resolved.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when layout analysis has produced the ordered block list.
    ///
    /// # Arguments
    /// * `pages`   — pages read successfully
    /// * `blocks`  — content blocks found across those pages
    /// * `flagged` — pages that could not be read and were skipped
    fn on_extraction_complete(&self, pages: usize, blocks: usize, flagged: usize) {
        let _ = (pages, blocks, flagged);
    }

    /// Called once before the first summariser request.
    ///
    /// # Arguments
    /// * `total_chunks` — number of chunks that will be sent remotely
    fn on_summarize_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called just before a chunk is sent to the summariser.
    ///
    /// `chunk` is 1-indexed.
    fn on_chunk_start(&self, chunk: usize, total_chunks: usize) {
        let _ = (chunk, total_chunks);
    }

    /// Called when a chunk was summarised.
    ///
    /// # Arguments
    /// * `chunk`        — 1-indexed chunk number
    /// * `total_chunks` — total chunks
    /// * `bullets`      — bullet lines recovered from the response
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, bullets: usize) {
        let _ = (chunk, total_chunks, bullets);
    }

    /// Called when a chunk fails after all retries; it will be rendered as
    /// missing content.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once the deck is composed.
    ///
    /// # Arguments
    /// * `slides`         — slides in the deck
    /// * `missing_chunks` — chunks rendered as placeholders
    fn on_generation_complete(&self, slides: usize, missing_chunks: usize) {
        let _ = (slides, missing_chunks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
