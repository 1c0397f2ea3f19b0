//! # edgequake-pdf2slides
//!
//! Turn academic PDF papers into summarised slide decks.
//!
//! ## Why this crate?
//!
//! Reading a paper to build a talk means re-typing its structure: one slide
//! per section, a handful of bullets each, the key figures next to the text
//! that explains them. This crate does the mechanical part. It lays out the
//! PDF's own text objects into reading order, sends section-sized passages
//! to an LLM for bullet summaries, and composes the answers into a deck
//! whose order follows the paper.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file, URL or bytes; check %PDF magic
//!  ├─ 2. Extract    page objects via pdfium (spawn_blocking)
//!  ├─ 3. Layout     columns, headings, equations, tables, captions
//!  ├─ 4. Chunk      section-sized passages (figures stay local)
//!  ├─ 5. Summarise  concurrent calls to gemini / gpt / claude / …
//!  ├─ 6. Compose    topic slides, "(cont.)" overflow, figures by page
//!  └─ 7. Export     PPTX, JSON or Markdown
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2slides::{generate_to_file, GenerationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = GenerationConfig::default();
//!     let output = generate_to_file("paper.pdf", "paper.pptx", &config).await?;
//!     eprintln!("{} slides, {} chunks missing",
//!         output.stats.total_slides,
//!         output.stats.missing_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Bring your own summariser
//!
//! Everything after extraction is reachable through
//! [`generate_from_extraction`], which takes any [`Summarizer`]:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use edgequake_pdf2slides::{extract, generate_from_extraction, GenerationConfig, Summarizer, SummarizeError};
//!
//! struct FirstSentence;
//!
//! #[async_trait]
//! impl Summarizer for FirstSentence {
//!     async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
//!         Ok(format!("• {}", text.split(". ").next().unwrap_or(text)))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GenerationConfig::default();
//! let extraction = extract("paper.pdf", &config).await?;
//! let output = generate_from_extraction(extraction, &FirstSentence, &config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2slides` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2slides = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod generate;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod summarizer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GenerationConfig, GenerationConfigBuilder, OutputFormat, PageSelection};
pub use error::{ChunkError, ErrorKind, SlideGenError};
pub use generate::{
    extract, generate, generate_from_bytes, generate_from_extraction, generate_sync,
    generate_to_file, inspect, resolve_provider, write_deck,
};
pub use model::{
    BlockKind, ContentBlock, Slide, SlideDeck, SlideItem, SlideKind, SummaryStatus, SummaryUnit,
};
pub use output::{DocumentMetadata, Extraction, GenerationOutput, GenerationStats, PageIssue};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use summarizer::{LlmSummarizer, SummarizeError, Summarizer};
