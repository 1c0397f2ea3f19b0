//! Pipeline stages for PDF-to-slides generation.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the pdfium-bound part stays isolated from the
//! pure text heuristics.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ layout ──▶ chunk ──▶ summarize ──▶ compose
//! (path/URL) (pdfium)   (blocks)   (plan)    (units)       (deck)
//! ```
//!
//! 1. [`input`]   — canonicalise a path, URL or byte buffer to a local PDF
//! 2. [`extract`] — walk page objects in `spawn_blocking`; figures go
//!    through [`encode`]
//! 3. [`layout`]  — pure geometry: columns, lines, paragraphs, headings,
//!    equations, tables, captions
//! 4. [`chunk`]   — group blocks into summariser-sized requests
//! 5. [`summarize`] — bounded-concurrency calls through the
//!    [`crate::Summarizer`] seam, cleaned by [`postprocess`]
//! 6. [`compose`] — topic slides, bullet overflow, visual attachment

pub mod chunk;
pub mod compose;
pub mod encode;
pub mod extract;
pub mod input;
pub mod layout;
pub mod postprocess;
pub mod summarize;
