//! Result types returned by the generation entry points.

use crate::model::{ContentBlock, SlideDeck, SummaryUnit};
use serde::{Deserialize, Serialize};

/// Metadata read from the PDF's info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Something the extractor could not read. Either the whole page was
/// skipped, or the page was kept and one figure on it was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageIssue {
    /// 1-indexed page number.
    pub page: usize,
    pub detail: String,
    /// `true` when the page contributed nothing.
    #[serde(default)]
    pub skipped: bool,
}

/// Everything the extractor produced for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    /// Display name of the input (file name or URL), used in messages.
    pub source_name: String,
    pub metadata: DocumentMetadata,
    /// Blocks in reading order; `blocks[i].id == i`.
    pub blocks: Vec<ContentBlock>,
    pub pages_read: usize,
    pub issues: Vec<PageIssue>,
}

impl Extraction {
    /// Pages that could not be read at all.
    pub fn skipped_pages(&self) -> usize {
        self.issues.iter().filter(|i| i.skipped).count()
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_pages: usize,
    pub pages_read: usize,
    pub flagged_pages: usize,
    pub total_blocks: usize,
    /// Chunks sent to the summariser.
    pub remote_chunks: usize,
    pub summarized_chunks: usize,
    pub missing_chunks: usize,
    pub total_slides: usize,
    pub extract_duration_ms: u64,
    pub summarize_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Complete result of a run: the deck plus everything needed to audit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub deck: SlideDeck,
    pub units: Vec<SummaryUnit>,
    pub metadata: DocumentMetadata,
    pub issues: Vec<PageIssue>,
    pub stats: GenerationStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_figures_do_not_count_as_skipped_pages() {
        let extraction = Extraction {
            issues: vec![
                PageIssue {
                    page: 2,
                    detail: "could not decode image: BadFormat".into(),
                    skipped: false,
                },
                PageIssue {
                    page: 5,
                    detail: "PdfiumLibraryInternalError".into(),
                    skipped: true,
                },
            ],
            ..Default::default()
        };
        assert_eq!(extraction.skipped_pages(), 1);

        let old: PageIssue = serde_json::from_str(r#"{"page":3,"detail":"x"}"#).unwrap();
        assert!(!old.skipped);
    }
}
