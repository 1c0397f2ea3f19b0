//! Configuration types for PDF-to-slides generation.
//!
//! All generation behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. Every stage (extraction, chunking,
//! summarisation, composition, export) reads its knobs from this one struct,
//! and the stages derive their own small option structs from it.

use crate::error::SlideGenError;
use crate::pipeline::chunk::ChunkOptions;
use crate::pipeline::compose::ComposeOptions;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Upper bound for [`GenerationConfig::max_media_per_slide`]; more visuals
/// than this leave no room for their captions on a 16:9 slide.
pub const MAX_MEDIA_PER_SLIDE: usize = 6;

/// Configuration for a PDF-to-slides run.
///
/// Built via [`GenerationConfig::builder()`] or using
/// [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2slides::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .concurrency(2)
///     .max_bullets_per_slide(4)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    // ── Summariser ───────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-nano".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the summariser. Default: 0.2.
    ///
    /// Slightly above zero so bullets read naturally, low enough that two
    /// runs over the same paper produce nearly the same deck.
    pub temperature: f32,

    /// Maximum tokens the summariser may generate per chunk. Default: 1024.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed summariser call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-call summariser timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Number of concurrent summariser calls. Default: 4.
    pub concurrency: usize,

    /// Custom system prompt. If None, uses the built-in bullet prompt.
    pub system_prompt: Option<String>,

    /// Treat any chunk failure as fatal instead of rendering a placeholder.
    /// Default: false.
    pub strict: bool,

    // ── Extraction ───────────────────────────────────────────────────────
    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    // ── Chunking ─────────────────────────────────────────────────────────
    /// Soft size limit (characters) for one summariser request. Default: 1000.
    ///
    /// A single block longer than this is never split; it travels alone.
    pub max_chunk_chars: usize,

    /// Headings at this level or above (1 = top) open a new section.
    /// Default: 2.
    pub section_heading_level: u8,

    // ── Composition ──────────────────────────────────────────────────────
    /// Maximum bullets on one slide before a "(cont.)" slide is started.
    /// Default: 5.
    pub max_bullets_per_slide: usize,

    /// Maximum figures/tables on one slide, at most
    /// [`MAX_MEDIA_PER_SLIDE`]. Default: 2.
    pub max_media_per_slide: usize,

    /// Prepend a title slide built from the PDF metadata. Default: false.
    pub include_title_slide: bool,

    /// Ask the summariser for a one-sentence caption under each figure and
    /// table. Default: true.
    pub short_captions: bool,

    // ── Output ───────────────────────────────────────────────────────────
    /// Serialisation format for [`crate::generate_to_file`]. Default: Pptx.
    pub output_format: OutputFormat,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 1024,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            concurrency: 4,
            system_prompt: None,
            strict: false,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            max_chunk_chars: 1000,
            section_heading_level: 2,
            max_bullets_per_slide: 5,
            max_media_per_slide: 2,
            include_title_slide: false,
            short_captions: true,
            output_format: OutputFormat::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("strict", &self.strict)
            .field("pages", &self.pages)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("section_heading_level", &self.section_heading_level)
            .field("max_bullets_per_slide", &self.max_bullets_per_slide)
            .field("max_media_per_slide", &self.max_media_per_slide)
            .field("include_title_slide", &self.include_title_slide)
            .field("short_captions", &self.short_captions)
            .field("output_format", &self.output_format)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Chunker settings derived from this config.
    pub fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions {
            max_chars: self.max_chunk_chars,
            section_heading_level: self.section_heading_level,
        }
    }

    /// Composer settings derived from this config.
    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            max_bullets_per_slide: self.max_bullets_per_slide,
            max_media_per_slide: self.max_media_per_slide,
            include_title_slide: self.include_title_slide,
        }
    }
}

/// Builder for [`GenerationConfig`].
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl fmt::Debug for GenerationConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl GenerationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn strict(mut self, v: bool) -> Self {
        self.config.strict = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn section_heading_level(mut self, level: u8) -> Self {
        self.config.section_heading_level = level.clamp(1, 3);
        self
    }

    pub fn max_bullets_per_slide(mut self, n: usize) -> Self {
        self.config.max_bullets_per_slide = n.max(1);
        self
    }

    pub fn max_media_per_slide(mut self, n: usize) -> Self {
        self.config.max_media_per_slide = n.clamp(1, MAX_MEDIA_PER_SLIDE);
        self
    }

    pub fn include_title_slide(mut self, v: bool) -> Self {
        self.config.include_title_slide = v;
        self
    }

    pub fn short_captions(mut self, v: bool) -> Self {
        self.config.short_captions = v;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, SlideGenError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(SlideGenError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_chunk_chars < 100 {
            return Err(SlideGenError::InvalidConfig(format!(
                "max_chunk_chars must be ≥ 100, got {}",
                c.max_chunk_chars
            )));
        }
        if c.max_tokens == 0 {
            return Err(SlideGenError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(SlideGenError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_bullets_per_slide == 0 || c.max_media_per_slide == 0 {
            return Err(SlideGenError::InvalidConfig(
                "max_bullets_per_slide and max_media_per_slide must be ≥ 1".into(),
            ));
        }
        if c.max_media_per_slide > MAX_MEDIA_PER_SLIDE {
            return Err(SlideGenError::InvalidConfig(format!(
                "max_media_per_slide must be ≤ {}, got {}",
                MAX_MEDIA_PER_SLIDE, c.max_media_per_slide
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Read all pages (default).
    #[default]
    All,
    /// Read a single page (1-indexed).
    Single(usize),
    /// Read a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Read specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Renders the selection the way the CLI `--pages` flag accepts it.
impl std::fmt::Display for PageSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Single(p) => write!(f, "{}", p),
            PageSelection::Range(start, end) => write!(f, "{}-{}", start, end),
            PageSelection::Set(pages) => {
                let list: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                f.write_str(&list.join(","))
            }
        }
    }
}

/// Serialisation format of the finished deck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PowerPoint Open XML package (default).
    #[default]
    Pptx,
    /// The deck structure as pretty-printed JSON.
    Json,
    /// A Markdown outline, one section per slide.
    Markdown,
}

impl OutputFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pptx => "pptx",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }

    /// Guess the format from a file name's extension.
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pptx" => Some(OutputFormat::Pptx),
            "json" => Some(OutputFormat::Json),
            "md" | "markdown" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn defaults_match_documentation() {
        let c = GenerationConfig::default();
        assert_eq!(c.max_chunk_chars, 1000);
        assert_eq!(c.max_bullets_per_slide, 5);
        assert_eq!(c.max_media_per_slide, 2);
        assert_eq!(c.concurrency, 4);
        assert!(!c.include_title_slide);
        assert!(c.short_captions);
        assert_eq!(c.output_format, OutputFormat::Pptx);
    }

    #[test]
    fn builder_clamps_values() {
        let c = GenerationConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .section_heading_level(7)
            .max_bullets_per_slide(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.section_heading_level, 3);
        assert_eq!(c.max_bullets_per_slide, 1);
    }

    #[test]
    fn builder_rejects_tiny_chunks() {
        let err = GenerationConfig::builder()
            .max_chunk_chars(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, SlideGenError::InvalidConfig(_)));
    }

    #[test]
    fn page_selection_range_is_clamped() {
        assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(9).to_indices(4), Vec::<usize>::new());
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3, 8]).to_indices(4),
            vec![0, 2]
        );
    }

    #[test]
    fn media_per_slide_is_capped() {
        let c = GenerationConfig::builder()
            .max_media_per_slide(40)
            .build()
            .unwrap();
        assert_eq!(c.max_media_per_slide, MAX_MEDIA_PER_SLIDE);

        let mut builder = GenerationConfig::builder();
        builder.config.max_media_per_slide = 19;
        let err = builder.build().unwrap_err();
        assert!(matches!(err, SlideGenError::InvalidConfig(_)));
    }

    #[test]
    fn page_selection_displays_like_the_cli_flag() {
        assert_eq!(PageSelection::All.to_string(), "all");
        assert_eq!(PageSelection::Single(4).to_string(), "4");
        assert_eq!(PageSelection::Range(3, 15).to_string(), "3-15");
        assert_eq!(PageSelection::Set(vec![1, 3, 5]).to_string(), "1,3,5");
    }

    #[test]
    fn output_format_from_extension() {
        assert_eq!(
            OutputFormat::from_extension(Path::new("deck.PPTX")),
            Some(OutputFormat::Pptx)
        );
        assert_eq!(
            OutputFormat::from_extension(Path::new("deck.md")),
            Some(OutputFormat::Markdown)
        );
        assert_eq!(OutputFormat::from_extension(Path::new("deck")), None);
    }
}
