//! End-to-end entry points.
//!
//! ```text
//! resolve input ─▶ extract ─▶ chunk ─▶ summarise ─▶ compose ─▶ (export)
//! ```
//!
//! [`generate`] runs everything; [`generate_from_extraction`] starts after
//! extraction and takes any [`Summarizer`], which is how the pipeline is
//! exercised without pdfium or a live model.

use crate::config::GenerationConfig;
use crate::error::SlideGenError;
use crate::export;
use crate::model::ContentBlock;
use crate::output::{DocumentMetadata, Extraction, GenerationOutput, GenerationStats};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{chunk, compose, extract, summarize};
use crate::summarizer::{LlmSummarizer, Summarizer};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default model when the provider is picked from `GEMINI_API_KEY`.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Turn a PDF file or URL into a slide deck.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Generation configuration
///
/// # Returns
/// `Ok(GenerationOutput)` on success, even if some chunks could not be
/// summarised (check `output.stats.missing_chunks`).
///
/// # Errors
/// Returns `Err(SlideGenError)` only for fatal errors:
/// - missing, empty, or non-PDF input
/// - a valid PDF with nothing to summarise
/// - provider not configured, or every chunk failed
pub async fn generate(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    let input_str = input_str.as_ref();
    info!("Starting generation: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    generate_resolved(&resolved, config).await
}

/// Turn an in-memory PDF into a slide deck.
///
/// The bytes are validated, then spooled to a managed temp file that is
/// removed when this returns.
pub async fn generate_from_bytes(
    bytes: &[u8],
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    let resolved = input::spool_bytes(bytes)?;
    generate_resolved(&resolved, config).await
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SlideGenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(input_str, config))
}

/// Generate a deck and write it to `output_path`.
///
/// The format comes from the file extension (`.pptx`, `.json`, `.md`),
/// falling back to `config.output_format`. Uses atomic write (temp file +
/// rename) so a failed run never leaves a truncated deck behind.
pub async fn generate_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    let output = generate(input_str, config).await?;
    write_deck(&output, output_path.as_ref(), config).await?;
    Ok(output)
}

/// Serialise `output.deck` and write it atomically.
pub async fn write_deck(
    output: &GenerationOutput,
    path: &Path,
    config: &GenerationConfig,
) -> Result<(), SlideGenError> {
    let format = crate::config::OutputFormat::from_extension(path).unwrap_or(config.output_format);
    let bytes = export::render(&output.deck, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SlideGenError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| SlideGenError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| SlideGenError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {} ({} bytes, {})", path.display(), bytes.len(), format);
    Ok(())
}

/// Run only the extractor: ordered content blocks plus metadata.
///
/// Does not require an LLM provider or API key.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<Extraction, SlideGenError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extract_resolved(&resolved, config).await
}

/// Extract PDF metadata without reading page content.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, SlideGenError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    extract::extract_metadata(resolved.path(), None).await
}

/// Run chunking, summarisation and composition on an existing extraction.
///
/// # Errors
/// * [`SlideGenError::EmptyContent`] when the extraction has no usable block
/// * [`SlideGenError::AllChunksFailed`] / [`SlideGenError::PartialFailure`]
///   from the summariser adapter
pub async fn generate_from_extraction(
    extraction: Extraction,
    summarizer: &dyn Summarizer,
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    let start = Instant::now();
    let empty_content = || SlideGenError::EmptyContent {
        source_name: extraction.source_name.clone(),
        pages: extraction.metadata.page_count.max(extraction.pages_read),
        flagged: extraction.skipped_pages(),
    };

    if !extraction.blocks.iter().any(has_content) {
        return Err(empty_content());
    }

    // ── Chunk ────────────────────────────────────────────────────────────
    let plan = chunk::build_chunks(&extraction.blocks, &config.chunk_options());
    debug!(
        "{} blocks → {} plan items ({} remote)",
        extraction.blocks.len(),
        plan.items.len(),
        plan.remote_count()
    );

    // ── Summarise ────────────────────────────────────────────────────────
    let summarize_start = Instant::now();
    let units = summarize::summarize_plan(&plan, summarizer, config).await?;
    let summarize_duration_ms = summarize_start.elapsed().as_millis() as u64;

    // ── Compose ──────────────────────────────────────────────────────────
    let deck = compose::compose_deck(&units, &extraction.metadata, &config.compose_options())
        .map_err(|e| match e {
            SlideGenError::EmptyContent { .. } => empty_content(),
            other => other,
        })?;

    let missing = units.iter().filter(|u| u.is_missing()).count();
    let stats = GenerationStats {
        total_pages: extraction.metadata.page_count,
        pages_read: extraction.pages_read,
        flagged_pages: extraction.skipped_pages(),
        total_blocks: extraction.blocks.len(),
        remote_chunks: plan.remote_count(),
        summarized_chunks: plan.remote_count() - missing,
        missing_chunks: missing,
        total_slides: deck.slides.len(),
        extract_duration_ms: 0,
        summarize_duration_ms,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Generation complete: {} slides from {} chunks ({} missing)",
        stats.total_slides, stats.remote_chunks, stats.missing_chunks
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(stats.total_slides, stats.missing_chunks);
    }

    Ok(GenerationOutput {
        deck,
        units,
        metadata: extraction.metadata,
        issues: extraction.issues,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn has_content(block: &ContentBlock) -> bool {
    !block.content.trim().is_empty() || block.media.is_some() || block.table.is_some()
}

async fn generate_resolved(
    resolved: &ResolvedInput,
    config: &GenerationConfig,
) -> Result<GenerationOutput, SlideGenError> {
    let total_start = Instant::now();

    // Fail on a missing API key before spending time on extraction.
    let provider = resolve_provider(config).await?;
    let summarizer = LlmSummarizer::new(provider, config);

    let extract_start = Instant::now();
    let extraction = extract_resolved(resolved, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    let mut output = generate_from_extraction(extraction, &summarizer, config).await?;
    output.stats.extract_duration_ms = extract_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

async fn extract_resolved(
    resolved: &ResolvedInput,
    config: &GenerationConfig,
) -> Result<Extraction, SlideGenError> {
    let password = config.password.as_deref();
    let metadata = extract::extract_metadata(resolved.path(), password).await?;
    let selected = config.pages.to_indices(metadata.page_count).len();
    info!("PDF has {} pages ({} selected)", metadata.page_count, selected);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(selected);
    }

    let extraction = extract::extract_document(
        resolved.path(),
        &resolved.display_name(),
        password,
        &config.pages,
    )
    .await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(
            extraction.pages_read,
            extraction.blocks.len(),
            extraction.skipped_pages(),
        );
    }
    Ok(extraction)
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SlideGenError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SlideGenError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Named provider + model** (`config.provider_name`) — the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini** when `GEMINI_API_KEY` is set, with
///    [`DEFAULT_GEMINI_MODEL`] unless a model is configured.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &GenerationConfig,
) -> Result<Arc<dyn LLMProvider>, SlideGenError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if non_empty_env("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SlideGenError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
