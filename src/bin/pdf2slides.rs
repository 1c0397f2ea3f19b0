//! CLI binary for edgequake-pdf2slides.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GenerationConfig` and writes the deck.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2slides::export;
use edgequake_pdf2slides::{
    generate, inspect, write_deck, GenerationConfig, GenerationOutput,
    GenerationProgressCallback, OutputFormat, PageSelection, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the PDF is read, then a bar over the
/// summariser chunks. Chunks complete out of order, so start times are keyed
/// by chunk number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Summarising");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, chunk: usize) -> f64 {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&chunk))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        ms as f64 / 1000.0
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_prefix("Reading");
        self.bar.set_message(format!("{total_pages} pages"));
    }

    fn on_extraction_complete(&self, pages: usize, blocks: usize, flagged: usize) {
        let flagged_note = if flagged > 0 {
            format!("  {}", red(&format!("{flagged} unreadable")))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "{} {}  {}{}",
            cyan("◆"),
            bold(&format!("Read {pages} pages")),
            dim(&format!("{blocks} blocks")),
            flagged_note,
        ));
    }

    fn on_summarize_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
    }

    fn on_chunk_start(&self, chunk: usize, _total_chunks: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(chunk, Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk}"));
    }

    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, bullets: usize) {
        let secs = self.elapsed_secs(chunk);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            chunk,
            total_chunks,
            dim(&format!("{bullets:>2} bullets")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let secs = self.elapsed_secs(chunk);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk,
            total_chunks,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, slides: usize, missing_chunks: usize) {
        self.bar.finish_and_clear();
        if missing_chunks == 0 {
            eprintln!("{} {} slides composed", green("✔"), bold(&slides.to_string()));
        } else {
            eprintln!(
                "{} {} slides composed  ({} chunks missing)",
                cyan("⚠"),
                bold(&slides.to_string()),
                red(&missing_chunks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Paper to PowerPoint (writes paper.pptx in the current directory)
  pdf2slides paper.pdf

  # Choose the output file; the extension picks the format
  pdf2slides paper.pdf -o talk/deck.pptx
  pdf2slides paper.pdf -o outline.md

  # Markdown outline on stdout
  pdf2slides paper.pdf --format md -o -

  # Only the first eight pages, denser slides, with a title slide
  pdf2slides --pages 1-8 --max-bullets 7 --title-slide paper.pdf

  # Use a specific model
  pdf2slides --provider openai --model gpt-4.1-mini paper.pdf

  # Straight from a URL
  pdf2slides https://arxiv.org/pdf/1706.03762 -o attention.pptx

  # Inspect PDF metadata (no API key needed)
  pdf2slides --inspect paper.pdf

  # Fail instead of emitting placeholders when a chunk cannot be summarised
  pdf2slides --strict paper.pdf

PROVIDER SELECTION (first match wins):
  1. --provider / --model
  2. EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL
  3. GEMINI_API_KEY        → gemini (gemini-2.0-flash)
  4. any key edgequake-llm auto-detects (OPENAI_API_KEY, ANTHROPIC_API_KEY, …)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2SLIDES_*            Every flag below has a PDF2SLIDES_ counterpart
  RUST_LOG                tracing filter (overrides -v / --quiet)

OUTPUT:
  Slides follow the paper's reading order. A chunk the model could not
  summarise keeps its slide and shows "[Summary unavailable]" in grey.
  The same input and the same model answers give a byte-identical .pptx.
"#;

/// Turn academic PDF papers into summarised slide decks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2slides",
    version,
    about = "Turn academic PDF papers into summarised slide decks",
    long_about = "Read a PDF paper in reading order, summarise each section with an LLM \
(Google Gemini, OpenAI, Anthropic, Ollama, or any OpenAI-compatible endpoint) and write \
a PowerPoint deck, a JSON deck, or a Markdown outline. Figures and tables are kept next \
to the text that describes them.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output file; `-` writes to stdout. Default: `<input stem>.<format>`.
    #[arg(short, long, env = "PDF2SLIDES_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format when the output path has no recognised extension.
    #[arg(short, long, env = "PDF2SLIDES_FORMAT", value_enum, default_value = "pptx")]
    format: FormatArg,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set \
          (GEMINI_API_KEY is preferred).\n\
          Supported: gemini, openai, anthropic, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2SLIDES_PAGES", default_value = "all")]
    pages: String,

    /// Number of concurrent summariser calls.
    #[arg(short, long, env = "PDF2SLIDES_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Target characters per summariser chunk.
    #[arg(long, env = "PDF2SLIDES_MAX_CHUNK_CHARS", default_value_t = 1000)]
    max_chunk_chars: usize,

    /// Headings at this level or above start a new slide topic (1–6).
    #[arg(long, env = "PDF2SLIDES_SECTION_LEVEL", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    section_level: u8,

    /// Bullets per slide before it continues on the next one.
    #[arg(long, env = "PDF2SLIDES_MAX_BULLETS", default_value_t = 5)]
    max_bullets: usize,

    /// Figures/tables per slide before it continues on the next one (1-6).
    #[arg(long, env = "PDF2SLIDES_MAX_MEDIA", default_value_t = 2,
          value_parser = clap::value_parser!(u64).range(1..=6))]
    max_media: u64,

    /// Keep the PDF captions under figures and tables instead of asking
    /// the model for a one-sentence slide caption.
    #[arg(long, env = "PDF2SLIDES_NO_SHORT_CAPTIONS")]
    no_short_captions: bool,

    /// Start the deck with a title slide built from the PDF metadata.
    #[arg(long, env = "PDF2SLIDES_TITLE_SLIDE")]
    title_slide: bool,

    /// Abort when any chunk cannot be summarised.
    #[arg(long, env = "PDF2SLIDES_STRICT")]
    strict: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2SLIDES_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2SLIDES_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "PDF2SLIDES_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2SLIDES_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per chunk on LLM failure.
    #[arg(long, env = "PDF2SLIDES_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-chunk LLM call timeout in seconds.
    #[arg(long, env = "PDF2SLIDES_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2SLIDES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print PDF metadata only, no generation.
    #[arg(long)]
    inspect: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2SLIDES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2SLIDES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2SLIDES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pptx,
    Json,
    #[value(alias = "markdown")]
    Md,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pptx => OutputFormat::Pptx,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Md => OutputFormat::Markdown,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let to_stdout = cli.output.as_deref() == Some(Path::new("-"));

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect mode ─────────────────────────────────────────────────────
    if cli.inspect {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if matches!(cli.format, FormatArg::Json) {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run generation ───────────────────────────────────────────────────
    let output = generate(&cli.input, &config)
        .await
        .context("Slide generation failed")?;

    if to_stdout {
        let bytes = export::render(&output.deck, config.output_format)
            .context("Failed to render deck")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&bytes)
            .context("Failed to write to stdout")?;
        handle.flush().ok();
    } else {
        let path = match cli.output {
            Some(ref p) => p.clone(),
            None => default_output_path(&cli.input, config.output_format),
        };
        write_deck(&output, &path, &config)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if !cli.quiet {
            print_summary(&output, &path);
        }
    }

    Ok(())
}

fn print_summary(output: &GenerationOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} slides  {}/{} chunks  {}ms  →  {}",
        if stats.missing_chunks == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.total_slides,
        stats.summarized_chunks,
        stats.remote_chunks,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   {} blocks from {}/{} pages  /  {}ms summarising",
        dim(&stats.total_blocks.to_string()),
        stats.pages_read,
        stats.total_pages,
        dim(&stats.summarize_duration_ms.to_string()),
    );
    for issue in &output.issues {
        eprintln!("   {} page {}: {}", red("!"), issue.page, issue.detail);
    }
}

/// `<input stem>.<ext>` in the current directory; URLs use their last path
/// segment.
fn default_output_path(input: &str, format: OutputFormat) -> PathBuf {
    let name = input
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input);
    let stem = match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".pdf") => {
            &name[..cut]
        }
        _ => name,
    };
    let stem = if stem.is_empty() { "slides" } else { stem };
    PathBuf::from(format!("{stem}.{}", format.extension()))
}

/// Map CLI args to `GenerationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let pages = parse_pages(&cli.pages)?;

    let mut builder = GenerationConfig::builder()
        .pages(pages)
        .concurrency(cli.concurrency)
        .max_chunk_chars(cli.max_chunk_chars)
        .section_heading_level(cli.section_level)
        .max_bullets_per_slide(cli.max_bullets)
        .max_media_per_slide(cli.max_media as usize)
        .include_title_slide(cli.title_slide)
        .short_captions(!cli.no_short_captions)
        .strict(cli.strict)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .output_format(cli.format.into());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
