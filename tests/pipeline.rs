//! Pipeline integration tests that need neither pdfium nor a live model.
//!
//! Pages are built by hand as positioned runs, pushed through layout
//! analysis, then through chunking, a scripted summariser, composition and
//! export.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_pdf2slides::export;
use edgequake_pdf2slides::model::{BoundingBox, MediaAsset, UnitKind, VisualContent};
use edgequake_pdf2slides::pipeline::layout::{
    analyze_pages, ImageElement, LayoutOptions, PageElement, RawPage, TextRun,
};
use edgequake_pdf2slides::{
    generate, generate_from_bytes, generate_from_extraction, DocumentMetadata, ErrorKind,
    Extraction, GenerationConfig, GenerationProgressCallback, OutputFormat, SlideGenError,
    SlideItem, SummarizeError, Summarizer,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Page builders ────────────────────────────────────────────────────────────

fn run(text: &str, x0: f32, y0: f32, w: f32, size: f32) -> PageElement {
    PageElement::Text(TextRun::new(
        text,
        BoundingBox::new(x0, y0, x0 + w, y0 + size),
        size,
        false,
    ))
}

fn heading(text: &str, x0: f32, y0: f32) -> PageElement {
    PageElement::Text(TextRun::new(
        text,
        BoundingBox::new(x0, y0, x0 + 160.0, y0 + 10.0),
        10.0,
        true,
    ))
}

fn figure(x0: f32, y0: f32, x1: f32, y1: f32) -> PageElement {
    PageElement::Image(ImageElement {
        bbox: BoundingBox::new(x0, y0, x1, y1),
        image: MediaAsset {
            png: vec![0x89, b'P', b'N', b'G', 1, 2, 3],
            width: 300,
            height: 200,
        },
    })
}

/// Body lines 12pt apart, which layout joins into one paragraph.
fn paragraph(x0: f32, y_start: f32, lines: &[&str]) -> Vec<PageElement> {
    lines
        .iter()
        .enumerate()
        .map(|(i, t)| run(t, x0, y_start + i as f32 * 12.0, 230.0, 10.0))
        .collect()
}

fn page(number: usize, elements: Vec<PageElement>) -> RawPage {
    RawPage {
        number,
        width: 612.0,
        height: 792.0,
        elements,
    }
}

fn extraction(pages: Vec<RawPage>, title: Option<&str>) -> Extraction {
    let page_count = pages.len();
    let blocks = analyze_pages(pages, &LayoutOptions::default());
    Extraction {
        source_name: "synthetic.pdf".into(),
        metadata: DocumentMetadata {
            title: title.map(str::to_string),
            page_count,
            pdf_version: "1.7".into(),
            ..Default::default()
        },
        blocks,
        pages_read: page_count,
        issues: vec![],
    }
}

/// Two pages: a titled two-column page with two numbered sections, then a
/// single-column page holding a figure, a table, and the conclusion.
fn paper() -> Vec<RawPage> {
    let mut p1 = vec![run(
        "Attention Across Two Columns of Text",
        50.0,
        40.0,
        500.0,
        18.0,
    )];
    p1.push(heading("1 Introduction", 50.0, 90.0));
    p1.extend(paragraph(
        50.0,
        110.0,
        &[
            "Left column opens the paper.",
            "Recurrent models read tokens",
            "one after another in order.",
            "This limits parallel training.",
        ],
    ));
    p1.push(heading("2 Method", 320.0, 90.0));
    p1.extend(paragraph(
        320.0,
        110.0,
        &[
            "Right column explains the model.",
            "Attention relates every pair",
            "of positions in one step.",
            "Layers are stacked six deep.",
        ],
    ));

    let mut p2 = vec![
        figure(100.0, 60.0, 400.0, 260.0),
        run("Figure 1: The model architecture.", 100.0, 270.0, 250.0, 9.0),
    ];
    p2.push(run("Table 1: Translation quality.", 100.0, 320.0, 200.0, 9.0));
    for (i, (a, b, c)) in [("Model", "BLEU", "Cost"), ("Base", "27.3", "1.0"), ("Big", "28.4", "2.3")]
        .iter()
        .enumerate()
    {
        let y = 340.0 + i as f32 * 12.0;
        p2.push(run(a, 100.0, y, 40.0, 9.0));
        p2.push(run(b, 220.0, y, 30.0, 9.0));
        p2.push(run(c, 280.0, y, 30.0, 9.0));
    }
    p2.push(heading("3 Conclusion", 72.0, 450.0));
    p2.extend(paragraph(
        72.0,
        470.0,
        &[
            "Page two closes the paper.",
            "Attention alone is enough",
            "for strong translation.",
        ],
    ));

    vec![page(1, p1), page(2, p2)]
}

// ── Scripted summarisers ─────────────────────────────────────────────────────

/// Bullets from the first sentences of the passage. Sleeps in proportion to
/// the input length so completions arrive out of order.
struct Echo {
    calls: AtomicUsize,
    captions: AtomicUsize,
}

impl Echo {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            captions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Summarizer for Echo {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = 30u64.saturating_sub(text.len() as u64 / 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let bullets: Vec<String> = text
            .split(['.', '\n'])
            .map(str::trim)
            .filter(|s| s.len() > 3)
            .take(3)
            .map(|s| format!("• {s}."))
            .collect();
        Ok(bullets.join("\n"))
    }

    async fn caption(&self, context: &str) -> Result<String, SummarizeError> {
        self.captions.fetch_add(1, Ordering::SeqCst);
        if context.starts_with("Table") {
            Ok("Caption: \"Ours beats the baseline at lower cost\"".into())
        } else {
            Ok("Encoder and decoder stacks side by side".into())
        }
    }
}

/// Fails any passage containing `needle`; echoes the rest.
struct FailOn {
    needle: &'static str,
    inner: Echo,
}

#[async_trait]
impl Summarizer for FailOn {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        if text.contains(self.needle) {
            return Err(SummarizeError::Service("503 overloaded".into()));
        }
        self.inner.summarize(text).await
    }
}

struct AlwaysDown;

#[async_trait]
impl Summarizer for AlwaysDown {
    async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
        Err(SummarizeError::Timeout { secs: 60 })
    }
}

fn config() -> GenerationConfig {
    GenerationConfig::builder()
        .concurrency(4)
        .build()
        .expect("valid config")
}

// ── Reading order and coverage ───────────────────────────────────────────────

#[tokio::test]
async fn slides_follow_reading_order_across_columns_and_pages() {
    let summarizer = Echo::new();
    let output = generate_from_extraction(extraction(paper(), None), &summarizer, &config())
        .await
        .expect("generation succeeds");

    let all_text: Vec<String> = output
        .deck
        .slides
        .iter()
        .flat_map(|s| std::iter::once(s.title.clone()).chain(s.items.iter().map(|i| i.text().to_string())))
        .collect();
    let joined = all_text.join("\n");

    let pos = |needle: &str| {
        joined
            .find(needle)
            .unwrap_or_else(|| panic!("{needle:?} missing from deck:\n{joined}"))
    };
    assert!(pos("Left column opens") < pos("Right column explains"));
    assert!(pos("Right column explains") < pos("Page two closes"));

    let pages: Vec<usize> = output
        .deck
        .slides
        .iter()
        .filter_map(|s| s.source_pages.first().copied())
        .collect();
    let mut sorted = pages.clone();
    sorted.sort_unstable();
    assert_eq!(pages, sorted, "slides must not jump back a page");
}

#[tokio::test]
async fn every_block_lands_in_exactly_one_unit() {
    let ex = extraction(paper(), None);
    let block_count = ex.blocks.len();
    let output = generate_from_extraction(ex, &Echo::new(), &config())
        .await
        .expect("generation succeeds");

    let mut seen = HashSet::new();
    for unit in &output.units {
        assert!(!unit.sources.is_empty(), "unit {} has no sources", unit.index);
        for &id in &unit.sources {
            assert!(seen.insert(id), "block {id} appears in two units");
        }
    }
    assert_eq!(seen.len(), block_count);

    let firsts: Vec<usize> = output.units.iter().map(|u| u.first_block()).collect();
    let mut sorted = firsts.clone();
    sorted.sort_unstable();
    assert_eq!(firsts, sorted, "units must be in block order");

    assert!(output.units.iter().any(|u| u.kind == UnitKind::Figure));
    assert!(output.units.iter().any(|u| u.kind == UnitKind::Table));
    assert_eq!(output.stats.total_blocks, block_count);
    assert_eq!(output.stats.missing_chunks, 0);
}

#[tokio::test]
async fn figures_are_captioned_but_never_summarized() {
    let summarizer = Echo::new();
    let output = generate_from_extraction(extraction(paper(), None), &summarizer, &config())
        .await
        .expect("generation succeeds");
    assert_eq!(
        summarizer.calls.load(Ordering::SeqCst),
        output.stats.remote_chunks
    );
    let figure = output
        .units
        .iter()
        .find(|u| u.kind == UnitKind::Figure)
        .expect("figure unit");
    assert_eq!(figure.text, "Figure 1: The model architecture.");

    let visual = figure.visual.as_ref().expect("figure visual");
    assert_eq!(visual.caption.as_deref(), Some("Figure 1: The model architecture."));
    assert_eq!(visual.label.as_deref(), Some("Encoder and decoder stacks side by side"));

    let table = output
        .units
        .iter()
        .find(|u| u.kind == UnitKind::Table)
        .and_then(|u| u.visual.as_ref())
        .expect("table visual");
    assert_eq!(table.label.as_deref(), Some("Ours beats the baseline at lower cost"));
    assert_eq!(summarizer.captions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn captions_are_skipped_when_switched_off() {
    let summarizer = Echo::new();
    let config = GenerationConfig::builder()
        .concurrency(4)
        .short_captions(false)
        .build()
        .expect("valid config");
    let output = generate_from_extraction(extraction(paper(), None), &summarizer, &config)
        .await
        .expect("generation succeeds");
    assert_eq!(summarizer.captions.load(Ordering::SeqCst), 0);
    assert!(output
        .units
        .iter()
        .filter_map(|u| u.visual.as_ref())
        .all(|v| v.label.is_none()));
}

// ── The one-page-one-figure case ─────────────────────────────────────────────

#[tokio::test]
async fn one_text_page_with_one_figure_makes_one_slide() {
    let mut els = vec![
        figure(100.0, 100.0, 400.0, 300.0),
        run("Figure 1: Overview of the system.", 100.0, 310.0, 250.0, 9.0),
    ];
    els.extend(paragraph(
        100.0,
        360.0,
        &[
            "We describe a small system.",
            "It reads papers and writes",
            "slides for a short talk.",
        ],
    ));
    let output = generate_from_extraction(
        extraction(vec![page(1, els)], Some("Small System")),
        &Echo::new(),
        &config(),
    )
    .await
    .expect("generation succeeds");

    assert_eq!(output.deck.slides.len(), 1, "{:#?}", output.deck.slides);
    let slide = &output.deck.slides[0];
    assert_eq!(slide.visuals.len(), 1);
    assert_eq!(slide.visuals[0].page, 1);
    assert!(matches!(slide.visuals[0].content, VisualContent::Image(_)));
    assert_eq!(
        slide.visuals[0].caption.as_deref(),
        Some("Figure 1: Overview of the system.")
    );
    assert!(!slide.items.is_empty());
    assert_eq!(output.deck.title, "Small System");
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_chunk_keeps_its_slide_with_a_placeholder() {
    let summarizer = FailOn {
        needle: "Right column explains",
        inner: Echo::new(),
    };
    let output = generate_from_extraction(extraction(paper(), None), &summarizer, &config())
        .await
        .expect("partial failure is not fatal by default");

    assert_eq!(output.stats.missing_chunks, 1);
    assert_eq!(
        output.stats.summarized_chunks,
        output.stats.remote_chunks - 1
    );

    let method = output
        .deck
        .slides
        .iter()
        .find(|s| s.title.contains("Method"))
        .expect("slide for the failed section");
    assert!(method.has_missing_content);
    assert!(method
        .items
        .iter()
        .any(|i| matches!(i, SlideItem::Placeholder(t) if t == "[Summary unavailable]")));

    // Neighbouring sections are unaffected.
    let intro = output
        .deck
        .slides
        .iter()
        .find(|s| s.title.contains("Introduction"))
        .expect("introduction slide");
    assert!(!intro.has_missing_content);
}

#[tokio::test]
async fn strict_mode_turns_one_failure_into_an_error() {
    let summarizer = FailOn {
        needle: "Right column explains",
        inner: Echo::new(),
    };
    let config = GenerationConfig::builder()
        .strict(true)
        .build()
        .expect("valid config");
    let err = generate_from_extraction(extraction(paper(), None), &summarizer, &config)
        .await
        .expect_err("strict mode must fail");
    assert!(matches!(err, SlideGenError::PartialFailure { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::RemoteService);
}

#[tokio::test]
async fn all_chunks_failing_is_a_remote_service_error() {
    let err = generate_from_extraction(extraction(paper(), None), &AlwaysDown, &config())
        .await
        .expect_err("nothing was summarised");
    assert!(matches!(err, SlideGenError::AllChunksFailed { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::RemoteService);
    assert!(err.is_retryable());
}

// ── Empty and invalid input ──────────────────────────────────────────────────

#[tokio::test]
async fn document_without_content_is_empty_content() {
    let blank = vec![page(1, vec![run("   ", 72.0, 100.0, 50.0, 10.0)]), page(2, vec![])];
    let err = generate_from_extraction(extraction(blank, None), &Echo::new(), &config())
        .await
        .expect_err("blank pages have nothing to summarise");
    assert!(matches!(err, SlideGenError::EmptyContent { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::EmptyContent);
}

#[tokio::test]
async fn empty_and_non_pdf_bytes_are_input_errors() {
    let config = config();

    let err = generate_from_bytes(b"", &config).await.expect_err("empty");
    assert!(matches!(err, SlideGenError::EmptyFile { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Input);

    let err = generate_from_bytes(b"hello world", &config)
        .await
        .expect_err("not a pdf");
    assert!(matches!(err, SlideGenError::NotAPdf { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[tokio::test]
async fn missing_file_is_an_input_error() {
    let err = generate("/definitely/not/here/paper.pdf", &config())
        .await
        .expect_err("missing file");
    assert!(matches!(err, SlideGenError::FileNotFound { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Input);
}

// ── Determinism and export ───────────────────────────────────────────────────

#[tokio::test]
async fn pptx_is_byte_identical_across_runs() {
    let first = generate_from_extraction(extraction(paper(), Some("Paper")), &Echo::new(), &config())
        .await
        .expect("first run");
    let second = generate_from_extraction(extraction(paper(), Some("Paper")), &Echo::new(), &config())
        .await
        .expect("second run");

    assert_eq!(first.deck, second.deck);
    let a = export::render(&first.deck, OutputFormat::Pptx).expect("render");
    let b = export::render(&second.deck, OutputFormat::Pptx).expect("render");
    assert!(a.starts_with(b"PK"), "PPTX is a zip archive");
    assert_eq!(a, b);
}

#[tokio::test]
async fn deck_renders_to_json_and_markdown() {
    let output = generate_from_extraction(extraction(paper(), Some("Paper")), &Echo::new(), &config())
        .await
        .expect("generation succeeds");

    let json = export::render(&output.deck, OutputFormat::Json).expect("json");
    let value: serde_json::Value = serde_json::from_slice(&json).expect("valid json");
    assert_eq!(value["title"], "Paper");
    assert_eq!(
        value["slides"].as_array().map(Vec::len),
        Some(output.deck.slides.len())
    );

    let md = export::render(&output.deck, OutputFormat::Markdown).expect("markdown");
    let md = String::from_utf8(md).expect("utf-8");
    assert!(md.starts_with("# Paper\n"));
    assert!(md.contains("> Figure (page 2): Figure 1: The model architecture."));
    assert!(md.contains("| Model | BLEU | Cost |"));
}

#[tokio::test]
async fn write_deck_picks_format_from_extension() {
    let output = generate_from_extraction(extraction(paper(), None), &Echo::new(), &config())
        .await
        .expect("generation succeeds");
    let dir = tempfile::tempdir().expect("tempdir");

    let md_path = dir.path().join("nested/outline.md");
    edgequake_pdf2slides::write_deck(&output, &md_path, &config())
        .await
        .expect("write markdown");
    let text = std::fs::read_to_string(&md_path).expect("read back");
    assert!(text.contains("## "));

    let pptx_path = dir.path().join("deck.pptx");
    edgequake_pdf2slides::write_deck(&output, &pptx_path, &config())
        .await
        .expect("write pptx");
    let bytes = std::fs::read(&pptx_path).expect("read back");
    assert!(bytes.starts_with(b"PK"));
    assert!(!dir.path().join("deck.pptx.tmp").exists());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    planned: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    slides: AtomicUsize,
}

impl GenerationProgressCallback for Counting {
    fn on_summarize_start(&self, total_chunks: usize) {
        self.planned.store(total_chunks, Ordering::SeqCst);
    }
    fn on_chunk_complete(&self, _chunk: usize, _total: usize, _bullets: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_chunk_error(&self, _chunk: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_generation_complete(&self, slides: usize, _missing: usize) {
        self.slides.store(slides, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_cover_every_remote_chunk() {
    let counter = Arc::new(Counting::default());
    let config = GenerationConfig::builder()
        .progress_callback(counter.clone() as Arc<dyn GenerationProgressCallback>)
        .build()
        .expect("valid config");
    let summarizer = FailOn {
        needle: "Page two closes",
        inner: Echo::new(),
    };

    let output = generate_from_extraction(extraction(paper(), None), &summarizer, &config)
        .await
        .expect("generation succeeds");

    let planned = counter.planned.load(Ordering::SeqCst);
    assert_eq!(planned, output.stats.remote_chunks);
    assert_eq!(
        counter.completed.load(Ordering::SeqCst) + counter.errors.load(Ordering::SeqCst),
        planned
    );
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.slides.load(Ordering::SeqCst), output.deck.slides.len());
}
