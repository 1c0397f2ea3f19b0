//! PDF extraction: walk page objects via pdfium and hand them to layout.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is synchronous and
//! keeps global state. All pdfium work runs on the blocking pool so the
//! Tokio workers stay free for summariser calls.
//!
//! Form XObjects are entered recursively. Vector drawings are found by
//! clustering path objects and are cropped out of a page render.
//!
//! A page whose objects cannot be read is recorded as a [`PageIssue`] and
//! skipped. A figure that cannot be decoded is recorded too, but its page
//! is kept. Only a document that cannot be opened at all is fatal.

use crate::config::PageSelection;
use crate::error::SlideGenError;
use crate::model::BoundingBox;
use crate::output::{DocumentMetadata, Extraction, PageIssue};
use crate::pipeline::encode;
use crate::pipeline::layout::{self, ImageElement, LayoutOptions, PageElement, RawPage, TextRun};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Images smaller than this (in points, either edge) are logos, bullets
/// or rules rather than figures.
const MIN_FIGURE_POINTS: f32 = 24.0;

/// Vector drawings smaller than this on either edge are not figures.
const MIN_VECTOR_FIGURE_POINTS: f32 = 48.0;

/// Paths closer than this (points) belong to the same drawing.
const PATH_CLUSTER_SLACK: f32 = 6.0;

/// A path this thin on either edge is a rule or a table border.
const RULE_THICKNESS: f32 = 2.0;

/// Vector figures are cropped from a 144 DPI render.
const VECTOR_RENDER_SCALE: f32 = 2.0;

/// Form XObjects nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 8;

#[cfg(target_os = "windows")]
const PLATFORM_LIBRARY: &str = "pdfium.dll";
#[cfg(target_os = "macos")]
const PLATFORM_LIBRARY: &str = "libpdfium.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const PLATFORM_LIBRARY: &str = "libpdfium.so";

/// Bind to a pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (file or directory), the working
/// directory, then the system loader path.
pub fn bind_pdfium() -> Result<Pdfium, SlideGenError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH").ok().filter(|p| !p.is_empty());

    let bindings = match from_env {
        Some(p) => {
            let path = PathBuf::from(&p);
            let lib = if path.is_dir() {
                path.join(PLATFORM_LIBRARY)
            } else {
                path
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| SlideGenError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Extract ordered content blocks from the selected pages of a PDF.
pub async fn extract_document(
    pdf_path: &Path,
    source_name: &str,
    password: Option<&str>,
    pages: &PageSelection,
) -> Result<Extraction, SlideGenError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);
    let selection = pages.clone();

    let (metadata, raw_pages, issues) =
        tokio::task::spawn_blocking(move || read_document_blocking(&path, pwd.as_deref(), &selection))
            .await
            .map_err(|e| SlideGenError::Internal(format!("Extraction task panicked: {}", e)))??;

    let pages_read = raw_pages.len();
    let blocks = layout::analyze_pages(raw_pages, &LayoutOptions::default());
    info!(
        "Extracted {} blocks from {} pages ({} issues)",
        blocks.len(),
        pages_read,
        issues.len()
    );

    Ok(Extraction {
        source_name: source_name.to_string(),
        metadata,
        blocks,
        pages_read,
        issues,
    })
}

/// Extract document metadata without reading page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, SlideGenError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok::<_, SlideGenError>(read_metadata(&document))
    })
    .await
    .map_err(|e| SlideGenError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, SlideGenError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                SlideGenError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                SlideGenError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            SlideGenError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn read_metadata(document: &PdfDocument) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

type BlockingExtraction = (DocumentMetadata, Vec<RawPage>, Vec<PageIssue>);

fn read_document_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<BlockingExtraction, SlideGenError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let metadata = read_metadata(&document);
    let total_pages = metadata.page_count;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages == 0 {
        return Ok((metadata, Vec::new(), Vec::new()));
    }

    let indices = selected_indices(selection, total_pages)?;
    let pages = document.pages();
    let mut raw_pages = Vec::with_capacity(indices.len());
    let mut issues = Vec::new();

    for idx in indices {
        let number = idx + 1;
        let result = pages
            .get(idx as u16)
            .map_err(|e| format!("{:?}", e))
            .and_then(|page| read_page(&page, number));
        match result {
            Ok((raw, lost)) => {
                debug!("Page {}: {} elements", number, raw.elements.len());
                issues.extend(lost.into_iter().map(|detail| PageIssue {
                    page: number,
                    detail,
                    skipped: false,
                }));
                raw_pages.push(raw);
            }
            Err(detail) => {
                warn!("Skipping unreadable page {}: {}", number, detail);
                issues.push(PageIssue {
                    page: number,
                    detail,
                    skipped: true,
                });
            }
        }
    }

    Ok((metadata, raw_pages, issues))
}

fn selected_indices(selection: &PageSelection, total_pages: usize) -> Result<Vec<usize>, SlideGenError> {
    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(SlideGenError::PageOutOfRange {
            selection: selection.to_string(),
            total: total_pages,
        });
    }
    Ok(indices)
}

/// Per-page accumulator for the object walk.
struct PageWalk {
    number: usize,
    height: f32,
    elements: Vec<PageElement>,
    /// Bounds of vector path objects, top-left origin.
    paths: Vec<BoundingBox>,
    /// Figures that were found but could not be decoded or encoded.
    lost: Vec<String>,
}

/// Convert one page's objects into engine-independent elements.
///
/// pdfium reports bounds bottom-up; they are flipped so y grows downwards.
/// Returns the page plus one message per figure that could not be kept.
fn read_page(page: &PdfPage, number: usize) -> Result<(RawPage, Vec<String>), String> {
    let width = page.width().value;
    let height = page.height().value;
    let mut walk = PageWalk {
        number,
        height,
        elements: Vec::new(),
        paths: Vec::new(),
        lost: Vec::new(),
    };

    walk_objects(page.objects().iter(), Affine::IDENTITY, 0, &mut walk)?;

    let figures = vector_figure_regions(&walk.paths, width, height);
    if !figures.is_empty() {
        debug!("Page {}: {} vector figures", number, figures.len());
        walk.elements.retain(|el| match el {
            PageElement::Text(run) => !figures.iter().any(|f| contains_center(f, &run.bbox)),
            PageElement::Image(img) => !figures.iter().any(|f| contains_center(f, &img.bbox)),
        });
        render_vector_figures(page, &figures, &mut walk);
    }

    let raw = RawPage {
        number,
        width,
        height,
        elements: walk.elements,
    };
    Ok((raw, walk.lost))
}

/// Visit `objects`, descending into form XObjects. `ctm` maps the
/// objects' coordinate space onto the page.
fn walk_objects(
    objects: PdfPageObjectsIterator<'_>,
    ctm: Affine,
    depth: usize,
    walk: &mut PageWalk,
) -> Result<(), String> {
    for object in objects {
        if let Some(text_obj) = object.as_text_object() {
            let text = text_obj.text();
            if text.trim().is_empty() {
                continue;
            }
            let bounds = object.bounds().map_err(|e| format!("{:?}", e))?;
            let bbox = page_bbox(&ctm, &bounds, walk.height);
            let font_size = text_obj.scaled_font_size().value * ctm.scale();
            let bold = is_bold_font(&text_obj.font().name());
            walk.elements.push(PageElement::Text(TextRun::new(text, bbox, font_size, bold)));
        } else if let Some(image_obj) = object.as_image_object() {
            let Ok(bounds) = object.bounds() else {
                continue;
            };
            let bbox = page_bbox(&ctm, &bounds, walk.height);
            if bbox.width() < MIN_FIGURE_POINTS || bbox.height() < MIN_FIGURE_POINTS {
                continue;
            }
            let encoded = image_obj
                .get_raw_image()
                .map_err(|e| format!("could not decode image: {:?}", e))
                .and_then(|img| {
                    encode::encode_media(&img).map_err(|e| format!("could not encode image: {}", e))
                });
            match encoded {
                Ok(asset) => walk.elements.push(PageElement::Image(ImageElement { bbox, image: asset })),
                Err(detail) => {
                    warn!("Page {}: {}", walk.number, detail);
                    walk.lost.push(detail);
                }
            }
        } else if object.as_path_object().is_some() {
            if let Ok(bounds) = object.bounds() {
                walk.paths.push(page_bbox(&ctm, &bounds, walk.height));
            }
        } else if let Some(form) = object.as_x_object_form_object() {
            if depth >= MAX_FORM_DEPTH {
                debug!("Page {}: form nesting deeper than {}, skipped", walk.number, MAX_FORM_DEPTH);
                continue;
            }
            let inner = form
                .matrix()
                .map(|m| Affine::from_matrix(&m))
                .unwrap_or(Affine::IDENTITY);
            walk_objects(form.iter(), inner.then(&ctm), depth + 1, walk)?;
        }
    }
    Ok(())
}

/// Rasterise the page once and crop each vector figure out of it.
fn render_vector_figures(page: &PdfPage, figures: &[BoundingBox], walk: &mut PageWalk) {
    let config = PdfRenderConfig::new().scale_page_by_factor(VECTOR_RENDER_SCALE);
    let bitmap = match page.render_with_config(&config) {
        Ok(b) => b,
        Err(e) => {
            let detail = format!("could not render {} vector figures: {:?}", figures.len(), e);
            warn!("Page {}: {}", walk.number, detail);
            walk.lost.push(detail);
            return;
        }
    };
    let rendered = bitmap.as_image();

    for figure in figures {
        let Some((x, y, w, h)) =
            pixel_window(figure, VECTOR_RENDER_SCALE, rendered.width(), rendered.height())
        else {
            continue;
        };
        match encode::encode_media(&rendered.crop_imm(x, y, w, h)) {
            Ok(asset) => walk.elements.push(PageElement::Image(ImageElement {
                bbox: *figure,
                image: asset,
            })),
            Err(e) => {
                let detail = format!("could not encode vector figure: {}", e);
                warn!("Page {}: {}", walk.number, detail);
                walk.lost.push(detail);
            }
        }
    }
}

fn page_bbox(ctm: &Affine, bounds: &PdfQuadPoints, page_height: f32) -> BoundingBox {
    let (left, bottom, right, top) = ctm.map_rect(
        bounds.left().value,
        bounds.bottom().value,
        bounds.right().value,
        bounds.top().value,
    );
    flip(left, top, right, bottom, page_height)
}

fn flip(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> BoundingBox {
    BoundingBox::new(left, page_height - top, right, page_height - bottom)
}

/// 2D affine transform in PDF order: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Affine {
    const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    fn from_matrix(m: &PdfMatrix) -> Self {
        Affine { a: m.a(), b: m.b(), c: m.c(), d: m.d(), e: m.e(), f: m.f() }
    }

    /// `self` first, then `outer`.
    fn then(&self, outer: &Affine) -> Affine {
        Affine {
            a: self.a * outer.a + self.b * outer.c,
            b: self.a * outer.b + self.b * outer.d,
            c: self.c * outer.a + self.d * outer.c,
            d: self.c * outer.b + self.d * outer.d,
            e: self.e * outer.a + self.f * outer.c + outer.e,
            f: self.e * outer.b + self.f * outer.d + outer.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Uniform scale factor, used for font sizes.
    fn scale(&self) -> f32 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }

    /// Axis-aligned hull of a mapped rectangle, as `(left, bottom, right, top)`.
    fn map_rect(&self, left: f32, bottom: f32, right: f32, top: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(left, bottom),
            self.apply(right, bottom),
            self.apply(left, top),
            self.apply(right, top),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(l, b, r, t), &(x, y)| (l.min(x), b.min(y), r.max(x), t.max(y)),
        )
    }
}

/// Cluster vector paths into figure regions.
///
/// Paths within [`PATH_CLUSTER_SLACK`] of each other merge. A cluster is
/// a figure when it is at least [`MIN_VECTOR_FIGURE_POINTS`] on both
/// edges, holds at least one path that is not a thin rule, and covers less
/// than half the page. Table rules and page frames fail those tests.
fn vector_figure_regions(paths: &[BoundingBox], page_width: f32, page_height: f32) -> Vec<BoundingBox> {
    let is_rule = |b: &BoundingBox| b.width() <= RULE_THICKNESS || b.height() <= RULE_THICKNESS;
    let mut clusters: Vec<(BoundingBox, bool)> = Vec::new();

    for path in paths {
        let mut merged = (*path, !is_rule(path));
        // Absorb every cluster the growing box touches; repeat until stable.
        loop {
            let before = clusters.len();
            clusters.retain(|(bbox, shaped)| {
                if near(bbox, &merged.0, PATH_CLUSTER_SLACK) {
                    merged = (merged.0.union(bbox), merged.1 || *shaped);
                    false
                } else {
                    true
                }
            });
            if clusters.len() == before {
                break;
            }
        }
        clusters.push(merged);
    }

    let page_area = page_width * page_height;
    let mut figures: Vec<BoundingBox> = clusters
        .into_iter()
        .filter(|(bbox, shaped)| {
            *shaped
                && bbox.width() >= MIN_VECTOR_FIGURE_POINTS
                && bbox.height() >= MIN_VECTOR_FIGURE_POINTS
                && bbox.width() * bbox.height() < page_area * 0.5
        })
        .map(|(bbox, _)| bbox)
        .collect();
    figures.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));
    figures
}

fn near(a: &BoundingBox, b: &BoundingBox, slack: f32) -> bool {
    a.x0 - slack <= b.x1 && b.x0 - slack <= a.x1 && a.y0 - slack <= b.y1 && b.y0 - slack <= a.y1
}

fn contains_center(outer: &BoundingBox, inner: &BoundingBox) -> bool {
    let cx = (inner.x0 + inner.x1) / 2.0;
    let cy = (inner.y0 + inner.y1) / 2.0;
    cx >= outer.x0 && cx <= outer.x1 && cy >= outer.y0 && cy <= outer.y1
}

/// Pixel rectangle `(x, y, w, h)` of `bbox` in a page rendered at `scale`,
/// clamped to the bitmap. `None` when nothing is left.
fn pixel_window(bbox: &BoundingBox, scale: f32, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = ((bbox.x0 * scale).floor().max(0.0) as u32).min(img_w);
    let y0 = ((bbox.y0 * scale).floor().max(0.0) as u32).min(img_h);
    let x1 = ((bbox.x1 * scale).ceil().max(0.0) as u32).min(img_w);
    let y1 = ((bbox.y1 * scale).ceil().max(0.0) as u32).min(img_h);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}

fn is_bold_font(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("bold")
        || lower.contains("black")
        || lower.contains("heavy")
        || lower.contains("semibold")
        // TeX Computer Modern / Latin Modern bold extended
        || lower.contains("cmbx")
        || lower.contains("lmroman10-bold")
}
