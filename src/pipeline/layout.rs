//! Layout analysis: positioned text runs and images → ordered content blocks.
//!
//! This stage is pure. It never touches pdfium, which keeps every heuristic
//! testable with hand-built [`RawPage`]s.
//!
//! ## Reading order
//!
//! Academic papers are usually two-column with full-width elements (title,
//! wide figures, page-spanning tables) interleaved. Each page is cut into
//! horizontal *bands* at every full-width element; inside a band the left
//! column is read top to bottom, then the right column. Single-column pages
//! degenerate to one column of full-width lines.
//!
//! ## Classification
//!
//! ```text
//! runs ─▶ lines ─▶ (tables) ─▶ paragraphs ─▶ headings / equations / text
//!                                   └─▶ captions attached to figures/tables
//! ```

use crate::model::{BlockKind, BoundingBox, ContentBlock, MediaAsset, TableGrid};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

// ── Input types ──────────────────────────────────────────────────────────

/// A run of text with uniform style, as reported by the PDF engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bbox: BoundingBox,
    pub font_size: f32,
    pub bold: bool,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, font_size: f32, bold: bool) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
            bold,
        }
    }
}

/// A raster image placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    pub bbox: BoundingBox,
    pub image: MediaAsset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageElement {
    Text(TextRun),
    Image(ImageElement),
}

/// Everything read from one page, in engine order (not reading order).
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// 1-indexed page number.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub elements: Vec<PageElement>,
}

/// Tunables for layout analysis. Distances are in PDF points.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Narrowest empty vertical strip accepted as a column gutter.
    pub min_gutter: f32,
    /// Narrowest column accepted on either side of a gutter.
    pub min_column_width: f32,
    /// Horizontal gap that separates two table cells on one line.
    pub min_cell_gap: f32,
    pub min_table_rows: usize,
    pub min_table_columns: usize,
    pub max_table_columns: usize,
    /// Share of math symbols above which a short paragraph is an equation.
    pub equation_symbol_ratio: f32,
    /// Deepest heading level emitted.
    pub max_heading_level: u8,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            min_gutter: 12.0,
            min_column_width: 80.0,
            min_cell_gap: 15.0,
            min_table_rows: 2,
            min_table_columns: 2,
            max_table_columns: 8,
            equation_symbol_ratio: 0.12,
            max_heading_level: 3,
        }
    }
}

// ── Font statistics ──────────────────────────────────────────────────────

/// Character-weighted histogram of font sizes across the document.
///
/// The most common size is body text; distinct larger sizes rank as heading
/// levels, largest first.
#[derive(Debug, Clone, Default)]
pub struct FontStatistics {
    pub body_size: f32,
    pub heading_sizes: Vec<f32>,
    histogram: HashMap<i32, usize>,
}

impl FontStatistics {
    pub fn from_pages(pages: &[RawPage]) -> Self {
        let mut stats = FontStatistics::default();
        for page in pages {
            for el in &page.elements {
                if let PageElement::Text(run) = el {
                    stats.add(run.font_size, run.text.trim().chars().count());
                }
            }
        }
        stats.analyze();
        stats
    }

    fn add(&mut self, size: f32, weight: usize) {
        if weight == 0 || !size.is_finite() || size <= 0.0 {
            return;
        }
        let key = (size * 10.0).round() as i32;
        *self.histogram.entry(key).or_insert(0) += weight;
    }

    fn analyze(&mut self) {
        // Ties resolve to the smaller size so a short title never becomes body.
        let body_key = self
            .histogram
            .iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.cmp(ka)))
            .map(|(k, _)| *k);
        let Some(body_key) = body_key else {
            self.body_size = 10.0;
            return;
        };
        self.body_size = body_key as f32 / 10.0;

        let mut larger: Vec<f32> = self
            .histogram
            .keys()
            .map(|k| *k as f32 / 10.0)
            .filter(|s| *s >= self.body_size + 1.5)
            .collect();
        larger.sort_by(|a, b| b.total_cmp(a));
        // Sizes within half a point of each other are one level.
        let mut merged: Vec<f32> = Vec::new();
        for s in larger {
            if merged.last().is_none_or(|last| last - s > 0.5) {
                merged.push(s);
            }
        }
        self.heading_sizes = merged;
    }

    /// Heading level implied by font size alone (`None` for body text).
    pub fn level_for_size(&self, size: f32, max_level: u8) -> Option<u8> {
        if size < self.body_size + 1.5 {
            return None;
        }
        let pos = self
            .heading_sizes
            .iter()
            .position(|&h| size >= h - 0.5)
            .unwrap_or(self.heading_sizes.len());
        Some(((pos + 1) as u8).min(max_level))
    }
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Analyse every page and return blocks in global reading order.
///
/// Pages are processed in ascending page number; ids are assigned densely
/// so `blocks[i].id == i`.
pub fn analyze_pages(mut pages: Vec<RawPage>, opts: &LayoutOptions) -> Vec<ContentBlock> {
    pages.sort_by_key(|p| p.number);
    let stats = FontStatistics::from_pages(&pages);
    debug!(
        "Font statistics: body={:.1}pt headings={:?}",
        stats.body_size, stats.heading_sizes
    );

    let mut blocks = Vec::new();
    for page in pages {
        let page_blocks = analyze_page(page, &stats, opts);
        for mut b in page_blocks {
            b.id = blocks.len();
            blocks.push(b);
        }
    }
    blocks
}

/// Analyse one page with document-wide font statistics.
pub fn analyze_page(page: RawPage, stats: &FontStatistics, opts: &LayoutOptions) -> Vec<ContentBlock> {
    let page_no = page.number;
    let mut runs = Vec::new();
    let mut images = Vec::new();
    for el in page.elements {
        match el {
            PageElement::Text(r) if !r.text.trim().is_empty() => runs.push(r),
            PageElement::Text(_) => {}
            PageElement::Image(img) => images.push(img),
        }
    }

    let gutter = detect_gutter(&runs, opts);
    debug!("Page {}: {} runs, {} images, gutter={:?}", page_no, runs.len(), images.len(), gutter);

    // Lines are grouped per region so text at the same height in the two
    // columns never fuses.
    let mut by_region: [Vec<TextRun>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for run in runs {
        by_region[region_of(&run.bbox, gutter) as usize].push(run);
    }
    let mut items: Vec<Item> = Vec::new();
    for (idx, region_runs) in by_region.into_iter().enumerate() {
        let region = Region::from_index(idx);
        for line in group_runs_into_lines(region_runs) {
            items.push(Item::new(region, ItemBody::Line(line)));
        }
    }
    for img in images {
        let region = region_of(&img.bbox, gutter);
        items.push(Item::new(region, ItemBody::Image(img)));
    }

    order_items(&mut items);
    let items = detect_tables(items, opts);
    let mut blocks = build_blocks(items, page_no, stats, opts);
    attach_captions(&mut blocks);
    blocks
}

// ── Columns and reading order ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Region {
    Left = 0,
    Right = 1,
    Full = 2,
}

impl Region {
    fn from_index(i: usize) -> Self {
        match i {
            0 => Region::Left,
            1 => Region::Right,
            _ => Region::Full,
        }
    }
}

fn region_of(bbox: &BoundingBox, gutter: Option<f32>) -> Region {
    match gutter {
        None => Region::Full,
        Some(g) if bbox.x0 < g - 1.0 && bbox.x1 > g + 1.0 => Region::Full,
        Some(g) if bbox.center_x() < g => Region::Left,
        Some(_) => Region::Right,
    }
}

/// Find the x coordinate of a two-column gutter, if any.
///
/// The occupied x-range is cut into 3pt slices; the widest empty stretch in
/// the middle 70% of the page is a gutter when it is wide enough, both
/// columns are wide enough, and each side holds at least 10% of the runs.
/// Runs spanning almost the whole width (titles, abstracts) are ignored so
/// they do not fill the gutter.
fn detect_gutter(runs: &[TextRun], opts: &LayoutOptions) -> Option<f32> {
    const SLICE: f32 = 3.0;
    if runs.len() < 4 {
        return None;
    }
    let min_x = runs.iter().map(|r| r.bbox.x0).fold(f32::MAX, f32::min);
    let max_x = runs.iter().map(|r| r.bbox.x1).fold(f32::MIN, f32::max);
    let extent = max_x - min_x;
    if extent < opts.min_column_width * 2.0 + opts.min_gutter {
        return None;
    }

    let n = (extent / SLICE) as usize + 1;
    let mut occupancy = vec![0usize; n];
    let column_runs: Vec<&TextRun> = runs
        .iter()
        .filter(|r| r.bbox.width() < extent * 0.6)
        .collect();
    for r in &column_runs {
        let s = ((r.bbox.x0 - min_x) / SLICE) as usize;
        let e = (((r.bbox.x1 - min_x) / SLICE) as usize).min(n - 1);
        for slot in occupancy.iter_mut().take(e + 1).skip(s) {
            *slot += 1;
        }
    }

    let (lo, hi) = (n * 15 / 100, n * 85 / 100);
    let mut best: Option<(usize, usize)> = None;
    let mut start = None;
    for (i, &occ) in occupancy.iter().enumerate().take(hi).skip(lo) {
        match (occ == 0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if best.is_none_or(|(_, len)| i - s > len) {
                    best = Some((s, i - s));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if best.is_none_or(|(_, len)| hi - s > len) {
            best = Some((s, hi - s));
        }
    }

    let (gs, glen) = best?;
    if (glen as f32) * SLICE < opts.min_gutter {
        return None;
    }
    // Prose fills its column; sparse table cells leave holes on both sides.
    let fill = |slots: &[usize]| {
        slots.iter().filter(|&&o| o > 0).count() as f32 / slots.len().max(1) as f32
    };
    if fill(&occupancy[..gs]) < 0.8 || fill(&occupancy[gs + glen..]) < 0.8 {
        return None;
    }
    let gutter = min_x + (gs as f32 + glen as f32 / 2.0) * SLICE;
    if gutter - min_x < opts.min_column_width || max_x - gutter < opts.min_column_width {
        return None;
    }
    let left = column_runs.iter().filter(|r| r.bbox.center_x() < gutter).count();
    let right = column_runs.len() - left;
    let min_share = (column_runs.len() / 10).max(2);
    if left < min_share || right < min_share {
        return None;
    }
    Some(gutter)
}

#[derive(Debug, Clone)]
struct Line {
    runs: Vec<TextRun>,
    bbox: BoundingBox,
    font_size: f32,
    bold: bool,
    text: String,
}

impl Line {
    fn from_runs(mut runs: Vec<TextRun>) -> Self {
        runs.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        let bbox = runs
            .iter()
            .skip(1)
            .fold(runs[0].bbox, |acc, r| acc.union(&r.bbox));
        let total: usize = runs.iter().map(|r| r.text.chars().count()).sum();
        let font_size = if total > 0 {
            runs.iter()
                .map(|r| r.font_size * r.text.chars().count() as f32)
                .sum::<f32>()
                / total as f32
        } else {
            runs[0].font_size
        };
        let bold_chars: usize = runs
            .iter()
            .filter(|r| r.bold)
            .map(|r| r.text.chars().count())
            .sum();
        let text = join_runs(&runs);
        Self {
            bold: bold_chars * 2 > total,
            runs,
            bbox,
            font_size,
            text,
        }
    }

    /// Text chunks separated by gaps wide enough to be table cells.
    fn cells(&self, min_gap: f32) -> Vec<(f32, String)> {
        let mut cells: Vec<(f32, Vec<TextRun>)> = Vec::new();
        let mut last_x1 = f32::MIN;
        for r in &self.runs {
            if cells.is_empty() || r.bbox.x0 - last_x1 >= min_gap {
                cells.push((r.bbox.x0, vec![r.clone()]));
            } else if let Some((_, c)) = cells.last_mut() {
                c.push(r.clone());
            }
            last_x1 = last_x1.max(r.bbox.x1);
        }
        cells
            .into_iter()
            .map(|(x, rs)| (x, join_runs(&rs)))
            .collect()
    }
}

/// Join runs left to right, inserting a space where the gap is visible.
fn join_runs(runs: &[TextRun]) -> String {
    let mut out = String::new();
    let mut prev: Option<&TextRun> = None;
    for r in runs {
        let t = r.text.as_str();
        if let Some(p) = prev {
            let gap = r.bbox.x0 - p.bbox.x1;
            let needs_space = gap > p.font_size.min(r.font_size) * 0.15
                && !out.ends_with(char::is_whitespace)
                && !t.starts_with(char::is_whitespace);
            if needs_space {
                out.push(' ');
            }
        }
        out.push_str(t);
        prev = Some(r);
    }
    collapse_spaces(out.trim())
}

fn collapse_spaces(s: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]{2,}").unwrap());
    RE.replace_all(s, " ").into_owned()
}

fn group_runs_into_lines(mut runs: Vec<TextRun>) -> Vec<Line> {
    if runs.is_empty() {
        return Vec::new();
    }
    let center_y = |b: &BoundingBox| (b.y0 + b.y1) / 2.0;
    runs.sort_by(|a, b| {
        center_y(&a.bbox)
            .total_cmp(&center_y(&b.bbox))
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut lines = Vec::new();
    let mut current: Vec<TextRun> = Vec::new();
    let mut line_y = 0.0f32;
    let mut line_size = 0.0f32;
    for run in runs {
        let cy = center_y(&run.bbox);
        let tolerance = run.font_size.max(line_size) * 0.35;
        if !current.is_empty() && (cy - line_y).abs() > tolerance {
            lines.push(Line::from_runs(std::mem::take(&mut current)));
        }
        if current.is_empty() {
            line_y = cy;
            line_size = run.font_size;
        }
        current.push(run);
    }
    if !current.is_empty() {
        lines.push(Line::from_runs(current));
    }
    lines
}

#[derive(Debug, Clone)]
enum ItemBody {
    Line(Line),
    Image(ImageElement),
    Table(TableGrid),
}

#[derive(Debug, Clone)]
struct Item {
    region: Region,
    band: usize,
    bbox: BoundingBox,
    body: ItemBody,
}

impl Item {
    fn new(region: Region, body: ItemBody) -> Self {
        let bbox = match &body {
            ItemBody::Line(l) => l.bbox,
            ItemBody::Image(i) => i.bbox,
            ItemBody::Table(_) => BoundingBox::default(),
        };
        Self {
            region,
            band: 0,
            bbox,
            body,
        }
    }

    fn line(&self) -> Option<&Line> {
        match &self.body {
            ItemBody::Line(l) => Some(l),
            _ => None,
        }
    }
}

/// Sort items band by band: left column, right column, then the full-width
/// group closing the band.
///
/// Consecutive full-width items with no column content between them form one
/// group, so a single-column page is a single band.
fn order_items(items: &mut [Item]) {
    let mut full_tops: Vec<f32> = items
        .iter()
        .filter(|i| i.region == Region::Full)
        .map(|i| i.bbox.y0)
        .collect();
    full_tops.sort_by(f32::total_cmp);
    let column_tops: Vec<f32> = items
        .iter()
        .filter(|i| i.region != Region::Full)
        .map(|i| i.bbox.y0)
        .collect();

    let mut group_starts: Vec<f32> = Vec::new();
    for (k, &top) in full_tops.iter().enumerate() {
        let opens_group = match k.checked_sub(1).map(|p| full_tops[p]) {
            None => true,
            Some(prev) => column_tops.iter().any(|&t| t > prev && t <= top),
        };
        if opens_group {
            group_starts.push(top);
        }
    }

    for item in items.iter_mut() {
        let y0 = item.bbox.y0;
        item.band = match item.region {
            Region::Full => {
                let group = group_starts.iter().filter(|&&s| s <= y0).count();
                2 * group.saturating_sub(1) + 1
            }
            _ => 2 * group_starts.iter().filter(|&&s| s < y0).count(),
        };
    }
    items.sort_by(|a, b| {
        a.band
            .cmp(&b.band)
            .then(a.region.cmp(&b.region))
            .then(a.bbox.y0.total_cmp(&b.bbox.y0))
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
}

// ── Tables ───────────────────────────────────────────────────────────────

/// Replace runs of aligned multi-cell lines with table items.
///
/// A table is at least `min_table_rows` consecutive lines in the same
/// column and band, each splitting into the same number of cells
/// (`min_table_columns..=max_table_columns`) whose left edges line up.
fn detect_tables(items: Vec<Item>, opts: &LayoutOptions) -> Vec<Item> {
    let cell_rows: Vec<Option<Vec<(f32, String)>>> = items
        .iter()
        .map(|it| {
            it.line().and_then(|l| {
                let cells = l.cells(opts.min_cell_gap);
                (cells.len() >= opts.min_table_columns && cells.len() <= opts.max_table_columns)
                    .then_some(cells)
            })
        })
        .collect();

    let aligned = |a: &[(f32, String)], b: &[(f32, String)]| {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x.0 - y.0).abs() <= opts.min_cell_gap)
    };

    let mut out = Vec::with_capacity(items.len());
    let mut i = 0;
    while i < items.len() {
        let mut j = i;
        if let Some(first) = &cell_rows[i] {
            while j + 1 < items.len()
                && items[j + 1].region == items[i].region
                && items[j + 1].band == items[i].band
                && matches!(&cell_rows[j + 1], Some(next) if aligned(first, next))
            {
                j += 1;
            }
        }
        let rows = j - i + 1;
        if cell_rows[i].is_some() && rows >= opts.min_table_rows {
            let grid = TableGrid {
                rows: cell_rows[i..=j]
                    .iter()
                    .flatten()
                    .map(|cells| cells.iter().map(|(_, t)| t.clone()).collect())
                    .collect(),
            };
            let bbox = items[i..=j]
                .iter()
                .skip(1)
                .fold(items[i].bbox, |acc, it| acc.union(&it.bbox));
            debug!("Detected table: {} rows × {} cols", rows, grid.column_count());
            out.push(Item {
                region: items[i].region,
                band: items[i].band,
                bbox,
                body: ItemBody::Table(grid),
            });
            i = j + 1;
        } else {
            out.push(items[i].clone());
            i += 1;
        }
    }
    out
}

// ── Paragraphs and classification ────────────────────────────────────────

static NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:\d+\.)*\d+|[IVX]+)\.?\s+\p{Lu}").unwrap()
});

static NAMED_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(abstract|introduction|related work|background|conclusions?|discussion|acknowledge?ments?|references|bibliography|appendix)\s*$",
    )
    .unwrap()
});

static CAPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(figure|fig\.|table)\s*(\d+|[ivx]+)\s*[.:|]").unwrap()
});

static EQUATION_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"=.*\(\d+[a-z]?\)\s*$").unwrap());

fn heading_level(line: &Line, stats: &FontStatistics, opts: &LayoutOptions) -> Option<u8> {
    let text = line.text.trim();
    let chars = text.chars().count();
    if chars == 0 || chars > 120 || (text.ends_with('.') && chars > 40) {
        return None;
    }
    if let Some(level) = stats.level_for_size(line.font_size, opts.max_heading_level) {
        return Some(level);
    }
    if !line.bold || line.font_size < stats.body_size - 0.5 {
        return None;
    }
    if let Some(m) = NUMBERED_HEADING.captures(text) {
        let depth = m[1].split('.').count() as u8;
        return Some((depth + 1).min(opts.max_heading_level));
    }
    NAMED_HEADING
        .is_match(text)
        .then_some(2.min(opts.max_heading_level))
}

fn is_math_char(c: char) -> bool {
    matches!(c, '=' | '+' | '<' | '>' | '^' | '_' | '|' | '∑' | '∫' | '∏' | '√' | '±' | '·' | '×' | '÷' | '−')
        || ('\u{0391}'..='\u{03C9}').contains(&c)
        || ('\u{2200}'..='\u{22FF}').contains(&c)
        || ('\u{1D400}'..='\u{1D7FF}').contains(&c)
}

/// Dense-math heuristic for short paragraphs.
pub fn looks_like_equation(text: &str, symbol_ratio: f32) -> bool {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > 300 {
        return false;
    }
    let visible: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let math = visible.iter().filter(|c| is_math_char(**c)).count();
    let ratio = math as f32 / visible.len().max(1) as f32;
    ratio >= symbol_ratio || (len <= 160 && EQUATION_NUMBER.is_match(trimmed))
}

struct Paragraph {
    lines: Vec<Line>,
    heading: Option<u8>,
}

impl Paragraph {
    fn bbox(&self) -> BoundingBox {
        self.lines
            .iter()
            .skip(1)
            .fold(self.lines[0].bbox, |acc, l| acc.union(&l.bbox))
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for l in &self.lines {
            let t = l.text.trim();
            if out.ends_with('-') && t.starts_with(|c: char| c.is_lowercase()) {
                out.pop();
            } else if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(t);
        }
        out
    }
}

fn build_blocks(
    items: Vec<Item>,
    page: usize,
    stats: &FontStatistics,
    opts: &LayoutOptions,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut para: Option<(Region, usize, Paragraph)> = None;

    let flush = |para: &mut Option<(Region, usize, Paragraph)>, blocks: &mut Vec<ContentBlock>| {
        if let Some((_, _, p)) = para.take() {
            let text = p.text();
            if text.is_empty() {
                return;
            }
            let kind = if p.heading.is_none() && looks_like_equation(&text, opts.equation_symbol_ratio) {
                BlockKind::Equation
            } else {
                BlockKind::Text
            };
            blocks.push(ContentBlock {
                id: 0,
                kind,
                content: text,
                page,
                bbox: p.bbox(),
                heading_level: p.heading,
                caption: None,
                media: None,
                table: None,
            });
        }
    };

    for item in items {
        match item.body {
            ItemBody::Line(line) => {
                let level = heading_level(&line, stats, opts);
                let breaks = match &para {
                    None => true,
                    Some((region, band, p)) => {
                        let prev = &p.lines[p.lines.len() - 1];
                        *region != item.region
                            || *band != item.band
                            || p.heading != level
                            || line_breaks_paragraph(prev, &line, opts)
                    }
                };
                if breaks {
                    flush(&mut para, &mut blocks);
                    para = Some((
                        item.region,
                        item.band,
                        Paragraph {
                            lines: vec![line],
                            heading: level,
                        },
                    ));
                } else if let Some((_, _, p)) = para.as_mut() {
                    p.lines.push(line);
                }
            }
            ItemBody::Image(img) => {
                flush(&mut para, &mut blocks);
                blocks.push(ContentBlock {
                    id: 0,
                    kind: BlockKind::Figure,
                    content: String::new(),
                    page,
                    bbox: img.bbox,
                    heading_level: None,
                    caption: None,
                    media: Some(img.image),
                    table: None,
                });
            }
            ItemBody::Table(grid) => {
                flush(&mut para, &mut blocks);
                blocks.push(ContentBlock {
                    id: 0,
                    kind: BlockKind::Table,
                    content: grid.to_text(),
                    page,
                    bbox: item.bbox,
                    heading_level: None,
                    caption: None,
                    media: None,
                    table: Some(grid),
                });
            }
        }
    }
    flush(&mut para, &mut blocks);
    blocks
}

fn line_breaks_paragraph(prev: &Line, curr: &Line, opts: &LayoutOptions) -> bool {
    let gap = curr.bbox.y0 - prev.bbox.y1;
    if gap > prev.font_size.max(curr.font_size) * 0.8 {
        return true;
    }
    if (prev.font_size - curr.font_size).abs() > 1.0 {
        return true;
    }
    // An indented line starts a new paragraph; returning to the margin does not.
    if curr.bbox.x0 - prev.bbox.x0 > 8.0 {
        return true;
    }
    let prev_math = looks_like_equation(&prev.text, opts.equation_symbol_ratio);
    let curr_math = looks_like_equation(&curr.text, opts.equation_symbol_ratio);
    prev_math != curr_math
}

/// Move "Figure N" / "Table N" paragraphs onto the nearest uncaptioned
/// figure or table of the same page.
fn attach_captions(blocks: &mut Vec<ContentBlock>) {
    let mut consumed = Vec::new();
    for i in 0..blocks.len() {
        if blocks[i].kind != BlockKind::Text || blocks[i].heading_level.is_some() {
            continue;
        }
        let Some(m) = CAPTION.captures(&blocks[i].content) else {
            continue;
        };
        let target_kind = if m[1].eq_ignore_ascii_case("table") {
            BlockKind::Table
        } else {
            BlockKind::Figure
        };
        let caption_box = blocks[i].bbox;
        let target = blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == target_kind && b.caption.is_none())
            .min_by(|(_, a), (_, b)| {
                a.bbox
                    .vertical_gap(&caption_box)
                    .total_cmp(&b.bbox.vertical_gap(&caption_box))
            })
            .map(|(j, _)| j);
        if let Some(j) = target {
            let caption = blocks[i].content.clone();
            debug!("Caption '{}' → block {}", truncate(&caption, 40), j);
            if blocks[j].kind == BlockKind::Figure {
                blocks[j].content = caption.clone();
            }
            blocks[j].caption = Some(caption);
            consumed.push(i);
        }
    }
    for i in consumed.into_iter().rev() {
        blocks.remove(i);
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
