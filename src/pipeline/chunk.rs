//! Chunking: group ordered blocks into summariser-sized requests.
//!
//! Rules, in order of precedence:
//!
//! 1. A heading at or above `section_heading_level` opens a section. A
//!    heading that arrives before its section has any body merges into the
//!    section title (stacked headings like "3 Model" / "3.1 Encoder").
//! 2. Prose and equations accumulate until the next block would push the
//!    chunk past `max_chars`; the chunk then closes and the section title
//!    carries over to the next one.
//! 3. An equation stays with the text just before it and pulls in the text
//!    just after it, even past the limit. Inside a chunk, equations are
//!    tagged `[E1]`, `[E2]`, … so the summariser can point bullets at them.
//! 4. In a references section there is no gluing; chunks split on block
//!    boundaries only.
//! 5. Each table is its own chunk. Figures never leave the process; they
//!    become local plan items.
//!
//! Every block id lands in exactly one plan item. A block larger than
//! `max_chars` is never split; it travels alone and is logged.

use crate::model::{BlockId, BlockKind, ContentBlock, MediaAsset, TableGrid};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Tunables for [`build_chunks`].
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub max_chars: usize,
    pub section_heading_level: u8,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            section_heading_level: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Prose,
    Table,
}

/// One summariser request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub kind: ChunkKind,
    /// Section title (prose) or caption (table).
    pub heading: Option<String>,
    /// Exact text sent to the summariser.
    pub text: String,
    pub sources: Vec<BlockId>,
    pub pages: Vec<usize>,
    pub references: bool,
    /// A single block exceeded the size limit.
    pub oversize: bool,
    /// The grid, for table chunks.
    pub table: Option<TableGrid>,
    /// Tagged equations, in text order.
    pub equations: Vec<EquationRef>,
}

/// An equation block as tagged in a chunk's text.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationRef {
    /// `"E1"`, `"E2"`, … unique within the chunk.
    pub label: String,
    pub block: BlockId,
    pub text: String,
}

/// A figure handled without a remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureItem {
    pub block: BlockId,
    pub page: usize,
    pub caption: Option<String>,
    pub media: Option<MediaAsset>,
    /// The paragraph read just before the figure, for its slide caption.
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    Remote(Chunk),
    Figure(FigureItem),
}

impl PlanItem {
    pub fn first_block(&self) -> BlockId {
        match self {
            PlanItem::Remote(c) => c.sources.first().copied().unwrap_or_default(),
            PlanItem::Figure(f) => f.block,
        }
    }

    pub fn sources(&self) -> Vec<BlockId> {
        match self {
            PlanItem::Remote(c) => c.sources.clone(),
            PlanItem::Figure(f) => vec![f.block],
        }
    }
}

/// Plan items in reading order of their first source block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkPlan {
    pub items: Vec<PlanItem>,
}

impl ChunkPlan {
    pub fn remote_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, PlanItem::Remote(_)))
            .count()
    }
}

/// Longest excerpt of the preceding paragraph sent with a figure.
const FIGURE_CONTEXT_CHARS: usize = 500;

/// The first `max_chars` characters of `text`, cut at a word boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(i) if i > 0 => format!("{}…", cut[..i].trim_end()),
        _ => format!("{}…", cut),
    }
}

static REFERENCES_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(reference|bibliograph|tài liệu tham khảo)").unwrap());

/// Accumulator for the section currently being chunked.
#[derive(Default)]
struct Section {
    title: Option<String>,
    /// Heading blocks not yet emitted with a chunk.
    heading_ids: Vec<BlockId>,
    body: Vec<(BlockId, BlockKind, usize, String)>,
    body_len: usize,
    references: bool,
    oversize: bool,
}

impl Section {
    fn push(&mut self, block: &ContentBlock) {
        let text = block.content.trim().to_string();
        self.body_len += text.chars().count();
        self.body.push((block.id, block.kind, block.page, text));
    }

    fn pop_last_text(&mut self) -> Option<(BlockId, BlockKind, usize, String)> {
        if matches!(self.body.last(), Some((_, BlockKind::Text, _, _))) {
            let last = self.body.pop()?;
            self.body_len -= last.3.chars().count();
            Some(last)
        } else {
            None
        }
    }

    /// Emit the body as a chunk. The title survives for continuation chunks.
    fn flush(&mut self, pages_of: &dyn Fn(BlockId) -> usize, out: &mut Vec<PlanItem>) {
        if self.body.is_empty() {
            return;
        }
        let mut sources: Vec<BlockId> = std::mem::take(&mut self.heading_ids);
        sources.extend(self.body.iter().map(|b| b.0));
        sources.sort_unstable();

        let mut equations = Vec::new();
        let mut lines = Vec::with_capacity(self.body.len());
        for (id, kind, _, text) in &self.body {
            if *kind == BlockKind::Equation && !self.references && !text.is_empty() {
                let label = format!("E{}", equations.len() + 1);
                lines.push(format!("[{}] {}", label, text));
                equations.push(EquationRef {
                    label,
                    block: *id,
                    text: text.clone(),
                });
            } else {
                lines.push(text.clone());
            }
        }
        let body = lines.join("\n");
        let text = match &self.title {
            Some(t) => format!("{}\n{}", t, body),
            None => body,
        };
        let mut pages: Vec<usize> = sources.iter().map(|&id| pages_of(id)).collect();
        pages.sort_unstable();
        pages.dedup();

        debug!("Chunk: {} blocks, {} chars", sources.len(), text.chars().count());
        out.push(PlanItem::Remote(Chunk {
            kind: ChunkKind::Prose,
            heading: self.title.clone(),
            text,
            sources,
            pages,
            references: self.references,
            oversize: self.oversize,
            table: None,
            equations,
        }));
        self.body.clear();
        self.body_len = 0;
        self.oversize = false;
    }
}

/// Split blocks into a chunk plan.
pub fn build_chunks(blocks: &[ContentBlock], opts: &ChunkOptions) -> ChunkPlan {
    let page_by_id: std::collections::HashMap<BlockId, usize> =
        blocks.iter().map(|b| (b.id, b.page)).collect();
    let pages_of = |id: BlockId| page_by_id.get(&id).copied().unwrap_or(1);

    let mut items = Vec::new();
    let mut section = Section::default();
    let mut glue_next = false;
    let mut last_paragraph: Option<&str> = None;

    for block in blocks {
        match block.kind {
            BlockKind::Figure => {
                items.push(PlanItem::Figure(FigureItem {
                    block: block.id,
                    page: block.page,
                    caption: block.caption.clone(),
                    media: block.media.clone(),
                    context: last_paragraph.map(|p| excerpt(p, FIGURE_CONTEXT_CHARS)),
                }));
            }
            BlockKind::Table => {
                let grid = block.table.clone().unwrap_or_default();
                let body = if grid.rows.is_empty() {
                    block.content.clone()
                } else {
                    grid.to_text()
                };
                let text = match &block.caption {
                    Some(c) => format!("{}\n{}", c, body),
                    None => body,
                };
                items.push(PlanItem::Remote(Chunk {
                    kind: ChunkKind::Table,
                    heading: block.caption.clone(),
                    oversize: text.chars().count() > opts.max_chars,
                    text,
                    sources: vec![block.id],
                    pages: vec![block.page],
                    references: false,
                    table: Some(grid),
                    equations: Vec::new(),
                }));
            }
            BlockKind::Text
                if block
                    .heading_level
                    .is_some_and(|l| l <= opts.section_heading_level) =>
            {
                let heading = block.content.trim().to_string();
                if section.body.is_empty() && !section.heading_ids.is_empty() {
                    let merged = match section.title.take() {
                        Some(t) => format!("{}\n{}", t, heading),
                        None => heading,
                    };
                    section.title = Some(merged);
                } else {
                    section.flush(&pages_of, &mut items);
                    section.title = Some(heading);
                }
                section.heading_ids.push(block.id);
                section.references = section
                    .title
                    .as_deref()
                    .is_some_and(|t| REFERENCES_TITLE.is_match(t));
                glue_next = false;
            }
            BlockKind::Text | BlockKind::Equation => {
                if block.kind == BlockKind::Text && !block.content.trim().is_empty() {
                    last_paragraph = Some(block.content.trim());
                }
                let len = block.content.trim().chars().count();
                if len == 0 {
                    // Still owned by the current section so no id goes missing.
                    section.body.push((block.id, block.kind, block.page, String::new()));
                    continue;
                }
                let over = section.body_len + len > opts.max_chars;

                if block.kind == BlockKind::Equation && !section.references {
                    if over && !section.body.is_empty() {
                        let carried = section.pop_last_text();
                        section.flush(&pages_of, &mut items);
                        if let Some(c) = carried {
                            section.body_len += c.3.chars().count();
                            section.body.push(c);
                        }
                    }
                    section.push(block);
                    glue_next = true;
                } else {
                    if over && !glue_next && !section.body.is_empty() {
                        section.flush(&pages_of, &mut items);
                    }
                    section.push(block);
                    glue_next = false;
                }

                if len > opts.max_chars {
                    warn!(
                        "Block {} on page {} is {} chars (limit {}); sending it unsplit",
                        block.id, block.page, len, opts.max_chars
                    );
                    section.oversize = true;
                }
            }
        }
    }
    section.flush(&pages_of, &mut items);

    // A document that ends on headings with no body still owns them.
    if !section.heading_ids.is_empty() {
        let sources = std::mem::take(&mut section.heading_ids);
        let title = section.title.clone().unwrap_or_default();
        let mut pages: Vec<usize> = sources.iter().map(|&id| pages_of(id)).collect();
        pages.sort_unstable();
        pages.dedup();
        items.push(PlanItem::Remote(Chunk {
            kind: ChunkKind::Prose,
            heading: Some(title.clone()),
            text: title,
            sources,
            pages,
            references: section.references,
            oversize: false,
            table: None,
            equations: Vec::new(),
        }));
    }

    items.sort_by_key(PlanItem::first_block);
    debug!(
        "Chunk plan: {} items ({} remote)",
        items.len(),
        items.iter().filter(|i| matches!(i, PlanItem::Remote(_))).count()
    );
    ChunkPlan { items }
}
