//! Data carried between pipeline stages.
//!
//! ```text
//! ContentBlock ──(N:1)──▶ SummaryUnit ──(N:1)──▶ Slide ──▶ SlideDeck
//! ```
//!
//! Blocks are immutable once the extractor has emitted them. Each block id
//! ends up in exactly one summary unit, and each unit feeds exactly one
//! topic slide (plus its "(cont.)" overflow slides).

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};

/// Position of a block in global reading order (0-based, dense).
pub type BlockId = usize;

/// Axis-aligned rectangle in PDF points, measured from the **top-left**
/// corner of the page (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Vertical distance between the two boxes (0 when they overlap).
    pub fn vertical_gap(&self, other: &BoundingBox) -> f32 {
        if self.y1 < other.y0 {
            other.y0 - self.y1
        } else if other.y1 < self.y0 {
            self.y0 - other.y1
        } else {
            0.0
        }
    }
}

/// What a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Table,
    Figure,
    Equation,
}

/// A PNG-encoded raster image lifted from the PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    #[serde(with = "base64_bytes")]
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Cell text of a detected table, row-major. Row 0 is the header when the
/// table has one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Pipe-separated plain-text rendering, used as summariser input.
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|r| r.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One unit of extracted content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Reading-order position.
    pub id: BlockId,
    pub kind: BlockKind,
    /// Text for text/equation blocks, the caption (or empty) for figures,
    /// the flattened grid for tables.
    pub content: String,
    /// 1-indexed page number.
    pub page: usize,
    pub bbox: BoundingBox,
    /// 1 (top) … 3 for headings, `None` for body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableGrid>,
}

impl ContentBlock {
    pub fn is_heading(&self) -> bool {
        self.kind == BlockKind::Text && self.heading_level.is_some()
    }
}

// ── Summary units ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Running prose (with its equations) under one section heading.
    Section,
    Table,
    Figure,
}

/// How a unit got its condensed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
    /// The summariser answered.
    Summarized,
    /// Built locally without a remote call (figures).
    Local,
    /// The summariser failed; the slide shows a placeholder.
    Missing { error: ChunkError },
}

/// A visual attached to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub block: BlockId,
    pub page: usize,
    /// Caption as printed in the PDF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// One-sentence slide caption written by the summariser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub content: VisualContent,
}

impl Visual {
    /// The text shown under the visual on a slide: the short label when
    /// there is one, else the PDF caption.
    pub fn display_caption(&self) -> Option<&str> {
        self.label
            .as_deref()
            .or(self.caption.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisualContent {
    Image(MediaAsset),
    Table(TableGrid),
}

/// The condensed form of one or more adjacent blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryUnit {
    /// Position in the unit sequence.
    pub index: usize,
    pub kind: UnitKind,
    /// Source blocks, ascending. Never empty.
    pub sources: Vec<BlockId>,
    /// Distinct 1-indexed pages the sources sit on, ascending.
    pub pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Cleaned summary text.
    pub text: String,
    /// `text` split into bullet lines.
    pub bullets: Vec<String>,
    #[serde(flatten)]
    pub status: SummaryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<Visual>,
    /// Equations the bullets point at.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equations: Vec<EquationLink>,
    /// Prose chunk came from a references section.
    #[serde(default)]
    pub references: bool,
}

/// An equation block referenced by one bullet of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationLink {
    /// Index into [`SummaryUnit::bullets`].
    pub bullet: usize,
    pub block: BlockId,
    pub text: String,
}

impl SummaryUnit {
    pub fn first_block(&self) -> BlockId {
        self.sources.first().copied().unwrap_or_default()
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.status, SummaryStatus::Missing { .. })
    }

    pub fn first_page(&self) -> usize {
        self.pages.first().copied().unwrap_or(1)
    }
}

// ── Slides ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    Title,
    Content,
}

/// One line in a slide body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum SlideItem {
    Bullet(String),
    /// Stand-in for content the summariser could not produce.
    Placeholder(String),
    /// An equation shown under the bullet before it.
    Equation(String),
}

impl SlideItem {
    pub fn text(&self) -> &str {
        match self {
            SlideItem::Bullet(t) | SlideItem::Placeholder(t) | SlideItem::Equation(t) => t,
        }
    }

    /// Equations ride along with their bullet and do not count towards
    /// the bullets-per-slide limit.
    pub fn is_equation(&self) -> bool {
        matches!(self, SlideItem::Equation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Position in the deck (0-based).
    pub index: usize,
    pub kind: SlideKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub items: Vec<SlideItem>,
    pub visuals: Vec<Visual>,
    pub source_pages: Vec<usize>,
    pub source_units: Vec<usize>,
    pub has_missing_content: bool,
}

/// The composed presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideDeck {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub slides: Vec<Slide>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
