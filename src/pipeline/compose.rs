//! Slide composition: summary units → [`SlideDeck`].
//!
//! Each section unit becomes one topic slide; bullets beyond
//! `max_bullets_per_slide` spill onto "(cont.)" slides. Figure and table
//! units do not open slides of their own. They attach to the first topic
//! slide whose sources share their page, falling back to the nearest
//! preceding topic, then the nearest following one. Only a document with
//! no prose at all gets one slide per figure/table.
//!
//! Slide order follows the first source block of each topic, so the deck
//! reads in the same order as the paper.
//!
//! An equation a bullet points at is shown right under that bullet and
//! never counts towards the bullet limit.

use crate::error::SlideGenError;
use crate::model::{
    BlockId, EquationLink, Slide, SlideDeck, SlideItem, SlideKind, SummaryUnit, UnitKind, Visual,
};
use crate::output::DocumentMetadata;
use crate::pipeline::postprocess::first_sentence;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Bullet shown where the summariser produced nothing.
pub const PLACEHOLDER: &str = "[Summary unavailable]";

const CONT_SUFFIX: &str = " (cont.)";

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub max_bullets_per_slide: usize,
    pub max_media_per_slide: usize,
    pub include_title_slide: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            max_bullets_per_slide: 5,
            max_media_per_slide: 2,
            include_title_slide: false,
        }
    }
}

/// Content destined for one topic, before it is cut into slides.
struct Topic {
    title: String,
    first_block: BlockId,
    items: Vec<SlideItem>,
    visuals: Vec<Visual>,
    units: Vec<usize>,
    pages: BTreeSet<usize>,
    missing: bool,
}

impl Topic {
    fn add_unit(&mut self, unit: &SummaryUnit) {
        self.units.push(unit.index);
        self.pages.extend(unit.pages.iter().copied());
        if unit.is_missing() {
            self.missing = true;
        }
    }
}

/// Build a deck from summary units in reading order.
///
/// # Errors
/// [`SlideGenError::EmptyContent`] when no unit carries text, bullets or a
/// visual.
pub fn compose_deck(
    units: &[SummaryUnit],
    metadata: &DocumentMetadata,
    opts: &ComposeOptions,
) -> Result<SlideDeck, SlideGenError> {
    let has_content = units.iter().any(|u| {
        !u.bullets.is_empty() || !u.text.trim().is_empty() || u.visual.is_some() || u.is_missing()
    });
    if !has_content {
        return Err(SlideGenError::EmptyContent {
            source_name: metadata
                .title
                .clone()
                .unwrap_or_else(|| "document".to_string()),
            pages: metadata.page_count,
            flagged: 0,
        });
    }

    let mut topics = section_topics(units);
    attach_visual_units(units, &mut topics);
    topics.sort_by_key(|t| t.first_block);

    let deck_title = deck_title(units, metadata);
    let mut slides = Vec::new();

    if opts.include_title_slide {
        slides.push(Slide {
            index: 0,
            kind: SlideKind::Title,
            title: deck_title.clone(),
            subtitle: metadata.author.clone(),
            items: Vec::new(),
            visuals: Vec::new(),
            source_pages: Vec::new(),
            source_units: Vec::new(),
            has_missing_content: false,
        });
    }

    for topic in topics {
        split_topic(topic, opts, &mut slides);
    }
    for (i, slide) in slides.iter_mut().enumerate() {
        slide.index = i;
    }

    info!("Composed {} slides from {} units", slides.len(), units.len());
    Ok(SlideDeck {
        title: deck_title,
        author: metadata.author.clone(),
        slides,
    })
}

/// One topic per section unit. Consecutive chunks of the same section are
/// titled "(cont.)".
fn section_topics(units: &[SummaryUnit]) -> Vec<Topic> {
    let mut topics: Vec<Topic> = Vec::new();
    let mut prev_heading: Option<String> = None;

    for unit in units.iter().filter(|u| u.kind == UnitKind::Section) {
        let mut bullets = unit.bullets.clone();
        let heading = unit.heading.as_deref().map(heading_title);

        let title = match &heading {
            Some(h) if prev_heading.as_deref() == Some(h.as_str()) => format!("{h}{CONT_SUFFIX}"),
            Some(h) => h.clone(),
            None => title_from_summary(&mut bullets, &unit.text)
                .unwrap_or_else(|| format!("Page {}", unit.first_page())),
        };
        prev_heading = heading;

        let items = if unit.is_missing() {
            vec![SlideItem::Placeholder(PLACEHOLDER.to_string())]
        } else {
            let consumed = unit.bullets.len() - bullets.len();
            bullet_items(bullets, &unit.equations, consumed)
        };

        let mut topic = Topic {
            title,
            first_block: unit.first_block(),
            items,
            visuals: Vec::new(),
            units: Vec::new(),
            pages: BTreeSet::new(),
            missing: false,
        };
        topic.add_unit(unit);
        topics.push(topic);
    }
    topics
}

/// Bullets with their equations underneath. `consumed` leading bullets
/// went into the title; their equations open the list. Each equation is
/// shown once.
fn bullet_items(bullets: Vec<String>, links: &[EquationLink], consumed: usize) -> Vec<SlideItem> {
    let mut shown: BTreeSet<BlockId> = BTreeSet::new();
    let mut equations_for = |bullet: usize, items: &mut Vec<SlideItem>| {
        for link in links.iter().filter(|l| l.bullet == bullet) {
            if shown.insert(link.block) {
                items.push(SlideItem::Equation(link.text.clone()));
            }
        }
    };

    let mut items = Vec::with_capacity(bullets.len() + links.len());
    for bullet in 0..consumed {
        equations_for(bullet, &mut items);
    }
    for (i, text) in bullets.into_iter().enumerate() {
        items.push(SlideItem::Bullet(text));
        equations_for(i + consumed, &mut items);
    }
    items
}

/// Stacked headings ("3 Model" / "3.1 Encoder") read as one title.
fn heading_title(heading: &str) -> String {
    heading
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(": ")
}

/// Use the first sentence of the summary as the title and remove it from
/// the bullets.
fn title_from_summary(bullets: &mut Vec<String>, text: &str) -> Option<String> {
    let source = bullets.first().map(String::as_str).unwrap_or(text);
    let title = first_sentence(source)?;

    if let Some(first) = bullets.first_mut() {
        let rest = first
            .strip_prefix(title.as_str())
            .map(|r| r.trim_start_matches(['.', '!', '?']).trim().to_string());
        match rest {
            Some(r) if r.is_empty() => {
                bullets.remove(0);
            }
            Some(r) => *first = r,
            None => {}
        }
    }
    Some(title)
}

/// Attach figure/table units to topics, or give them topics of their own
/// when there is no prose at all.
fn attach_visual_units(units: &[SummaryUnit], topics: &mut Vec<Topic>) {
    let standalone = topics.is_empty();

    for unit in units.iter().filter(|u| u.kind != UnitKind::Section) {
        let table_items: Vec<SlideItem> = match unit.kind {
            UnitKind::Table if unit.is_missing() => {
                vec![SlideItem::Placeholder(PLACEHOLDER.to_string())]
            }
            UnitKind::Table => unit.bullets.iter().cloned().map(SlideItem::Bullet).collect(),
            _ => Vec::new(),
        };
        if unit.visual.is_none() && table_items.is_empty() {
            continue;
        }

        if standalone {
            let title = unit
                .heading
                .clone()
                .or_else(|| unit.text.lines().next().map(str::to_string))
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| match unit.kind {
                    UnitKind::Table => format!("Table (page {})", unit.first_page()),
                    _ => format!("Figure (page {})", unit.first_page()),
                });
            let mut topic = Topic {
                title,
                first_block: unit.first_block(),
                items: table_items,
                visuals: unit.visual.iter().cloned().collect(),
                units: Vec::new(),
                pages: BTreeSet::new(),
                missing: false,
            };
            topic.add_unit(unit);
            topics.push(topic);
            continue;
        }

        let target = target_topic(topics, unit.first_page(), unit.first_block());
        debug!(
            "Unit {} ({:?}, page {}) → topic '{}'",
            unit.index,
            unit.kind,
            unit.first_page(),
            topics[target].title
        );
        let topic = &mut topics[target];
        topic.items.extend(table_items);
        topic.visuals.extend(unit.visual.iter().cloned());
        topic.add_unit(unit);
    }
}

/// Same page first; otherwise nearest preceding topic; otherwise the first
/// following one. `topics` is non-empty and in reading order.
fn target_topic(topics: &[Topic], page: usize, block: BlockId) -> usize {
    if let Some(i) = topics.iter().position(|t| t.pages.contains(&page)) {
        return i;
    }
    topics
        .iter()
        .rposition(|t| t.first_block < block)
        .unwrap_or(0)
}

/// Cut a topic into slides of at most `max_bullets` items and
/// `max_media` visuals.
fn split_topic(topic: Topic, opts: &ComposeOptions, slides: &mut Vec<Slide>) {
    let max_bullets = opts.max_bullets_per_slide.max(1);
    let max_media = opts.max_media_per_slide.max(1);

    let item_pages = paginate_items(&topic.items, max_bullets);
    let visual_pages: Vec<Vec<Visual>> =
        topic.visuals.chunks(max_media).map(<[_]>::to_vec).collect();
    let count = item_pages.len().max(visual_pages.len()).max(1);

    let mut item_pages = item_pages.into_iter();
    let mut visual_pages = visual_pages.into_iter();
    for i in 0..count {
        let items = item_pages.next().unwrap_or_default();
        let visuals = visual_pages.next().unwrap_or_default();

        let mut pages = topic.pages.clone();
        pages.extend(visuals.iter().map(|v| v.page));

        let title = if i == 0 || topic.title.ends_with(CONT_SUFFIX) {
            topic.title.clone()
        } else {
            format!("{}{}", topic.title, CONT_SUFFIX)
        };
        let has_missing_content =
            topic.missing && items.iter().any(|it| matches!(it, SlideItem::Placeholder(_)));

        slides.push(Slide {
            index: 0,
            kind: SlideKind::Content,
            title,
            subtitle: None,
            items,
            visuals,
            source_pages: pages.into_iter().collect(),
            source_units: topic.units.clone(),
            has_missing_content,
        });
    }
}

/// Pages of at most `max_bullets` bullets. An equation stays on the page
/// of the bullet before it.
fn paginate_items(items: &[SlideItem], max_bullets: usize) -> Vec<Vec<SlideItem>> {
    let mut pages: Vec<Vec<SlideItem>> = Vec::new();
    let mut count = 0;
    for item in items {
        let opens_page = match pages.last() {
            None => true,
            Some(_) => !item.is_equation() && count == max_bullets,
        };
        if opens_page {
            pages.push(Vec::new());
            count = 0;
        }
        if !item.is_equation() {
            count += 1;
        }
        if let Some(page) = pages.last_mut() {
            page.push(item.clone());
        }
    }
    pages
}

/// Metadata title, else the first top-level heading, else the first
/// heading of any level.
fn deck_title(units: &[SummaryUnit], metadata: &DocumentMetadata) -> String {
    metadata
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            units
                .iter()
                .filter(|u| u.kind == UnitKind::Section)
                .find_map(|u| u.heading.as_deref().map(heading_title))
        })
        .unwrap_or_else(|| "Presentation".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkError;
    use crate::model::{MediaAsset, SummaryStatus, TableGrid, VisualContent};

    fn section(index: usize, sources: Vec<BlockId>, page: usize, heading: Option<&str>, bullets: &[&str]) -> SummaryUnit {
        SummaryUnit {
            index,
            kind: UnitKind::Section,
            sources,
            pages: vec![page],
            heading: heading.map(str::to_string),
            text: bullets.iter().map(|b| format!("• {b}")).collect::<Vec<_>>().join("\n"),
            bullets: bullets.iter().map(|b| b.to_string()).collect(),
            status: SummaryStatus::Summarized,
            visual: None,
            equations: vec![],
            references: false,
        }
    }

    fn figure(index: usize, block: BlockId, page: usize) -> SummaryUnit {
        SummaryUnit {
            index,
            kind: UnitKind::Figure,
            sources: vec![block],
            pages: vec![page],
            heading: Some(format!("Figure {index}.")),
            text: format!("Figure {index}."),
            bullets: vec![],
            status: SummaryStatus::Local,
            visual: Some(Visual {
                block,
                page,
                caption: Some(format!("Figure {index}.")),
                label: None,
                content: VisualContent::Image(MediaAsset {
                    png: vec![0],
                    width: 4,
                    height: 3,
                }),
            }),
            equations: vec![],
            references: false,
        }
    }

    fn compose(units: &[SummaryUnit]) -> SlideDeck {
        compose_deck(units, &DocumentMetadata::default(), &ComposeOptions::default()).unwrap()
    }

    #[test]
    fn one_page_with_figure_is_one_slide() {
        let units = vec![
            section(0, vec![0, 1], 1, Some("1 Introduction"), &["A", "B"]),
            figure(1, 2, 1),
        ];
        let deck = compose(&units);
        assert_eq!(deck.slides.len(), 1);
        let slide = &deck.slides[0];
        assert_eq!(slide.title, "1 Introduction");
        assert_eq!(slide.visuals.len(), 1);
        assert_eq!(slide.visuals[0].page, 1);
        assert_eq!(slide.source_units, vec![0, 1]);
    }

    #[test]
    fn bullets_overflow_to_cont_slide() {
        let units = vec![section(
            0,
            vec![0],
            1,
            Some("2 Method"),
            &["a", "b", "c", "d", "e", "f", "g"],
        )];
        let deck = compose(&units);
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[0].items.len(), 5);
        assert_eq!(deck.slides[1].title, "2 Method (cont.)");
        assert_eq!(deck.slides[1].items.len(), 2);
    }

    #[test]
    fn title_from_first_sentence_when_no_heading() {
        let units = vec![section(
            0,
            vec![0],
            1,
            None,
            &["Transformers drop recurrence. They use attention", "Faster training"],
        )];
        let deck = compose(&units);
        let slide = &deck.slides[0];
        assert_eq!(slide.title, "Transformers drop recurrence");
        assert_eq!(
            slide.items,
            vec![
                SlideItem::Bullet("They use attention".into()),
                SlideItem::Bullet("Faster training".into())
            ]
        );
    }

    fn link(bullet: usize, block: BlockId, text: &str) -> EquationLink {
        EquationLink {
            bullet,
            block,
            text: text.into(),
        }
    }

    #[test]
    fn equation_sits_under_its_bullet() {
        let mut unit = section(0, vec![0, 1, 2], 1, Some("3 Attention"), &["Scores are scaled", "Heads merge"]);
        unit.equations = vec![link(0, 1, "s = q k / √d"), link(1, 2, "o = concat(h) W"), link(1, 1, "s = q k / √d")];
        let deck = compose(&[unit]);
        assert_eq!(
            deck.slides[0].items,
            vec![
                SlideItem::Bullet("Scores are scaled".into()),
                SlideItem::Equation("s = q k / √d".into()),
                SlideItem::Bullet("Heads merge".into()),
                SlideItem::Equation("o = concat(h) W".into()),
            ]
        );
    }

    #[test]
    fn equations_do_not_count_towards_the_bullet_limit() {
        let mut unit = section(0, vec![0], 1, Some("2 Method"), &["a", "b", "c", "d", "e", "f"]);
        unit.equations = vec![link(1, 1, "x = 1"), link(4, 2, "y = 2")];
        let deck = compose(&[unit]);
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[0].items.len(), 7);
        assert_eq!(deck.slides[0].items[6], SlideItem::Equation("y = 2".into()));
        assert_eq!(deck.slides[1].items, vec![SlideItem::Bullet("f".into())]);
    }

    #[test]
    fn equation_of_a_title_sentence_leads_the_list() {
        let mut unit = section(0, vec![0], 1, None, &["Attention is scaled.", "Heads run in parallel"]);
        unit.equations = vec![link(0, 1, "s = q k / √d")];
        let deck = compose(&[unit]);
        assert_eq!(deck.slides[0].title, "Attention is scaled");
        assert_eq!(
            deck.slides[0].items,
            vec![
                SlideItem::Equation("s = q k / √d".into()),
                SlideItem::Bullet("Heads run in parallel".into()),
            ]
        );
    }

    #[test]
    fn missing_unit_renders_placeholder() {
        let mut unit = section(0, vec![0], 1, Some("3 Results"), &[]);
        unit.text.clear();
        unit.status = SummaryStatus::Missing {
            error: ChunkError::EmptyResponse { chunk: 1 },
        };
        let ok = section(1, vec![1], 2, Some("4 Discussion"), &["fine"]);
        let deck = compose(&[unit, ok]);
        assert_eq!(deck.slides[0].items, vec![SlideItem::Placeholder(PLACEHOLDER.into())]);
        assert!(deck.slides[0].has_missing_content);
        assert!(!deck.slides[1].has_missing_content);
    }

    #[test]
    fn media_overflow_and_fallback_attachment() {
        let units = vec![
            section(0, vec![0], 1, Some("1 Intro"), &["x"]),
            figure(1, 1, 1),
            figure(2, 2, 1),
            figure(3, 3, 1),
            // Page 3 has no prose: attaches to the preceding topic.
            section(4, vec![4], 2, Some("2 Model"), &["y"]),
            figure(5, 5, 3),
        ];
        let deck = compose(&units);
        let titles: Vec<&str> = deck.slides.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["1 Intro", "1 Intro (cont.)", "2 Model"]);
        assert_eq!(deck.slides[0].visuals.len(), 2);
        assert_eq!(deck.slides[1].visuals.len(), 1);
        assert_eq!(deck.slides[2].visuals[0].page, 3);
    }

    #[test]
    fn figure_only_document_gets_captioned_slides() {
        let deck = compose(&[figure(0, 0, 1), figure(1, 1, 2)]);
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[0].title, "Figure 0.");
        assert_eq!(deck.slides[1].source_pages, vec![2]);
    }

    #[test]
    fn table_bullets_join_their_slide() {
        let table = SummaryUnit {
            index: 1,
            kind: UnitKind::Table,
            sources: vec![1],
            pages: vec![1],
            heading: Some("Table 1: Scores.".into()),
            text: "• Ours wins".into(),
            bullets: vec!["Ours wins".into()],
            status: SummaryStatus::Summarized,
            visual: Some(Visual {
                block: 1,
                page: 1,
                caption: Some("Table 1: Scores.".into()),
                label: None,
                content: VisualContent::Table(TableGrid {
                    rows: vec![vec!["a".into(), "b".into()]],
                }),
            }),
            equations: vec![],
            references: false,
        };
        let deck = compose(&[section(0, vec![0], 1, Some("5 Experiments"), &["setup"]), table]);
        assert_eq!(deck.slides.len(), 1);
        assert_eq!(
            deck.slides[0].items,
            vec![SlideItem::Bullet("setup".into()), SlideItem::Bullet("Ours wins".into())]
        );
    }

    #[test]
    fn title_slide_uses_metadata() {
        let meta = DocumentMetadata {
            title: Some("Attention Is All You Need".into()),
            author: Some("Vaswani et al.".into()),
            ..Default::default()
        };
        let opts = ComposeOptions {
            include_title_slide: true,
            ..Default::default()
        };
        let deck = compose_deck(&[section(0, vec![0], 1, Some("Abstract"), &["x"])], &meta, &opts).unwrap();
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[0].kind, SlideKind::Title);
        assert_eq!(deck.slides[0].subtitle.as_deref(), Some("Vaswani et al."));
        assert_eq!(deck.slides[1].index, 1);
    }

    #[test]
    fn empty_units_is_empty_content() {
        let err = compose_deck(&[], &DocumentMetadata::default(), &ComposeOptions::default())
            .unwrap_err();
        assert!(matches!(err, SlideGenError::EmptyContent { .. }));
    }

    #[test]
    fn repeated_heading_is_continued() {
        let units = vec![
            section(0, vec![0], 1, Some("2 Method"), &["a"]),
            section(1, vec![1], 1, Some("2 Method"), &["b"]),
        ];
        let deck = compose(&units);
        assert_eq!(deck.slides[1].title, "2 Method (cont.)");
    }

    #[test]
    fn stacked_heading_joins_lines() {
        let deck = compose(&[section(0, vec![0], 1, Some("3 Model\n3.1 Encoder"), &["x"])]);
        assert_eq!(deck.slides[0].title, "3 Model: 3.1 Encoder");
        assert_eq!(deck.title, "3 Model: 3.1 Encoder");
    }
}
