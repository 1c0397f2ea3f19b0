//! Markdown outline of a deck.

use crate::model::{SlideDeck, SlideItem, SlideKind, VisualContent};
use std::fmt::Write;

/// Render the deck as a Markdown outline, one `##` section per slide.
///
/// Figures are referenced by caption only (the PNG bytes live in the PPTX
/// and JSON outputs); tables are rendered as GFM pipe tables. A slide
/// caption from the summariser follows the PDF caption in italics.
/// Equations are indented under their bullet as inline code.
pub fn render_markdown(deck: &SlideDeck) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", deck.title);
    if let Some(author) = &deck.author {
        let _ = writeln!(out, "\n_{}_", author);
    }

    for slide in &deck.slides {
        out.push_str("\n---\n\n");
        match slide.kind {
            SlideKind::Title => {
                let _ = writeln!(out, "## {}", slide.title);
                if let Some(sub) = &slide.subtitle {
                    let _ = writeln!(out, "\n{}", sub);
                }
            }
            SlideKind::Content => {
                let _ = writeln!(out, "## {}\n", slide.title);
                for item in &slide.items {
                    match item {
                        SlideItem::Bullet(t) => {
                            let _ = writeln!(out, "- {}", t);
                        }
                        SlideItem::Placeholder(t) => {
                            let _ = writeln!(out, "- _{}_", t);
                        }
                        SlideItem::Equation(t) => {
                            let _ = writeln!(out, "  - `{}`", t.replace('`', "'"));
                        }
                    }
                }
                for visual in &slide.visuals {
                    out.push('\n');
                    let caption = visual.caption.as_deref().unwrap_or("");
                    match &visual.content {
                        VisualContent::Image(_) => {
                            let _ = writeln!(
                                out,
                                "> Figure (page {}): {}",
                                visual.page, caption
                            );
                            if let Some(label) = &visual.label {
                                let _ = writeln!(out, ">\n> _{}_", label);
                            }
                        }
                        VisualContent::Table(grid) => {
                            if !caption.is_empty() {
                                let _ = writeln!(out, "{}\n", caption);
                            }
                            if let Some(label) = &visual.label {
                                let _ = writeln!(out, "_{}_\n", label);
                            }
                            write_table(&mut out, &grid.rows);
                        }
                    }
                }
                if !slide.source_pages.is_empty() {
                    let pages: Vec<String> =
                        slide.source_pages.iter().map(usize::to_string).collect();
                    let _ = writeln!(out, "\n<!-- pages: {} -->", pages.join(", "));
                }
            }
        }
    }
    out
}

fn write_table(out: &mut String, rows: &[Vec<String>]) {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 {
        return;
    }
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..cols)
            .map(|c| row.get(c).map(|s| s.replace('|', "\\|")).unwrap_or_default())
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
        if i == 0 {
            let _ = writeln!(out, "|{}", " --- |".repeat(cols));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Slide, TableGrid, Visual};

    #[test]
    fn outline_with_placeholder_and_table() {
        let deck = SlideDeck {
            title: "Paper".into(),
            author: Some("A. Author".into()),
            slides: vec![Slide {
                index: 0,
                kind: SlideKind::Content,
                title: "Results".into(),
                subtitle: None,
                items: vec![
                    SlideItem::Bullet("Wins".into()),
                    SlideItem::Placeholder("[Summary unavailable]".into()),
                ],
                visuals: vec![Visual {
                    block: 3,
                    page: 4,
                    caption: Some("Table 1: Scores.".into()),
                    label: None,
                    content: VisualContent::Table(TableGrid {
                        rows: vec![
                            vec!["Model".into(), "BLEU".into()],
                            vec!["Ours".into(), "41.2".into()],
                        ],
                    }),
                }],
                source_pages: vec![4],
                source_units: vec![2],
                has_missing_content: true,
            }],
        };
        let md = render_markdown(&deck);
        assert!(md.starts_with("# Paper\n\n_A. Author_\n"));
        assert!(md.contains("## Results\n\n- Wins\n- _[Summary unavailable]_\n"));
        assert!(md.contains("| Model | BLEU |\n| --- | --- |\n| Ours | 41.2 |\n"));
        assert!(md.contains("<!-- pages: 4 -->"));
    }

    #[test]
    fn equation_is_indented_and_label_follows_caption() {
        let deck = SlideDeck {
            title: "Paper".into(),
            author: None,
            slides: vec![Slide {
                index: 0,
                kind: SlideKind::Content,
                title: "Attention".into(),
                subtitle: None,
                items: vec![
                    SlideItem::Bullet("Scaled dot-product attention".into()),
                    SlideItem::Equation("softmax(QK^T / sqrt(d_k)) V".into()),
                ],
                visuals: vec![Visual {
                    block: 5,
                    page: 3,
                    caption: Some("Figure 2: Attention.".into()),
                    label: Some("Queries attend over all keys".into()),
                    content: VisualContent::Image(crate::model::MediaAsset {
                        png: vec![0],
                        width: 1,
                        height: 1,
                    }),
                }],
                source_pages: vec![3],
                source_units: vec![0],
                has_missing_content: false,
            }],
        };
        let md = render_markdown(&deck);
        assert!(md.contains("- Scaled dot-product attention\n  - `softmax(QK^T / sqrt(d_k)) V`\n"));
        assert!(md.contains("> Figure (page 3): Figure 2: Attention.\n>\n> _Queries attend over all keys_\n"));
    }
}
