//! Summariser adapter: run a chunk plan through a [`Summarizer`].
//!
//! Remote chunks are sent with bounded concurrency and the results are put
//! back in plan order, so the unit sequence always follows the reading order
//! of the blocks. Figures are turned into units locally.
//!
//! A second, optional pass asks the summariser for a one-sentence slide
//! caption for every figure and table. A caption that fails is not an
//! error; the visual keeps its PDF caption.
//!
//! A chunk that fails is never dropped. It becomes a unit with
//! [`SummaryStatus::Missing`] so the composer can show a placeholder where
//! the content belongs. The run only fails when every remote chunk failed,
//! or when `strict` is set and any did.

use crate::config::GenerationConfig;
use crate::error::{ChunkError, SlideGenError};
use crate::model::{EquationLink, SummaryStatus, SummaryUnit, UnitKind, Visual, VisualContent};
use crate::pipeline::chunk::{Chunk, ChunkKind, ChunkPlan, FigureItem, PlanItem};
use crate::pipeline::postprocess::{bullets_with_equations, clean_caption, clean_summary};
use crate::summarizer::{SummarizeError, Summarizer};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Summarise every remote chunk of `plan` and build units in plan order.
///
/// # Errors
/// * [`SlideGenError::AllChunksFailed`] when there was at least one remote
///   chunk and none succeeded.
/// * [`SlideGenError::PartialFailure`] in strict mode when any chunk failed.
pub async fn summarize_plan(
    plan: &ChunkPlan,
    summarizer: &dyn Summarizer,
    config: &GenerationConfig,
) -> Result<Vec<SummaryUnit>, SlideGenError> {
    let total = plan.remote_count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_summarize_start(total);
    }
    info!("Summarising {} chunks (concurrency {})", total, config.concurrency);

    // (plan position, 1-indexed chunk number, chunk)
    let remote: Vec<(usize, usize, &Chunk)> = plan
        .items
        .iter()
        .enumerate()
        .filter_map(|(pos, item)| match item {
            PlanItem::Remote(c) => Some((pos, c)),
            PlanItem::Figure(_) => None,
        })
        .enumerate()
        .map(|(n, (pos, c))| (pos, n + 1, c))
        .collect();

    let mut outcomes: Vec<(usize, usize, Result<String, SummarizeError>)> =
        stream::iter(remote.into_iter().map(|(pos, chunk_no, chunk)| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_start(chunk_no, total);
            }
            debug!(
                "Chunk {}/{}: {} chars, pages {:?}",
                chunk_no,
                total,
                chunk.text.chars().count(),
                chunk.pages
            );
            let result = summarizer.summarize(&chunk.text).await;
            (pos, chunk_no, result)
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(pos, _, _)| *pos);

    let mut outcomes = outcomes.into_iter().peekable();
    let mut units = Vec::with_capacity(plan.items.len());
    let mut failures: Vec<ChunkError> = Vec::new();

    for (pos, item) in plan.items.iter().enumerate() {
        let unit = match item {
            PlanItem::Figure(fig) => figure_unit(pos, fig),
            PlanItem::Remote(chunk) => {
                let (chunk_no, result) = match outcomes.next_if(|(p, _, _)| *p == pos) {
                    Some((_, no, r)) => (no, r),
                    None => {
                        return Err(SlideGenError::Internal(format!(
                            "no summariser outcome for plan item {pos}"
                        )))
                    }
                };
                let unit = remote_unit(pos, chunk, chunk_no, result, config.max_retries);
                match &unit.status {
                    SummaryStatus::Missing { error } => {
                        warn!("{}", error);
                        if let Some(ref cb) = config.progress_callback {
                            cb.on_chunk_error(chunk_no, total, &error.to_string());
                        }
                        failures.push(error.clone());
                    }
                    _ => {
                        if let Some(ref cb) = config.progress_callback {
                            cb.on_chunk_complete(chunk_no, total, unit.bullets.len());
                        }
                    }
                }
                unit
            }
        };
        units.push(unit);
    }

    if let Some(first) = failures.first() {
        if failures.len() == total {
            return Err(SlideGenError::AllChunksFailed {
                total,
                retries: config.max_retries,
                first_error: first.to_string(),
            });
        }
        if config.strict {
            return Err(SlideGenError::PartialFailure {
                failed: failures.len(),
                total,
                first_error: first.to_string(),
            });
        }
    }

    info!(
        "Summarised {}/{} chunks ({} missing)",
        total - failures.len(),
        total,
        failures.len()
    );

    if config.short_captions {
        caption_visuals(plan, &mut units, summarizer, config.concurrency).await;
    }
    Ok(units)
}

/// Ask for a slide caption for every visual unit and store it as the
/// visual's label. Failures only log.
async fn caption_visuals(
    plan: &ChunkPlan,
    units: &mut [SummaryUnit],
    summarizer: &dyn Summarizer,
    concurrency: usize,
) {
    let requests: Vec<(usize, String)> = plan
        .items
        .iter()
        .zip(units.iter())
        .enumerate()
        .filter(|(_, (_, unit))| unit.visual.is_some())
        .filter_map(|(pos, (item, _))| caption_context(item).map(|c| (pos, c)))
        .collect();
    if requests.is_empty() {
        return;
    }
    debug!("Requesting {} slide captions", requests.len());

    let answers: Vec<(usize, Result<String, SummarizeError>)> =
        stream::iter(requests.into_iter().map(|(pos, context)| async move {
            (pos, summarizer.caption(&context).await)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (pos, answer) in answers {
        let Some(visual) = units[pos].visual.as_mut() else {
            continue;
        };
        match answer {
            Ok(raw) => visual.label = clean_caption(&raw),
            Err(e) => debug!("No slide caption for plan item {}: {}", pos, e),
        }
    }
}

/// What the summariser sees when captioning a plan item.
fn caption_context(item: &PlanItem) -> Option<String> {
    match item {
        PlanItem::Figure(fig) => {
            if fig.caption.is_none() && fig.context.is_none() {
                return None;
            }
            let mut out = String::new();
            if let Some(caption) = &fig.caption {
                out.push_str(&format!("Figure caption: {}\n", caption));
            }
            if let Some(context) = &fig.context {
                out.push_str(&format!("Text before the figure: {}\n", context));
            }
            Some(out)
        }
        PlanItem::Remote(chunk) if chunk.kind == ChunkKind::Table => {
            Some(format!("Table (rows separated by newlines, cells by |):\n{}", chunk.text))
        }
        PlanItem::Remote(_) => None,
    }
}

fn remote_unit(
    index: usize,
    chunk: &Chunk,
    chunk_no: usize,
    result: Result<String, SummarizeError>,
    max_retries: u32,
) -> SummaryUnit {
    let mut equations = Vec::new();
    let (text, bullets, status) = match result {
        Ok(raw) => {
            let text = clean_summary(&raw);
            let annotated = bullets_with_equations(&raw);
            if annotated.is_empty() {
                let error = ChunkError::EmptyResponse { chunk: chunk_no };
                (String::new(), Vec::new(), SummaryStatus::Missing { error })
            } else {
                let mut bullets = Vec::with_capacity(annotated.len());
                for (i, (bullet, labels)) in annotated.into_iter().enumerate() {
                    equations.extend(labels.iter().filter_map(|label| {
                        let eq = chunk.equations.iter().find(|e| &e.label == label)?;
                        Some(EquationLink {
                            bullet: i,
                            block: eq.block,
                            text: eq.text.clone(),
                        })
                    }));
                    bullets.push(bullet);
                }
                (text, bullets, SummaryStatus::Summarized)
            }
        }
        Err(SummarizeError::Empty) => {
            let error = ChunkError::EmptyResponse { chunk: chunk_no };
            (String::new(), Vec::new(), SummaryStatus::Missing { error })
        }
        Err(e) => {
            let error = ChunkError::SummarizeFailed {
                chunk: chunk_no,
                retries: max_retries,
                detail: e.to_string(),
            };
            (String::new(), Vec::new(), SummaryStatus::Missing { error })
        }
    };

    let (kind, visual) = match chunk.kind {
        ChunkKind::Prose => (UnitKind::Section, None),
        ChunkKind::Table => {
            let visual = chunk.table.clone().and_then(|grid| {
                let block = chunk.sources.first().copied()?;
                Some(Visual {
                    block,
                    page: chunk.pages.first().copied().unwrap_or(1),
                    caption: chunk.heading.clone(),
                    label: None,
                    content: VisualContent::Table(grid),
                })
            });
            (UnitKind::Table, visual)
        }
    };

    SummaryUnit {
        index,
        kind,
        sources: chunk.sources.clone(),
        pages: chunk.pages.clone(),
        heading: chunk.heading.clone(),
        text,
        bullets,
        status,
        visual,
        equations,
        references: chunk.references,
    }
}

/// Figures keep their caption as condensed text; no remote call.
fn figure_unit(index: usize, fig: &FigureItem) -> SummaryUnit {
    let visual = fig.media.clone().map(|media| Visual {
        block: fig.block,
        page: fig.page,
        caption: fig.caption.clone(),
        label: None,
        content: VisualContent::Image(media),
    });
    SummaryUnit {
        index,
        kind: UnitKind::Figure,
        sources: vec![fig.block],
        pages: vec![fig.page],
        heading: fig.caption.clone(),
        text: fig.caption.clone().unwrap_or_default(),
        bullets: Vec::new(),
        status: SummaryStatus::Local,
        visual,
        equations: Vec::new(),
        references: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaAsset;
    use crate::pipeline::chunk::EquationRef;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with the first line of the passage; fails on passages
    /// containing "FAIL".
    struct FirstLine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FirstLine {
        async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("FAIL") {
                return Err(SummarizeError::Service("503 overloaded".into()));
            }
            let first = text.lines().next().unwrap_or_default();
            Ok(format!("• {first}\n• second point"))
        }
    }

    fn prose(sources: Vec<usize>, text: &str) -> PlanItem {
        PlanItem::Remote(Chunk {
            kind: ChunkKind::Prose,
            heading: None,
            text: text.into(),
            pages: vec![1],
            sources,
            references: false,
            oversize: false,
            table: None,
            equations: vec![],
        })
    }

    fn figure(block: usize) -> PlanItem {
        PlanItem::Figure(FigureItem {
            block,
            page: 1,
            caption: Some("Figure 1: Overview.".into()),
            media: Some(MediaAsset {
                png: vec![1, 2, 3],
                width: 10,
                height: 10,
            }),
            context: Some("The encoder maps tokens to vectors.".into()),
        })
    }

    fn summarizer() -> FirstLine {
        FirstLine {
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn units_follow_plan_order() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "alpha"), figure(1), prose(vec![2, 3], "beta")],
        };
        let s = summarizer();
        let config = GenerationConfig::builder().concurrency(3).build().unwrap();
        let units = summarize_plan(&plan, &s, &config).await.unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].bullets, vec!["alpha", "second point"]);
        assert_eq!(units[1].kind, UnitKind::Figure);
        assert_eq!(units[1].status, SummaryStatus::Local);
        assert_eq!(units[2].sources, vec![2, 3]);
        assert_eq!(units.iter().map(|u| u.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(s.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_chunk_becomes_missing() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "ok"), prose(vec![1], "FAIL here")],
        };
        let units = summarize_plan(&plan, &summarizer(), &GenerationConfig::default())
            .await
            .unwrap();
        assert!(!units[0].is_missing());
        assert!(units[1].is_missing());
        assert!(matches!(
            &units[1].status,
            SummaryStatus::Missing { error: ChunkError::SummarizeFailed { chunk: 2, .. } }
        ));
    }

    #[tokio::test]
    async fn all_failed_is_remote_error() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "FAIL"), figure(1), prose(vec![2], "FAIL")],
        };
        let err = summarize_plan(&plan, &summarizer(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SlideGenError::AllChunksFailed { total: 2, .. }));
    }

    #[tokio::test]
    async fn strict_mode_fails_on_any_missing() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "ok"), prose(vec![1], "FAIL")],
        };
        let config = GenerationConfig::builder().strict(true).build().unwrap();
        let err = summarize_plan(&plan, &summarizer(), &config).await.unwrap_err();
        assert!(matches!(err, SlideGenError::PartialFailure { failed: 1, total: 2, .. }));
    }

    #[tokio::test]
    async fn figure_only_plan_needs_no_calls() {
        let plan = ChunkPlan {
            items: vec![figure(0)],
        };
        let s = summarizer();
        let units = summarize_plan(&plan, &s, &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].visual.is_some());
        assert_eq!(s.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_response_is_missing() {
        struct Blank;
        #[async_trait]
        impl Summarizer for Blank {
            async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
                Ok("```\n\n```".into())
            }
        }
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "a"), figure(1)],
        };
        let err = summarize_plan(&plan, &Blank, &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SlideGenError::AllChunksFailed { total: 1, .. }));
    }

    /// Bullets that cite the first equation; captions name what they saw.
    struct Annotating {
        captions: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for Annotating {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok("• Scores are scaled (Equation: E1).\n• Heads run in parallel.\n• Outputs merge (Equation: E2, E9)".into())
        }

        async fn caption(&self, context: &str) -> Result<String, SummarizeError> {
            self.captions.fetch_add(1, Ordering::SeqCst);
            if context.starts_with("Table") {
                return Err(SummarizeError::Timeout { secs: 60 });
            }
            assert!(context.contains("Figure caption: Figure 1: Overview."));
            assert!(context.contains("The encoder maps tokens"));
            Ok("**Caption**: The encoder and decoder side by side".into())
        }
    }

    fn annotating() -> Annotating {
        Annotating {
            captions: AtomicUsize::new(0),
        }
    }

    fn table(block: usize) -> PlanItem {
        PlanItem::Remote(Chunk {
            kind: ChunkKind::Table,
            heading: Some("Table 1: Scores.".into()),
            text: "Table 1: Scores.\na | b\n1 | 2".into(),
            pages: vec![1],
            sources: vec![block],
            references: false,
            oversize: false,
            table: Some(crate::model::TableGrid {
                rows: vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]],
            }),
            equations: vec![],
        })
    }

    #[tokio::test]
    async fn bullets_link_to_tagged_equations() {
        let mut chunk = match prose(vec![0, 1, 2], "The score is\n[E1] s = q k\n[E2] o = s v") {
            PlanItem::Remote(c) => c,
            other => panic!("unexpected {other:?}"),
        };
        chunk.equations = vec![
            EquationRef { label: "E1".into(), block: 1, text: "s = q k".into() },
            EquationRef { label: "E2".into(), block: 2, text: "o = s v".into() },
        ];
        let plan = ChunkPlan {
            items: vec![PlanItem::Remote(chunk)],
        };
        let units = summarize_plan(&plan, &annotating(), &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(
            units[0].bullets,
            vec!["Scores are scaled.", "Heads run in parallel.", "Outputs merge"]
        );
        let links: Vec<(usize, usize)> = units[0].equations.iter().map(|l| (l.bullet, l.block)).collect();
        // E9 names no equation and is dropped.
        assert_eq!(links, vec![(0, 1), (2, 2)]);
        assert_eq!(units[0].equations[1].text, "o = s v");
    }

    #[tokio::test]
    async fn visuals_get_short_captions_and_keep_pdf_ones_on_failure() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "alpha"), figure(1), table(2)],
        };
        let s = annotating();
        let units = summarize_plan(&plan, &s, &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(s.captions.load(Ordering::SeqCst), 2);

        let fig = units[1].visual.as_ref().unwrap();
        assert_eq!(fig.label.as_deref(), Some("The encoder and decoder side by side"));
        assert_eq!(fig.caption.as_deref(), Some("Figure 1: Overview."));

        let tab = units[2].visual.as_ref().unwrap();
        assert_eq!(tab.label, None);
        assert_eq!(tab.display_caption(), Some("Table 1: Scores."));
    }

    #[tokio::test]
    async fn short_captions_can_be_switched_off() {
        let plan = ChunkPlan {
            items: vec![prose(vec![0], "alpha"), figure(1)],
        };
        let s = annotating();
        let config = GenerationConfig::builder().short_captions(false).build().unwrap();
        let units = summarize_plan(&plan, &s, &config).await.unwrap();
        assert_eq!(s.captions.load(Ordering::SeqCst), 0);
        assert_eq!(units[1].visual.as_ref().unwrap().label, None);
    }
}
