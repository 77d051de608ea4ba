/*!
 * Bounded fan-out translation of the spans of a page.
 *
 * Spans are dispatched concurrently through the shared engine and reassembled
 * in their original order. A failed span keeps its source text and is marked
 * `Failed`; it never blocks the rest of the page.
 */

use futures::stream::{self, StreamExt};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::cache::truncate_text;
use super::engine::{TranslationEngine, is_translatable};
use crate::document::{FormulaRun, Span, SpanStatus};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*[vV]\s*(\d+)\s*\}").expect("placeholder pattern is valid"));

/// Placeholder text of the `index`-th inline formula of a span
pub fn placeholder(index: usize) -> String {
    format!("{{v{}}}", index)
}

/// Rewrite placeholder variants a backend may produce (`{ v0 }`, `{V0}`) to `{v0}`
pub fn normalize_placeholders(text: &str) -> String {
    PLACEHOLDER_RE.replace_all(text, "{v$1}").into_owned()
}

/// Remove every placeholder from a text
pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER_RE.replace_all(text, "").into_owned()
}

/// Append placeholders the backend dropped, so no inline formula is lost
pub fn restore_placeholders(translated: &str, formulas: &[FormulaRun]) -> String {
    let mut result = normalize_placeholders(translated);
    for formula in formulas {
        if !result.contains(&formula.placeholder) {
            if !result.is_empty() && !result.ends_with(' ') {
                result.push(' ');
            }
            result.push_str(&formula.placeholder);
        }
    }
    result
}

/// Fan-out translator for ordered spans
#[derive(Debug, Clone)]
pub struct TranslationScheduler {
    engine: Arc<TranslationEngine>,
    /// Maximum spans in flight
    fan_out: usize,
}

impl TranslationScheduler {
    pub fn new(engine: Arc<TranslationEngine>, fan_out: usize) -> Self {
        Self {
            engine,
            fan_out: fan_out.max(1),
        }
    }

    pub fn engine(&self) -> &Arc<TranslationEngine> {
        &self.engine
    }

    /// Number of spans that will go through the engine
    pub fn pending_count(spans: &[Span]) -> usize {
        spans.iter().filter(|s| Self::needs_translation(s)).count()
    }

    fn needs_translation(span: &Span) -> bool {
        !span.is_formula && is_translatable(&strip_placeholders(&span.source_text))
    }

    /// Translate the spans of one page, returning them in input order
    ///
    /// `on_span_done` is called once per span sent to the engine, whatever its
    /// outcome.
    pub async fn translate_spans<F>(&self, spans: Vec<Span>, on_span_done: F) -> Vec<Span>
    where
        F: Fn() + Send + Sync,
    {
        let total = spans.len();
        let on_span_done = &on_span_done;

        let mut results: Vec<(usize, Span)> = stream::iter(spans.into_iter().enumerate())
            .map(|(index, mut span)| {
                let engine = self.engine.clone();

                async move {
                    if !Self::needs_translation(&span) {
                        span.status = SpanStatus::Skipped;
                        return (index, span);
                    }

                    match engine.translate(&span.source_text).await {
                        Ok(translated) => {
                            let translated = if span.formulas.is_empty() {
                                translated
                            } else {
                                restore_placeholders(&translated, &span.formulas)
                            };
                            span.target_text = Some(translated);
                            span.status = SpanStatus::Translated;
                        }
                        Err(e) => {
                            warn!(
                                "Keeping original text for span {} ('{}'): {}",
                                span.id,
                                truncate_text(&span.source_text, 30),
                                e
                            );
                            span.target_text = None;
                            span.status = SpanStatus::Failed;
                        }
                    }

                    on_span_done();
                    (index, span)
                }
            })
            .buffer_unordered(self.fan_out)
            .collect()
            .await;

        // Completion order is arbitrary; restore span order
        results.sort_by_key(|(index, _)| *index);
        debug_assert_eq!(results.len(), total);
        results.into_iter().map(|(_, span)| span).collect()
    }
}
