/*!
 * Tests for span scheduling
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pdfbabel::document::{FormulaRun, Rect, RegionKind, Span, SpanStatus};
use pdfbabel::providers::MockProvider;
use pdfbabel::translation::TranslationScheduler;
use pdfbabel::translation::scheduler::placeholder;

use crate::common::{engine, engine_options};

fn span(id: usize, text: &str) -> Span {
    Span {
        id,
        region: 0,
        region_kind: RegionKind::Text,
        source_text: text.to_string(),
        target_text: None,
        is_formula: false,
        font: "Times-Roman".to_string(),
        font_size: 10.0,
        anchor: Rect::new(72.0, 72.0 + id as f32 * 20.0, 540.0, 84.0 + id as f32 * 20.0),
        glyphs: Vec::new(),
        formulas: Vec::new(),
        status: SpanStatus::Pending,
    }
}

#[tokio::test]
async fn test_translateSpans_withSlowBackend_shouldKeepInputOrder() {
    let provider = Arc::new(MockProvider::slow(10));
    let scheduler = TranslationScheduler::new(engine(provider, engine_options(3)), 3);
    let spans: Vec<Span> = (0..10).map(|i| span(i, &format!("Sentence number {}", i))).collect();

    let done = AtomicUsize::new(0);
    let translated = scheduler
        .translate_spans(spans, || {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert_eq!(done.load(Ordering::SeqCst), 10);
    for (i, span) in translated.iter().enumerate() {
        assert_eq!(span.id, i);
        assert_eq!(span.status, SpanStatus::Translated);
        assert_eq!(
            span.target_text.as_deref(),
            Some(format!("[fr] Sentence number {}", i).as_str())
        );
    }
}

#[tokio::test]
async fn test_translateSpans_withFormulaSpan_shouldSkipIt() {
    let provider = Arc::new(MockProvider::working());
    let scheduler = TranslationScheduler::new(engine(provider.clone(), engine_options(3)), 4);
    let mut formula = span(0, "x = y + 1");
    formula.is_formula = true;
    let numbers = span(1, "3.14 2.71");

    let counted = AtomicUsize::new(0);
    let spans = vec![formula, numbers];
    assert_eq!(TranslationScheduler::pending_count(&spans), 0);

    let result = scheduler
        .translate_spans(spans, || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(result.iter().all(|s| s.status == SpanStatus::Skipped));
    assert!(result.iter().all(|s| s.target_text.is_none()));
    assert_eq!(counted.load(Ordering::SeqCst), 0);
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_translateSpans_withDroppedPlaceholder_shouldRestoreIt() {
    let provider = Arc::new(MockProvider::dropping_placeholders());
    let scheduler = TranslationScheduler::new(engine(provider, engine_options(3)), 4);
    let mut inline = span(0, &format!("Let {} be a vector", placeholder(0)));
    inline.formulas.push(FormulaRun {
        placeholder: placeholder(0),
        text: "α".to_string(),
        font: "CMMI10".to_string(),
        size: 10.0,
    });

    let result = scheduler.translate_spans(vec![inline], || {}).await;

    let target = result[0].target_text.as_deref().unwrap();
    assert!(target.contains("{v0}"));
    assert_eq!(result[0].status, SpanStatus::Translated);
}

#[tokio::test]
async fn test_translateSpans_withFailingBackend_shouldKeepOriginalText() {
    let provider = Arc::new(MockProvider::failing());
    let scheduler = TranslationScheduler::new(engine(provider.clone(), engine_options(2)), 4);

    let result = scheduler
        .translate_spans(vec![span(0, "Lost in translation")], || {})
        .await;

    assert_eq!(result[0].status, SpanStatus::Failed);
    assert!(result[0].target_text.is_none());
    assert_eq!(result[0].source_text, "Lost in translation");
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_translateSpans_withTimedOutBackend_shouldKeepOriginalText() {
    let provider = Arc::new(MockProvider::slow(200));
    let mut options = engine_options(2);
    options.timeout = Duration::from_millis(20);
    let scheduler = TranslationScheduler::new(engine(provider.clone(), options), 4);

    let result = scheduler
        .translate_spans(
            vec![span(0, "Waiting forever"), span(1, "Still waiting")],
            || {},
        )
        .await;

    assert!(result.iter().all(|s| s.status == SpanStatus::Failed));
    assert_eq!(result[0].source_text, "Waiting forever");
    assert_eq!(result[1].source_text, "Still waiting");
    assert_eq!(provider.request_count(), 4);
}
