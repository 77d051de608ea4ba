/*!
 * End-to-end tests of the document pipeline.
 *
 * Documents are synthetic intermediate layers written to a temporary
 * directory; translation goes through mock backends.
 */

use lopdf::Document as PdfDocument;
use std::path::PathBuf;
use std::sync::Arc;

use pdfbabel::app_config::{Config, TranslationProvider};
use pdfbabel::file_utils::{FileManager, OutputKind};
use pdfbabel::layout::{FallbackClassifier, RasterBlockClassifier};
use pdfbabel::pipeline::{
    PipelineOptions, PipelineState, ProgressEvent, ProgressMonitor, Stage, TranslationPipeline,
    TranslationResultSummary,
};
use pdfbabel::providers::MockProvider;

use crate::common::{
    UnavailableClassifier, collect_events, column_page, components, create_temp_dir,
    engine_options, init_logging, pipeline, pipeline_options, sample_pages, titled_page,
    write_document,
};

fn finish_summary(events: &[ProgressEvent]) -> TranslationResultSummary {
    match events.last() {
        Some(ProgressEvent::Finish {
            translate_result, ..
        }) => translate_result.clone(),
        other => panic!("run did not finish: {:?}", other),
    }
}

fn assert_single_terminal(events: &[ProgressEvent]) {
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().is_some_and(|e| e.is_terminal()));
}

#[tokio::test]
async fn test_translate_withWorkingBackend_shouldWriteBothOutputs() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "paper", sample_pages(2)).unwrap();
    let out = dir.path().join("out");

    let provider = Arc::new(MockProvider::working());
    let pipeline = Arc::new(pipeline(provider.clone(), &out, 3));
    let events = collect_events(pipeline.clone().translate(input.clone())).await;

    assert_single_terminal(&events);
    let progress: Vec<f64> = events.iter().filter_map(|e| e.overall_progress()).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress[..progress.len() - 1].iter().all(|p| *p < 100.0));
    assert_eq!(progress.last(), Some(&100.0));

    let summary = finish_summary(&events);
    assert_eq!(summary.original_path, input);
    assert_eq!(summary.page_count, 2);
    assert_eq!(summary.translated_spans, 4);
    assert_eq!(summary.fallback_spans, 0);
    // Both pages carry the same paragraphs
    assert_eq!(provider.request_count(), 2);

    let mono = summary.mono_path.clone().unwrap();
    let dual = summary.dual_path.clone().unwrap();
    assert_eq!(
        mono,
        FileManager::generate_output_path(&input, &out, "fr", OutputKind::Mono)
    );
    assert_eq!(PdfDocument::load(&mono).unwrap().get_pages().len(), 2);
    assert_eq!(PdfDocument::load(&dual).unwrap().get_pages().len(), 4);
    assert_eq!(pipeline.state(), PipelineState::Finished);
}

#[tokio::test]
async fn test_translate_shouldReportStagesInOrder() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "stages", sample_pages(1)).unwrap();

    let pipeline = Arc::new(pipeline(Arc::new(MockProvider::working()), dir.path(), 3));
    let events = collect_events(pipeline.translate(input)).await;

    let started: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ProgressStart { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(started, Stage::ALL.to_vec());

    let translation_end = events.iter().find_map(|e| match e {
        ProgressEvent::ProgressEnd {
            stage: Stage::Translation,
            stage_current,
            stage_total,
            ..
        } => Some((*stage_current, *stage_total)),
        _ => None,
    });
    assert_eq!(translation_end, Some((2, 2)));
}

#[tokio::test]
async fn test_translate_withNoMono_shouldWriteDualOnly() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "dual-only", sample_pages(1)).unwrap();

    let options = PipelineOptions {
        no_mono: true,
        ..pipeline_options(dir.path())
    };
    let pipeline = Arc::new(TranslationPipeline::new(
        options,
        components(
            Arc::new(MockProvider::working()),
            Arc::new(RasterBlockClassifier::new()),
            engine_options(3),
        ),
    ));
    let events = collect_events(pipeline.translate(input.clone())).await;
    let summary = finish_summary(&events);

    assert!(summary.mono_path.is_none());
    let dual = summary.dual_path.unwrap();
    assert!(dual.is_file());
    assert!(
        !FileManager::generate_output_path(&input, dir.path(), "fr", OutputKind::Mono).exists()
    );
}

#[tokio::test]
async fn test_translate_withFailingBackend_shouldKeepOriginalTextAndFinish() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "offline", sample_pages(1)).unwrap();

    let provider = Arc::new(MockProvider::failing());
    let pipeline = Arc::new(pipeline(provider.clone(), dir.path(), 3));
    let events = collect_events(pipeline.translate(input)).await;

    assert_single_terminal(&events);
    let summary = finish_summary(&events);
    assert_eq!(summary.fallback_spans, 2);
    assert!(summary.mono_path.unwrap().is_file());
    // Two distinct paragraphs, three attempts each
    assert_eq!(provider.request_count(), 6);
}

#[tokio::test]
async fn test_translate_withPageSelection_shouldOnlyTranslateSelectedPages() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "selection", sample_pages(3)).unwrap();

    let options = PipelineOptions {
        pages: "2".parse().unwrap(),
        ..pipeline_options(dir.path())
    };
    let pipeline = Arc::new(TranslationPipeline::new(
        options,
        components(
            Arc::new(MockProvider::working()),
            Arc::new(RasterBlockClassifier::new()),
            engine_options(3),
        ),
    ));
    let summary = finish_summary(&collect_events(pipeline.translate(input)).await);

    assert_eq!(summary.page_count, 1);
    let mono = PdfDocument::load(summary.mono_path.unwrap()).unwrap();
    assert_eq!(mono.get_pages().len(), 1);
}

#[tokio::test]
async fn test_translate_withMissingLayer_shouldEmitAssetError() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("missing.pdf");

    let pipeline = Arc::new(pipeline(Arc::new(MockProvider::working()), dir.path(), 3));
    let events = collect_events(pipeline.clone().translate(input)).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ProgressEvent::Error { kind, .. } if kind == "asset_unavailable"
    ));
    assert_eq!(pipeline.state(), PipelineState::Aborted);
}

#[tokio::test]
async fn test_run_withUnavailableClassifier_shouldAbortWithoutOutputs() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "nolayout", sample_pages(2)).unwrap();

    let pipeline = TranslationPipeline::new(
        pipeline_options(dir.path()),
        components(
            Arc::new(MockProvider::working()),
            Arc::new(UnavailableClassifier),
            engine_options(3),
        ),
    );
    let (monitor, _receiver) = ProgressMonitor::channel(std::time::Duration::ZERO);
    let result = pipeline.run(&input, Arc::new(monitor)).await;

    let error = result.unwrap_err();
    assert_eq!(error.kind(), "layout");
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(
        !FileManager::generate_output_path(&input, dir.path(), "fr", OutputKind::Mono).exists()
    );
}

#[tokio::test]
async fn test_translate_withFullTextColumn_shouldTranslateColumn() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "column", vec![column_page(0, 40)]).unwrap();

    let provider = Arc::new(MockProvider::working());
    let pipeline = Arc::new(pipeline(provider.clone(), dir.path(), 3));
    let events = collect_events(pipeline.clone().translate(input)).await;

    let summary = finish_summary(&events);
    assert_eq!(summary.page_count, 1);
    assert_eq!(summary.translated_spans, 1);
    assert_eq!(summary.fallback_spans, 0);
    assert_eq!(provider.request_count(), 1);
    assert!(summary.mono_path.is_some_and(|path| path.exists()));
}

#[tokio::test]
async fn test_translate_withOneLineTitle_shouldTranslateTitle() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "titled", vec![titled_page(0)]).unwrap();

    let provider = Arc::new(MockProvider::working());
    let pipeline = Arc::new(pipeline(provider.clone(), dir.path(), 3));
    let events = collect_events(pipeline.clone().translate(input)).await;

    let summary = finish_summary(&events);
    // The title and the paragraph are sent separately
    assert_eq!(summary.translated_spans, 2);
    assert_eq!(summary.fallback_spans, 0);
    assert_eq!(provider.request_count(), 2);
    assert!(summary.mono_path.is_some_and(|path| path.exists()));
}

#[tokio::test]
async fn test_run_withFallbackClassifier_shouldUseLocalBackend() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "fallback", sample_pages(1)).unwrap();

    let classifier = FallbackClassifier::new(
        Arc::new(UnavailableClassifier),
        Arc::new(RasterBlockClassifier::new()),
    );
    let pipeline = TranslationPipeline::new(
        pipeline_options(dir.path()),
        components(
            Arc::new(MockProvider::working()),
            Arc::new(classifier),
            engine_options(3),
        ),
    );
    let (monitor, _receiver) = ProgressMonitor::channel(std::time::Duration::ZERO);
    let summary = pipeline.run(&input, Arc::new(monitor)).await.unwrap();

    assert_eq!(summary.page_count, 1);
    assert_eq!(summary.translated_spans, 2);
    assert_eq!(pipeline.state(), PipelineState::Finished);
}

#[tokio::test]
async fn test_run_withCancelledToken_shouldStopBeforeFirstPage() {
    let dir = create_temp_dir().unwrap();
    let input = write_document(dir.path(), "cancelled", sample_pages(2)).unwrap();

    let provider = Arc::new(MockProvider::working());
    let pipeline = pipeline(provider.clone(), dir.path(), 3);
    pipeline.cancellation_token().cancel();

    let (monitor, _receiver) = ProgressMonitor::channel(std::time::Duration::ZERO);
    let result = pipeline.run(&input, Arc::new(monitor)).await;

    assert_eq!(result.unwrap_err().kind(), "cancelled");
    assert_eq!(provider.request_count(), 0);
}

#[test]
fn test_fromConfig_withMissingFont_shouldReportAssetUnavailable() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    config.translation.persistent_cache = false;
    config.output.font_path = Some(PathBuf::from("/nonexistent/SourceHanSerifCN.ttf"));

    let result = TranslationPipeline::from_config(
        &config,
        Arc::new(MockProvider::working()),
        Arc::new(RasterBlockClassifier::new()),
    );

    let error = result.err().unwrap();
    assert_eq!(error.kind(), "asset_unavailable");
}
