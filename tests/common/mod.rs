/*!
 * Common test utilities for the pdfbabel test suite
 */

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pdfbabel::document::{Glyph, GraphicKind, GraphicObject, IlDocument, Rect, Region, SourcePage};
use pdfbabel::errors::LayoutError;
use pdfbabel::extraction::SpanExtractor;
use pdfbabel::layout::{LayoutClassifier, PageImage, RasterBlockClassifier};
use pdfbabel::pdf::{JsonIlParser, LopdfWriter};
use pdfbabel::pipeline::{PipelineComponents, PipelineOptions, ProgressEvent, TranslationPipeline};
use pdfbabel::providers::Translator;
use pdfbabel::reconstruction::{PageReconstructor, ReconstructOptions};
use pdfbabel::translation::{
    EngineOptions, RateLimiter, RetryPolicy, TranslationCache, TranslationEngine,
    TranslationScheduler,
};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const FONT_SIZE: f32 = 10.0;

/// Route library logs to the test output
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// One glyph per character, spaces left as gaps of half the font size
pub fn glyph_line(text: &str, x: f32, y: f32, size: f32, font: &str) -> Vec<Glyph> {
    let advance = size * 0.5;
    let mut glyphs = Vec::new();
    let mut cursor = x;
    for c in text.chars() {
        if c != ' ' {
            glyphs.push(Glyph {
                text: c.to_string(),
                bbox: Rect::new(cursor, y, cursor + advance, y + size),
                font: font.to_string(),
                size,
            });
        }
        cursor += advance;
    }
    glyphs
}

/// A page with one block of lines per paragraph, blocks far apart
pub fn paragraph_page(index: usize, paragraphs: &[&[&str]]) -> SourcePage {
    let mut glyphs = Vec::new();
    let mut y = 72.0;
    for lines in paragraphs {
        for line in lines.iter() {
            glyphs.extend(glyph_line(line, 72.0, y, FONT_SIZE, "Times-Roman"));
            y += FONT_SIZE * 1.2;
        }
        y += 60.0;
    }

    SourcePage {
        index,
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        rotation: 0,
        glyphs,
        graphics: vec![GraphicObject {
            bbox: Rect::new(72.0, 600.0, 300.0, 700.0),
            kind: GraphicKind::Image,
            ops: None,
        }],
    }
}

/// A page filled by one running-text column of `lines` full-width lines
pub fn column_page(index: usize, lines: usize) -> SourcePage {
    let text: Vec<String> = (0..lines)
        .map(|line| {
            format!(
                "{:02} running text fills the column from one margin to the other margin here",
                line
            )
        })
        .collect();
    let text: Vec<&str> = text.iter().map(String::as_str).collect();
    paragraph_page(index, &[text.as_slice()])
}

/// A page with a one-line bold title above a two-line paragraph
pub fn titled_page(index: usize) -> SourcePage {
    let mut glyphs = glyph_line("Layout Preserving Translation", 72.0, 72.0, 16.0, "Times-Bold");
    glyphs.extend(glyph_line("Regions are found on every page", 72.0, 150.0, FONT_SIZE, "Times-Roman"));
    glyphs.extend(glyph_line("and their text is translated.", 72.0, 162.0, FONT_SIZE, "Times-Roman"));

    SourcePage {
        index,
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        rotation: 0,
        glyphs,
        graphics: Vec::new(),
    }
}

/// A small document of `count` pages, two paragraphs each
pub fn sample_pages(count: usize) -> Vec<SourcePage> {
    (0..count)
        .map(|index| {
            paragraph_page(
                index,
                &[
                    &["Layout analysis finds the regions", "of every page in the document."],
                    &["Translated text replaces the original", "glyphs inside each region."],
                ],
            )
        })
        .collect()
}

/// Write the intermediate layer of `pages` next to a `<stem>.pdf` path
///
/// Returns the PDF path handed to the pipeline.
pub fn write_document(dir: &Path, stem: &str, pages: Vec<SourcePage>) -> Result<PathBuf> {
    let pdf = dir.join(format!("{}.pdf", stem));
    let document = IlDocument {
        source: pdf.clone(),
        pages,
    };
    fs::write(
        dir.join(format!("{}.il.json", stem)),
        serde_json::to_string(&document)?,
    )?;
    Ok(pdf)
}

/// Retry settings small enough for tests
pub fn engine_options(max_attempts: u32) -> EngineOptions {
    let mut options = EngineOptions::new("en", "fr");
    options.retry = RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    options.timeout = Duration::from_secs(5);
    options
}

/// Engine without a persistent cache and with a generous rate limit
pub fn engine(translator: Arc<dyn Translator>, options: EngineOptions) -> Arc<TranslationEngine> {
    Arc::new(TranslationEngine::new(
        translator,
        Arc::new(TranslationCache::new()),
        Arc::new(RateLimiter::new(1000.0)),
        options,
    ))
}

/// Pipeline components for tests: no API key, no persistent database
pub fn components(
    translator: Arc<dyn Translator>,
    classifier: Arc<dyn LayoutClassifier>,
    options: EngineOptions,
) -> PipelineComponents {
    PipelineComponents {
        parser: Arc::new(JsonIlParser::new()),
        classifier,
        extractor: SpanExtractor::default(),
        scheduler: TranslationScheduler::new(engine(translator, options), 4),
        reconstructor: PageReconstructor::new(ReconstructOptions {
            rich_text: true,
            dual_translate_first: false,
        }),
        writer: Arc::new(LopdfWriter::new(false)),
    }
}

/// Options writing French output to `output_dir`, reporting every update
pub fn pipeline_options(output_dir: &Path) -> PipelineOptions {
    PipelineOptions {
        target_language: "fr".to_string(),
        output_dir: Some(output_dir.to_path_buf()),
        report_interval: Duration::ZERO,
        ..PipelineOptions::default()
    }
}

/// Pipeline writing to `output_dir` with the local classifier
pub fn pipeline(
    translator: Arc<dyn Translator>,
    output_dir: &Path,
    max_attempts: u32,
) -> TranslationPipeline {
    TranslationPipeline::new(
        pipeline_options(output_dir),
        components(
            translator,
            Arc::new(RasterBlockClassifier::new()),
            engine_options(max_attempts),
        ),
    )
}

/// Receive every event of a run, up to and including the terminal one
pub async fn collect_events(
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    events
}

/// Classifier whose backend is always down
#[derive(Debug, Default)]
pub struct UnavailableClassifier;

#[async_trait]
impl LayoutClassifier for UnavailableClassifier {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn classify(&self, _page: &PageImage) -> Result<Vec<Region>, LayoutError> {
        Err(LayoutError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), LayoutError> {
        Err(LayoutError::Unavailable("connection refused".to_string()))
    }
}
