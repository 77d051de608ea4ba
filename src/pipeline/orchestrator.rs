/*!
 * Per-document pipeline orchestrator.
 *
 * A run walks one document through the stages
 * `LayoutAnalysis -> Extraction -> Translation -> Reconstruction -> Assembly`.
 * Within a stage, pages are processed concurrently through an ordered
 * buffered stream, so their order is preserved. The orchestrator is the only
 * producer of progress events and the only writer of output files.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::progress::{ProgressEvent, ProgressMonitor, Stage};
use super::result::TranslationResultSummary;
use crate::app_config::Config;
use crate::database::{DatabaseConnection, Repository};
use crate::document::{Document, Page, PageSelection, SpanStatus};
use crate::errors::PipelineError;
use crate::extraction::SpanExtractor;
use crate::file_utils::{FileManager, OutputKind};
use crate::layout::{LayoutClassifier, PageImage};
use crate::pdf::{DocumentParser, EmbeddedFont, JsonIlParser, LopdfWriter, PdfWriter};
use crate::providers::Translator;
use crate::reconstruction::{OutputPage, PageReconstructor, ReconstructOptions};
use crate::translation::{
    EngineOptions, RateLimiter, TranslationCache, TranslationEngine, TranslationScheduler,
};

/// Lifecycle of a document run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Pending,
    LayoutAnalysis,
    Extraction,
    Translation,
    Reconstruction,
    Assembly,
    Finished,
    /// A fatal error or a cancellation ended the run
    Aborted,
}

impl PipelineState {
    /// Whether the state machine allows going from `self` to `next`
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Finished | Aborted, _) => false,
            (_, Aborted) => true,
            (Pending, LayoutAnalysis)
            | (LayoutAnalysis, Extraction)
            | (Extraction, Translation)
            | (Translation, Reconstruction)
            | (Reconstruction, Assembly)
            | (Assembly, Finished) => true,
            _ => false,
        }
    }

    fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::LayoutAnalysis => Self::LayoutAnalysis,
            Stage::Extraction => Self::Extraction,
            Stage::Translation => Self::Translation,
            Stage::Reconstruction => Self::Reconstruction,
            Stage::Assembly => Self::Assembly,
        }
    }
}

/// Cooperative cancellation flag, checked before each page of each stage
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Options of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub target_language: String,
    pub pages: PageSelection,
    /// Input directory when absent
    pub output_dir: Option<PathBuf>,
    pub no_mono: bool,
    pub no_dual: bool,
    /// Pages processed concurrently within a stage
    pub page_workers: usize,
    /// Minimum delay between two progress updates of a stage
    pub report_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            target_language: "zh".to_string(),
            pages: PageSelection::all(),
            output_dir: None,
            no_mono: false,
            no_dual: false,
            page_workers: 4,
            report_interval: Duration::from_millis(100),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let pages = match &config.pages {
            Some(selection) => PageSelection::parse(selection)?,
            None => PageSelection::all(),
        };
        Ok(Self {
            target_language: config.target_language.clone(),
            pages,
            output_dir: config.output.output_dir.clone(),
            no_mono: config.output.no_mono,
            no_dual: config.output.no_dual,
            page_workers: config.pipeline.page_workers.max(1),
            report_interval: Duration::from_secs_f64(config.pipeline.report_interval_secs.max(0.0)),
        })
    }
}

/// Collaborators of a pipeline, constructed by the caller
#[derive(Debug, Clone)]
pub struct PipelineComponents {
    pub parser: Arc<dyn DocumentParser>,
    pub classifier: Arc<dyn LayoutClassifier>,
    pub extractor: SpanExtractor,
    pub scheduler: TranslationScheduler,
    pub reconstructor: PageReconstructor,
    pub writer: Arc<dyn PdfWriter>,
}

/// Document translation pipeline
#[derive(Debug)]
pub struct TranslationPipeline {
    options: PipelineOptions,
    components: PipelineComponents,
    cancel: CancellationToken,
    state: Mutex<PipelineState>,
}

impl TranslationPipeline {
    pub fn new(options: PipelineOptions, components: PipelineComponents) -> Self {
        Self {
            options,
            components,
            cancel: CancellationToken::new(),
            state: Mutex::new(PipelineState::Pending),
        }
    }

    /// Wire the default components for a configuration
    ///
    /// The translator and the layout classifier are selected by the caller.
    /// The persistent cache is opened when enabled; failing to open it only
    /// disables it.
    pub fn from_config(
        config: &Config,
        translator: Arc<dyn Translator>,
        classifier: Arc<dyn LayoutClassifier>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let options = PipelineOptions::from_config(config)?;

        let cache = Arc::new(TranslationCache::new());
        let limiter = Arc::new(RateLimiter::new(config.translation.qps));
        let mut engine = TranslationEngine::new(
            translator,
            cache,
            limiter,
            EngineOptions::from_config(config),
        );
        if config.translation.persistent_cache {
            let repository = match &config.translation.cache_path {
                Some(path) => DatabaseConnection::new(path).map(Repository::new),
                None => Repository::new_default(),
            };
            match repository {
                Ok(repository) => engine = engine.with_repository(repository),
                Err(e) => warn!("Persistent translation cache disabled: {}", e),
            }
        }

        let mut writer = LopdfWriter::new(config.output.skip_clean);
        if let Some(font) = EmbeddedFont::resolve(config.output.font_path.as_deref())? {
            writer = writer.with_font(Arc::new(font));
        }

        let components = PipelineComponents {
            parser: Arc::new(JsonIlParser::new()),
            classifier,
            extractor: SpanExtractor::from_config(config)?,
            scheduler: TranslationScheduler::new(
                Arc::new(engine),
                config.translation.concurrent_requests,
            ),
            reconstructor: PageReconstructor::new(ReconstructOptions {
                rich_text: config.rich_text(),
                dual_translate_first: config.output.dual_translate_first,
            }),
            writer: Arc::new(writer),
        };
        Ok(Self::new(options, components))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Token that stops the run at the next page boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// State of the current or last run
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    fn enter(&self, next: PipelineState) {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            debug!("Pipeline state {:?} -> {:?}", *state, next);
            *state = next;
        } else {
            warn!("Ignoring pipeline state change {:?} -> {:?}", *state, next);
        }
    }

    /// Translate a document in a background task, streaming its progress
    ///
    /// The channel always ends with one terminal event: `finish` with the
    /// summary, or `error`.
    pub fn translate(self: Arc<Self>, input: PathBuf) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (monitor, receiver) = ProgressMonitor::channel(self.options.report_interval);
        let monitor = Arc::new(monitor);

        tokio::spawn(async move {
            match self.run(&input, monitor.clone()).await {
                Ok(summary) => monitor.finish(summary),
                Err(e) => {
                    error!("Translation of {:?} failed: {}", input, e);
                    monitor.error(&e);
                }
            }
        });

        receiver
    }

    /// Run the pipeline on one document
    ///
    /// The caller emits the terminal event from the returned result.
    pub async fn run(
        &self,
        input: &Path,
        monitor: Arc<ProgressMonitor>,
    ) -> Result<TranslationResultSummary, PipelineError> {
        *self.state.lock() = PipelineState::Pending;
        let result = self.run_stages(input, &monitor).await;
        match &result {
            Ok(summary) => {
                self.enter(PipelineState::Finished);
                info!("Finished {}", summary);
            }
            Err(e) => {
                self.enter(PipelineState::Aborted);
                if matches!(e, PipelineError::Cancelled) {
                    warn!("Translation of {:?} cancelled", input);
                }
            }
        }
        result
    }

    async fn run_stages(
        &self,
        input: &Path,
        monitor: &Arc<ProgressMonitor>,
    ) -> Result<TranslationResultSummary, PipelineError> {
        let started = Instant::now();
        let mut document = self.load(input).await?;
        info!(
            "Translating {:?}: {} of the document's pages selected",
            input,
            document.selected.len()
        );

        self.layout_stage(&mut document, monitor).await?;
        self.extraction_stage(&mut document, monitor)?;
        let translated_spans = self.translation_stage(&mut document, monitor).await?;
        self.reconstruction_stage(&mut document, monitor)?;
        let (mono_path, dual_path) = self.assembly_stage(&document, monitor).await?;

        let fallback_spans = document
            .pages
            .iter()
            .flat_map(|p| p.spans.iter())
            .filter(|s| s.status == SpanStatus::Failed)
            .count();
        let overflow_count = document
            .pages
            .iter()
            .filter_map(|p| p.output.as_ref())
            .map(|o| o.overflowed)
            .sum();

        Ok(TranslationResultSummary {
            original_path: input.to_path_buf(),
            total_seconds: started.elapsed().as_secs_f64(),
            mono_path,
            dual_path,
            page_count: document.pages.len(),
            translated_spans,
            fallback_spans,
            overflow_count,
        })
    }

    /// Parse the input and resolve the page selection
    async fn load(&self, input: &Path) -> Result<Document, PipelineError> {
        let parser = self.components.parser.clone();
        let path = input.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| PipelineError::Io(format!("Parser task failed: {}", e)))??;

        let selected = self.options.pages.resolve(parsed.pages.len());
        if selected.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "No pages selected in {:?} ({} pages)",
                input,
                parsed.pages.len()
            )));
        }

        let pages = parsed
            .pages
            .into_iter()
            .enumerate()
            .filter(|(position, _)| selected.binary_search(&(position + 1)).is_ok())
            .map(|(_, source)| Page::new(source))
            .collect();

        let output_dir = match &self.options.output_dir {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        Ok(Document {
            input: input.to_path_buf(),
            output_dir,
            selected,
            pages,
        })
    }

    fn begin(&self, stage: Stage, total: usize, monitor: &ProgressMonitor) {
        self.enter(PipelineState::for_stage(stage));
        info!("{} started ({} items)", stage, total);
        monitor.stage_start(stage, total);
    }

    fn end(&self, stage: Stage, monitor: &ProgressMonitor) {
        monitor.stage_end(stage);
        debug!("{} finished", stage);
    }

    async fn layout_stage(
        &self,
        document: &mut Document,
        monitor: &ProgressMonitor,
    ) -> Result<(), PipelineError> {
        self.begin(Stage::LayoutAnalysis, document.pages.len(), monitor);
        let classifier = &self.components.classifier;

        let pages: Vec<Result<Page, PipelineError>> =
            stream::iter(std::mem::take(&mut document.pages))
                .map(|mut page| async move {
                    self.cancel.check()?;
                    let image = PageImage::render(&page.source);
                    let regions = classifier.classify(&image).await.map_err(|source| {
                        PipelineError::Layout {
                            page: page.number(),
                            source,
                        }
                    })?;
                    page.regions = regions.iter().map(|r| image.to_page_space(r)).collect();
                    debug!("Page {}: {} regions", page.number(), page.regions.len());
                    monitor.advance(Stage::LayoutAnalysis, 1);
                    Ok(page)
                })
                .buffered(self.options.page_workers)
                .collect()
                .await;

        document.pages = pages.into_iter().collect::<Result<_, _>>()?;
        self.end(Stage::LayoutAnalysis, monitor);
        Ok(())
    }

    fn extraction_stage(&self, document: &mut Document, monitor: &ProgressMonitor) -> Result<(), PipelineError> {
        self.begin(Stage::Extraction, document.pages.len(), monitor);
        for page in &mut document.pages {
            self.cancel.check()?;
            page.spans = self.components.extractor.extract(&page.source, &page.regions);
            monitor.advance(Stage::Extraction, 1);
        }
        self.end(Stage::Extraction, monitor);
        Ok(())
    }

    /// Returns the number of spans sent to the engine
    async fn translation_stage(
        &self,
        document: &mut Document,
        monitor: &ProgressMonitor,
    ) -> Result<usize, PipelineError> {
        let total: usize = document
            .pages
            .iter()
            .map(|p| TranslationScheduler::pending_count(&p.spans))
            .sum();
        self.begin(Stage::Translation, total, monitor);
        let scheduler = &self.components.scheduler;

        let pages: Vec<Result<Page, PipelineError>> =
            stream::iter(std::mem::take(&mut document.pages))
                .map(|mut page| async move {
                    self.cancel.check()?;
                    let spans = std::mem::take(&mut page.spans);
                    page.spans = scheduler
                        .translate_spans(spans, || monitor.advance(Stage::Translation, 1))
                        .await;
                    Ok(page)
                })
                .buffered(self.options.page_workers)
                .collect()
                .await;

        document.pages = pages.into_iter().collect::<Result<_, _>>()?;
        self.end(Stage::Translation, monitor);
        Ok(total)
    }

    fn reconstruction_stage(&self, document: &mut Document, monitor: &ProgressMonitor) -> Result<(), PipelineError> {
        self.begin(Stage::Reconstruction, document.pages.len(), monitor);
        for page in &mut document.pages {
            self.cancel.check()?;
            let output = self.components.reconstructor.mono(&page.source, &page.spans);
            if output.overflowed > 0 {
                warn!("Page {}: {} spans truncated to fit", page.number(), output.overflowed);
            }
            page.output = Some(output);
            monitor.advance(Stage::Reconstruction, 1);
        }
        self.end(Stage::Reconstruction, monitor);
        Ok(())
    }

    /// Write the requested outputs, returning the mono and dual paths
    async fn assembly_stage(
        &self,
        document: &Document,
        monitor: &ProgressMonitor,
    ) -> Result<(Option<PathBuf>, Option<PathBuf>), PipelineError> {
        let mut kinds = Vec::new();
        if !self.options.no_mono {
            kinds.push(OutputKind::Mono);
        }
        if !self.options.no_dual {
            kinds.push(OutputKind::Dual);
        }
        self.begin(Stage::Assembly, kinds.len(), monitor);

        let mut mono_path = None;
        let mut dual_path = None;
        for kind in kinds {
            self.cancel.check()?;
            let pages = self.output_pages(document, kind);
            let path = FileManager::generate_output_path(
                &document.input,
                &document.output_dir,
                &self.options.target_language,
                kind,
            );

            let writer = self.components.writer.clone();
            let target = path.clone();
            tokio::task::spawn_blocking(move || writer.write(&pages, &target))
                .await
                .map_err(|e| PipelineError::Io(format!("Writer task failed: {}", e)))??;
            info!("Wrote {:?}", path);

            match kind {
                OutputKind::Mono => mono_path = Some(path),
                OutputKind::Dual => dual_path = Some(path),
            }
            monitor.advance(Stage::Assembly, 1);
        }

        self.end(Stage::Assembly, monitor);
        Ok((mono_path, dual_path))
    }

    fn output_pages(&self, document: &Document, kind: OutputKind) -> Vec<OutputPage> {
        let reconstructor = &self.components.reconstructor;
        document
            .pages
            .iter()
            .flat_map(|page| {
                let mono = page
                    .output
                    .clone()
                    .unwrap_or_else(|| PageReconstructor::identity(&page.source));
                match kind {
                    OutputKind::Mono => vec![mono],
                    OutputKind::Dual => {
                        reconstructor.dual_pair(PageReconstructor::identity(&page.source), mono)
                    }
                }
            })
            .collect()
    }
}
