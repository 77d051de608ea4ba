// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use pdfbabel::app_config::{self, Config, TranslationProvider};
use pdfbabel::file_utils::FileManager;
use pdfbabel::layout::{FallbackClassifier, LayoutClassifier, RasterBlockClassifier, RpcLayoutClassifier};
use pdfbabel::pipeline::{ProgressEvent, TranslationPipeline, TranslationResultSummary};
use pdfbabel::providers::{OpenAI, Translator};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for pdfbabel
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// PDF files, intermediate-layer files or directories to translate
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Pages to translate, e.g. "1,3-5" or "10-"
    #[arg(short, long)]
    pages: Option<String>,

    /// Source language code (e.g., 'en', 'de')
    #[arg(long = "lang-in", short = 'l')]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'fr')
    #[arg(long = "lang-out", short = 't')]
    target_language: Option<String>,

    /// Output directory (defaults to the directory of each input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "pdfbabel.json")]
    config: String,

    /// Translation provider to use
    #[arg(long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(long = "openai-model")]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long = "openai-base-url")]
    base_url: Option<String>,

    /// API key (falls back to OPENAI_API_KEY)
    #[arg(long = "openai-api-key")]
    api_key: Option<String>,

    /// Maximum translation requests per second
    #[arg(long)]
    qps: Option<f64>,

    /// Translate again even when a cached translation exists
    #[arg(long)]
    ignore_cache: bool,

    /// Do not write the bilingual document
    #[arg(long)]
    no_dual: bool,

    /// Do not write the translated-only document
    #[arg(long)]
    no_mono: bool,

    /// Regex of font names treated as formula fonts
    #[arg(long)]
    formula_font_pattern: Option<String>,

    /// Regex of characters treated as formula characters
    #[arg(long)]
    formula_char_pattern: Option<String>,

    /// Break paragraphs around short lines
    #[arg(long)]
    split_short_lines: bool,

    /// Fraction of the median line width below which a line is short
    #[arg(long)]
    short_line_split_factor: Option<f32>,

    /// Keep unreferenced objects and uncompressed streams in the output
    #[arg(long)]
    skip_clean: bool,

    /// Put the translated page first in the bilingual document
    #[arg(long)]
    dual_translate_first: bool,

    /// Translate formulas inline instead of protecting them
    #[arg(long)]
    disable_rich_text_translate: bool,

    /// Same as --skip-clean --dual-translate-first --disable-rich-text-translate
    #[arg(long)]
    enhance_compatibility: bool,

    /// TrueType font embedded for non-Latin text
    #[arg(long, value_name = "TTF")]
    font: Option<PathBuf>,

    /// Minimum delay between two progress updates, in seconds
    #[arg(long)]
    report_interval: Option<f64>,

    /// Pages processed concurrently within a stage
    #[arg(long)]
    page_workers: Option<usize>,

    /// Host of a DocLayout inference server (e.g. http://localhost:8000)
    #[arg(long = "rpc-doclayout")]
    rpc_host: Option<String>,

    /// Use the local classifier when the layout server is unavailable
    #[arg(long)]
    layout_fallback: bool,

    /// Check the translation and layout backends, then exit
    #[arg(long)]
    warmup: bool,

    /// Shortcut for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// pdfbabel - layout-preserving PDF translation
#[derive(Parser, Debug)]
#[command(name = "pdfbabel")]
#[command(version)]
#[command(about = "Translate PDF documents while preserving their layout")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "pdfbabel translates the text of PDF documents and writes a translated copy \
that keeps the original layout, plus a bilingual copy with original and translated pages side by side.

Each PDF is read from its intermediate layer, `<name>.il.json`, next to it.

EXAMPLES:
    pdfbabel paper.pdf                              # Translate using the default config
    pdfbabel -t fr -p 1-3 paper.pdf                 # First three pages into French
    pdfbabel --no-dual -o out/ papers/              # Translate a whole directory
    pdfbabel --rpc-doclayout http://gpu:8000 --layout-fallback paper.pdf
    pdfbabel --warmup                               # Check the backends
    pdfbabel completions bash > pdfbabel.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in pdfbabel.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically. Command line options override the file.

SUPPORTED PROVIDERS:
    openai    - OpenAI API (requires an API key, or OPENAI_API_KEY)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

// @struct: Custom logger implementation, filtered by the global max level
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Marker and ANSI color for a log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("✖", "1;31"),
            Level::Warn => ("!", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("·", "1;36"),
            Level::Trace => ("…", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > log::max_level() {
            return false;
        }
        // Debug output of the HTTP stack is noise
        metadata.level() <= Level::Info || metadata.target().starts_with("pdfbabel")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (marker, color) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                color,
                now,
                marker,
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "pdfbabel", &mut std::io::stdout());
            Ok(())
        }
        None => run_translate(cli.translate).await,
    }
}

// @applies: Command line overrides on top of the configuration file
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(pages) = &options.pages {
        config.pages = Some(pages.clone());
    }
    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(output) = &options.output {
        config.output.output_dir = Some(output.clone());
    }

    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.model = model.clone();
    }
    if let Some(base_url) = &options.base_url {
        config.translation.endpoint = Some(base_url.clone());
    }
    if let Some(api_key) = &options.api_key {
        config.translation.api_key = api_key.clone();
    }
    if let Some(qps) = options.qps {
        config.translation.qps = qps;
    }
    config.translation.ignore_cache |= options.ignore_cache;

    if let Some(pattern) = &options.formula_font_pattern {
        config.extraction.formula_font_pattern = Some(pattern.clone());
    }
    if let Some(pattern) = &options.formula_char_pattern {
        config.extraction.formula_char_pattern = Some(pattern.clone());
    }
    config.extraction.split_short_lines |= options.split_short_lines;
    if let Some(factor) = options.short_line_split_factor {
        config.extraction.short_line_split_factor = factor;
    }

    config.output.no_dual |= options.no_dual;
    config.output.no_mono |= options.no_mono;
    config.output.skip_clean |= options.skip_clean;
    config.output.dual_translate_first |= options.dual_translate_first;
    config.output.disable_rich_text_translate |= options.disable_rich_text_translate;
    config.output.enhance_compatibility |= options.enhance_compatibility;
    config.apply_compatibility();
    if let Some(font) = &options.font {
        config.output.font_path = Some(font.clone());
    }

    if let Some(interval) = options.report_interval {
        config.pipeline.report_interval_secs = interval;
    }
    if let Some(workers) = options.page_workers {
        config.pipeline.page_workers = workers;
    }

    if let Some(host) = &options.rpc_host {
        config.layout.rpc_host = Some(host.clone());
    }
    config.layout.fallback_to_local |= options.layout_fallback;

    if options.debug {
        config.log_level = app_config::LogLevel::Debug;
    } else if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

// @creates: Translation backend for the configured provider
fn build_translator(config: &Config) -> Arc<dyn Translator> {
    let translation = &config.translation;
    let client = OpenAI::new(
        translation.get_api_key(),
        translation.get_endpoint(),
        translation.model.clone(),
        translation.timeout_secs,
    )
    .with_system_prompt(translation.system_prompt.clone())
    .with_temperature(translation.temperature);
    Arc::new(client)
}

// @creates: Layout classifier, remote when a host is configured
fn build_classifier(config: &Config) -> Arc<dyn LayoutClassifier> {
    match &config.layout.rpc_host {
        Some(host) => {
            let rpc: Arc<dyn LayoutClassifier> = Arc::new(RpcLayoutClassifier::new(host.clone()));
            if config.layout.fallback_to_local {
                Arc::new(FallbackClassifier::new(rpc, Arc::new(RasterBlockClassifier::new())))
            } else {
                rpc
            }
        }
        None => Arc::new(RasterBlockClassifier::new()),
    }
}

async fn warmup(translator: &dyn Translator, classifier: &dyn LayoutClassifier) -> Result<()> {
    info!("Checking translation backend {}", translator.engine_id());
    translator
        .test_connection()
        .await
        .context("Translation backend is not reachable")?;

    info!("Checking layout classifier {}", classifier.name());
    classifier
        .health_check()
        .await
        .context("Layout classifier is not reachable")?;

    info!("All backends are ready");
    Ok(())
}

// @collects: Documents named on the command line, expanding directories
fn collect_documents(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = FileManager::find_documents(input)?;
            if found.is_empty() {
                warn!("No documents found in {:?}", input);
            }
            documents.extend(found);
        } else if input.is_file() {
            documents.push(input.clone());
        } else {
            return Err(anyhow!("Input path does not exist: {:?}", input));
        }
    }
    Ok(documents)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if options.debug {
        log::set_max_level(LevelFilter::Debug);
    } else if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let (mut config, created) = Config::load_or_create(&options.config)?;
    if created {
        warn!("Config file not found at '{}', created a default one.", options.config);
    }
    apply_overrides(&mut config, &options);

    config
        .validate()
        .context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());
    debug!("Effective configuration: {:?}", config);

    let translator = build_translator(&config);
    let classifier = build_classifier(&config);

    if options.warmup {
        return warmup(translator.as_ref(), classifier.as_ref()).await;
    }

    if options.files.is_empty() {
        return Err(anyhow!("At least one input file or directory is required"));
    }
    let documents = collect_documents(&options.files)?;
    if documents.is_empty() {
        return Err(anyhow!("No documents to translate"));
    }

    let pipeline = Arc::new(TranslationPipeline::from_config(&config, translator, classifier)?);

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next page");
            token.cancel();
        }
    });

    let multi_progress = MultiProgress::new();
    let files_bar = (documents.len() > 1).then(|| {
        let bar = multi_progress.add(ProgressBar::new(documents.len() as u64));
        bar.set_style(bar_style("{pos}/{len} files"));
        bar.set_message("Processing files");
        bar
    });

    let mut failures = 0usize;
    for document in &documents {
        if let Some(bar) = &files_bar {
            bar.set_message(format!("Processing: {}", FileManager::document_stem(document)));
        }

        let receiver = pipeline.clone().translate(document.clone());
        match render_progress(receiver, &multi_progress).await {
            Some(summary) => {
                info!("{}", summary);
            }
            None => {
                failures += 1;
            }
        }

        if let Some(bar) = &files_bar {
            bar.inc(1);
        }
        if pipeline.cancellation_token().is_cancelled() {
            break;
        }
    }

    if let Some(bar) = &files_bar {
        bar.finish_with_message("Done");
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} documents failed", failures, documents.len()));
    }
    Ok(())
}

fn bar_style(counter: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {} {{msg}}",
            counter
        ))
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}

// @renders: Progress events of one document until the terminal event
async fn render_progress(
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
    multi_progress: &MultiProgress,
) -> Option<TranslationResultSummary> {
    let bar = multi_progress.add(ProgressBar::new(100));
    bar.set_style(bar_style("{pos:>3}%"));

    let mut summary = None;
    while let Some(event) = receiver.recv().await {
        if let Some(progress) = event.overall_progress() {
            bar.set_position(progress.floor() as u64);
        }
        match event {
            ProgressEvent::ProgressStart { stage, .. } => bar.set_message(stage.to_string()),
            ProgressEvent::ProgressUpdate {
                stage,
                stage_current,
                stage_total,
                ..
            } => bar.set_message(format!("{} {}/{}", stage, stage_current, stage_total)),
            ProgressEvent::ProgressEnd { .. } => {}
            ProgressEvent::Finish { translate_result, .. } => {
                bar.finish_with_message("Finished");
                summary = Some(translate_result);
                break;
            }
            ProgressEvent::Error { error, kind } => {
                bar.abandon_with_message(format!("Failed ({})", kind));
                error!("{}", error);
                break;
            }
        }
    }
    summary
}
