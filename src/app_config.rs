use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

use crate::errors::PipelineError;

/// Application configuration module
/// This module handles loading, validating and saving the settings of a
/// translation run. Every field has a serde default so partial files load.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Page selection such as "1,3-5" (all pages when absent)
    #[serde(default)]
    pub pages: Option<String>,

    /// Translation backend settings
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Layout analysis settings
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Span extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Scheduling and progress settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: OpenAI
    #[default]
    OpenAI,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    /// Whether the backend refuses requests without a key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API key, falls back to OPENAI_API_KEY
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Base URL of the chat completions API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// System prompt template
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Temperature parameter for text generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upstream requests per second shared by the whole run
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Spans of one page translated concurrently
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Total attempts per span before giving up
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound of a single backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip cache reads for this run
    #[serde(default)]
    pub ignore_cache: bool,

    /// Keep translations in the on-disk cache between runs
    #[serde(default = "default_true")]
    pub persistent_cache: bool,

    /// Location of the on-disk cache (user cache directory when absent)
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            model: default_openai_model(),
            api_key: String::new(),
            endpoint: None,
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            qps: default_qps(),
            concurrent_requests: default_concurrent_requests(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            ignore_cache: false,
            persistent_cache: true,
            cache_path: None,
        }
    }
}

impl TranslationConfig {
    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.is_empty() {
                return endpoint.trim_end_matches('/').to_string();
            }
        }

        match self.provider {
            TranslationProvider::OpenAI => default_openai_endpoint(),
            TranslationProvider::LMStudio => default_lmstudio_endpoint(),
        }
    }

    /// Get the API key, reading the environment when the file has none
    pub fn get_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("OPENAI_API_KEY").unwrap_or_default()
    }
}

/// Layout analysis configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LayoutConfig {
    /// Host of a DocLayout inference server; the in-process classifier is used when absent
    #[serde(default)]
    pub rpc_host: Option<String>,

    /// Use the in-process classifier when the server is unavailable
    #[serde(default)]
    pub fallback_to_local: bool,
}

/// Span extraction configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Font names treated as formula fonts
    #[serde(default)]
    pub formula_font_pattern: Option<String>,

    /// Characters treated as formula characters
    #[serde(default)]
    pub formula_char_pattern: Option<String>,

    /// Break paragraphs around lines narrower than the page median
    #[serde(default)]
    pub split_short_lines: bool,

    /// Fraction of the median line width below which a line is short
    #[serde(default = "default_short_line_split_factor")]
    pub short_line_split_factor: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            formula_font_pattern: None,
            formula_char_pattern: None,
            split_short_lines: false,
            short_line_split_factor: default_short_line_split_factor(),
        }
    }
}

/// Output configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Output directory (input directory when absent)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Do not write the translated-only document
    #[serde(default)]
    pub no_mono: bool,

    /// Do not write the bilingual document
    #[serde(default)]
    pub no_dual: bool,

    /// Skip pruning and stream compression when writing
    #[serde(default)]
    pub skip_clean: bool,

    /// Put the translated page before the original in dual output
    #[serde(default)]
    pub dual_translate_first: bool,

    /// Translate spans as plain text without formula placeholders
    #[serde(default)]
    pub disable_rich_text_translate: bool,

    /// Shorthand for skip_clean, dual_translate_first and disable_rich_text_translate
    #[serde(default)]
    pub enhance_compatibility: bool,

    /// TrueType font embedded for text outside the standard PDF fonts
    /// (a system font is looked up when absent)
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

/// Scheduling and progress configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Pages processed concurrently within a stage
    #[serde(default = "default_page_workers")]
    pub page_workers: usize,

    /// Minimum seconds between two progress updates of a stage
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            page_workers: default_page_workers(),
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching filter of the `log` facade
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_concurrent_requests() -> usize {
    8
}

fn default_page_workers() -> usize {
    4
}

fn default_qps() -> f64 {
    4.0
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_temperature() -> f32 {
    0.0
}

fn default_short_line_split_factor() -> f32 {
    0.8
}

fn default_report_interval() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_lmstudio_endpoint() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional, authentic machine translation engine. Translate the following text from {source_language} to {target_language}. Keep every placeholder of the form {v0}, {v1} unchanged. Output only the translation.".to_string()
}

impl Config {
    /// Load a configuration file, writing the defaults first when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok((config, false));
        }

        let config = Config::default();
        config.save(path)?;
        Ok((config, true))
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {:?}", path))?;
        Ok(())
    }

    /// Expand `enhance_compatibility` into the three options it stands for
    pub fn apply_compatibility(&mut self) {
        if self.output.enhance_compatibility {
            self.output.skip_clean = true;
            self.output.dual_translate_first = true;
            self.output.disable_rich_text_translate = true;
        }
    }

    /// Whether inline formulas are carried as placeholders
    pub fn rich_text(&self) -> bool {
        !self.output.disable_rich_text_translate
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), PipelineError> {
        crate::language_utils::validate_language_code(&self.source_language)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        crate::language_utils::validate_language_code(&self.target_language)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        if self.translation.provider.requires_api_key() && self.translation.get_api_key().is_empty()
        {
            return Err(PipelineError::Configuration(format!(
                "Translation API key is required for {} provider",
                self.translation.provider.display_name()
            )));
        }

        if !(self.translation.qps > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "QPS must be positive, got {}",
                self.translation.qps
            )));
        }

        if self.translation.retry_count == 0 {
            return Err(PipelineError::Configuration(
                "Retry count must be at least 1".to_string(),
            ));
        }

        if self.pipeline.page_workers == 0 || self.translation.concurrent_requests == 0 {
            return Err(PipelineError::Configuration(
                "Worker counts must be at least 1".to_string(),
            ));
        }

        let factor = self.extraction.short_line_split_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(PipelineError::Configuration(format!(
                "Short line split factor must be in (0, 1], got {}",
                factor
            )));
        }

        for pattern in [
            &self.extraction.formula_font_pattern,
            &self.extraction.formula_char_pattern,
        ]
        .into_iter()
        .flatten()
        {
            Regex::new(pattern).map_err(|e| {
                PipelineError::Configuration(format!("Invalid formula pattern '{}': {}", pattern, e))
            })?;
        }

        if let Some(pages) = &self.pages {
            crate::document::PageSelection::parse(pages)?;
        }

        let endpoint = self.translation.get_endpoint();
        Url::parse(&endpoint).map_err(|e| {
            PipelineError::Configuration(format!("Invalid translation endpoint '{}': {}", endpoint, e))
        })?;

        if self.output.no_mono && self.output.no_dual {
            log::warn!("Both mono and dual outputs are disabled, nothing will be written");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            pages: None,
            translation: TranslationConfig::default(),
            layout: LayoutConfig::default(),
            extraction: ExtractionConfig::default(),
            output: OutputConfig::default(),
            pipeline: PipelineSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
