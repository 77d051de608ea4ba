/*!
 * # pdfbabel - layout-preserving PDF translation
 *
 * A Rust library that translates the text of a PDF while keeping its
 * layout: figures, tables and formulas stay where they are, and only the
 * prose is replaced.
 *
 * ## Features
 *
 * - Layout analysis through a DocLayout RPC server or a local raster classifier
 * - Paragraph extraction with inline formula protection (`{v0}` placeholders)
 * - Cached, rate-limited, deduplicated translation through OpenAI-compatible APIs
 * - Font-shrinking typesetting into the original region boxes
 * - Monolingual and bilingual (side by side pages) output documents
 * - Weighted progress events for renderers
 *
 * ## Architecture
 *
 * - `document`: intermediate layer and pipeline data model
 * - `layout`: page rasterization and region classification
 * - `extraction`: glyph to span assembly and formula detection
 * - `translation`: cache, rate limiter, engine and span scheduler
 * - `reconstruction`: typesetting of translated spans into output pages
 * - `pdf`: intermediate layer parser and PDF writer
 * - `pipeline`: per-document orchestrator and progress telemetry
 * - `providers`: translation backends
 * - `database`: persistent translation cache
 * - `app_config`, `errors`, `file_utils`, `language_utils`: ambient support
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod database;
pub mod document;
pub mod errors;
pub mod extraction;
pub mod file_utils;
pub mod language_utils;
pub mod layout;
pub mod pdf;
pub mod pipeline;
pub mod providers;
pub mod reconstruction;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use document::{PageSelection, Region, RegionKind, Span};
pub use errors::{LayoutError, PipelineError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match};
pub use pipeline::{
    CancellationToken, ProgressEvent, TranslationPipeline, TranslationResultSummary,
};
