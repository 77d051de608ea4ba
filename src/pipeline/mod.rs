/*!
 * Document pipeline: stage orchestration, progress telemetry and the run
 * summary.
 */

pub mod orchestrator;
pub mod progress;
pub mod result;

pub use self::orchestrator::{
    CancellationToken, PipelineComponents, PipelineOptions, PipelineState, TranslationPipeline,
};
pub use self::progress::{ProgressEvent, ProgressMonitor, Stage};
pub use self::result::TranslationResultSummary;
