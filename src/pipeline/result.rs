use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Outcome of a successful document run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResultSummary {
    /// Input document
    pub original_path: PathBuf,
    /// Wall-clock duration of the run
    pub total_seconds: f64,
    pub mono_path: Option<PathBuf>,
    pub dual_path: Option<PathBuf>,
    /// Pages translated
    pub page_count: usize,
    /// Spans sent to the backend
    pub translated_spans: usize,
    /// Spans that kept their original text after a backend failure
    pub fallback_spans: usize,
    /// Spans whose translation was truncated to fit
    pub overflow_count: usize,
}

impl TranslationResultSummary {
    /// Paths of the files written
    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.mono_path.iter().chain(self.dual_path.iter())
    }
}

impl fmt::Display for TranslationResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} pages, {} spans in {:.2}s",
            self.original_path, self.page_count, self.translated_spans, self.total_seconds
        )?;
        if self.fallback_spans > 0 {
            write!(f, ", {} kept original", self.fallback_spans)?;
        }
        if self.overflow_count > 0 {
            write!(f, ", {} truncated", self.overflow_count)?;
        }
        if let Some(mono) = &self.mono_path {
            write!(f, "\n  mono: {:?}", mono)?;
        }
        if let Some(dual) = &self.dual_path {
            write!(f, "\n  dual: {:?}", dual)?;
        }
        Ok(())
    }
}
