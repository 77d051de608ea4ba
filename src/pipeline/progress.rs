/*!
 * Weighted progress telemetry.
 *
 * The monitor is the single producer of `ProgressEvent`s for a run. Overall
 * progress is the weighted sum of stage completion; it never decreases and
 * stays below 100 until the `finish` event.
 */

use log::trace;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::result::TranslationResultSummary;
use crate::errors::PipelineError;

/// Highest overall progress reported before the run finishes
pub const MAX_INTERMEDIATE_PROGRESS: f64 = 99.9;

/// Processing stage of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LayoutAnalysis,
    Extraction,
    Translation,
    Reconstruction,
    Assembly,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::LayoutAnalysis,
        Stage::Extraction,
        Stage::Translation,
        Stage::Reconstruction,
        Stage::Assembly,
    ];

    /// Share of the overall progress, in percent
    pub fn weight(self) -> f64 {
        match self {
            Self::LayoutAnalysis => 20.0,
            Self::Extraction => 10.0,
            Self::Translation => 50.0,
            Self::Reconstruction => 15.0,
            Self::Assembly => 5.0,
        }
    }

    fn position(self) -> usize {
        match self {
            Self::LayoutAnalysis => 0,
            Self::Extraction => 1,
            Self::Translation => 2,
            Self::Reconstruction => 3,
            Self::Assembly => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LayoutAnalysis => "Layout analysis",
            Self::Extraction => "Extraction",
            Self::Translation => "Translation",
            Self::Reconstruction => "Reconstruction",
            Self::Assembly => "Assembly",
        };
        write!(f, "{}", name)
    }
}

/// Event sent to progress renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    ProgressStart {
        stage: Stage,
        stage_total: usize,
        overall_progress: f64,
    },
    ProgressUpdate {
        stage: Stage,
        stage_current: usize,
        stage_total: usize,
        overall_progress: f64,
    },
    ProgressEnd {
        stage: Stage,
        stage_current: usize,
        stage_total: usize,
        overall_progress: f64,
    },
    Finish {
        overall_progress: f64,
        translate_result: TranslationResultSummary,
    },
    Error {
        error: String,
        kind: String,
    },
}

impl ProgressEvent {
    /// Overall progress carried by the event, if any
    pub fn overall_progress(&self) -> Option<f64> {
        match self {
            Self::ProgressStart { overall_progress, .. }
            | Self::ProgressUpdate { overall_progress, .. }
            | Self::ProgressEnd { overall_progress, .. }
            | Self::Finish { overall_progress, .. } => Some(*overall_progress),
            Self::Error { .. } => None,
        }
    }

    /// Whether no event follows this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StageCounter {
    current: usize,
    total: usize,
    done: bool,
}

impl StageCounter {
    fn fraction(&self) -> f64 {
        if self.done {
            1.0
        } else if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    stages: [StageCounter; 5],
    last_update: Option<Instant>,
    reported: f64,
    terminated: bool,
}

/// Producer of the progress events of one run
#[derive(Debug)]
pub struct ProgressMonitor {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    report_interval: Duration,
    state: Mutex<MonitorState>,
}

impl ProgressMonitor {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>, report_interval: Duration) -> Self {
        Self {
            sender,
            report_interval,
            state: Mutex::new(MonitorState {
                stages: [StageCounter::default(); 5],
                last_update: None,
                reported: 0.0,
                terminated: false,
            }),
        }
    }

    /// Create a monitor together with the receiving end of its channel
    pub fn channel(report_interval: Duration) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender, report_interval), receiver)
    }

    fn emit(&self, event: ProgressEvent) {
        trace!("Progress event: {:?}", event);
        // A dropped receiver only means nobody is rendering
        let _ = self.sender.send(event);
    }

    /// Weighted progress, non-decreasing and clamped below 100
    fn overall(state: &mut MonitorState) -> f64 {
        let raw: f64 = Stage::ALL
            .iter()
            .map(|stage| stage.weight() * state.stages[stage.position()].fraction())
            .sum();
        let clamped = raw.min(MAX_INTERMEDIATE_PROGRESS).max(state.reported);
        state.reported = clamped;
        clamped
    }

    /// Current overall progress
    pub fn overall_progress(&self) -> f64 {
        self.state.lock().reported
    }

    pub fn stage_start(&self, stage: Stage, total: usize) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        state.stages[stage.position()] = StageCounter {
            current: 0,
            total,
            done: false,
        };
        state.last_update = None;
        let overall_progress = Self::overall(&mut state);
        // Sent under the lock so that concurrent producers stay ordered
        self.emit(ProgressEvent::ProgressStart {
            stage,
            stage_total: total,
            overall_progress,
        });
    }

    /// Record `count` more units of work, emitting a throttled update
    pub fn advance(&self, stage: Stage, count: usize) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        let counter = &mut state.stages[stage.position()];
        counter.current += count;
        let (current, total) = (counter.current, counter.total);
        let overall_progress = Self::overall(&mut state);

        let now = Instant::now();
        let due = state
            .last_update
            .is_none_or(|last| now.duration_since(last) >= self.report_interval);
        if due {
            state.last_update = Some(now);
            self.emit(ProgressEvent::ProgressUpdate {
                stage,
                stage_current: current,
                stage_total: total,
                overall_progress,
            });
        }
    }

    pub fn stage_end(&self, stage: Stage) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        let counter = &mut state.stages[stage.position()];
        counter.done = true;
        counter.current = counter.current.max(counter.total);
        let (current, total) = (counter.current, counter.total);
        let overall_progress = Self::overall(&mut state);
        self.emit(ProgressEvent::ProgressEnd {
            stage,
            stage_current: current,
            stage_total: total,
            overall_progress,
        });
    }

    /// Emit the terminal `finish` event at 100; later calls are ignored
    pub fn finish(&self, summary: TranslationResultSummary) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        state.reported = 100.0;
        self.emit(ProgressEvent::Finish {
            overall_progress: 100.0,
            translate_result: summary,
        });
    }

    /// Emit the terminal `error` event
    pub fn error(&self, error: &PipelineError) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        self.emit(ProgressEvent::Error {
            error: error.to_string(),
            kind: error.kind().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn summary() -> TranslationResultSummary {
        TranslationResultSummary {
            original_path: PathBuf::from("doc.pdf"),
            total_seconds: 1.0,
            mono_path: None,
            dual_path: None,
            page_count: 1,
            translated_spans: 0,
            fallback_spans: 0,
            overflow_count: 0,
        }
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_stageWeights_shouldSumToHundred() {
        let total: f64 = Stage::ALL.iter().map(|s| s.weight()).sum();
        assert_eq!(total, 100.0);
    }

    #[tokio::test]
    async fn test_monitor_withAllStages_shouldBeMonotonicAndFinishOnce() {
        let (monitor, mut receiver) = ProgressMonitor::channel(Duration::ZERO);

        for stage in Stage::ALL {
            monitor.stage_start(stage, 4);
            for _ in 0..4 {
                monitor.advance(stage, 1);
            }
            monitor.stage_end(stage);
        }
        monitor.finish(summary());
        monitor.finish(summary());

        let events = drain(&mut receiver);
        let progress: Vec<f64> = events.iter().filter_map(|e| e.overall_progress()).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.iter().filter(|p| **p >= 100.0).count(), 1);
        assert_eq!(*progress.last().unwrap(), 100.0);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_monitor_withLongInterval_shouldThrottleUpdates() {
        let (monitor, mut receiver) = ProgressMonitor::channel(Duration::from_secs(3600));

        monitor.stage_start(Stage::Translation, 100);
        for _ in 0..100 {
            monitor.advance(Stage::Translation, 1);
        }
        monitor.stage_end(Stage::Translation);

        let events = drain(&mut receiver);
        let updates = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::ProgressUpdate { .. }))
            .count();
        assert_eq!(updates, 1);
        assert_eq!(events.last().unwrap().overall_progress(), Some(50.0));
    }

    #[test]
    fn test_event_serialization_shouldUseTypeTag() {
        let event = ProgressEvent::ProgressUpdate {
            stage: Stage::Translation,
            stage_current: 3,
            stage_total: 10,
            overall_progress: 45.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["stage"], "translation");
        assert_eq!(json["stage_current"], 3);
    }
}
