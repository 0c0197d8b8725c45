//! Progress reporting
//!
//! The pipeline reports through a [`ProgressReporter`], which fans each
//! event out to every attached [`ProgressObserver`]. Events are forced to be
//! monotonic: phases only move forward and progress never decreases.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Pipeline phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generating,
    Processing,
    Complete,
}

/// One progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Overall progress, 0-100
    pub progress: f64,
    pub current_step: String,
}

/// Share of the bar covered by frame generation
pub const GENERATING_SHARE: f64 = 50.0;

/// Progress at which the encoder is invoked
pub const ENCODING_START: f64 = 75.0;

/// Receives progress events
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        // A dropped receiver just means nobody is watching any more.
        let _ = self.tx.send(event.clone());
    }
}

/// Logs every event at info level
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        tracing::info!(
            phase = ?event.phase,
            progress = event.progress,
            "{}",
            event.current_step,
        );
    }
}

#[derive(Debug)]
struct ReporterState {
    phase: Phase,
    progress: f64,
}

/// Monotonic fan-out of progress events for one job
pub struct ProgressReporter {
    observers: Vec<Arc<dyn ProgressObserver>>,
    state: Mutex<Option<ReporterState>>,
}

impl ProgressReporter {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            observers,
            state: Mutex::new(None),
        }
    }

    /// Create a channel observer and its receiving end
    pub fn channel() -> (Arc<dyn ProgressObserver>, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelObserver::new(tx)), rx)
    }

    /// Report an event.
    ///
    /// Events for an earlier phase than the last one reported are dropped.
    /// Progress is clamped to 0-100 and to the last reported value.
    pub fn report(&self, phase: Phase, progress: f64, step: impl Into<String>) {
        let event = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            let mut progress = if progress.is_finite() {
                progress.clamp(0.0, 100.0)
            } else {
                0.0
            };

            if let Some(last) = state.as_ref() {
                if phase < last.phase {
                    tracing::warn!(
                        from = ?last.phase,
                        to = ?phase,
                        "Ignoring progress event for an earlier phase",
                    );
                    return;
                }
                progress = progress.max(last.progress);
            }

            *state = Some(ReporterState { phase, progress });

            ProgressEvent {
                phase,
                progress,
                current_step: step.into(),
            }
        };

        for observer in &self.observers {
            observer.on_progress(&event);
        }
    }

    /// Last reported phase, if any
    pub fn phase(&self) -> Option<Phase> {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.as_ref().map(|s| s.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Arc<dyn ProgressObserver>, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer: Arc<dyn ProgressObserver> =
            Arc::new(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));
        (observer, events)
    }

    #[test]
    fn test_fans_out_to_all_observers() {
        let (a, a_events) = collecting();
        let (b, b_events) = collecting();
        let reporter = ProgressReporter::new(vec![a, b]);

        reporter.report(Phase::Generating, 0.0, "Generating frames...");

        assert_eq!(a_events.lock().unwrap().len(), 1);
        assert_eq!(b_events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_progress_never_decreases() {
        let (observer, events) = collecting();
        let reporter = ProgressReporter::new(vec![observer]);

        reporter.report(Phase::Generating, 30.0, "a");
        reporter.report(Phase::Generating, 10.0, "b");
        reporter.report(Phase::Processing, 120.0, "c");

        let events = events.lock().unwrap();
        let values: Vec<f64> = events.iter().map(|e| e.progress).collect();
        assert_eq!(values, vec![30.0, 30.0, 100.0]);
    }

    #[test]
    fn test_phase_regression_is_dropped() {
        let (observer, events) = collecting();
        let reporter = ProgressReporter::new(vec![observer]);

        reporter.report(Phase::Processing, 50.0, "processing");
        reporter.report(Phase::Generating, 60.0, "late frame");

        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(reporter.phase(), Some(Phase::Processing));
    }

    #[tokio::test]
    async fn test_channel_observer() {
        let (observer, mut rx) = ProgressReporter::channel();
        let reporter = ProgressReporter::new(vec![observer]);

        reporter.report(Phase::Complete, 100.0, "done");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.phase, Phase::Complete);
        assert_eq!(event.current_step, "done");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = ProgressEvent {
            phase: Phase::Processing,
            progress: 50.0,
            current_step: "Processing frames...".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "processing");
        assert_eq!(json["currentStep"], "Processing frames...");
    }
}
