//! Pipeline progress reporting

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// A step of the signing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Mode,
    Version,
    Identity,
    Digest,
    Secret,
    Command,
    Execute,
    Cleanup,
}

impl Stage {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validate => "Validating request",
            Self::Mode => "Resolving trust mode",
            Self::Version => "Detecting signer version",
            Self::Identity => "Resolving certificate identity",
            Self::Digest => "Resolving image digest",
            Self::Secret => "Materializing key",
            Self::Command => "Building signer command",
            Self::Execute => "Running signer",
            Self::Cleanup => "Cleaning up secrets",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Events emitted while a request moves through the pipeline
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// A stage is starting
    Started { stage: Stage },
    /// A stage completed
    Completed { stage: Stage, detail: Option<String> },
    /// A stage does not apply to this request
    Skipped { stage: Stage, reason: String },
    /// Non-fatal degradation
    Warning { stage: Stage, message: String },
    /// A stage failed; the pipeline stops
    Failed { stage: Stage, error: String },
    /// The pipeline finished
    Finished { success: bool, duration: Duration },
}

/// Trait for reporting pipeline progress
pub trait StageReporter: Send + Sync {
    /// Handle a stage event
    fn report(&self, event: &StageEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl StageReporter for TracingReporter {
    fn report(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { stage } => tracing::info!("{}", stage),
            StageEvent::Completed { stage, detail } => match detail {
                Some(detail) => tracing::info!("{}: {}", stage, detail),
                None => tracing::debug!("{} done", stage),
            },
            StageEvent::Skipped { stage, reason } => {
                tracing::debug!("{} skipped: {}", stage, reason);
            }
            StageEvent::Warning { stage, message } => {
                tracing::warn!("{}: {}", stage, message);
            }
            StageEvent::Failed { stage, error } => {
                tracing::error!("{} failed: {}", stage, error);
            }
            StageEvent::Finished { success, duration } => {
                tracing::info!(
                    "Pipeline {} in {:.1}s",
                    if *success { "succeeded" } else { "failed" },
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<StageEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<StageEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages of every warning event
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StageEvent::Warning { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Stages that started, in order
    pub fn started(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StageEvent::Started { stage } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl StageReporter for CollectingReporter {
    fn report(&self, event: &StageEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
