use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::IntentKind;

/// The five phases an orchestration call reports to `on_progress`, each
/// carrying its fixed position in the pipeline (`parsing` is always 1/5,
/// `complete` is always 5/5) regardless of how many DAG steps a particular
/// plan ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parsing,
    Discovering,
    Compiling,
    Executing,
    Reflecting,
    Complete,
}

impl Phase {
    pub fn step(&self) -> (u32, u32) {
        match self {
            Phase::Parsing => (1, 5),
            Phase::Discovering => (2, 5),
            Phase::Compiling => (3, 5),
            Phase::Executing => (4, 5),
            Phase::Reflecting => (5, 5),
            Phase::Complete => (5, 5),
        }
    }
}

/// One chunk of the orchestration progress stream. Carries the same payload
/// whether delivered over an `mpsc` channel in-process or serialized across
/// a transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    Status { phase: Phase, current: u32, total: u32, message: String },
    IntentParsed { intent: IntentKind, confidence: f64 },
    PlanCompiled { step_count: usize },
    PlanValidated { passed: bool, warning_count: usize },
    BatchStart { index: usize, size: usize },
    StepStart { step_id: String },
    StepComplete { step_id: String, output: String },
    StepError { step_id: String, error: String },
    StepSkip { step_id: String, reason: String },
    StepRecovery { step_id: String, action: String },
    Message { text: String },
    Complete { success_count: usize, failed_count: usize, skipped_count: usize, total_duration_ms: u64 },
    Error { message: String },
    Cancelled,
}

/// Wraps an [`OrchestrationEvent`] with the timestamp and progress fields
/// every chunk in the stream carries, independent of its variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp_ms: i64,
    pub progress: Option<u8>,
    pub event: OrchestrationEvent,
}

impl EventEnvelope {
    pub fn new(event: OrchestrationEvent, progress: Option<u8>) -> Self {
        Self { timestamp_ms: Utc::now().timestamp_millis(), progress, event }
    }
}

/// Sender half of the progress stream; the `Orchestrator` holds one per
/// in-flight call and drops it when the run ends, closing the receiver the
/// caller is draining.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<EventEnvelope>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_positions_are_fixed_regardless_of_plan_size() {
        assert_eq!(Phase::Parsing.step(), (1, 5));
        assert_eq!(Phase::Complete.step(), (5, 5));
    }

    #[test]
    fn envelope_carries_a_timestamp() {
        let envelope = EventEnvelope::new(OrchestrationEvent::Cancelled, None);
        assert!(envelope.timestamp_ms > 0);
    }
}
