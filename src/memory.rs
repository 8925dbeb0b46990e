use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;

use crate::intent::ParseContext;
use crate::trace::TraceEntry;
use crate::types::{ExecutionPlan, ExecutionResult, IntentSpec, OrchestrationOptions};
use crate::validator::ValidationReport;

/// Per-call state threaded through one `Orchestrator::orchestrate` invocation
/// — one struct collecting everything a single run accumulates, constructed
/// fresh per call rather than shared across calls.
#[derive(Debug)]
pub struct OrchestrationContext {
    pub user_message: String,
    pub options: OrchestrationOptions,
    pub session_id: Option<String>,
    pub parse_context: ParseContext,
    pub intent: Option<IntentSpec>,
    pub plan: Option<ExecutionPlan>,
    pub validation: Option<ValidationReport>,
    pub execution: Option<ExecutionResult>,
    pub reply: Option<String>,
    pub cancel: Arc<AtomicBool>,
    log: Vec<TraceEntry>,
}

impl OrchestrationContext {
    pub fn new(user_message: impl Into<String>, options: OrchestrationOptions, parse_context: ParseContext) -> Self {
        Self {
            user_message: user_message.into(),
            options,
            session_id: None,
            parse_context,
            intent: None,
            plan: None,
            validation: None,
            execution: None,
            reply: None,
            cancel: Arc::new(AtomicBool::new(false)),
            log: Vec::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Records a lightweight phase-transition note independent of the full
    /// `Tracer` — cheap enough to call on every phase boundary even when
    /// tracing is disabled for the call.
    pub fn log(&mut self, phase: &str, event: &str, data: &str) {
        tracing::debug!(phase, event, data, "orchestration phase");
        self.log.push(TraceEntry { step: self.log.len(), state: phase.to_string(), event: event.to_string(), data: data.to_string(), timestamp: Utc::now() });
    }

    pub fn phase_log(&self) -> &[TraceEntry] {
        &self.log
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(std::sync::atomic::Ordering::SeqCst)
    }
}
