use thiserror::Error;

use crate::validator::ValidationIssue;

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("failed to parse LLM output as JSON: {0}")]
    ParseJsonFailure(String),

    #[error("unsupported intent: {0}")]
    UnsupportedIntent(String),

    #[error("plan compilation failed: {reason}")]
    CompileFailure { reason: String },

    #[error("plan validation blocked by {} error(s)", .errors.len())]
    PlanValidationBlocked { errors: Vec<ValidationIssue> },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{name}' invocation failed: {error}")]
    ToolInvocationFailed { name: String, error: String },

    #[error("dependency cycle detected in execution plan")]
    CycleDetected,

    #[error("orchestration cancelled")]
    Cancelled,

    #[error("LLM caller error: {0}")]
    LlmError(String),

    #[error("registry error: {0}")]
    RegistryError(String),

    #[error("orchestrator build error: {0}")]
    BuildError(String),
}
