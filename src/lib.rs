pub mod actions;
pub mod builder;
pub mod cellref;
pub mod compiler;
pub mod discovery;
pub mod error;
pub mod events;
pub mod executor;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod monitor;
pub mod orchestrator;
pub mod payloads;
pub mod recovery;
pub mod registry;
pub mod session;
pub mod synonyms;
pub mod trace;
pub mod transitions;
pub mod types;
pub mod validator;

// Convenience re-exports at crate root
pub use builder::OrchestratorBuilder;
pub use error::OrchestratorError;
pub use events::{EventEnvelope, EventSender, OrchestrationEvent, Phase};
pub use intent::{IntentParser, ParseContext};
pub use llm::IntentLlm;
pub use memory::OrchestrationContext;
pub use monitor::{Alert, AlertLevel, ExecutionMonitor};
pub use orchestrator::{Orchestrator, OrchestrationOutcome};
pub use registry::{Tool, ToolRegistry};
pub use session::{Episode, EpisodeResult, InMemorySessionStore, SessionStore};
pub use trace::{Span, SpanType, Tracer};
pub use types::{
    ExecutionPlan, ExecutionResult, IntentAtom, IntentKind, IntentSpec, OrchestrationOptions,
    OrchestratorConfig, PlanPhase, RecoveryAction, Step, StepPhase, StepResult, StepStatus,
};
