use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fixed catalog of intents the Intent Parser recognizes.
///
/// New intents are added here, not invented ad hoc by the LLM — the parser
/// rejects (falls back to `Clarify`) any `intent` field that doesn't match
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateTable,
    WriteData,
    UpdateData,
    DeleteData,
    FormatRange,
    CreateFormula,
    BatchFormula,
    CalculateSummary,
    AnalyzeData,
    CreateChart,
    SortData,
    FilterData,
    RemoveDuplicates,
    CleanData,
    QueryData,
    LookupValue,
    CreateSheet,
    SwitchSheet,
    Clarify,
    RespondOnly,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::CreateTable => "create_table",
            IntentKind::WriteData => "write_data",
            IntentKind::UpdateData => "update_data",
            IntentKind::DeleteData => "delete_data",
            IntentKind::FormatRange => "format_range",
            IntentKind::CreateFormula => "create_formula",
            IntentKind::BatchFormula => "batch_formula",
            IntentKind::CalculateSummary => "calculate_summary",
            IntentKind::AnalyzeData => "analyze_data",
            IntentKind::CreateChart => "create_chart",
            IntentKind::SortData => "sort_data",
            IntentKind::FilterData => "filter_data",
            IntentKind::RemoveDuplicates => "remove_duplicates",
            IntentKind::CleanData => "clean_data",
            IntentKind::QueryData => "query_data",
            IntentKind::LookupValue => "lookup_value",
            IntentKind::CreateSheet => "create_sheet",
            IntentKind::SwitchSheet => "switch_sheet",
            IntentKind::Clarify => "clarify",
            IntentKind::RespondOnly => "respond_only",
        }
    }

    pub fn all() -> &'static [IntentKind] {
        use IntentKind::*;
        &[
            CreateTable, WriteData, UpdateData, DeleteData, FormatRange, CreateFormula,
            BatchFormula, CalculateSummary, AnalyzeData, CreateChart, SortData, FilterData,
            RemoveDuplicates, CleanData, QueryData, LookupValue, CreateSheet, SwitchSheet,
            Clarify, RespondOnly,
        ]
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The Intent Parser's output: a structured guess at what the user wants,
/// plus the raw spec payload the Spec Compiler will type per `intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSpec {
    pub intent: IntentKind,
    pub confidence: f64,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub clarification_options: Option<Vec<String>>,
    pub spec: serde_json::Value,
    pub reasoning: Option<String>,
    pub compressed_intent: Option<String>,
    #[serde(default)]
    pub semantic_atoms: Vec<IntentAtom>,
}

/// A single action/entity/modifier triple extracted from the user's message,
/// independent of whatever the LLM returned — used by the Tool Discovery
/// index to rank candidate tools even when the LLM's own `intent` guess is
/// weak or wrong.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentAtom {
    pub action: Option<String>,
    pub entity: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub domain: Option<String>,
    pub raw_text: Option<String>,
}

/// Where a step sits in the compiler's fixed three-stage recipe shape:
/// gather the inputs a write needs, perform the mutation or read the
/// user's asking about, then report back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Sensing,
    Execution,
    Response,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            StepPhase::Sensing => "sensing",
            StepPhase::Execution => "execution",
            StepPhase::Response => "response",
        };
        write!(f, "{s}")
    }
}

/// Coarse-grained lifecycle of an [`ExecutionPlan`] itself, as distinct from
/// the per-step [`StepStatus`] the Executor tracks while running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Planning,
    Executing,
    Completed,
    Failed,
}

/// A single node in an execution plan's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    /// Position of this step within its plan's `steps` sequence at compile
    /// time — fixed once compiled, independent of execution order.
    pub order: usize,
    pub action: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Order-preserving, deduplicated — see SPEC_FULL.md §3 for why this
    /// isn't a `HashSet`: `{{previous}}` resolves to the last element.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub phase: StepPhase,
    #[serde(default)]
    pub is_write_operation: bool,
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    pub fn depends_on_push(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
    }

    pub fn previous(&self) -> Option<&str> {
        self.depends_on.last().map(|s| s.as_str())
    }
}

/// The Spec Compiler's output: an ordered, still-unvalidated set of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub task_description: String,
    pub intent: IntentKind,
    pub steps: Vec<Step>,
    pub task_success_conditions: Vec<String>,
    pub requires_confirmation: bool,
    pub phase: PlanPhase,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionPlan {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// A tool-facing JSON Schema-ish parameter description, used by the
/// registry to advertise what a tool accepts and by the Plan Validator to
/// sanity-check step parameters against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub r#type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// The result of a single `Tool::invoke` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: serde_json::Value) -> Self {
        Self { success: true, output, error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, output: serde_json::Value::Null, error: Some(error.into()) }
    }

    /// Stringifies `output` the way the DAG Executor stores it in a
    /// `StepResult` — strings pass through untouched, everything else is
    /// JSON-encoded.
    pub fn output_as_string(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

/// Status of one DAG node as the Executor runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

/// The record a `Step` leaves behind once the Executor has resolved it,
/// one way or another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub recovered: bool,
    pub recovery_action: Option<String>,
}

impl StepResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(reason.into()),
            duration_ms: 0,
            recovered: false,
            recovery_action: None,
        }
    }
}

/// A decision returned by the Recovery Manager after a step fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecoveryAction {
    Retry { delay_ms: u64 },
    Skip { reason: String },
    Substitute { alternative_step: Step },
    Abort { user_message: String },
}

/// Per-run parallelism statistics the Executor reports alongside step
/// results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelismStats {
    pub max_concurrent: usize,
    pub avg_concurrent: f64,
    pub batches: usize,
}

/// The Executor's final report for one `ExecutionPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub total_steps: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub step_results: HashMap<String, StepResult>,
    pub total_duration_ms: u64,
    pub parallelism: ParallelismStats,
}

/// One entry in the Execution Monitor's ring buffer — a compact summary of
/// a completed orchestration, independent of the full `Trace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub message: String,
    pub intent: Option<IntentKind>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub success: Option<bool>,
    pub step_count: usize,
    pub failed_count: usize,
}

/// Process-wide tunables, seeded into a request's `OrchestrationOptions`
/// unless the caller overrides them. See SPEC_FULL.md §4 "Configuration".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub discovery_limit: usize,
    pub discovery_min_score: f64,
    pub trace_ring_capacity: usize,
    pub monitor_ring_capacity: usize,
    pub registry_health_min_success_rate: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 3,
            discovery_limit: 5,
            discovery_min_score: 0.1,
            trace_ring_capacity: 50,
            monitor_ring_capacity: 200,
            registry_health_min_success_rate: 0.5,
        }
    }
}

/// Per-call options — the request-scoped counterpart to `OrchestratorConfig`.
/// Anything left `None` falls back to the config the `Orchestrator` was
/// built with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationOptions {
    pub max_concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub dry_run: bool,
    pub target_sheet: Option<String>,
}
