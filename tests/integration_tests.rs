//! Integration tests for agentcore-rs.
//!
//! All tests use `MockIntentLlm` — no network calls are made.
//! Run with: `cargo test`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use agentcore::compiler::SpecCompiler;
use agentcore::executor::DagExecutor;
use agentcore::llm::MockIntentLlm;
use agentcore::recovery::RecoveryManager;
use agentcore::registry::{RegistrationOptions, Tool};
use agentcore::types::{
    ExecutionPlan, IntentKind, IntentSpec, OrchestrationOptions, ParameterDescriptor, PlanPhase, Step, StepPhase,
    StepStatus, ToolResult,
};
use agentcore::validator::PlanValidator;
use agentcore::{IntentParser, OrchestratorBuilder, ParseContext, ToolRegistry};
use async_trait::async_trait;
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

struct StubTool {
    name: &'static str,
    output: serde_json::Value,
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "stub"
    }
    fn category(&self) -> &str {
        "test"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, _input: &HashMap<String, serde_json::Value>) -> ToolResult {
        ToolResult::ok(self.output.clone())
    }
}

fn intent_spec(intent: IntentKind, spec: serde_json::Value) -> IntentSpec {
    IntentSpec {
        intent,
        confidence: 0.9,
        needs_clarification: false,
        clarification_question: None,
        clarification_options: None,
        spec,
        reasoning: None,
        compressed_intent: None,
        semantic_atoms: Vec::new(),
    }
}

fn registry_with(tools: Vec<(&'static str, serde_json::Value)>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    for (name, output) in tools {
        registry.register(Arc::new(StubTool { name, output }), RegistrationOptions::default());
    }
    registry
}

fn plan_with(intent: IntentKind, steps: Vec<Step>) -> ExecutionPlan {
    ExecutionPlan {
        id: "plan_1".to_string(),
        task_description: "test".to_string(),
        intent,
        steps,
        task_success_conditions: Vec::new(),
        requires_confirmation: false,
        phase: PlanPhase::Planning,
        metadata: HashMap::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 1 — query, no writes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_with_no_writes_compiles_two_steps_and_skips_validation_rules() {
    let spec = intent_spec(IntentKind::QueryData, json!({"range": "current_selection"}));
    let plan = SpecCompiler::compile(&spec).unwrap();
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[1].depends_on, vec![plan.steps[0].id.clone()]);

    let registry = registry_with(vec![
        (agentcore::actions::READ_SELECTION, json!([["A1:B10", "value"]])),
        (agentcore::actions::RESPOND_TO_USER, json!("ok")),
    ]);
    let report = PlanValidator::validate(&plan, &registry, None);
    assert!(!report.blocked());
    assert!(report.issues.is_empty());

    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 4);
    let options = OrchestrationOptions::default();
    let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let result = executor.run(&plan, &options, cancel, None, None).await;
    assert!(result.success);
    assert_eq!(result.total_steps, 2);
    assert_eq!(result.success_count, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 2 — write data, end to end through the orchestrator
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn write_data_end_to_end_reports_a_successful_reply() {
    let registry_tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(StubTool { name: agentcore::actions::WRITE_RANGE, output: json!({"wrote": "A1"}) }),
        Arc::new(StubTool { name: agentcore::actions::RESPOND_TO_USER, output: json!("done") }),
    ];
    let llm = Arc::new(MockIntentLlm::new(vec![
        r#"{"intent":"write_data","confidence":0.9,"needs_clarification":false,"spec":{"target":"A1","data":[["x"]]}}"#.to_string(),
    ]));
    let mut builder = OrchestratorBuilder::new().llm(llm);
    for tool in registry_tools {
        builder = builder.add_tool(tool);
    }
    let orchestrator = builder.build().unwrap();

    let outcome = orchestrator.orchestrate("put x in A1", OrchestrationOptions::default(), ParseContext::default()).await;
    assert!(outcome.success);
    let execution = outcome.execution.unwrap();
    assert_eq!(execution.total_steps, 2);
    assert_eq!(execution.success_count, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 3 — a cycle fails every step and runs zero batches
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_cyclic_plan_fails_every_step_without_running_a_batch() {
    let mut a = Step { id: "a".to_string(), order: 0, action: "noop".to_string(), parameters: HashMap::new(), depends_on: vec!["b".to_string()], phase: StepPhase::Execution, is_write_operation: false, status: StepStatus::Pending };
    let b = Step { id: "b".to_string(), order: 1, action: "noop".to_string(), parameters: HashMap::new(), depends_on: vec!["a".to_string()], phase: StepPhase::Execution, is_write_operation: false, status: StepStatus::Pending };
    a.depends_on = vec!["b".to_string()];
    let plan = plan_with(IntentKind::WriteData, vec![a, b]);

    let registry = registry_with(vec![("noop", json!(null))]);
    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 4);
    let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let result = executor.run(&plan, &OrchestrationOptions::default(), cancel, None, None).await;

    assert!(!result.success);
    assert_eq!(result.failed_count, 2);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.skipped_count, 0);
    assert_eq!(result.parallelism.batches, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 4 — network failure retries twice then succeeds
// ─────────────────────────────────────────────────────────────────────────────

struct FlakyNetworkTool {
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

#[async_trait]
impl Tool for FlakyNetworkTool {
    fn name(&self) -> &str {
        "api_call"
    }
    fn description(&self) -> &str {
        "flaky"
    }
    fn category(&self) -> &str {
        "network"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, _input: &HashMap<String, serde_json::Value>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None }).is_ok() {
            ToolResult::err("Network timeout reaching host".to_string())
        } else {
            ToolResult::ok(json!("pong"))
        }
    }
}

#[tokio::test]
async fn network_timeout_retries_twice_then_succeeds() {
    let tool = Arc::new(FlakyNetworkTool { remaining_failures: AtomicU32::new(2), calls: AtomicU32::new(0) });
    let registry = Arc::new(ToolRegistry::new());
    registry.register(tool.clone(), RegistrationOptions::default());

    let step = Step { id: "step_1".to_string(), order: 0, action: "api_call".to_string(), parameters: HashMap::new(), depends_on: Vec::new(), phase: StepPhase::Execution, is_write_operation: false, status: StepStatus::Pending };
    let plan = plan_with(IntentKind::WriteData, vec![step]);

    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 1);
    let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let result = executor.run(&plan, &OrchestrationOptions::default(), cancel, None, None).await;

    assert!(result.success);
    let step_result = &result.step_results["step_1"];
    assert!(step_result.success);
    assert!(step_result.recovered);
    assert_eq!(step_result.recovery_action.as_deref(), Some("retry"));
    assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 5 — a missing range substitutes in read_selection as a fallback
// ─────────────────────────────────────────────────────────────────────────────

struct AlwaysFailsTool;

#[async_trait]
impl Tool for AlwaysFailsTool {
    fn name(&self) -> &str {
        agentcore::actions::READ_RANGE
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn category(&self) -> &str {
        "read"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, _input: &HashMap<String, serde_json::Value>) -> ToolResult {
        ToolResult::err("Range not found: XYZ1".to_string())
    }
}

#[tokio::test]
async fn a_missing_range_falls_back_to_reading_the_current_selection() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(AlwaysFailsTool), RegistrationOptions::default());
    registry.register(
        Arc::new(StubTool { name: agentcore::actions::READ_SELECTION, output: json!([["A1", "value"]]) }),
        RegistrationOptions::default(),
    );

    let mut params = HashMap::new();
    params.insert("address".to_string(), json!("XYZ1"));
    let step = Step { id: "step_1".to_string(), order: 0, action: agentcore::actions::READ_RANGE.to_string(), parameters: params, depends_on: Vec::new(), phase: StepPhase::Sensing, is_write_operation: false, status: StepStatus::Pending };
    let plan = plan_with(IntentKind::QueryData, vec![step]);

    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 1);
    let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let result = executor.run(&plan, &OrchestrationOptions::default(), cancel, None, None).await;

    assert!(result.success);
    let step_result = &result.step_results["step_1"];
    assert!(step_result.recovered);
    assert_eq!(step_result.recovery_action.as_deref(), Some("substitute"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario 6 — a whole-sheet destructive op is blocked before execution
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_whole_sheet_clear_is_blocked_and_never_reaches_a_tool() {
    let called = Arc::new(Mutex::new(false));

    struct TrackedClearTool(Arc<Mutex<bool>>);
    #[async_trait]
    impl Tool for TrackedClearTool {
        fn name(&self) -> &str {
            agentcore::actions::CLEAR
        }
        fn description(&self) -> &str {
            "clear"
        }
        fn category(&self) -> &str {
            "write"
        }
        fn parameters(&self) -> &[ParameterDescriptor] {
            &[]
        }
        async fn invoke(&self, _input: &HashMap<String, serde_json::Value>) -> ToolResult {
            *self.0.lock().unwrap() = true;
            ToolResult::ok(json!(null))
        }
    }

    let mut params = HashMap::new();
    params.insert("range".to_string(), json!("A:Z"));
    let clear_step = Step { id: "step_1".to_string(), order: 0, action: agentcore::actions::CLEAR.to_string(), parameters: params, depends_on: Vec::new(), phase: StepPhase::Execution, is_write_operation: true, status: StepStatus::Pending };
    let respond_step = Step { id: "step_2".to_string(), order: 1, action: agentcore::actions::RESPOND_TO_USER.to_string(), parameters: HashMap::new(), depends_on: vec!["step_1".to_string()], phase: StepPhase::Response, is_write_operation: false, status: StepStatus::Pending };
    let plan = plan_with(IntentKind::DeleteData, vec![clear_step, respond_step]);

    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(TrackedClearTool(called.clone())), RegistrationOptions::default());
    registry.register(Arc::new(StubTool { name: agentcore::actions::RESPOND_TO_USER, output: json!("ok") }), RegistrationOptions::default());

    let report = PlanValidator::validate(&plan, &registry, None);
    assert!(report.blocked());
    assert_eq!(report.issues[0].rule_id, "high_risk_operation");
    assert!(!*called.lock().unwrap());
}

// ─────────────────────────────────────────────────────────────────────────────
// Clarification short-circuit
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn an_unparseable_intent_falls_back_to_a_clarifying_question_without_executing_anything() {
    let llm = Arc::new(MockIntentLlm::new(vec!["not json at all".to_string()]));
    let orchestrator = OrchestratorBuilder::new().llm(llm).build().unwrap();
    let outcome = orchestrator.orchestrate("???", OrchestrationOptions::default(), ParseContext::default()).await;
    assert!(outcome.success);
    assert!(outcome.execution.is_none());
}

#[tokio::test]
async fn intent_parser_default_fallback_never_panics_on_garbage_input() {
    let llm = Arc::new(MockIntentLlm::new(vec!["{{{".to_string()]));
    let parser = IntentParser::new(llm);
    let spec = parser.parse("asdf", &ParseContext::default()).await;
    assert!(spec.needs_clarification);
}
