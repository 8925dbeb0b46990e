//! Confirms independent steps in a batch actually run concurrently rather
//! than one at a time — the DAG Executor's whole reason for existing over a
//! sequential step runner.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use agentcore::executor::DagExecutor;
use agentcore::recovery::RecoveryManager;
use agentcore::registry::{RegistrationOptions, Tool};
use agentcore::types::{
    ExecutionPlan, IntentKind, OrchestrationOptions, ParameterDescriptor, PlanPhase, Step, StepPhase, StepStatus,
    ToolResult,
};
use agentcore::ToolRegistry;
use async_trait::async_trait;
use serde_json::json;

struct SlowTool(&'static str);

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        self.0
    }
    fn description(&self) -> &str {
        "sleeps 100ms then succeeds"
    }
    fn category(&self) -> &str {
        "test"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, _input: &HashMap<String, serde_json::Value>) -> ToolResult {
        tokio::time::sleep(Duration::from_millis(100)).await;
        ToolResult::ok(json!("done"))
    }
}

fn independent_step(id: &str, action: &str) -> Step {
    Step {
        id: id.to_string(),
        order: 0,
        action: action.to_string(),
        parameters: HashMap::new(),
        depends_on: Vec::new(),
        phase: StepPhase::Execution,
        is_write_operation: true,
        status: StepStatus::Pending,
    }
}

fn plan_with(steps: Vec<Step>) -> ExecutionPlan {
    ExecutionPlan {
        id: "plan_1".to_string(),
        task_description: "test".to_string(),
        intent: IntentKind::WriteData,
        steps,
        task_success_conditions: Vec::new(),
        requires_confirmation: false,
        phase: PlanPhase::Planning,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn two_independent_steps_run_in_the_same_batch_not_back_to_back() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(SlowTool("tool_a")), RegistrationOptions::default());
    registry.register(Arc::new(SlowTool("tool_b")), RegistrationOptions::default());

    let plan = plan_with(vec![independent_step("a", "tool_a"), independent_step("b", "tool_b")]);

    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 4);
    let start = std::time::Instant::now();
    let result = executor.run(&plan, &OrchestrationOptions::default(), Arc::new(AtomicBool::new(false)), None, None).await;
    let elapsed = start.elapsed();

    assert!(result.success);
    assert_eq!(result.parallelism.batches, 1);
    assert!(elapsed.as_millis() < 180, "two steps with no dependency should run concurrently, took {}ms", elapsed.as_millis());
}

#[tokio::test]
async fn a_dependency_chain_forces_sequential_batches() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(SlowTool("tool_a")), RegistrationOptions::default());
    registry.register(Arc::new(SlowTool("tool_b")), RegistrationOptions::default());

    let mut second = independent_step("b", "tool_b");
    second.depends_on = vec!["a".to_string()];
    let plan = plan_with(vec![independent_step("a", "tool_a"), second]);

    let executor = DagExecutor::new(registry, Arc::new(RecoveryManager::new()), 4);
    let result = executor.run(&plan, &OrchestrationOptions::default(), Arc::new(AtomicBool::new(false)), None, None).await;

    assert!(result.success);
    assert_eq!(result.parallelism.batches, 2);
}
