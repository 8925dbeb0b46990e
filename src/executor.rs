use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::recovery::RecoveryManager;
use crate::registry::ToolRegistry;
use crate::trace::Tracer;
use crate::types::{
    ExecutionPlan, ExecutionResult, OrchestrationOptions, ParallelismStats, RecoveryAction, Step, StepResult,
    StepStatus,
};

#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    BatchStarted { index: usize, size: usize },
    StepStarted { id: String, action: String },
    StepSucceeded { id: String, result: StepResult },
    StepFailed { id: String, result: StepResult },
    StepSkipped { id: String, reason: String },
    StepRecovered { id: String, recovery_action: String },
}

struct DagNode {
    step: Step,
    status: StepStatus,
}

/// Runs a validated [`ExecutionPlan`] to completion: resolves `{{step_id}}`
/// placeholders, dispatches ready nodes in concurrency-bounded batches via
/// `tokio::spawn` + `join_all`, consults the [`RecoveryManager`] on
/// failure, and propagates failures to dependents by skipping them rather
/// than running steps whose inputs never materialized.
pub struct DagExecutor {
    registry: Arc<ToolRegistry>,
    recovery: Arc<RecoveryManager>,
    max_concurrency: usize,
}

impl DagExecutor {
    pub fn new(registry: Arc<ToolRegistry>, recovery: Arc<RecoveryManager>, max_concurrency: usize) -> Self {
        Self { registry, recovery, max_concurrency: max_concurrency.max(1) }
    }

    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        options: &OrchestrationOptions,
        cancel: Arc<AtomicBool>,
        tracer: Option<Arc<Tracer>>,
        events_tx: Option<tokio::sync::mpsc::UnboundedSender<ExecutorEvent>>,
    ) -> ExecutionResult {
        let total_steps = plan.steps.len();

        if let Some(cycle_err) = detect_cycle(plan) {
            tracing::warn!(error = %cycle_err, "cycle detected, aborting execution");
            let mut step_results = HashMap::new();
            for step in &plan.steps {
                step_results.insert(step.id.clone(), StepResult {
                    success: false,
                    output: String::new(),
                    error: Some("dependency cycle detected".to_string()),
                    duration_ms: 0,
                    recovered: false,
                    recovery_action: None,
                });
            }
            return ExecutionResult {
                success: false,
                total_steps,
                success_count: 0,
                failed_count: total_steps,
                skipped_count: 0,
                step_results,
                total_duration_ms: 0,
                parallelism: ParallelismStats::default(),
            };
        }

        let max_concurrency = options.max_concurrency.unwrap_or(self.max_concurrency).max(1);

        let mut nodes: HashMap<String, DagNode> =
            plan.steps.iter().cloned().map(|step| (step.id.clone(), DagNode { step, status: StepStatus::Pending })).collect();

        let mut step_results: HashMap<String, StepResult> = HashMap::new();
        let mut batches = 0usize;
        let mut concurrency_samples: Vec<usize> = Vec::new();
        let mut max_concurrent_seen = 0usize;
        let start = Instant::now();

        loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!("orchestration cancelled mid-run");
                break;
            }

            // Propagate failures: any pending node with a failed/skipped
            // dependency is skipped rather than left to wait forever.
            let mut newly_skipped: Vec<String> = Vec::new();
            for node in nodes.values() {
                if node.status != StepStatus::Pending {
                    continue;
                }
                let blocked = node.step.depends_on.iter().any(|dep| {
                    matches!(nodes.get(dep).map(|n| n.status), Some(StepStatus::Failed) | Some(StepStatus::Skipped))
                });
                if blocked {
                    newly_skipped.push(node.step.id.clone());
                }
            }
            for id in &newly_skipped {
                if let Some(node) = nodes.get_mut(id) {
                    node.status = StepStatus::Skipped;
                    let reason = "upstream dependency failed or was skipped".to_string();
                    step_results.insert(id.clone(), StepResult::skipped(reason.clone()));
                    emit(&events_tx, ExecutorEvent::StepSkipped { id: id.clone(), reason });
                }
            }
            if !newly_skipped.is_empty() {
                continue;
            }

            let ready: Vec<String> = nodes
                .values()
                .filter(|n| n.status == StepStatus::Pending)
                .filter(|n| n.step.depends_on.iter().all(|d| nodes.get(d).map(|n| n.status) == Some(StepStatus::Completed)))
                .map(|n| n.step.id.clone())
                .collect();

            if ready.is_empty() {
                break;
            }

            let batch: Vec<String> = ready.into_iter().take(max_concurrency).collect();
            emit(&events_tx, ExecutorEvent::BatchStarted { index: batches, size: batch.len() });
            for id in &batch {
                let node = nodes.get_mut(id).unwrap();
                node.status = StepStatus::Running;
                emit(&events_tx, ExecutorEvent::StepStarted { id: id.clone(), action: node.step.action.clone() });
            }
            concurrency_samples.push(batch.len());
            max_concurrent_seen = max_concurrent_seen.max(batch.len());

            let mut futures = Vec::new();
            for id in &batch {
                let step = nodes.get(id).unwrap().step.clone();
                let resolved = resolve_parameters(&step, &step_results);
                let registry = self.registry.clone();
                let recovery = self.recovery.clone();
                let tracer = tracer.clone();
                futures.push(async move { (step.id.clone(), execute_step(&step, resolved, &registry, &recovery, tracer).await) });
            }

            let results = join_all(futures).await;
            for (id, result) in results {
                let status = if result.success { StepStatus::Completed } else { StepStatus::Failed };
                nodes.get_mut(&id).unwrap().status = status;
                if result.recovered {
                    emit(
                        &events_tx,
                        ExecutorEvent::StepRecovered { id: id.clone(), recovery_action: result.recovery_action.clone().unwrap_or_default() },
                    );
                }
                if result.success {
                    emit(&events_tx, ExecutorEvent::StepSucceeded { id: id.clone(), result: result.clone() });
                } else {
                    emit(&events_tx, ExecutorEvent::StepFailed { id: id.clone(), result: result.clone() });
                }
                step_results.insert(id, result);
            }

            batches += 1;
        }

        let success_count = nodes.values().filter(|n| n.status == StepStatus::Completed).count();
        let failed_count = nodes.values().filter(|n| n.status == StepStatus::Failed).count();
        let skipped_count = nodes.values().filter(|n| n.status == StepStatus::Skipped).count();

        let avg_concurrent = if concurrency_samples.is_empty() {
            0.0
        } else {
            concurrency_samples.iter().sum::<usize>() as f64 / concurrency_samples.len() as f64
        };

        ExecutionResult {
            success: failed_count == 0 && !cancel.load(Ordering::SeqCst),
            total_steps,
            success_count,
            failed_count,
            skipped_count,
            step_results,
            total_duration_ms: start.elapsed().as_millis() as u64,
            parallelism: ParallelismStats { max_concurrent: max_concurrent_seen, avg_concurrent, batches },
        }
    }
}

fn emit(tx: &Option<tokio::sync::mpsc::UnboundedSender<ExecutorEvent>>, event: ExecutorEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

async fn execute_step(
    step: &Step,
    mut resolved: HashMap<String, serde_json::Value>,
    registry: &Arc<ToolRegistry>,
    recovery: &Arc<RecoveryManager>,
    tracer: Option<Arc<Tracer>>,
) -> StepResult {
    let start = Instant::now();
    let mut current_action = step.action.clone();
    let mut current_step = step.clone();
    let mut recovery_action: Option<String> = None;

    loop {
        let Some(tool) = registry.get(&current_action) else {
            return StepResult {
                success: false,
                output: String::new(),
                error: Some(format!("tool not found: {current_action}")),
                duration_ms: start.elapsed().as_millis() as u64,
                recovered: recovery_action.is_some(),
                recovery_action,
            };
        };

        emit_span_event(&tracer, &current_action);
        let result = tool.invoke(&resolved).await;
        registry.record_usage(&current_action);

        if result.success {
            return StepResult {
                success: true,
                output: result.output_as_string(),
                error: None,
                duration_ms: start.elapsed().as_millis() as u64,
                recovered: recovery_action.is_some(),
                recovery_action,
            };
        }

        let error = result.error.clone().unwrap_or_else(|| "tool reported failure".to_string());
        match recovery.recover(&current_step, &error) {
            Some(RecoveryAction::Retry { delay_ms }) => {
                recovery_action = Some("retry".to_string());
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                continue;
            }
            Some(RecoveryAction::Skip { reason }) => {
                return StepResult {
                    success: true,
                    output: String::new(),
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    recovered: true,
                    recovery_action: Some(format!("skip: {reason}")),
                };
            }
            Some(RecoveryAction::Substitute { alternative_step }) => {
                recovery_action = Some("substitute".to_string());
                current_action = alternative_step.action.clone();
                resolved = alternative_step.parameters.clone();
                current_step = alternative_step;
                continue;
            }
            Some(RecoveryAction::Abort { user_message }) => {
                return StepResult {
                    success: false,
                    output: String::new(),
                    error: Some(user_message),
                    duration_ms: start.elapsed().as_millis() as u64,
                    recovered: false,
                    recovery_action: Some("abort".to_string()),
                };
            }
            None => {
                return StepResult {
                    success: false,
                    output: String::new(),
                    error: Some(error),
                    duration_ms: start.elapsed().as_millis() as u64,
                    recovered: false,
                    recovery_action: None,
                };
            }
        }
    }
}

fn emit_span_event(tracer: &Option<Arc<Tracer>>, action: &str) {
    if let Some(tracer) = tracer {
        tracer.add_event(format!("invoking:{action}"), HashMap::new());
    }
}

/// Substitutes `{{step_id}}` and `{{previous}}` placeholders in every
/// string-valued parameter with the referenced step's output. A token that
/// doesn't resolve to a known, completed step (e.g. the
/// `{{ANALYZE_AND_REPLY}}` marker a respond step may carry) is left
/// untouched — resolving it isn't this component's job.
pub fn resolve_parameters(step: &Step, results: &HashMap<String, StepResult>) -> HashMap<String, serde_json::Value> {
    let previous = step.previous().map(|s| s.to_string());
    step.parameters
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results, previous.as_deref())))
        .collect()
}

fn resolve_value(value: &serde_json::Value, results: &HashMap<String, StepResult>, previous: Option<&str>) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(resolve_string(s, results, previous)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| resolve_value(v, results, previous)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), resolve_value(v, results, previous))).collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, results: &HashMap<String, StepResult>, previous: Option<&str>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            out.push_str(rest);
            return out;
        };
        let end = start + end_rel;
        out.push_str(&rest[..start]);
        let token = rest[start + 2..end].trim();

        let lookup_id = if token == "previous" { previous } else { Some(token) };
        match lookup_id.and_then(|id| results.get(id)) {
            Some(result) => out.push_str(&result.output),
            None => out.push_str(&rest[start..end + 2]),
        }

        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Iterative DFS cycle detection over `depends_on` edges — white/gray/black
/// marking with an explicit stack rather than recursion, so a pathological
/// plan can't blow the call stack.
fn detect_cycle(plan: &ExecutionPlan) -> Option<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> = plan.steps.iter().map(|s| (s.id.as_str(), Color::White)).collect();

    for start in &plan.steps {
        if color.get(start.id.as_str()) != Some(&Color::White) {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(start.id.as_str(), 0)];
        color.insert(start.id.as_str(), Color::Gray);

        while let Some((id, child_idx)) = stack.last_mut() {
            let id = *id;
            let Some(step) = plan.step(id) else {
                stack.pop();
                continue;
            };
            if *child_idx < step.depends_on.len() {
                let dep = step.depends_on[*child_idx].as_str();
                *child_idx += 1;
                match color.get(dep).copied().unwrap_or(Color::White) {
                    Color::White => {
                        color.insert(dep, Color::Gray);
                        stack.push((dep, 0));
                    }
                    Color::Gray => return Some(format!("cycle through step '{dep}'")),
                    Color::Black => {}
                }
            } else {
                color.insert(id, Color::Black);
                stack.pop();
            }
        }
    }
    None
}
