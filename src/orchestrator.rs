use std::sync::atomic::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use crate::compiler::SpecCompiler;
use crate::discovery::{DiscoveryOptions, ToolDiscovery};
use crate::error::OrchestratorError;
use crate::events::{EventEnvelope, EventSender, OrchestrationEvent, Phase};
use crate::executor::{DagExecutor, ExecutorEvent};
use crate::intent::{IntentParser, ParseContext};
use crate::memory::OrchestrationContext;
use crate::monitor::{AlertLevel, ExecutionMonitor};
use crate::recovery::RecoveryManager;
use crate::registry::ToolRegistry;
use crate::session::{Episode, EpisodeResult, SessionStore};
use crate::trace::{SpanStatus, SpanType, Tracer};
use crate::types::{ExecutionResult, IntentKind, IntentSpec, OrchestrationOptions, OrchestratorConfig, PlanPhase};
use crate::validator::PlanValidator;

/// Everything `orchestrate` hands back to the caller: the synthesized reply
/// plus every intermediate artifact a programmatic consumer might want
/// (`§7`: "detailed errors live in the structured result for programmatic
/// consumers").
#[derive(Debug, Clone)]
pub struct OrchestrationOutcome {
    pub reply: String,
    pub success: bool,
    pub intent: Option<IntentSpec>,
    pub execution: Option<ExecutionResult>,
    pub validation_warnings: Vec<String>,
    pub error: Option<OrchestratorError>,
}

/// Composes every component (C1–C9) behind one entry point:
/// `orchestrate(message, options) → OrchestrationOutcome` plus an optional
/// progress-event stream. Built once by the host and shared across calls —
/// `orchestrate` takes `&self` and constructs a fresh [`OrchestrationContext`]
/// per call rather than holding any call-scoped state on `self`.
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    intent_parser: IntentParser,
    recovery: Arc<RecoveryManager>,
    session_store: Option<Arc<dyn SessionStore>>,
    monitor: Arc<ExecutionMonitor>,
    tracer: Arc<Tracer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        intent_parser: IntentParser,
        recovery: Arc<RecoveryManager>,
        session_store: Option<Arc<dyn SessionStore>>,
        config: OrchestratorConfig,
    ) -> Self {
        let monitor = Arc::new(ExecutionMonitor::new(config.monitor_ring_capacity));
        let tracer = Arc::new(Tracer::new(config.trace_ring_capacity));
        monitor.register_tools(&registry.all_names().iter().map(|s| s.as_str()).collect::<Vec<_>>());
        Self { registry, intent_parser, recovery, session_store, monitor, tracer, config }
    }

    pub fn monitor(&self) -> &Arc<ExecutionMonitor> {
        &self.monitor
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Runs the full pipeline once: parse → (discover, for observability) →
    /// compile → validate → execute → reply. Never panics or propagates an
    /// error out of this call — every failure mode produces an
    /// [`OrchestrationOutcome`] with `success = false` and the triggering
    /// error attached.
    pub async fn orchestrate(
        &self,
        user_message: impl Into<String>,
        options: OrchestrationOptions,
        parse_context: ParseContext,
    ) -> OrchestrationOutcome {
        self.orchestrate_with_events(user_message, options, parse_context, None).await
    }

    pub async fn orchestrate_with_events(
        &self,
        user_message: impl Into<String>,
        options: OrchestrationOptions,
        parse_context: ParseContext,
        events: Option<EventSender>,
    ) -> OrchestrationOutcome {
        let user_message = user_message.into();
        let task_id = Uuid::new_v4().to_string();
        let mut ctx = OrchestrationContext::new(user_message.clone(), options, parse_context);

        self.monitor.start_task(&task_id, &user_message);
        let root_span = self.tracer.start_span("orchestrate", SpanType::Other);

        emit(&events, OrchestrationEvent::Status { phase: Phase::Parsing, current: 1, total: 5, message: "interpreting request".to_string() });
        self.monitor.start_phase(&task_id, "parsing");
        ctx.log("parsing", "start", &user_message);

        let intent_spec = self.intent_parser.parse(&user_message, &ctx.parse_context).await;
        emit(
            &events,
            OrchestrationEvent::IntentParsed { intent: intent_spec.intent, confidence: intent_spec.confidence },
        );
        self.monitor.complete_phase(&task_id, "parsing");

        emit(&events, OrchestrationEvent::Status { phase: Phase::Discovering, current: 2, total: 5, message: "ranking candidate tools".to_string() });
        self.monitor.start_phase(&task_id, "discovering");
        let discovery = ToolDiscovery::new(&self.registry);
        let discovery_options =
            DiscoveryOptions { limit: self.config.discovery_limit, min_score: self.config.discovery_min_score, use_stats: true };
        let _ranked = discovery.discover(&intent_spec.semantic_atoms, &discovery_options);
        self.monitor.complete_phase(&task_id, "discovering");

        emit(&events, OrchestrationEvent::Status { phase: Phase::Compiling, current: 3, total: 5, message: "compiling plan".to_string() });
        self.monitor.start_phase(&task_id, "compiling");
        ctx.intent = Some(intent_spec.clone());

        let mut plan = match SpecCompiler::compile(&intent_spec) {
            Ok(plan) => plan,
            Err(e) => {
                self.monitor.fail_phase(&task_id, "compiling", &e.to_string());
                self.monitor.fail_task(&task_id, &e.to_string());
                self.tracer.end_span(root_span, SpanStatus::Error);
                emit(&events, OrchestrationEvent::Error { message: e.to_string() });
                return OrchestrationOutcome {
                    reply: format!("\u{274c} {e}"),
                    success: false,
                    intent: Some(intent_spec),
                    execution: None,
                    validation_warnings: Vec::new(),
                    error: Some(e),
                };
            }
        };
        emit(&events, OrchestrationEvent::PlanCompiled { step_count: plan.steps.len() });
        self.monitor.complete_phase(&task_id, "compiling");

        if intent_spec.needs_clarification {
            self.monitor.complete_task(&task_id);
            self.tracer.end_span(root_span, SpanStatus::Ok);
            let reply = intent_spec
                .clarification_question
                .clone()
                .unwrap_or_else(|| "Could you clarify what you'd like me to do?".to_string());
            emit(&events, OrchestrationEvent::Message { text: reply.clone() });
            plan.phase = PlanPhase::Completed;
            ctx.plan = Some(plan);
            ctx.reply = Some(reply.clone());
            return OrchestrationOutcome { reply, success: true, intent: Some(intent_spec), execution: None, validation_warnings: Vec::new(), error: None };
        }

        let validation = PlanValidator::validate(&plan, &self.registry, None);
        let warnings: Vec<String> = validation.warnings().map(|w| w.message.clone()).collect();
        emit(&events, OrchestrationEvent::PlanValidated { passed: !validation.blocked(), warning_count: warnings.len() });

        if validation.blocked() {
            let error = OrchestratorError::PlanValidationBlocked { errors: validation.issues.clone() };
            self.monitor.fail_task(&task_id, &error.to_string());
            self.monitor.raise(AlertLevel::Warning, "plan_blocked", error.to_string(), Default::default());
            self.tracer.end_span(root_span, SpanStatus::Error);
            emit(&events, OrchestrationEvent::Error { message: error.to_string() });
            plan.phase = PlanPhase::Failed;
            ctx.plan = Some(plan);
            ctx.validation = Some(validation);
            return OrchestrationOutcome {
                reply: format!("\u{274c} This action was blocked: {error}"),
                success: false,
                intent: Some(intent_spec),
                execution: None,
                validation_warnings: warnings,
                error: Some(error),
            };
        }
        ctx.validation = Some(validation);

        plan.phase = PlanPhase::Executing;
        emit(&events, OrchestrationEvent::Status { phase: Phase::Executing, current: 4, total: 5, message: "running plan".to_string() });
        self.monitor.start_phase(&task_id, "executing");
        let max_concurrency = if ctx.options.dry_run { 1 } else { ctx.options.max_concurrency.unwrap_or(self.config.max_concurrency) };
        let executor = DagExecutor::new(self.registry.clone(), self.recovery.clone(), max_concurrency);

        let (exec_tx, mut exec_rx) = tokio::sync::mpsc::unbounded_channel::<ExecutorEvent>();
        let forward_events = events.clone();
        let task_id_for_forward = task_id.clone();
        let monitor_for_forward = self.monitor.clone();
        let forward_handle = tokio::spawn(async move {
            let mut step_actions = std::collections::HashMap::new();
            while let Some(event) = exec_rx.recv().await {
                forward_executor_event(&monitor_for_forward, &task_id_for_forward, &forward_events, &mut step_actions, event);
            }
        });

        let execution = if ctx.options.dry_run {
            ExecutionResult {
                success: true,
                total_steps: plan.steps.len(),
                success_count: 0,
                failed_count: 0,
                skipped_count: plan.steps.len(),
                step_results: Default::default(),
                total_duration_ms: 0,
                parallelism: Default::default(),
            }
        } else {
            executor
                .run(&plan, &ctx.options, ctx.cancel.clone(), Some(self.tracer.clone()), Some(exec_tx))
                .await
        };
        drop(forward_handle.await);

        self.monitor.complete_phase(&task_id, "executing");

        for (step_id, result) in &execution.step_results {
            let action = plan.step(step_id).map(|s| s.action.as_str()).unwrap_or("unknown");
            discovery.update_stats(action, result.success, result.duration_ms);
        }

        emit(&events, OrchestrationEvent::Status { phase: Phase::Reflecting, current: 5, total: 5, message: "summarizing outcome".to_string() });
        self.monitor.start_phase(&task_id, "reflecting");

        let reply = if ctx.cancel.load(Ordering::SeqCst) {
            "\u{26a0}\u{fe0f} Orchestration cancelled.".to_string()
        } else if execution.success {
            build_success_reply(&execution, &intent_spec)
        } else if execution.success_count > 0 {
            format!("\u{26a0}\u{fe0f} Partial: {}/{} steps completed.", execution.success_count, execution.total_steps)
        } else {
            "\u{274c} The action could not be completed.".to_string()
        };
        emit(&events, OrchestrationEvent::Message { text: reply.clone() });
        self.monitor.complete_phase(&task_id, "reflecting");

        if let Some(store) = &self.session_store {
            if let Some(session_id) = &ctx.session_id {
                let result = if execution.success {
                    EpisodeResult::Success
                } else if execution.success_count > 0 {
                    EpisodeResult::Partial
                } else {
                    EpisodeResult::Failure
                };
                store
                    .save_episode(Episode {
                        session_id: session_id.clone(),
                        intent: intent_spec.intent,
                        actions: plan.steps.iter().map(|s| s.action.clone()).collect(),
                        result,
                        duration_ms: execution.total_duration_ms,
                        tools_used: plan.steps.iter().map(|s| s.action.clone()).collect(),
                        recorded_at: now(),
                    })
                    .await;
            }
        }

        if execution.success {
            self.monitor.complete_task(&task_id);
        } else {
            self.monitor.fail_task(&task_id, "one or more steps failed");
        }
        self.tracer.end_span(root_span, if execution.success { SpanStatus::Ok } else { SpanStatus::Error });
        emit(
            &events,
            OrchestrationEvent::Complete {
                success_count: execution.success_count,
                failed_count: execution.failed_count,
                skipped_count: execution.skipped_count,
                total_duration_ms: execution.total_duration_ms,
            },
        );

        plan.phase = if execution.success { PlanPhase::Completed } else { PlanPhase::Failed };
        ctx.plan = Some(plan);
        ctx.execution = Some(execution.clone());
        ctx.reply = Some(reply.clone());

        OrchestrationOutcome {
            reply,
            success: execution.success,
            intent: Some(intent_spec),
            execution: Some(execution),
            validation_warnings: warnings,
            error: None,
        }
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

fn emit(events: &Option<EventSender>, event: OrchestrationEvent) {
    if let Some(tx) = events {
        let _ = tx.send(EventEnvelope::new(event, None));
    }
}

fn forward_executor_event(
    monitor: &ExecutionMonitor,
    task_id: &str,
    events: &Option<EventSender>,
    step_actions: &mut std::collections::HashMap<String, String>,
    event: ExecutorEvent,
) {
    match event {
        ExecutorEvent::BatchStarted { index, size } => {
            emit(events, OrchestrationEvent::BatchStart { index, size });
        }
        ExecutorEvent::StepStarted { id, action } => {
            monitor.start_tool_call(task_id, &action);
            step_actions.insert(id.clone(), action);
            emit(events, OrchestrationEvent::StepStart { step_id: id });
        }
        ExecutorEvent::StepSucceeded { id, result } => {
            if let Some(action) = step_actions.get(&id) {
                monitor.complete_tool_call(task_id, action);
            }
            emit(events, OrchestrationEvent::StepComplete { step_id: id, output: result.output });
        }
        ExecutorEvent::StepFailed { id, result } => {
            if let Some(action) = step_actions.get(&id) {
                monitor.fail_tool_call(task_id, action);
            }
            emit(events, OrchestrationEvent::StepError { step_id: id, error: result.error.unwrap_or_default() });
        }
        ExecutorEvent::StepSkipped { id, reason } => {
            emit(events, OrchestrationEvent::StepSkip { step_id: id, reason });
        }
        ExecutorEvent::StepRecovered { id, recovery_action } => {
            emit(events, OrchestrationEvent::StepRecovery { step_id: id, action: recovery_action });
        }
    }
}

fn build_success_reply(execution: &ExecutionResult, intent: &IntentSpec) -> String {
    if intent.intent == IntentKind::QueryData || intent.intent == IntentKind::AnalyzeData || intent.intent == IntentKind::LookupValue {
        if let Some(result) = execution.step_results.values().last() {
            if !result.output.is_empty() && result.output != crate::actions::ANALYZE_AND_REPLY {
                return result.output.clone();
            }
        }
    }
    format!("\u{2705} Done. {}/{} steps completed.", execution.success_count, execution.total_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockIntentLlm;
    use crate::registry::{RegistrationOptions, Tool};
    use crate::types::{ParameterDescriptor, ToolResult};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubTool(&'static str);

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.0
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
            ToolResult::ok(serde_json::json!("ok"))
        }
    }

    fn build_orchestrator(llm_responses: Vec<String>) -> Orchestrator {
        let registry = Arc::new(ToolRegistry::new());
        for name in [
            crate::actions::WRITE_RANGE,
            crate::actions::RESPOND_TO_USER,
            crate::actions::READ_RANGE,
            crate::actions::READ_SELECTION,
        ] {
            registry.register(Arc::new(StubTool(name)), RegistrationOptions::default());
        }
        let llm = Arc::new(MockIntentLlm::new(llm_responses));
        let parser = IntentParser::new(llm);
        let recovery = Arc::new(RecoveryManager::new());
        Orchestrator::new(registry, parser, recovery, None, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn write_data_runs_end_to_end_successfully() {
        let orchestrator = build_orchestrator(vec![
            r#"{"intent":"write_data","confidence":0.9,"needs_clarification":false,"spec":{"target":"A1","data":[["x"]]}}"#.to_string(),
        ]);
        let outcome = orchestrator.orchestrate("put x in A1", OrchestrationOptions::default(), ParseContext::default()).await;
        assert!(outcome.success);
        assert!(outcome.reply.starts_with('\u{2705}'));
    }

    #[tokio::test]
    async fn clarify_intent_returns_question_without_executing() {
        let orchestrator = build_orchestrator(vec![
            r#"{"intent":"clarify","confidence":0.3,"needs_clarification":true,"clarification_question":"Which sheet?"}"#.to_string(),
        ]);
        let outcome = orchestrator.orchestrate("do the thing", OrchestrationOptions::default(), ParseContext::default()).await;
        assert!(outcome.success);
        assert_eq!(outcome.reply, "Which sheet?");
        assert!(outcome.execution.is_none());
    }

    #[tokio::test]
    async fn unparseable_llm_output_falls_back_to_clarify_reply() {
        let orchestrator = build_orchestrator(vec!["not json at all".to_string()]);
        let outcome = orchestrator.orchestrate("???", OrchestrationOptions::default(), ParseContext::default()).await;
        assert!(outcome.success);
        assert!(outcome.execution.is_none());
    }
}
