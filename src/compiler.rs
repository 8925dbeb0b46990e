use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use uuid::Uuid;

use crate::actions;
use crate::cellref;
use crate::error::OrchestratorError;
use crate::payloads::{spec_as, ChartSpec, CreateTableSpec, FormulaSpec, QuerySpec, SheetSpec, TableOpSpec, WriteDataSpec};
use crate::types::{ExecutionPlan, IntentKind, IntentSpec, PlanPhase, Step, StepPhase, StepStatus};

/// Turns a validated [`IntentSpec`] into an [`ExecutionPlan`] — an ordered
/// DAG of tool-call steps, one recipe per intent family. Never talks to an
/// LLM; every decision here is a deterministic function of the spec payload.
pub struct SpecCompiler;

struct StepBuilder {
    steps: Vec<Step>,
    counter: usize,
}

impl StepBuilder {
    fn new() -> Self {
        Self { steps: Vec::new(), counter: 0 }
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
        format!("step_{millis}_{}", self.counter)
    }

    fn push(
        &mut self,
        action: &str,
        parameters: HashMap<String, serde_json::Value>,
        depends_on: Vec<String>,
        phase: StepPhase,
        is_write_operation: bool,
    ) -> String {
        let id = self.next_id();
        let order = self.steps.len();
        self.steps.push(Step {
            id: id.clone(),
            order,
            action: action.to_string(),
            parameters,
            depends_on,
            phase,
            is_write_operation,
            status: StepStatus::Pending,
        });
        id
    }

    fn push_respond(&mut self, depends_on: Vec<String>, message: &str) -> String {
        let mut params = HashMap::new();
        params.insert("message".to_string(), json!(message));
        self.push(actions::RESPOND_TO_USER, params, depends_on, StepPhase::Response, false)
    }
}

/// One-line description of what success looks like for each intent family,
/// carried on the plan for a host to show alongside progress — not consulted
/// by the executor itself.
fn success_conditions_for(intent: IntentKind) -> Vec<String> {
    let condition = match intent {
        IntentKind::CreateTable => "a header row is written and formatted in the target range",
        IntentKind::WriteData | IntentKind::UpdateData => "the target range contains the requested data",
        IntentKind::DeleteData => "the target range is cleared",
        IntentKind::FormatRange => "the target range carries the requested formatting",
        IntentKind::CreateFormula | IntentKind::BatchFormula | IntentKind::CalculateSummary => {
            "the formula is applied and returns a value"
        }
        IntentKind::CreateChart => "a chart of the requested type exists over the data range",
        IntentKind::SortData | IntentKind::FilterData | IntentKind::RemoveDuplicates | IntentKind::CleanData => {
            "the range reflects the requested transformation"
        }
        IntentKind::QueryData | IntentKind::AnalyzeData | IntentKind::LookupValue => {
            "the user receives an answer derived from the read data"
        }
        IntentKind::CreateSheet | IntentKind::SwitchSheet => "the workbook reflects the requested sheet change",
        IntentKind::Clarify => "the user has answered the clarifying question",
        IntentKind::RespondOnly => "the user has received the reply",
    };
    vec![condition.to_string()]
}

/// One-line description of the task a compiled plan carries out, shown to a
/// host alongside the plan itself — purely descriptive, not consulted by the
/// compiler or executor.
fn task_description_for(intent_spec: &IntentSpec) -> String {
    intent_spec
        .compressed_intent
        .clone()
        .unwrap_or_else(|| format!("{}", intent_spec.intent))
}

/// Intent kinds the compiler treats as mutating the workbook in a way a
/// careless retry could compound — their plans are flagged for
/// confirmation regardless of what the Plan Validator's risk rules decide.
const CONFIRM_BY_DEFAULT: &[IntentKind] = &[IntentKind::DeleteData, IntentKind::RemoveDuplicates];

impl SpecCompiler {
    pub fn compile(intent_spec: &IntentSpec) -> Result<ExecutionPlan, OrchestratorError> {
        if intent_spec.needs_clarification {
            return Ok(Self::clarify_plan(intent_spec));
        }

        let mut b = StepBuilder::new();
        match intent_spec.intent {
            IntentKind::CreateTable => Self::compile_create_table(&mut b, intent_spec),
            IntentKind::WriteData | IntentKind::UpdateData => Self::compile_write(&mut b, intent_spec),
            IntentKind::DeleteData => Self::compile_delete(&mut b, intent_spec),
            IntentKind::FormatRange => Self::compile_format(&mut b, intent_spec),
            IntentKind::CreateFormula | IntentKind::BatchFormula | IntentKind::CalculateSummary => {
                Self::compile_formula(&mut b, intent_spec)
            }
            IntentKind::CreateChart => Self::compile_chart(&mut b, intent_spec),
            IntentKind::SortData => Self::compile_table_op(&mut b, intent_spec, actions::SORT_RANGE, true),
            IntentKind::FilterData => Self::compile_table_op(&mut b, intent_spec, actions::FILTER_RANGE, false),
            IntentKind::RemoveDuplicates => {
                Self::compile_table_op(&mut b, intent_spec, actions::REMOVE_DUPLICATES, true)
            }
            IntentKind::CleanData => Self::compile_table_op(&mut b, intent_spec, actions::CLEAN_RANGE, true),
            IntentKind::QueryData | IntentKind::AnalyzeData | IntentKind::LookupValue => {
                Self::compile_query(&mut b, intent_spec)
            }
            IntentKind::CreateSheet => Self::compile_sheet(&mut b, intent_spec, actions::CREATE_SHEET),
            IntentKind::SwitchSheet => Self::compile_sheet(&mut b, intent_spec, actions::SWITCH_SHEET),
            IntentKind::Clarify => return Ok(Self::clarify_plan(intent_spec)),
            IntentKind::RespondOnly => return Ok(Self::respond_only_plan(intent_spec)),
        }?;

        let requires_confirmation = CONFIRM_BY_DEFAULT.contains(&intent_spec.intent);

        Ok(ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            task_description: task_description_for(intent_spec),
            intent: intent_spec.intent,
            steps: b.steps,
            task_success_conditions: success_conditions_for(intent_spec.intent),
            requires_confirmation,
            phase: PlanPhase::Planning,
            metadata: HashMap::new(),
        })
    }

    fn clarify_plan(intent_spec: &IntentSpec) -> ExecutionPlan {
        let mut b = StepBuilder::new();
        let question = intent_spec
            .clarification_question
            .clone()
            .unwrap_or_else(|| "Could you clarify what you'd like me to do?".to_string());
        let mut params = HashMap::new();
        params.insert("question".to_string(), json!(question));
        if let Some(options) = &intent_spec.clarification_options {
            params.insert("options".to_string(), json!(options));
        }
        b.push(actions::CLARIFY_REQUEST, params, Vec::new(), StepPhase::Response, false);
        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            task_description: task_description_for(intent_spec),
            intent: IntentKind::Clarify,
            steps: b.steps,
            task_success_conditions: success_conditions_for(IntentKind::Clarify),
            requires_confirmation: false,
            phase: PlanPhase::Planning,
            metadata: HashMap::new(),
        }
    }

    fn respond_only_plan(intent_spec: &IntentSpec) -> ExecutionPlan {
        let mut b = StepBuilder::new();
        let message = intent_spec.reasoning.clone().unwrap_or_default();
        b.push_respond(Vec::new(), &message);
        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            task_description: task_description_for(intent_spec),
            intent: IntentKind::RespondOnly,
            steps: b.steps,
            task_success_conditions: success_conditions_for(IntentKind::RespondOnly),
            requires_confirmation: false,
            phase: PlanPhase::Planning,
            metadata: HashMap::new(),
        }
    }

    fn compile_create_table(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: CreateTableSpec = spec_as(&intent_spec.spec);
        if spec.columns.is_empty() {
            return Err(OrchestratorError::CompileFailure { reason: "create_table requires at least one column".to_string() });
        }

        let header_range = cellref::header_range(&spec.start_cell, spec.columns.len())
            .ok_or_else(|| OrchestratorError::CompileFailure { reason: format!("invalid start_cell: {}", spec.start_cell) })?;

        let mut read_params = HashMap::new();
        read_params.insert("range".to_string(), json!("current_selection"));
        let read_id = b.push(actions::READ_SELECTION, read_params, Vec::new(), StepPhase::Sensing, false);

        let header_row: Vec<serde_json::Value> = spec.columns.iter().map(|c| json!(c.name)).collect();
        let mut write_params = HashMap::new();
        write_params.insert("range".to_string(), json!(header_range));
        write_params.insert("data".to_string(), json!([header_row]));
        if let Some(sheet) = &spec.target_sheet {
            write_params.insert("sheet".to_string(), json!(sheet));
        }
        let write_id = b.push(actions::WRITE_RANGE, write_params, vec![read_id], StepPhase::Execution, true);

        let mut format_params = HashMap::new();
        format_params.insert("range".to_string(), json!(header_range));
        format_params.insert("formatting".to_string(), json!({"bold": true}));
        let format_id = b.push(actions::FORMAT_RANGE, format_params, vec![write_id.clone()], StepPhase::Execution, true);

        let mut autofit_params = HashMap::new();
        autofit_params.insert("range".to_string(), json!(header_range));
        let autofit_id = b.push(actions::AUTOFIT_RANGE, autofit_params, vec![format_id], StepPhase::Execution, true);

        b.push_respond(vec![autofit_id], &format!("Created a table with {} columns.", spec.columns.len()));
        Ok(())
    }

    fn compile_write(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: WriteDataSpec = spec_as(&intent_spec.spec);
        let mut params = HashMap::new();
        params.insert("range".to_string(), json!(spec.target));
        params.insert("data".to_string(), json!(spec.data));
        let write_id = b.push(actions::WRITE_RANGE, params, Vec::new(), StepPhase::Execution, true);
        b.push_respond(vec![write_id], "Done.");
        Ok(())
    }

    fn compile_delete(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: WriteDataSpec = spec_as(&intent_spec.spec);
        let mut params = HashMap::new();
        params.insert("range".to_string(), json!(spec.target));
        let clear_id = b.push(actions::CLEAR, params, Vec::new(), StepPhase::Execution, true);
        b.push_respond(vec![clear_id], "Cleared.");
        Ok(())
    }

    fn compile_format(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: crate::payloads::FormatRangeSpec = spec_as(&intent_spec.spec);
        let mut params = HashMap::new();
        params.insert("range".to_string(), json!(spec.range));
        params.insert("formatting".to_string(), json!(spec.formatting));
        let format_id = b.push(actions::FORMAT_RANGE, params, Vec::new(), StepPhase::Execution, true);
        b.push_respond(vec![format_id], "Formatted.");
        Ok(())
    }

    fn compile_formula(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: FormulaSpec = spec_as(&intent_spec.spec);
        let mut read_params = HashMap::new();
        read_params.insert("range".to_string(), json!(spec.source_range));
        let read_id = b.push(actions::READ_RANGE, read_params, Vec::new(), StepPhase::Sensing, false);

        let mut set_params = HashMap::new();
        set_params.insert("cell".to_string(), json!(spec.target_cell.clone().unwrap_or_else(|| spec.source_range.clone())));
        set_params.insert("formula".to_string(), json!(spec.resolved_formula()));
        let set_id = b.push(actions::SET_FORMULA, set_params, vec![read_id], StepPhase::Execution, true);

        b.push_respond(vec![set_id], "Formula applied.");
        Ok(())
    }

    fn compile_chart(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: ChartSpec = spec_as(&intent_spec.spec);
        let mut params = HashMap::new();
        params.insert("data_range".to_string(), json!(spec.data_range));
        params.insert("chart_type".to_string(), json!(spec.chart_type));
        if let Some(title) = &spec.title {
            params.insert("title".to_string(), json!(title));
        }
        let chart_id = b.push(actions::CREATE_CHART, params, Vec::new(), StepPhase::Execution, true);
        b.push_respond(vec![chart_id], "Chart created.");
        Ok(())
    }

    fn compile_table_op(b: &mut StepBuilder, intent_spec: &IntentSpec, action: &str, is_write: bool) -> Result<(), OrchestratorError> {
        let spec: TableOpSpec = spec_as(&intent_spec.spec);
        let mut read_params = HashMap::new();
        read_params.insert("range".to_string(), json!(spec.range));
        let read_id = b.push(actions::READ_RANGE, read_params, Vec::new(), StepPhase::Sensing, false);

        let mut op_params = HashMap::new();
        op_params.insert("range".to_string(), json!(spec.range));
        op_params.insert("options".to_string(), json!(spec.options));
        let op_id = b.push(action, op_params, vec![read_id], StepPhase::Execution, is_write);

        b.push_respond(vec![op_id], "Done.");
        Ok(())
    }

    fn compile_query(b: &mut StepBuilder, intent_spec: &IntentSpec) -> Result<(), OrchestratorError> {
        let spec: QuerySpec = spec_as(&intent_spec.spec);
        let read_action = if spec.range == "current_selection" { actions::READ_SELECTION } else { actions::READ_RANGE };
        let mut read_params = HashMap::new();
        read_params.insert("range".to_string(), json!(spec.range));
        let read_id = b.push(read_action, read_params, Vec::new(), StepPhase::Sensing, false);

        b.push_respond(vec![read_id], actions::ANALYZE_AND_REPLY);
        Ok(())
    }

    fn compile_sheet(b: &mut StepBuilder, intent_spec: &IntentSpec, action: &str) -> Result<(), OrchestratorError> {
        let spec: SheetSpec = spec_as(&intent_spec.spec);
        let name = spec.sheet_name.unwrap_or_else(|| "Sheet".to_string());
        let mut params = HashMap::new();
        params.insert("sheet_name".to_string(), json!(name));
        let id = b.push(action, params, Vec::new(), StepPhase::Execution, action == actions::CREATE_SHEET);
        b.push_respond(vec![id], "Done.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(intent: IntentKind, spec: serde_json::Value) -> IntentSpec {
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

    #[test]
    fn create_table_computes_header_range_and_chains_steps() {
        let s = spec(
            IntentKind::CreateTable,
            json!({"columns": [{"name": "Name"}, {"name": "Age", "type": "number"}], "start_cell": "B7"}),
        );
        let plan = SpecCompiler::compile(&s).unwrap();
        assert_eq!(plan.steps.len(), 5);
        let read = &plan.steps[0];
        assert_eq!(read.action, actions::READ_SELECTION);
        let write = &plan.steps[1];
        assert_eq!(write.action, actions::WRITE_RANGE);
        assert_eq!(write.parameters["range"], json!("B7:C7"));
        assert_eq!(write.depends_on, vec![read.id.clone()]);
        assert_eq!(plan.steps[2].depends_on, vec![write.id.clone()]);
        assert_eq!(plan.steps.last().unwrap().action, actions::RESPOND_TO_USER);
        assert_eq!(plan.steps.last().unwrap().phase, StepPhase::Response);
    }

    #[test]
    fn create_table_without_columns_fails_to_compile() {
        let s = spec(IntentKind::CreateTable, json!({"columns": []}));
        assert!(SpecCompiler::compile(&s).is_err());
    }

    #[test]
    fn filter_data_is_not_marked_a_write_operation() {
        let s = spec(IntentKind::FilterData, json!({"range": "A1:C10"}));
        let plan = SpecCompiler::compile(&s).unwrap();
        let filter_step = plan.steps.iter().find(|st| st.action == actions::FILTER_RANGE).unwrap();
        assert!(!filter_step.is_write_operation);
    }

    #[test]
    fn query_data_leaves_analyze_and_reply_placeholder_unresolved() {
        let s = spec(IntentKind::QueryData, json!({"range": "current_selection"}));
        let plan = SpecCompiler::compile(&s).unwrap();
        let respond = plan.steps.last().unwrap();
        assert_eq!(respond.parameters["message"], json!(actions::ANALYZE_AND_REPLY));
    }

    #[test]
    fn delete_data_requires_confirmation() {
        let s = spec(IntentKind::DeleteData, json!({"target": "A1:A10"}));
        let plan = SpecCompiler::compile(&s).unwrap();
        assert!(plan.requires_confirmation);
    }

    #[test]
    fn clarify_needing_intent_produces_single_step_plan() {
        let mut s = spec(IntentKind::WriteData, json!({}));
        s.needs_clarification = true;
        s.clarification_question = Some("Which range?".to_string());
        let plan = SpecCompiler::compile(&s).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, actions::CLARIFY_REQUEST);
    }
}
