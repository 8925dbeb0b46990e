use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::actions;
use crate::cellref;
use crate::registry::ToolRegistry;
use crate::types::ExecutionPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Block,
    Warn,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub message: String,
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn blocked(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Block)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warn)
    }
}

/// External workbook state the Plan Validator needs for the two rules that
/// can't be decided from the plan alone. Callers that don't have a live
/// workbook to introspect simply pass `None` and those rules are skipped.
#[derive(Debug, Clone, Default)]
pub struct WorkbookContext {
    pub existing_sheets: Vec<String>,
    pub sheet_data_row_counts: HashMap<String, usize>,
}

impl WorkbookContext {
    fn has_sheet(&self, name: &str) -> bool {
        self.existing_sheets.iter().any(|s| s.eq_ignore_ascii_case(name))
    }
}

const WHOLE_SHEET_CELL_THRESHOLD: u64 = 500;

static SHEET_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:'([^']+)'|([A-Za-z0-9_]+))!").unwrap());

static TRANSACTION_SHEET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)transaction|order|sale").unwrap());
static SUMMARY_SHEET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)summary|report|monthly|yearly").unwrap());

/// Columns D-G, where a freshly-written literal price/cost/amount is most
/// likely a hallucinated number rather than a real one copied from the
/// workbook.
const PRICE_LIKE_COLUMNS: &[&str] = &["D", "E", "F", "G"];

/// Runs an ordered list of rules over a compiled plan before it reaches the
/// DAG Executor. Rules never mutate the plan — a `Block` issue stops
/// execution outright (`OrchestratorError::PlanValidationBlocked`), a `Warn`
/// issue is surfaced to the caller but doesn't prevent the run.
///
/// A plan made up entirely of reads (and the final reply) skips every rule
/// and reports `passed=true` outright — there's nothing a read-only plan
/// could violate.
pub struct PlanValidator;

impl PlanValidator {
    pub fn validate(plan: &ExecutionPlan, registry: &ToolRegistry, workbook_ctx: Option<&WorkbookContext>) -> ValidationReport {
        if Self::is_query_only(plan) {
            return ValidationReport { issues: Vec::new() };
        }

        let mut issues = Vec::new();
        issues.extend(Self::check_dangling_dependencies(plan));
        issues.extend(Self::check_dependency_order(plan));
        issues.extend(Self::check_unknown_tools(plan, registry));
        if let Some(ctx) = workbook_ctx {
            issues.extend(Self::check_reference_exists(plan, ctx));
        }
        issues.extend(Self::check_role_violations(plan));
        if let Some(ctx) = workbook_ctx {
            issues.extend(Self::check_batch_behavior_missing(plan, ctx));
        }
        issues.extend(Self::check_high_risk_operations(plan));
        ValidationReport { issues }
    }

    /// True when every step either just reads the workbook or replies to the
    /// user — nothing in the plan could have a dangling dependency, touch a
    /// destructive action, or need a workbook reference checked.
    fn is_query_only(plan: &ExecutionPlan) -> bool {
        plan.steps
            .iter()
            .all(|step| actions::READ_ACTIONS.contains(&step.action.as_str()) || step.action == actions::RESPOND_TO_USER)
    }

    fn check_dangling_dependencies(plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            for dep in &step.depends_on {
                if plan.step(dep).is_none() {
                    issues.push(ValidationIssue {
                        rule_id: "dangling_dependency",
                        severity: Severity::Block,
                        message: format!("step '{}' depends on unknown step '{dep}'", step.id),
                        step_id: Some(step.id.clone()),
                    });
                }
            }
        }
        issues
    }

    /// Checks that every step runs strictly after what it depends on — both
    /// its declared `depends_on` ids and, for formula steps, any sheet its
    /// formula references but which the plan itself creates later on.
    fn check_dependency_order(plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            for dep in &step.depends_on {
                let Some(dep_step) = plan.step(dep) else { continue };
                if dep_step.order >= step.order {
                    issues.push(ValidationIssue {
                        rule_id: "dependency_order",
                        severity: Severity::Block,
                        message: format!("step '{}' runs before the dependency '{}' it depends on", step.id, dep),
                        step_id: Some(step.id.clone()),
                    });
                }
            }

            if step.action != actions::SET_FORMULA {
                continue;
            }
            let Some(formula) = step.parameters.get("formula").and_then(|v| v.as_str()) else { continue };
            for sheet_name in referenced_sheets(formula) {
                let Some(creator) = plan.steps.iter().find(|s| {
                    s.action == actions::CREATE_SHEET
                        && s.parameters.get("sheet_name").and_then(|v| v.as_str()).map(|n| n.eq_ignore_ascii_case(&sheet_name)).unwrap_or(false)
                }) else {
                    continue;
                };
                if creator.order >= step.order {
                    issues.push(ValidationIssue {
                        rule_id: "dependency_order",
                        severity: Severity::Block,
                        message: format!("step '{}' references sheet '{sheet_name}' before it is created", step.id),
                        step_id: Some(step.id.clone()),
                    });
                }
            }
        }
        issues
    }

    fn check_unknown_tools(plan: &ExecutionPlan, registry: &ToolRegistry) -> Vec<ValidationIssue> {
        plan.steps
            .iter()
            .filter(|step| !registry.has(&step.action))
            .map(|step| ValidationIssue {
                rule_id: "unknown_tool",
                severity: Severity::Block,
                message: format!("no tool registered for action '{}'", step.action),
                step_id: Some(step.id.clone()),
            })
            .collect()
    }

    /// Every sheet a formula references must already exist in the workbook
    /// or be created earlier in the plan.
    fn check_reference_exists(plan: &ExecutionPlan, ctx: &WorkbookContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            if step.action != actions::SET_FORMULA {
                continue;
            }
            let Some(formula) = step.parameters.get("formula").and_then(|v| v.as_str()) else { continue };
            for sheet_name in referenced_sheets(formula) {
                if ctx.has_sheet(&sheet_name) {
                    continue;
                }
                let created_earlier = plan.steps.iter().any(|s| {
                    s.order < step.order
                        && s.action == actions::CREATE_SHEET
                        && s.parameters.get("sheet_name").and_then(|v| v.as_str()).map(|n| n.eq_ignore_ascii_case(&sheet_name)).unwrap_or(false)
                });
                if !created_earlier {
                    issues.push(ValidationIssue {
                        rule_id: "reference_exists",
                        severity: Severity::Block,
                        message: format!("step '{}' references unknown sheet '{sheet_name}'", step.id),
                        step_id: Some(step.id.clone()),
                    });
                }
            }
        }
        issues
    }

    /// Refuses literal numbers that read like fabricated transaction amounts
    /// or fabricated summary figures — a write carrying the shape of made-up
    /// data rather than data derived from what's already in the workbook.
    fn check_role_violations(plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            if step.action != actions::WRITE_RANGE {
                continue;
            }
            let Some(sheet) = step.parameters.get("sheet").and_then(|v| v.as_str()) else { continue };
            let Some(data) = step.parameters.get("data").and_then(|v| v.as_array()) else { continue };

            if TRANSACTION_SHEET.is_match(sheet) {
                let Some(range) = step.parameters.get("range").and_then(|v| v.as_str()) else { continue };
                let Some((start_letters, _)) = cellref::parse_cell_ref(range.split_once(':').map(|(s, _)| s).unwrap_or(range)) else { continue };
                let Some(start_col) = cellref::col_letters_to_number(&start_letters) else { continue };
                for (row_idx, row) in data.iter().enumerate() {
                    let Some(row) = row.as_array() else { continue };
                    for (col_idx, cell) in row.iter().enumerate() {
                        let col_letters = cellref::col_number_to_letters(start_col + col_idx as u32);
                        if !PRICE_LIKE_COLUMNS.contains(&col_letters.as_str()) {
                            continue;
                        }
                        if is_positive_literal_number(cell) {
                            issues.push(ValidationIssue {
                                rule_id: "role_violation",
                                severity: Severity::Block,
                                message: format!(
                                    "step '{}' writes a literal number into column '{col_letters}' row {} of transaction sheet '{sheet}'",
                                    step.id,
                                    row_idx + 1
                                ),
                                step_id: Some(step.id.clone()),
                            });
                        }
                    }
                }
            } else if SUMMARY_SHEET.is_match(sheet) {
                let has_literal = data.iter().any(|row| row.as_array().map(|r| r.iter().any(is_positive_literal_number)).unwrap_or(false));
                if has_literal {
                    issues.push(ValidationIssue {
                        rule_id: "role_violation",
                        severity: Severity::Block,
                        message: format!("step '{}' writes literal figures into summary sheet '{sheet}' instead of a formula", step.id),
                        step_id: Some(step.id.clone()),
                    });
                }
            }
        }
        issues
    }

    /// Flags a single-cell formula written to a data sheet with more than
    /// two rows when nothing in the plan fills it down the column.
    fn check_batch_behavior_missing(plan: &ExecutionPlan, ctx: &WorkbookContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            if step.action != actions::SET_FORMULA {
                continue;
            }
            let Some(cell) = step.parameters.get("cell").and_then(|v| v.as_str()) else { continue };
            let Some((letters, row)) = cellref::parse_cell_ref(cell) else { continue };
            if row <= 1 {
                continue;
            }
            let sheet = step.parameters.get("sheet").and_then(|v| v.as_str()).unwrap_or("");
            let row_count = ctx.sheet_data_row_counts.get(sheet).copied().unwrap_or(0);
            if row_count <= 2 {
                continue;
            }
            let filled = plan.steps.iter().any(|s| {
                (s.action == actions::FILL_FORMULA || s.action == actions::BATCH_FORMULA)
                    && s.parameters.get("range").and_then(|v| v.as_str()).map(|r| r.contains(&letters)).unwrap_or(false)
            });
            if !filled {
                issues.push(ValidationIssue {
                    rule_id: "batch_behavior_missing",
                    severity: Severity::Warn,
                    message: format!("step '{}' writes a single formula at '{cell}' instead of filling the column", step.id),
                    step_id: Some(step.id.clone()),
                });
            }
        }
        issues
    }

    /// Destructive operations that should stop a plan outright rather than
    /// merely warn: deleting a sheet, clearing an entire (or unspecified)
    /// range, and any write touching more cells than the plan could
    /// plausibly mean to.
    fn check_high_risk_operations(plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for step in &plan.steps {
            if step.action == actions::DELETE_SHEET {
                issues.push(ValidationIssue {
                    rule_id: "high_risk_operation",
                    severity: Severity::Block,
                    message: format!("step '{}' deletes an entire sheet", step.id),
                    step_id: Some(step.id.clone()),
                });
                continue;
            }

            let range = step.parameters.get("range").or_else(|| step.parameters.get("target")).and_then(|v| v.as_str());

            if step.action == actions::CLEAR {
                match range {
                    None => issues.push(ValidationIssue {
                        rule_id: "high_risk_operation",
                        severity: Severity::Block,
                        message: format!("step '{}' clears without an explicit range", step.id),
                        step_id: Some(step.id.clone()),
                    }),
                    Some(r) if cellref::is_whole_sheet_range(r) => issues.push(ValidationIssue {
                        rule_id: "high_risk_operation",
                        severity: Severity::Block,
                        message: format!("step '{}' clears an entire sheet range ('{r}')", step.id),
                        step_id: Some(step.id.clone()),
                    }),
                    Some(_) => {}
                }
                continue;
            }

            if step.is_write_operation {
                if let Some(r) = range {
                    if let Some(count) = cellref::range_cell_count(r) {
                        if count > WHOLE_SHEET_CELL_THRESHOLD {
                            issues.push(ValidationIssue {
                                rule_id: "high_risk_operation",
                                severity: Severity::Block,
                                message: format!("step '{}' writes {count} cells in '{r}'", step.id),
                                step_id: Some(step.id.clone()),
                            });
                        }
                    }
                }
            }
        }
        issues
    }
}

fn referenced_sheets(formula: &str) -> Vec<String> {
    SHEET_REFERENCE
        .captures_iter(formula)
        .map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string()).unwrap_or_default())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_positive_literal_number(value: &serde_json::Value) -> bool {
    match value.as_f64() {
        Some(n) => n > 0.0,
        None => false,
    }
}
