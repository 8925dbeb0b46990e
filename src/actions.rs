//! Canonical tool action names shared by the Spec Compiler, Plan Validator,
//! and Recovery Manager. Kept as one list so the three components agree on
//! vocabulary without importing each other.

pub const READ_SELECTION: &str = "read_selection";
pub const READ_RANGE: &str = "read_range";
pub const READ_CELL: &str = "read_cell";
pub const GET_SHEETS: &str = "get_sheets";
pub const GET_SELECTION: &str = "get_selection";
pub const GET_USED_RANGE: &str = "get_used_range";
pub const GET_ACTIVE_SHEET: &str = "get_active_sheet";
pub const GET_WORKBOOK_INFO: &str = "get_workbook_info";

pub const WRITE_RANGE: &str = "write_range";
pub const FORMAT_RANGE: &str = "format_range";
pub const AUTOFIT_RANGE: &str = "autofit_range";
pub const SET_FORMULA: &str = "set_formula";
pub const FILL_FORMULA: &str = "fill_formula";
pub const BATCH_FORMULA: &str = "batch_formula";
pub const CREATE_CHART: &str = "create_chart";
pub const CREATE_SHEET: &str = "create_sheet";
pub const SWITCH_SHEET: &str = "switch_sheet";
pub const DELETE_SHEET: &str = "delete_sheet";

pub const SORT_RANGE: &str = "sort_range";
pub const FILTER_RANGE: &str = "filter_range";
pub const REMOVE_DUPLICATES: &str = "remove_duplicates";
pub const CLEAN_RANGE: &str = "clean_range";
pub const CLEAR: &str = "clear";

pub const RESPOND_TO_USER: &str = "respond_to_user";
pub const CLARIFY_REQUEST: &str = "clarify_request";

/// Placeholder the Respond-to-user step's `message` parameter carries when
/// the reply should be synthesized from an upstream read's output rather
/// than templated verbatim. Not a `{{step_id}}` placeholder — the DAG
/// Executor leaves it untouched; the Orchestrator's reply builder resolves
/// it when assembling the final user-facing message.
pub const ANALYZE_AND_REPLY: &str = "{{ANALYZE_AND_REPLY}}";

/// Actions that read but never mutate workbook state.
pub const READ_ACTIONS: &[&str] = &[
    READ_SELECTION,
    READ_RANGE,
    READ_CELL,
    GET_SHEETS,
    GET_SELECTION,
    GET_USED_RANGE,
    GET_ACTIVE_SHEET,
    GET_WORKBOOK_INFO,
];
