//! Typed shapes for the `spec` field of an `IntentSpec`, one per family of
//! intents sharing a compilation recipe. The Intent Parser leaves `spec` as
//! an untyped `serde_json::Value` — the LLM's JSON is never guaranteed to
//! match any of these exactly, so the Spec Compiler deserializes into them
//! with `#[serde(default)]` throughout and treats a missing/mismatched
//! field as "use the default," never as a hard error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_start_cell() -> String {
    "A1".to_string()
}

fn default_target() -> String {
    "current_selection".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Date,
    Currency,
    Percentage,
    Formula,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub r#type: ColumnType,
    pub formula: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTableSpec {
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default = "default_start_cell")]
    pub start_cell: String,
    pub target_sheet: Option<String>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteDataSpec {
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatRangeSpec {
    #[serde(default = "default_target")]
    pub range: String,
    #[serde(default)]
    pub formatting: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormulaType {
    #[default]
    Custom,
    Sum,
    Average,
    Count,
    Max,
    Min,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormulaSpec {
    #[serde(default = "default_target")]
    pub source_range: String,
    pub target_cell: Option<String>,
    #[serde(default)]
    pub formula_type: FormulaType,
    pub custom_formula: Option<String>,
}

impl FormulaSpec {
    /// Synthesizes a formula from `formula_type` when the LLM didn't supply
    /// `custom_formula` directly.
    pub fn resolved_formula(&self) -> String {
        if let Some(custom) = &self.custom_formula {
            return custom.clone();
        }
        let fn_name = match self.formula_type {
            FormulaType::Custom => "SUM",
            FormulaType::Sum => "SUM",
            FormulaType::Average => "AVERAGE",
            FormulaType::Count => "COUNT",
            FormulaType::Max => "MAX",
            FormulaType::Min => "MIN",
        };
        format!("={fn_name}({})", self.source_range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
    Column,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default = "default_target")]
    pub data_range: String,
    #[serde(default)]
    pub chart_type: ChartType,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetSpec {
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableOpSpec {
    #[serde(default = "default_target")]
    pub range: String,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default = "default_target")]
    pub range: String,
    pub question: Option<String>,
}

/// Deserializes `value` into `T`, falling back to `T::default()` whenever
/// the shape doesn't line up — the compiler's job is to produce a
/// best-effort plan from whatever the LLM handed it, not to reject it.
pub fn spec_as<T: serde::de::DeserializeOwned + Default>(value: &serde_json::Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}
