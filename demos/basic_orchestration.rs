//! # Basic Orchestration Example
//!
//! Builds an `Orchestrator` with a couple of in-memory spreadsheet tools and
//! runs a single natural-language request to completion.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example basic_orchestration
//! RUST_LOG=debug OPENAI_API_KEY=sk-... cargo run --example basic_orchestration
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentcore::registry::Tool;
use agentcore::types::{ParameterDescriptor, ParameterType, ToolResult};
use agentcore::{OrchestrationOptions, OrchestratorBuilder, ParseContext};
use async_trait::async_trait;
use serde_json::json;

/// A single-sheet, in-memory "workbook" standing in for the real spreadsheet
/// host a production orchestrator would talk to over RPC.
struct MemoryWorkbook {
    cells: Mutex<HashMap<String, serde_json::Value>>,
}

struct WriteRangeTool(Arc<MemoryWorkbook>);

#[async_trait]
impl Tool for WriteRangeTool {
    fn name(&self) -> &str {
        agentcore::actions::WRITE_RANGE
    }
    fn description(&self) -> &str {
        "Writes a 2D array of values into a cell range."
    }
    fn category(&self) -> &str {
        "write"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, input: &HashMap<String, serde_json::Value>) -> ToolResult {
        let target = input.get("target").and_then(|v| v.as_str()).unwrap_or("A1").to_string();
        let data = input.get("data").cloned().unwrap_or(json!([]));
        self.0.cells.lock().unwrap().insert(target.clone(), data);
        ToolResult::ok(json!({ "wrote": target }))
    }
}

struct ReadRangeTool {
    workbook: Arc<MemoryWorkbook>,
    params: Vec<ParameterDescriptor>,
}

impl ReadRangeTool {
    fn new(workbook: Arc<MemoryWorkbook>) -> Self {
        Self {
            workbook,
            params: vec![ParameterDescriptor {
                name: "target".to_string(),
                r#type: ParameterType::String,
                required: true,
                default: None,
                description: "the range to read".to_string(),
            }],
        }
    }
}

#[async_trait]
impl Tool for ReadRangeTool {
    fn name(&self) -> &str {
        "read_range"
    }
    fn description(&self) -> &str {
        "Reads the values currently stored at a cell range."
    }
    fn category(&self) -> &str {
        "read"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &self.params
    }
    async fn invoke(&self, input: &HashMap<String, serde_json::Value>) -> ToolResult {
        let target = input.get("target").and_then(|v| v.as_str()).unwrap_or("A1");
        match self.workbook.cells.lock().unwrap().get(target) {
            Some(value) => ToolResult::ok(value.clone()),
            None => ToolResult::err(format!("range '{target}' is empty")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentcore-rs Basic Orchestration Example ===\n");

    let workbook = Arc::new(MemoryWorkbook { cells: Mutex::new(HashMap::new()) });

    let orchestrator = OrchestratorBuilder::new()
        // Swap for .anthropic("claude-3-5-sonnet-20241022", "") or .groq("llama-3.3-70b-versatile", "gsk_...")
        .openai("gpt-4o-mini", "")
        .retry_on_error(2)
        .add_tool(Arc::new(WriteRangeTool(workbook.clone())))
        .add_tool(Arc::new(ReadRangeTool::new(workbook.clone())))
        .max_concurrency(4)
        .build()?;

    let outcome = orchestrator
        .orchestrate("put the numbers 1, 2, 3 into A1:A3", OrchestrationOptions::default(), ParseContext::default())
        .await;

    println!("reply: {}", outcome.reply);
    println!("success: {}", outcome.success);
    if let Some(execution) = &outcome.execution {
        println!("steps: {}/{} completed", execution.success_count, execution.total_steps);
    }

    Ok(())
}
