//! # Streaming Orchestration Example
//!
//! Same request as `basic_orchestration`, but drains the progress-event
//! stream as the plan executes instead of waiting for the final outcome.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example streaming_orchestration
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentcore::registry::Tool;
use agentcore::types::{ParameterDescriptor, ToolResult};
use agentcore::{OrchestrationOptions, OrchestratorBuilder, ParseContext};
use async_trait::async_trait;
use serde_json::json;

struct EchoWriteTool {
    written: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

#[async_trait]
impl Tool for EchoWriteTool {
    fn name(&self) -> &str {
        agentcore::actions::WRITE_RANGE
    }
    fn description(&self) -> &str {
        "Writes a value into a cell range and remembers every write made."
    }
    fn category(&self) -> &str {
        "write"
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    async fn invoke(&self, input: &HashMap<String, serde_json::Value>) -> ToolResult {
        let target = input.get("target").and_then(|v| v.as_str()).unwrap_or("A1").to_string();
        let data = input.get("data").cloned().unwrap_or(json!(null));
        self.written.lock().unwrap().push((target.clone(), data));
        // A brief delay so the progress stream has something to interleave.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        ToolResult::ok(json!({ "wrote": target }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentcore-rs Streaming Orchestration Example ===\n");

    let written = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = OrchestratorBuilder::new()
        .openai("gpt-4o-mini", "")
        .add_tool(Arc::new(EchoWriteTool { written: written.clone() }))
        .build()?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let run = tokio::spawn(async move {
        orchestrator
            .orchestrate_with_events(
                "write 'hello' to A1 and 'world' to A2",
                OrchestrationOptions::default(),
                ParseContext::default(),
                Some(tx),
            )
            .await
    });

    while let Some(envelope) = rx.recv().await {
        println!("[{}ms] {:?}", envelope.timestamp_ms, envelope.event);
    }

    let outcome = run.await?;
    println!("\nfinal reply: {}", outcome.reply);
    println!("writes recorded: {}", written.lock().unwrap().len());

    Ok(())
}
