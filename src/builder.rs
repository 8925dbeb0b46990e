use std::sync::Arc;

use crate::error::OrchestratorError;
use crate::intent::IntentParser;
use crate::llm::{AnthropicIntentLlm, IntentLlm, OpenAiIntentLlm, RetryingIntentLlm};
use crate::orchestrator::Orchestrator;
use crate::recovery::RecoveryManager;
use crate::registry::{RegistrationOptions, Tool, ToolRegistry};
use crate::session::SessionStore;
use crate::types::OrchestratorConfig;

/// Fluent assembly of an [`Orchestrator`] — provider selection, tool
/// registration, and config all happen here so `Orchestrator::new` itself
/// can stay a plain constructor rather than a pile of optional arguments.
pub struct OrchestratorBuilder {
    registry: ToolRegistry,
    llm: Option<Arc<dyn IntentLlm>>,
    retry_count: Option<u32>,
    max_retries: Option<u32>,
    session_store: Option<Arc<dyn SessionStore>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
            llm: None,
            retry_count: None,
            max_retries: None,
            session_store: None,
            config: OrchestratorConfig::default(),
        }
    }

    // ── LLM provider setters ────────────────────────────────────────────────

    /// Set the intent-parsing LLM explicitly — the escape hatch for any
    /// provider not covered by the convenience methods below.
    pub fn llm(mut self, llm: Arc<dyn IntentLlm>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Use the standard OpenAI chat completions API.
    ///
    /// Pass `""` to pick up `OPENAI_API_KEY` from the environment.
    pub fn openai(mut self, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        let caller = if key.is_empty() { OpenAiIntentLlm::new(model) } else { OpenAiIntentLlm::with_base_url("https://api.openai.com/v1", key, model) };
        self.llm = Some(Arc::new(caller));
        self
    }

    /// Use Groq's inference API (OpenAI-compatible).
    pub fn groq(mut self, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.llm = Some(Arc::new(OpenAiIntentLlm::with_base_url("https://api.groq.com/openai/v1", api_key, model)));
        self
    }

    /// Use a local Ollama instance (OpenAI-compatible API).
    ///
    /// `base_url` defaults to `http://localhost:11434/v1` if empty.
    pub fn ollama(mut self, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        let url = if url.is_empty() { "http://localhost:11434/v1".to_string() } else { url };
        self.llm = Some(Arc::new(OpenAiIntentLlm::with_base_url(url, "ollama", model)));
        self
    }

    /// Use the Anthropic Messages API.
    ///
    /// Pass `""` to pick up `ANTHROPIC_API_KEY` from the environment.
    pub fn anthropic(mut self, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        let key = if key.is_empty() { std::env::var("ANTHROPIC_API_KEY").unwrap_or_default() } else { key };
        self.llm = Some(Arc::new(AnthropicIntentLlm::new(key, model)));
        self
    }

    /// Wrap the chosen LLM with exponential-backoff retry on transient
    /// errors. Must be called after a provider method.
    pub fn retry_on_error(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    // ── Tool registration ────────────────────────────────────────────────────

    pub fn tool(self, tool: Arc<dyn Tool>, options: RegistrationOptions) -> Self {
        self.registry.register(tool, options);
        self
    }

    pub fn add_tool(self, tool: Arc<dyn Tool>) -> Self {
        self.tool(tool, RegistrationOptions::default())
    }

    // ── Orchestration config ────────────────────────────────────────────────

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self.config.max_retries = n;
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    // ── Build ────────────────────────────────────────────────────────────────

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let mut llm = self
            .llm
            .ok_or_else(|| OrchestratorError::BuildError("an LLM provider is required — use .openai(), .groq(), .ollama(), .anthropic(), or .llm()".to_string()))?;

        if let Some(n) = self.retry_count {
            llm = Arc::new(RetryingIntentLlm::new(llm, n));
        }

        let registry = Arc::new(self.registry);
        let intent_parser = IntentParser::new(llm);
        let recovery = Arc::new(self.max_retries.map(RecoveryManager::with_max_retries).unwrap_or_else(RecoveryManager::new));

        Ok(Orchestrator::new(registry, intent_parser, recovery, self.session_store, self.config))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
