use async_trait::async_trait;

mod anthropic;
mod mock;
mod openai;
mod retry;

pub use anthropic::AnthropicIntentLlm;
pub use mock::MockIntentLlm;
pub use openai::OpenAiIntentLlm;
pub use retry::RetryingIntentLlm;

/// The single interface between the orchestrator and any LLM provider.
///
/// # Contract
/// - Must be `Send + Sync` (used behind `Arc<dyn IntentLlm>`).
/// - Returns `Ok(String)` whenever the provider returned *something*, even
///   if that something isn't valid JSON — the Intent Parser's own extraction
///   logic is responsible for coping with malformed output, not this trait.
/// - Returns `Err(String)` only for transport-level failures: the request
///   never reached the provider, or the provider refused it outright
///   (auth failure, rate limit exhausted after retries).
#[async_trait]
pub trait IntentLlm: Send + Sync {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String>;
}
