use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;

use super::IntentLlm;

/// `IntentLlm` backed by the OpenAI chat completions endpoint — also covers
/// any OpenAI-compatible provider (Groq, Together, Ollama, Fireworks, ...)
/// via [`Self::with_base_url`].
pub struct OpenAiIntentLlm {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiIntentLlm {
    /// Standard OpenAI client, picks up `OPENAI_API_KEY` from the environment.
    pub fn new(model: impl Into<String>) -> Self {
        Self { client: Client::new(), model: model.into() }
    }

    /// Custom base URL, e.g. `"https://api.groq.com/openai/v1"`.
    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_base(api_base).with_api_key(api_key);
        Self { client: Client::with_config(config), model: model.into() }
    }
}

#[async_trait]
impl IntentLlm for OpenAiIntentLlm {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
        let messages: Vec<ChatCompletionRequestMessage> = serde_json::from_value(serde_json::json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]))
        .map_err(|e| format!("failed to build messages: {e}"))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| format!("failed to build request: {e}"))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| format!("OpenAI API error: {e}"))?;

        let choice = response.choices.into_iter().next().ok_or("empty response from OpenAI")?;
        choice.message.content.ok_or_else(|| "no content in OpenAI response".to_string())
    }
}
