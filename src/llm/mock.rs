use std::sync::Mutex;

use async_trait::async_trait;

use super::IntentLlm;

/// Programmable `IntentLlm` for tests: returns queued responses in order and
/// records every call it received.
pub struct MockIntentLlm {
    responses: Mutex<Vec<Result<String, String>>>,
    call_log: Mutex<Vec<(String, String)>>, // (system_prompt, user_prompt)
}

impl MockIntentLlm {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(responses: Vec<Result<String, String>>) -> Self {
        Self { responses: Mutex::new(responses), call_log: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn user_prompt_for_call(&self, n: usize) -> Option<String> {
        self.call_log.lock().unwrap().get(n).map(|(_, user)| user.clone())
    }
}

#[async_trait]
impl IntentLlm for MockIntentLlm {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
        self.call_log.lock().unwrap().push((system_prompt.to_string(), user_prompt.to_string()));

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err("MockIntentLlm: no more programmed responses".to_string());
        }
        responses.remove(0)
    }
}
