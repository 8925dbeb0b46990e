use std::sync::Arc;

use async_trait::async_trait;

use super::IntentLlm;

/// Wraps any `IntentLlm` and retries transient failures with exponential
/// back-off. Auth failures are never retried.
pub struct RetryingIntentLlm {
    inner: Arc<dyn IntentLlm>,
    max_retries: u32,
}

impl RetryingIntentLlm {
    pub fn new(inner: Arc<dyn IntentLlm>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    fn is_auth_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("invalid api key")
    }

    fn is_rate_limit_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    }
}

#[async_trait]
impl IntentLlm for RetryingIntentLlm {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
        let mut last_err = String::new();
        let mut rate_limited = false;

        for attempt in 0..=self.max_retries {
            match self.inner.generate_json(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if Self::is_auth_error(&e) => {
                    tracing::error!(error = %e, "LLM auth error — not retrying");
                    return Err(e);
                }
                Err(e) => {
                    last_err = e.clone();
                    if Self::is_rate_limit_error(&e) {
                        rate_limited = true;
                    }

                    if attempt < self.max_retries {
                        let base_wait = if Self::is_rate_limit_error(&e) { 5 } else { 1 };
                        let wait_secs = std::cmp::min(base_wait << attempt, 60);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = self.max_retries,
                            wait_s = wait_secs,
                            error = %e,
                            "LLM transient error — retrying"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
                    }
                }
            }
        }

        let prefix = if rate_limited { "LLM rate limit exceeded" } else { "LLM failed" };
        Err(format!("{prefix} after {} retries — last error: {last_err}", self.max_retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyLlm {
        fail_times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IntentLlm for FlakyLlm {
        async fn generate_json(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err("503 service unavailable".to_string())
            } else {
                Ok("{}".to_string())
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let flaky = Arc::new(FlakyLlm { fail_times: 2, calls: AtomicUsize::new(0) });
        let retrying = RetryingIntentLlm::new(flaky.clone(), 3);
        let result = retrying.generate_json("sys", "user").await;
        assert!(result.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let flaky = Arc::new(FlakyLlm { fail_times: 100, calls: AtomicUsize::new(0) });
        let retrying = RetryingIntentLlm::new(flaky.clone(), 1);
        let result = retrying.generate_json("sys", "user").await;
        assert!(result.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_auth_errors() {
        struct AuthFailLlm;
        #[async_trait]
        impl IntentLlm for AuthFailLlm {
            async fn generate_json(&self, _s: &str, _u: &str) -> Result<String, String> {
                Err("401 unauthorized".to_string())
            }
        }
        let retrying = RetryingIntentLlm::new(Arc::new(AuthFailLlm), 5);
        assert!(retrying.generate_json("sys", "user").await.is_err());
    }
}
