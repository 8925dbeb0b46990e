use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use regex::Regex;

use crate::types::{RecoveryAction, Step};
#[cfg(test)]
use crate::types::{StepPhase, StepStatus};

type RecoverFn = Box<dyn Fn(&str, &Step) -> Option<RecoveryAction> + Send + Sync>;

struct RecoveryStrategy {
    id: &'static str,
    pattern: Regex,
    applicable_actions: Option<HashSet<&'static str>>,
    priority: u32,
    recover: RecoverFn,
}

/// Matches step failures against an ordered list of regex-keyed strategies
/// and decides how the DAG Executor should respond — retry, skip, fall back
/// to an alternative step, or give up on the whole run.
pub struct RecoveryManager {
    strategies: Vec<RecoveryStrategy>,
    retry_counts: Mutex<HashMap<String, u32>>,
    max_retries: u32,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::with_max_retries(3)
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        let mut strategies = vec![
            RecoveryStrategy {
                id: "network_error",
                pattern: Regex::new(r"(?i)network|timeout|ECONNREFUSED|fetch failed|网络|超时").unwrap(),
                applicable_actions: None,
                priority: 5,
                recover: Box::new(|_err, _step| Some(RecoveryAction::Retry { delay_ms: 2000 })),
            },
            RecoveryStrategy {
                id: "transient_error",
                pattern: Regex::new(r"(?i)busy|locked|temporarily|繁忙|锁定").unwrap(),
                applicable_actions: None,
                priority: 5,
                recover: Box::new(|_err, _step| Some(RecoveryAction::Retry { delay_ms: 1000 })),
            },
            RecoveryStrategy {
                id: "range_not_found",
                pattern: Regex::new(r"(?i)range.*not found|invalid range|范围.*不存在").unwrap(),
                applicable_actions: Some(
                    [crate::actions::READ_RANGE, crate::actions::READ_CELL, crate::actions::READ_SELECTION]
                        .into_iter()
                        .collect(),
                ),
                priority: 10,
                recover: Box::new(|_err, step| {
                    let mut alt = step.clone();
                    alt.id = format!("{}_fallback", step.id);
                    alt.action = crate::actions::READ_SELECTION.to_string();
                    Some(RecoveryAction::Substitute { alternative_step: alt })
                }),
            },
            RecoveryStrategy {
                id: "sheet_not_exist",
                pattern: Regex::new(r"(?i)sheet.*not exist|worksheet.*not found|工作表.*不存在").unwrap(),
                applicable_actions: None,
                priority: 10,
                recover: Box::new(|err, step| {
                    let name = extract_quoted_name(err).unwrap_or_else(|| "Sheet1".to_string());
                    let mut alt = step.clone();
                    alt.id = format!("{}_fallback", step.id);
                    alt.action = crate::actions::CREATE_SHEET.to_string();
                    alt.parameters.insert("sheet_name".to_string(), serde_json::json!(name));
                    Some(RecoveryAction::Substitute { alternative_step: alt })
                }),
            },
            RecoveryStrategy {
                id: "formula_error",
                pattern: Regex::new(r"(?i)formula|#REF|#VALUE|#NAME|公式错误").unwrap(),
                applicable_actions: Some([crate::actions::SET_FORMULA].into_iter().collect()),
                priority: 10,
                recover: Box::new(|err, _step| Some(RecoveryAction::Skip { reason: err.to_string() })),
            },
            RecoveryStrategy {
                id: "data_format_error",
                pattern: Regex::new(r"(?i)invalid format|data format|malformed|格式错误").unwrap(),
                applicable_actions: None,
                priority: 15,
                recover: Box::new(|err, step| {
                    if step.is_write_operation {
                        None
                    } else {
                        Some(RecoveryAction::Skip { reason: err.to_string() })
                    }
                }),
            },
            RecoveryStrategy {
                id: "permission_error",
                pattern: Regex::new(r"(?i)permission|forbidden|access denied|unauthorized|权限").unwrap(),
                applicable_actions: None,
                priority: 20,
                recover: Box::new(|err, step| {
                    if step.is_write_operation {
                        Some(RecoveryAction::Abort { user_message: format!("Permission denied: {err}") })
                    } else {
                        Some(RecoveryAction::Skip { reason: err.to_string() })
                    }
                }),
            },
            RecoveryStrategy {
                id: "default",
                pattern: Regex::new(r".*").unwrap(),
                applicable_actions: None,
                priority: 100,
                recover: Box::new(|err, step| {
                    if step.is_write_operation {
                        None
                    } else {
                        Some(RecoveryAction::Skip { reason: err.to_string() })
                    }
                }),
            },
        ];
        strategies.sort_by_key(|s| s.priority);

        Self { strategies, retry_counts: Mutex::new(HashMap::new()), max_retries }
    }

    /// Finds the first applicable, matching strategy and returns its
    /// decision. A `Retry` decision that would exceed `max_retries` for this
    /// step is skipped in favor of the next applicable strategy, so a
    /// persistently-failing network call eventually falls through to
    /// `default`'s `Skip`/`None` instead of retrying forever.
    pub fn recover(&self, step: &Step, error: &str) -> Option<RecoveryAction> {
        for strategy in &self.strategies {
            if let Some(allowed) = &strategy.applicable_actions {
                if !allowed.contains(step.action.as_str()) {
                    continue;
                }
            }
            if !strategy.pattern.is_match(error) {
                continue;
            }

            if let Some(action) = (strategy.recover)(error, step) {
                if matches!(action, RecoveryAction::Retry { .. }) {
                    let mut counts = self.retry_counts.lock().unwrap();
                    let count = counts.entry(step.id.clone()).or_insert(0);
                    if *count >= self.max_retries {
                        continue;
                    }
                    *count += 1;
                }
                return Some(action);
            }
        }
        None
    }

    pub fn reset_retry_count(&self, step_id: &str) {
        self.retry_counts.lock().unwrap().remove(step_id);
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_quoted_name(text: &str) -> Option<String> {
    let quote_re = Regex::new(r#"["']([^"']+)["']"#).unwrap();
    quote_re.captures(text).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn step(action: &str, write: bool) -> Step {
        Step {
            id: "s1".to_string(),
            order: 0,
            action: action.to_string(),
            parameters: HashMap::new(),
            depends_on: Vec::new(),
            phase: StepPhase::Execution,
            is_write_operation: write,
            status: StepStatus::Pending,
        }
    }

    #[test]
    fn network_errors_retry_with_backoff() {
        let recovery = RecoveryManager::new();
        let action = recovery.recover(&step(crate::actions::WRITE_RANGE, true), "network timeout");
        assert!(matches!(action, Some(RecoveryAction::Retry { delay_ms: 2000 })));
    }

    #[test]
    fn retry_exhaustion_falls_through_to_default() {
        let recovery = RecoveryManager::with_max_retries(2);
        let s = step(crate::actions::WRITE_RANGE, true);
        assert!(matches!(recovery.recover(&s, "network timeout"), Some(RecoveryAction::Retry { .. })));
        assert!(matches!(recovery.recover(&s, "network timeout"), Some(RecoveryAction::Retry { .. })));
        // third failure: retry budget exhausted, falls to `default`, which
        // returns None for a write step.
        assert!(recovery.recover(&s, "network timeout").is_none());
    }

    #[test]
    fn range_not_found_substitutes_read_selection() {
        let recovery = RecoveryManager::new();
        let action = recovery.recover(&step(crate::actions::READ_RANGE, false), "Range A1:Z99 not found");
        match action {
            Some(RecoveryAction::Substitute { alternative_step }) => {
                assert_eq!(alternative_step.action, crate::actions::READ_SELECTION);
            }
            _ => panic!("expected Substitute"),
        }
    }

    #[test]
    fn formula_error_only_applies_to_set_formula_steps() {
        let recovery = RecoveryManager::new();
        assert!(recovery.recover(&step(crate::actions::SET_FORMULA, true), "formula error").is_some());
        // Not applicable to write_range — falls through to `default`, which
        // returns None for a write step.
        assert!(recovery.recover(&step(crate::actions::WRITE_RANGE, true), "formula error").is_none());
    }

    #[test]
    fn permission_error_aborts_write_but_skips_read() {
        let recovery = RecoveryManager::new();
        assert!(matches!(
            recovery.recover(&step(crate::actions::WRITE_RANGE, true), "permission denied"),
            Some(RecoveryAction::Abort { .. })
        ));
        assert!(matches!(
            recovery.recover(&step(crate::actions::READ_RANGE, false), "permission denied"),
            Some(RecoveryAction::Skip { .. })
        ));
    }

    #[test]
    fn unmatched_write_failure_is_unrecoverable() {
        let recovery = RecoveryManager::new();
        assert!(recovery.recover(&step(crate::actions::WRITE_RANGE, true), "something weird happened").is_none());
    }

    #[test]
    fn unmatched_read_failure_is_skipped() {
        let recovery = RecoveryManager::new();
        assert!(matches!(
            recovery.recover(&step(crate::actions::READ_RANGE, false), "something weird happened"),
            Some(RecoveryAction::Skip { .. })
        ));
    }
}
