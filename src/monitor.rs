use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub code: String,
    pub message: String,
    pub meta: HashMap<String, String>,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Success,
    Failure,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolUsageStats {
    pub calls: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredTask {
    pub task_id: String,
    pub request: String,
    pub intent: Option<IntentKind>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub phase: Option<String>,
    pub phase_error: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub fallbacks: Vec<(String, String, String)>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatistics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub tool_usage_stats: HashMap<String, ToolUsageStats>,
    pub top_alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyCheck {
    pub used_but_not_registered: Vec<String>,
    pub registered_but_never_used: Vec<String>,
}

struct MonitorInner {
    tasks: HashMap<String, MonitoredTask>,
    order: VecDeque<String>,
    registered_tools: HashSet<String>,
    used_tools: HashSet<String>,
}

type AlertListener = Box<dyn Fn(&Alert) + Send + Sync>;

/// Bounded observability ledger over task/phase/tool-call lifecycles — a
/// ring of the most recent `capacity` tasks, mirroring the Tracer's own
/// bounded-history trace ring so the crate reuses one idiom for both
/// "remember the last N of these."
pub struct ExecutionMonitor {
    inner: Mutex<MonitorInner>,
    alerts: Mutex<Vec<Alert>>,
    listeners: Mutex<Vec<AlertListener>>,
    capacity: usize,
}

impl ExecutionMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                tasks: HashMap::new(),
                order: VecDeque::new(),
                registered_tools: HashSet::new(),
                used_tools: HashSet::new(),
            }),
            alerts: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn register_tools(&self, names: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.registered_tools.extend(names.iter().map(|s| s.to_string()));
    }

    pub fn start_task(&self, task_id: impl Into<String>, request: impl Into<String>) {
        let task_id = task_id.into();
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(
            task_id.clone(),
            MonitoredTask {
                task_id: task_id.clone(),
                request: request.into(),
                intent: None,
                started_at: Utc::now(),
                finished_at: None,
                success: None,
                phase: None,
                phase_error: None,
                tool_calls: Vec::new(),
                fallbacks: Vec::new(),
                error: None,
            },
        );
        inner.order.push_back(task_id);
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.tasks.remove(&evicted);
            }
        }
    }

    pub fn start_phase(&self, task_id: &str, phase_name: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.phase = Some(phase_name.to_string());
            task.phase_error = None;
        }
    }

    pub fn complete_phase(&self, task_id: &str, _phase_name: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.phase_error = None;
        }
    }

    pub fn fail_phase(&self, task_id: &str, phase_name: &str, error: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.phase = Some(phase_name.to_string());
            task.phase_error = Some(error.to_string());
        }
    }

    pub fn start_tool_call(&self, task_id: &str, tool_name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let registered = inner.registered_tools.is_empty() || inner.registered_tools.contains(tool_name);
        inner.used_tools.insert(tool_name.to_string());
        if let Some(task) = inner.tasks.get_mut(task_id) {
            let status = if registered { ToolCallStatus::Running } else { ToolCallStatus::NotFound };
            task.tool_calls.push(ToolCallRecord { tool_name: tool_name.to_string(), status, started_at: Utc::now(), finished_at: None });
        }
    }

    pub fn complete_tool_call(&self, task_id: &str, tool_name: &str) {
        self.finish_tool_call(task_id, tool_name, ToolCallStatus::Success);
    }

    pub fn fail_tool_call(&self, task_id: &str, tool_name: &str) {
        self.finish_tool_call(task_id, tool_name, ToolCallStatus::Failure);
    }

    fn finish_tool_call(&self, task_id: &str, tool_name: &str, status: ToolCallStatus) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            if let Some(call) = task.tool_calls.iter_mut().rev().find(|c| c.tool_name == tool_name && c.finished_at.is_none()) {
                if call.status != ToolCallStatus::NotFound {
                    call.status = status;
                }
                call.finished_at = Some(Utc::now());
            }
        }
    }

    pub fn record_fallback(&self, task_id: &str, original: &str, fallback: &str, reason: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.fallbacks.push((original.to_string(), fallback.to_string(), reason.to_string()));
        }
    }

    pub fn complete_task(&self, task_id: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.success = Some(true);
            task.finished_at = Some(Utc::now());
        }
    }

    pub fn fail_task(&self, task_id: &str, error: &str) {
        if let Some(task) = self.inner.lock().unwrap().tasks.get_mut(task_id) {
            task.success = Some(false);
            task.error = Some(error.to_string());
            task.finished_at = Some(Utc::now());
        }
    }

    pub fn raise(&self, level: AlertLevel, code: impl Into<String>, message: impl Into<String>, meta: HashMap<String, String>) {
        let alert = Alert { level, code: code.into(), message: message.into(), meta, raised_at: Utc::now(), acknowledged: false };
        for listener in self.listeners.lock().unwrap().iter() {
            listener(&alert);
        }
        self.alerts.lock().unwrap().push(alert);
    }

    pub fn add_alert_listener(&self, listener: AlertListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn get_unacknowledged(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().iter().filter(|a| !a.acknowledged).cloned().collect()
    }

    pub fn acknowledge(&self, index: usize) -> bool {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.get_mut(index) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn statistics(&self) -> MonitorStatistics {
        let inner = self.inner.lock().unwrap();
        let mut tool_usage_stats: HashMap<String, ToolUsageStats> = HashMap::new();
        let mut completed_tasks = 0;
        let mut failed_tasks = 0;

        for task in inner.tasks.values() {
            match task.success {
                Some(true) => completed_tasks += 1,
                Some(false) => failed_tasks += 1,
                None => {}
            }
            for call in &task.tool_calls {
                if call.status == ToolCallStatus::NotFound {
                    continue;
                }
                let entry = tool_usage_stats.entry(call.tool_name.clone()).or_default();
                entry.calls += 1;
                if call.status == ToolCallStatus::Failure {
                    entry.failures += 1;
                }
                if let Some(finished) = call.finished_at {
                    let duration = (finished - call.started_at).num_milliseconds().max(0) as f64;
                    let n = entry.calls as f64;
                    entry.avg_duration_ms += (duration - entry.avg_duration_ms) / n;
                }
            }
        }

        let top_alerts = self.alerts.lock().unwrap().iter().rev().take(10).cloned().collect();

        MonitorStatistics { total_tasks: inner.tasks.len(), completed_tasks, failed_tasks, tool_usage_stats, top_alerts }
    }

    pub fn consistency_check(&self) -> ConsistencyCheck {
        let inner = self.inner.lock().unwrap();
        let used_but_not_registered: Vec<String> = inner
            .used_tools
            .iter()
            .filter(|t| !inner.registered_tools.is_empty() && !inner.registered_tools.contains(*t))
            .cloned()
            .collect();
        let registered_but_never_used: Vec<String> =
            inner.registered_tools.iter().filter(|t| !inner.used_tools.contains(*t)).cloned().collect();
        ConsistencyCheck { used_but_not_registered, registered_but_never_used }
    }
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_task_counts_toward_statistics() {
        let monitor = ExecutionMonitor::new(10);
        monitor.start_task("t1", "write A1");
        monitor.complete_task("t1");
        let stats = monitor.statistics();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.failed_tasks, 0);
    }

    #[test]
    fn tool_call_against_unregistered_tool_is_not_found_and_excluded_from_tallies() {
        let monitor = ExecutionMonitor::new(10);
        monitor.register_tools(&["write_range"]);
        monitor.start_task("t1", "x");
        monitor.start_tool_call("t1", "mystery_tool");
        monitor.complete_tool_call("t1", "mystery_tool");
        let stats = monitor.statistics();
        assert!(!stats.tool_usage_stats.contains_key("mystery_tool"));
    }

    #[test]
    fn ring_evicts_oldest_task_past_capacity() {
        let monitor = ExecutionMonitor::new(2);
        monitor.start_task("t1", "a");
        monitor.start_task("t2", "b");
        monitor.start_task("t3", "c");
        assert_eq!(monitor.statistics().total_tasks, 2);
    }

    #[test]
    fn unacknowledged_alerts_are_listed_until_acknowledged() {
        let monitor = ExecutionMonitor::new(10);
        monitor.raise(AlertLevel::Warning, "slow_tool", "tool took too long", HashMap::new());
        assert_eq!(monitor.get_unacknowledged().len(), 1);
        monitor.acknowledge(0);
        assert_eq!(monitor.get_unacknowledged().len(), 0);
    }

    #[test]
    fn consistency_check_flags_unused_registered_tools() {
        let monitor = ExecutionMonitor::new(10);
        monitor.register_tools(&["write_range", "create_chart"]);
        monitor.start_task("t1", "x");
        monitor.start_tool_call("t1", "write_range");
        monitor.complete_tool_call("t1", "write_range");
        let check = monitor.consistency_check();
        assert_eq!(check.registered_but_never_used, vec!["create_chart".to_string()]);
        assert!(check.used_but_not_registered.is_empty());
    }
}
