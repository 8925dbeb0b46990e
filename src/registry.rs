use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ParameterDescriptor, ToolResult};

/// A single callable capability the orchestrator's DAG executor can invoke
/// by name. Implementations are owned by the host application (a
/// spreadsheet backend, a REST client, whatever); the core only ever sees
/// this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    fn parameters(&self) -> &[ParameterDescriptor];
    async fn invoke(&self, input: &HashMap<String, serde_json::Value>) -> ToolResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Active,
    Deprecated,
    Experimental,
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    namespace: String,
    group: String,
    tags: HashSet<String>,
    enabled: bool,
    status: ToolStatus,
    usage_count: u64,
    last_used_at: Option<DateTime<Utc>>,
    registered_order: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub namespace: String,
    pub group: String,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub status: ToolStatus,
    pub usage_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    pub namespace: String,
    pub group: String,
    pub tags: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEventKind {
    Registered,
    Unregistered,
    Enabled,
    Disabled,
    Deprecated,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
}

type Listener = Box<dyn Fn(&RegistryEvent) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatistics {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub deprecated: usize,
    pub by_group: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub total_tools: usize,
    pub enabled_tools: usize,
    pub issues: Vec<String>,
}

struct RegistryInner {
    tools: HashMap<String, RegisteredTool>,
    next_order: usize,
}

/// The single process-global collection of callable tools. `§5` calls this
/// out as the one shared-mutable-state component in the crate — guarded by
/// a plain `Mutex`, the same primitive the rest of the pack reaches for
/// when a shared map needs cheap, uncontended locking.
pub struct ToolRegistry {
    inner: Mutex<RegistryInner>,
    listeners: Mutex<Vec<Listener>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner { tools: HashMap::new(), next_order: 0 }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>, options: RegistrationOptions) {
        let name = tool.name().to_string();
        {
            let mut inner = self.inner.lock().unwrap();
            let order = inner.next_order;
            inner.next_order += 1;
            inner.tools.insert(
                name.clone(),
                RegisteredTool {
                    tool,
                    namespace: options.namespace,
                    group: options.group,
                    tags: options.tags,
                    enabled: true,
                    status: ToolStatus::Active,
                    usage_count: 0,
                    last_used_at: None,
                    registered_order: order,
                },
            );
        }
        self.emit(RegistryEventKind::Registered, &name);
        tracing::info!(tool = %name, "tool registered");
    }

    pub fn register_all(&self, tools: Vec<(Arc<dyn Tool>, RegistrationOptions)>) {
        for (tool, options) in tools {
            self.register(tool, options);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.lock().unwrap().tools.remove(name).is_some();
        if removed {
            self.emit(RegistryEventKind::Unregistered, name);
        }
        removed
    }

    pub fn unregister_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let names: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner.tools.keys().filter(|n| predicate(n)).cloned().collect()
        };
        for name in &names {
            self.unregister(name);
        }
        names.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let inner = self.inner.lock().unwrap();
        inner.tools.get(name).filter(|rt| rt.enabled).map(|rt| rt.tool.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.lock().unwrap().tools.contains_key(name)
    }

    pub fn enable(&self, name: &str) -> bool {
        let ok = {
            let mut inner = self.inner.lock().unwrap();
            inner.tools.get_mut(name).map(|rt| rt.enabled = true).is_some()
        };
        if ok {
            self.emit(RegistryEventKind::Enabled, name);
        }
        ok
    }

    pub fn disable(&self, name: &str) -> bool {
        let ok = {
            let mut inner = self.inner.lock().unwrap();
            inner.tools.get_mut(name).map(|rt| rt.enabled = false).is_some()
        };
        if ok {
            self.emit(RegistryEventKind::Disabled, name);
        }
        ok
    }

    pub fn deprecate(&self, name: &str) -> bool {
        let ok = {
            let mut inner = self.inner.lock().unwrap();
            inner.tools.get_mut(name).map(|rt| rt.status = ToolStatus::Deprecated).is_some()
        };
        if ok {
            self.emit(RegistryEventKind::Deprecated, name);
        }
        ok
    }

    pub fn record_usage(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rt) = inner.tools.get_mut(name) {
            rt.usage_count += 1;
            rt.last_used_at = Some(Utc::now());
        }
    }

    pub fn query(&self, group: Option<&str>, tag: Option<&str>, enabled_only: bool) -> Vec<ToolSummary> {
        let inner = self.inner.lock().unwrap();
        inner
            .tools
            .iter()
            .filter(|(_, rt)| group.map(|g| rt.group == g).unwrap_or(true))
            .filter(|(_, rt)| tag.map(|t| rt.tags.contains(t)).unwrap_or(true))
            .filter(|(_, rt)| !enabled_only || rt.enabled)
            .map(Self::summarize)
            .collect()
    }

    pub fn search(&self, text: &str) -> Vec<ToolSummary> {
        let lower = text.to_lowercase();
        let inner = self.inner.lock().unwrap();
        inner
            .tools
            .iter()
            .filter(|(_, rt)| rt.tool.name().to_lowercase().contains(&lower) || rt.tool.description().to_lowercase().contains(&lower))
            .map(Self::summarize)
            .collect()
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let inner = self.inner.lock().unwrap();
        let mut by_group: HashMap<String, usize> = HashMap::new();
        let mut enabled = 0;
        let mut deprecated = 0;
        for rt in inner.tools.values() {
            *by_group.entry(rt.group.clone()).or_insert(0) += 1;
            if rt.enabled {
                enabled += 1;
            }
            if rt.status == ToolStatus::Deprecated {
                deprecated += 1;
            }
        }
        RegistryStatistics { total: inner.tools.len(), enabled, disabled: inner.tools.len() - enabled, deprecated, by_group }
    }

    /// Reports `healthy: false` whenever the registry is empty, or every
    /// registered tool has been disabled — either state means the
    /// orchestrator has no way to execute any plan.
    pub fn health_check(&self) -> HealthCheckResult {
        let inner = self.inner.lock().unwrap();
        let total = inner.tools.len();
        let enabled = inner.tools.values().filter(|rt| rt.enabled).count();
        let mut issues = Vec::new();
        if total == 0 {
            issues.push("no tools registered".to_string());
        } else if enabled == 0 {
            issues.push("all registered tools are disabled".to_string());
        }
        HealthCheckResult { healthy: issues.is_empty(), total_tools: total, enabled_tools: enabled, issues }
    }

    pub fn add_event_listener(&self, listener: Listener) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Exposes registration order so Tool Discovery can use it as a
    /// deterministic tie-breaker when two tools score identically.
    pub fn registration_order(&self, name: &str) -> Option<usize> {
        self.inner.lock().unwrap().tools.get(name).map(|rt| rt.registered_order)
    }

    pub fn all_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().tools.keys().cloned().collect()
    }

    fn summarize((name, rt): (&String, &RegisteredTool)) -> ToolSummary {
        ToolSummary {
            name: name.clone(),
            namespace: rt.namespace.clone(),
            group: rt.group.clone(),
            tags: rt.tags.iter().cloned().collect(),
            enabled: rt.enabled,
            status: rt.status,
            usage_count: rt.usage_count,
        }
    }

    fn emit(&self, kind: RegistryEventKind, tool_name: &str) {
        let event = RegistryEvent { kind, tool_name: tool_name.to_string(), timestamp: Utc::now() };
        for listener in self.listeners.lock().unwrap().iter() {
            listener(&event);
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool {
        name: String,
        params: Vec<ParameterDescriptor>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn category(&self) -> &str {
            "test"
        }
        fn parameters(&self) -> &[ParameterDescriptor] {
            &self.params
        }
        async fn invoke(&self, input: &HashMap<String, serde_json::Value>) -> ToolResult {
            ToolResult::ok(serde_json::json!(input))
        }
    }

    fn echo(name: &str) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name: name.to_string(), params: Vec::new() })
    }

    #[test]
    fn register_and_get_roundtrip() {
        let registry = ToolRegistry::new();
        registry.register(echo("write_range"), RegistrationOptions::default());
        assert!(registry.has("write_range"));
        assert!(registry.get("write_range").is_some());
    }

    #[test]
    fn disabled_tool_is_not_returned_by_get() {
        let registry = ToolRegistry::new();
        registry.register(echo("write_range"), RegistrationOptions::default());
        registry.disable("write_range");
        assert!(registry.has("write_range"));
        assert!(registry.get("write_range").is_none());
    }

    #[test]
    fn health_check_flags_empty_registry() {
        let registry = ToolRegistry::new();
        let health = registry.health_check();
        assert!(!health.healthy);
    }

    #[test]
    fn health_check_flags_all_disabled() {
        let registry = ToolRegistry::new();
        registry.register(echo("a"), RegistrationOptions::default());
        registry.disable("a");
        assert!(!registry.health_check().healthy);
    }

    #[test]
    fn event_listener_sees_registration_and_removal() {
        let registry = ToolRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        registry.add_event_listener(Box::new(move |_evt| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register(echo("a"), RegistrationOptions::default());
        registry.unregister("a");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn query_filters_by_group_and_tag() {
        let registry = ToolRegistry::new();
        registry.register(
            echo("a"),
            RegistrationOptions { namespace: "sheet".into(), group: "write".into(), tags: ["range".to_string()].into() },
        );
        registry.register(
            echo("b"),
            RegistrationOptions { namespace: "sheet".into(), group: "read".into(), tags: [].into() },
        );
        assert_eq!(registry.query(Some("write"), None, false).len(), 1);
        assert_eq!(registry.query(None, Some("range"), false).len(), 1);
        assert_eq!(registry.query(None, None, false).len(), 2);
    }
}
