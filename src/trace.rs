use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    IntentParse,
    Compile,
    Validate,
    Execute,
    Step,
    Respond,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

/// A single lightweight phase-transition note, distinct from a `Span` — cheap
/// enough to record on every phase boundary of an `OrchestrationContext` even
/// when full span tracing is skipped for the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub state: String,
    pub event: String,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub span_type: SpanType,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub events: Vec<SpanEvent>,
}

tokio::task_local! {
    static CURRENT_SPAN: RefCell<Option<u64>>;
}

/// Records nested spans for one orchestration run. Single-task flows (intent
/// parse → compile → validate) nest implicitly through a `task_local` stack;
/// the DAG Executor's concurrently-spawned step spans instead pass their
/// parent id explicitly, since each step runs in its own `tokio::spawn`ed
/// task with its own `task_local` scope.
pub struct Tracer {
    spans: Mutex<HashMap<u64, Span>>,
    order: Mutex<VecDeque<u64>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Tracer {
    pub fn new(capacity: usize) -> Self {
        Self { spans: Mutex::new(HashMap::new()), order: Mutex::new(VecDeque::new()), capacity: capacity.max(1), next_id: AtomicU64::new(1) }
    }

    /// Starts a span nested under whatever span is current in this task's
    /// `task_local` stack, if any.
    pub fn start_span(&self, name: impl Into<String>, span_type: SpanType) -> u64 {
        let parent = CURRENT_SPAN.try_with(|cell| *cell.borrow()).unwrap_or(None);
        self.start_span_with_parent(parent, name, span_type)
    }

    /// Starts a span under an explicitly-provided parent id, bypassing the
    /// `task_local` stack — the executor uses this for steps dispatched via
    /// `tokio::spawn`, which don't inherit the caller's task-local scope.
    pub fn start_span_with_parent(&self, parent: Option<u64>, name: impl Into<String>, span_type: SpanType) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let span = Span {
            id,
            parent_id: parent,
            name: name.into(),
            span_type,
            status: SpanStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            events: Vec::new(),
        };
        let mut spans = self.spans.lock().unwrap();
        let mut order = self.order.lock().unwrap();
        spans.insert(id, span);
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                spans.remove(&evicted);
            }
        }
        id
    }

    pub fn end_span(&self, id: u64, status: SpanStatus) {
        if let Some(span) = self.spans.lock().unwrap().get_mut(&id) {
            span.status = status;
            span.finished_at = Some(Utc::now());
        }
    }

    /// Attaches an event to `id`'s span if still retained in the ring,
    /// otherwise the event is silently dropped rather than resurrecting an
    /// evicted span.
    pub fn add_event_to(&self, id: u64, name: impl Into<String>, attributes: HashMap<String, String>) {
        if let Some(span) = self.spans.lock().unwrap().get_mut(&id) {
            span.events.push(SpanEvent { name: name.into(), timestamp: Utc::now(), attributes });
        }
    }

    /// Attaches an event to the task-local current span, if one is set; a
    /// no-op outside of `trace_async`'s scope.
    pub fn add_event(&self, name: impl Into<String>, attributes: HashMap<String, String>) {
        let current = CURRENT_SPAN.try_with(|cell| *cell.borrow()).unwrap_or(None);
        if let Some(id) = current {
            self.add_event_to(id, name, attributes);
        }
    }

    /// Runs `fut` with `id` installed as the task-local current span for its
    /// duration, so nested `start_span`/`add_event` calls inside it pick up
    /// `id` as their parent without threading it through every call site.
    pub async fn trace_async<F, T>(id: u64, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT_SPAN.scope(RefCell::new(Some(id)), fut).await
    }

    pub fn export(&self) -> Vec<Span> {
        let spans = self.spans.lock().unwrap();
        let order = self.order.lock().unwrap();
        order.iter().filter_map(|id| spans.get(id)).cloned().collect()
    }

    /// Groups exported spans by parent id, for a caller that wants to render
    /// a tree rather than a flat list.
    pub fn export_tree(&self) -> HashMap<Option<u64>, Vec<Span>> {
        let mut tree: HashMap<Option<u64>, Vec<Span>> = HashMap::new();
        for span in self.export() {
            tree.entry(span.parent_id).or_default().push(span);
        }
        tree
    }

    /// Flattens every span's events into one chronologically-ordered
    /// timeline, independent of span nesting.
    pub fn export_timeline(&self) -> Vec<(DateTime<Utc>, String)> {
        let mut timeline: Vec<(DateTime<Utc>, String)> = self
            .export()
            .into_iter()
            .flat_map(|span| span.events.into_iter().map(move |e| (e.timestamp, format!("{}: {}", span.name, e.name))))
            .collect();
        timeline.sort_by_key(|(ts, _)| *ts);
        timeline
    }

    pub fn len(&self) -> usize {
        self.order.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_end_span_roundtrip() {
        let tracer = Tracer::new(10);
        let id = tracer.start_span("compile", SpanType::Compile);
        tracer.end_span(id, SpanStatus::Ok);
        let exported = tracer.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].status, SpanStatus::Ok);
    }

    #[test]
    fn ring_evicts_oldest_span_past_capacity() {
        let tracer = Tracer::new(2);
        tracer.start_span("a", SpanType::Other);
        tracer.start_span("b", SpanType::Other);
        tracer.start_span("c", SpanType::Other);
        assert_eq!(tracer.len(), 2);
        let names: Vec<_> = tracer.export().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn trace_async_nests_child_spans_under_parent() {
        let tracer = Tracer::new(10);
        let parent = tracer.start_span("execute", SpanType::Execute);
        Tracer::trace_async(parent, async {
            let _child = tracer.start_span("step", SpanType::Step);
        })
        .await;
        let exported = tracer.export();
        let child = exported.iter().find(|s| s.name == "step").unwrap();
        assert_eq!(child.parent_id, Some(parent));
    }

    #[tokio::test]
    async fn add_event_attaches_to_current_task_local_span() {
        let tracer = Tracer::new(10);
        let id = tracer.start_span("execute", SpanType::Execute);
        Tracer::trace_async(id, async {
            tracer.add_event("invoking:write_range", HashMap::new());
        })
        .await;
        let exported = tracer.export();
        assert_eq!(exported[0].events.len(), 1);
    }
}
