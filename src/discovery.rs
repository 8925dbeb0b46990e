use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::registry::ToolRegistry;
use crate::synonyms::{ACTION_SYNONYMS, ENTITY_SYNONYMS};
use crate::types::IntentAtom;

const ACTION_WEIGHT: f64 = 0.8;
const ENTITY_WEIGHT: f64 = 0.7;
const CATEGORY_WEIGHT: f64 = 0.5;
const STATS_BLEND: f64 = 0.3;
const EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Default)]
struct ToolStats {
    success_rate: f64,
    avg_duration_ms: f64,
    samples: u32,
}

#[derive(Debug, Clone)]
pub struct ScoredTool {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub limit: usize,
    pub min_score: f64,
    pub use_stats: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self { limit: 5, min_score: 0.1, use_stats: true }
    }
}

/// Ranks registered tools against the semantic atoms extracted from a
/// message — a weighted tag index plus a rolling success-rate stat,
/// recomputed from the registry on every `discover()` call so a tool added
/// or disabled mid-session is picked up immediately.
pub struct ToolDiscovery<'a> {
    registry: &'a ToolRegistry,
    stats: Mutex<HashMap<String, ToolStats>>,
}

impl<'a> ToolDiscovery<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry, stats: Mutex::new(HashMap::new()) }
    }

    pub fn discover(&self, atoms: &[IntentAtom], options: &DiscoveryOptions) -> Vec<ScoredTool> {
        if atoms.is_empty() {
            return Vec::new();
        }

        let summaries = self.registry.query(None, None, true);
        let stats = self.stats.lock().unwrap();

        let mut scored: Vec<ScoredTool> = summaries
            .iter()
            .filter_map(|summary| {
                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;

                for atom in atoms {
                    if let Some(action) = &atom.action {
                        weight_total += ACTION_WEIGHT;
                        if tag_matches(action, &summary.name, &summary.group, &ACTION_SYNONYMS) {
                            weighted_sum += ACTION_WEIGHT;
                        }
                    }
                    if let Some(entity) = &atom.entity {
                        weight_total += ENTITY_WEIGHT;
                        if tag_matches(entity, &summary.name, &summary.group, &ENTITY_SYNONYMS) {
                            weighted_sum += ENTITY_WEIGHT;
                        }
                    }
                    if let Some(domain) = &atom.domain {
                        weight_total += CATEGORY_WEIGHT;
                        if summary.group.eq_ignore_ascii_case(domain) {
                            weighted_sum += CATEGORY_WEIGHT;
                        }
                    }
                }

                if weight_total == 0.0 {
                    return None;
                }

                let mut score = weighted_sum / weight_total;
                if options.use_stats {
                    if let Some(s) = stats.get(&summary.name) {
                        if s.samples > 0 {
                            score = score * (1.0 - STATS_BLEND) + s.success_rate * STATS_BLEND;
                        }
                    }
                }

                if score < options.min_score {
                    return None;
                }

                Some(ScoredTool { name: summary.name.clone(), score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let oa = self.registry.registration_order(&a.name).unwrap_or(usize::MAX);
                    let ob = self.registry.registration_order(&b.name).unwrap_or(usize::MAX);
                    oa.cmp(&ob)
                })
        });
        scored.truncate(options.limit);
        scored
    }

    /// Folds a fresh success/duration sample into a tool's running stats
    /// with an exponential moving average — recent outcomes matter more
    /// than historical ones, without keeping unbounded sample history.
    pub fn update_stats(&self, tool_name: &str, success: bool, duration_ms: u64) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(tool_name.to_string()).or_default();
        let sample = if success { 1.0 } else { 0.0 };
        if entry.samples == 0 {
            entry.success_rate = sample;
            entry.avg_duration_ms = duration_ms as f64;
        } else {
            entry.success_rate = entry.success_rate * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA;
            entry.avg_duration_ms = entry.avg_duration_ms * (1.0 - EMA_ALPHA) + duration_ms as f64 * EMA_ALPHA;
        }
        entry.samples += 1;
    }
}

fn tag_matches(
    atom_value: &str,
    tool_name: &str,
    tool_group: &str,
    synonyms: &HashMap<&'static str, &'static [&'static str]>,
) -> bool {
    let haystack = format!("{tool_name} {tool_group}").to_lowercase();
    if haystack.contains(&atom_value.to_lowercase()) {
        return true;
    }
    if let Some(words) = synonyms.get(atom_value) {
        return words.iter().any(|w| haystack.contains(w));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistrationOptions;
    use crate::types::{ParameterDescriptor, ToolResult};
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    struct StubTool(&'static str, &'static str);

    #[async_trait]
    impl crate::registry::Tool for StubTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn category(&self) -> &str {
            self.1
        }
        fn parameters(&self) -> &[ParameterDescriptor] {
            &[]
        }
        async fn invoke(&self, _input: &Map<String, serde_json::Value>) -> ToolResult {
            ToolResult::ok(serde_json::Value::Null)
        }
    }

    fn atom(action: &str, entity: &str) -> IntentAtom {
        IntentAtom { action: Some(action.to_string()), entity: Some(entity.to_string()), modifiers: Vec::new(), domain: None, raw_text: None }
    }

    #[test]
    fn ranks_matching_tool_above_unrelated_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool("write_range", "write")), RegistrationOptions { group: "write".into(), ..Default::default() });
        registry.register(Arc::new(StubTool("create_chart", "chart")), RegistrationOptions { group: "chart".into(), ..Default::default() });

        let discovery = ToolDiscovery::new(&registry);
        let results = discovery.discover(&[atom("write", "range")], &DiscoveryOptions::default());
        assert!(!results.is_empty());
        assert_eq!(results[0].name, "write_range");
    }

    #[test]
    fn empty_atoms_produce_no_candidates() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool("write_range", "write")), RegistrationOptions::default());
        let discovery = ToolDiscovery::new(&registry);
        assert!(discovery.discover(&[], &DiscoveryOptions::default()).is_empty());
    }

    #[test]
    fn stats_blend_into_score_after_use_stats_enabled() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool("write_range", "write")), RegistrationOptions { group: "write".into(), ..Default::default() });
        let discovery = ToolDiscovery::new(&registry);
        for _ in 0..5 {
            discovery.update_stats("write_range", false, 10);
        }
        let results = discovery.discover(&[atom("write", "range")], &DiscoveryOptions { min_score: 0.0, ..Default::default() });
        assert!(results[0].score < 1.0);
    }
}
