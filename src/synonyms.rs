//! Closed synonym tables used by the Intent Parser to extract semantic
//! atoms from a raw message, and by Tool Discovery to score tools against
//! those atoms. Kept as static data rather than a learned model — the set
//! of actions and entities a spreadsheet assistant deals with is small and
//! stable.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub static ACTION_SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("create", ["create", "make", "build", "add", "new", "generate", "insert"].as_slice()),
        ("write", ["write", "enter", "type", "fill", "populate", "put"].as_slice()),
        ("update", ["update", "change", "edit", "modify", "revise"].as_slice()),
        ("delete", ["delete", "remove", "clear", "erase", "wipe"].as_slice()),
        ("format", ["format", "style", "color", "colour", "bold", "highlight"].as_slice()),
        ("calculate", ["calculate", "compute", "sum", "total", "average"].as_slice()),
        ("sort", ["sort", "order", "arrange", "rank"].as_slice()),
        ("filter", ["filter", "show only", "hide", "restrict"].as_slice()),
        ("analyze", ["analyze", "analyse", "summarize", "summarise", "insight", "trend"].as_slice()),
        ("query", ["find", "lookup", "look up", "search", "what is", "show me"].as_slice()),
        ("switch", ["switch", "go to", "navigate", "open"].as_slice()),
        ("clean", ["clean", "dedupe", "deduplicate", "tidy", "normalize"].as_slice()),
    ])
});

pub static ENTITY_SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("table", ["table", "grid", "dataset"].as_slice()),
        ("sheet", ["sheet", "tab", "worksheet"].as_slice()),
        ("cell", ["cell", "box"].as_slice()),
        ("range", ["range", "cells", "area", "selection"].as_slice()),
        ("row", ["row", "rows", "record", "line"].as_slice()),
        ("column", ["column", "columns", "col", "field"].as_slice()),
        ("chart", ["chart", "graph", "plot", "visualization", "visualisation"].as_slice()),
        ("formula", ["formula", "function", "equation", "calc"].as_slice()),
        ("data", ["data", "values", "content", "contents"].as_slice()),
        ("duplicate", ["duplicate", "duplicates"].as_slice()),
    ])
});

/// Scans `text` for any synonym in `table`, returning the canonical key the
/// first match belongs to. Longest synonym first so multi-word phrases
/// (`"look up"`) win over shorter overlapping ones (`"look"`).
pub fn first_match(text: &str, table: &HashMap<&'static str, &'static [&'static str]>) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;
    for (canonical, synonyms) in table.iter() {
        for syn in synonyms.iter() {
            if lower.contains(syn) {
                let len = syn.len();
                if best.map(|(_, best_len)| len > best_len).unwrap_or(true) {
                    best = Some((canonical, len));
                }
            }
        }
    }
    best.map(|(canonical, _)| canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_action_synonym() {
        assert_eq!(first_match("please build me a table", &ACTION_SYNONYMS), Some("create"));
        assert_eq!(first_match("remove the duplicate rows", &ACTION_SYNONYMS), Some("delete"));
    }

    #[test]
    fn prefers_longer_phrase_match() {
        assert_eq!(first_match("can you look up the total", &ENTITY_SYNONYMS), None);
        assert_eq!(first_match("look up the total in column B", &ACTION_SYNONYMS), Some("query"));
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        assert_eq!(first_match("xyzzy plugh", &ACTION_SYNONYMS), None);
    }
}
