//! Lightweight intent classification: regex/keyword features. A semantic
//! classifier can replace this behind the same function when available.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// `when`, `yesterday`, timestamps → event log.
    Temporal,
    /// `what is`, `define` → facts.
    Factual,
    /// `related`, `path from` → graph.
    Relational,
    /// `how do i`, imperative verbs → procedures.
    Procedural,
    /// `how confident`, `quality of` → meta.
    Meta,
    /// Everything else: fan out to facts, events, graph.
    General,
}

impl Intent {
    /// Layer names this intent routes to, in priority order.
    pub fn layers(self) -> &'static [&'static str] {
        match self {
            Self::Temporal => &["events"],
            Self::Factual => &["facts"],
            Self::Relational => &["graph"],
            Self::Procedural => &["procedures"],
            Self::Meta => &["meta"],
            Self::General => &["facts", "events", "graph"],
        }
    }

    /// Merge tie-break priority: higher wins. Graph > facts > events >
    /// procedures for factual intents, tunable by profile later.
    pub fn layer_priority(self, layer: &str) -> u8 {
        match layer {
            "graph" => 4,
            "facts" => 3,
            "events" => 2,
            "procedures" => 1,
            _ => 0,
        }
    }
}

fn patterns() -> &'static [(Intent, Regex)] {
    static CELL: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        vec![
            (
                Intent::Temporal,
                Regex::new(
                    r"(?i)\b(when|yesterday|today|last (week|month|night)|ago|timeline|history|recently)\b|\d{4}-\d{2}-\d{2}",
                )
                .expect("temporal regex"),
            ),
            (
                Intent::Meta,
                Regex::new(r"(?i)\b(how confident|confidence|quality of|how reliable|expertise|metrics?)\b")
                    .expect("meta regex"),
            ),
            (
                Intent::Relational,
                Regex::new(r"(?i)\b(related|relation|path (from|to|between)|connects?|depends? on|linked)\b")
                    .expect("relational regex"),
            ),
            (
                Intent::Procedural,
                Regex::new(r"(?i)\b(how (do|to|can) (i|we|you)|steps? (to|for)|procedure|workflow|recipe)\b")
                    .expect("procedural regex"),
            ),
            (
                Intent::Factual,
                Regex::new(r"(?i)\b(what (is|are|was)|define|definition|meaning of|explain)\b")
                    .expect("factual regex"),
            ),
        ]
    })
}

/// Classify free text. First matching rule wins; rules are ordered from
/// most to least specific, `General` when nothing matches.
pub fn classify(text: &str) -> Intent {
    for (intent, regex) in patterns() {
        if regex.is_match(text) {
            return *intent;
        }
    }
    Intent::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporal_phrasings() {
        assert_eq!(classify("when did the deploy happen"), Intent::Temporal);
        assert_eq!(classify("what failed yesterday"), Intent::Temporal);
        assert_eq!(classify("events on 2026-03-01"), Intent::Temporal);
    }

    #[test]
    fn factual_phrasings() {
        assert_eq!(classify("what is the cache layer"), Intent::Factual);
        assert_eq!(classify("define consolidation"), Intent::Factual);
    }

    #[test]
    fn relational_phrasings() {
        assert_eq!(classify("how is redis related to the session store"), Intent::Relational);
        assert_eq!(classify("path from parser to emitter"), Intent::Relational);
    }

    #[test]
    fn procedural_phrasings() {
        assert_eq!(classify("how do I rotate credentials"), Intent::Procedural);
        assert_eq!(classify("steps to cut a release"), Intent::Procedural);
    }

    #[test]
    fn meta_phrasings() {
        assert_eq!(classify("how confident are we about infra facts"), Intent::Meta);
        assert_eq!(classify("quality of the memory layer"), Intent::Meta);
    }

    #[test]
    fn fallback_is_general() {
        assert_eq!(classify("redis eviction behaviour"), Intent::General);
    }
}
