//! The request-surface operation registry.
//!
//! Ten families, each with named verbs. Inputs are structured JSON objects
//! validated against a per-operation schema before dispatch: unknown
//! operations and missing/mistyped fields fail before any store is touched.

use std::collections::BTreeMap;

use serde_json::Value;

use athena_core::errors::{AthenaError, AthenaResult};

/// Field type expectations a schema can state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One operation's input contract.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub family: &'static str,
    pub verb: &'static str,
    pub required: &'static [(&'static str, FieldType)],
    pub optional: &'static [(&'static str, FieldType)],
}

impl OperationSpec {
    pub fn name(&self) -> std::string::String {
        format!("{}.{}", self.family, self.verb)
    }

    /// Validate an input object against this spec.
    pub fn validate(&self, input: &Value) -> AthenaResult<()> {
        let Some(object) = input.as_object() else {
            return Err(AthenaError::invalid("input", "must be a JSON object"));
        };
        for (field, field_type) in self.required {
            match object.get(*field) {
                None => {
                    return Err(AthenaError::invalid(*field, "required field missing"));
                }
                Some(value) if !field_type.matches(value) => {
                    return Err(AthenaError::invalid(
                        *field,
                        format!("expected {}", field_type.name()),
                    ));
                }
                Some(_) => {}
            }
        }
        for (field, field_type) in self.optional {
            if let Some(value) = object.get(*field) {
                if !value.is_null() && !field_type.matches(value) {
                    return Err(AthenaError::invalid(
                        *field,
                        format!("expected {}", field_type.name()),
                    ));
                }
            }
        }
        Ok(())
    }
}

use FieldType::*;

/// The stable operation table.
const OPERATIONS: &[OperationSpec] = &[
    // memory: the fact layer.
    OperationSpec { family: "memory", verb: "remember", required: &[("content", String)], optional: &[("domain", String), ("confidence", Number), ("source_event_ids", Array)] },
    OperationSpec { family: "memory", verb: "recall", required: &[("query", String)], optional: &[("k", Integer), ("vector_weight", Number), ("lexical_weight", Number), ("cursor", String)] },
    OperationSpec { family: "memory", verb: "reinforce", required: &[("fact_id", String)], optional: &[("support", Integer), ("contradict", Integer)] },
    OperationSpec { family: "memory", verb: "purge", required: &[], optional: &[("confidence_threshold", Number), ("grace_days", Integer)] },
    // episodic: the event log.
    OperationSpec { family: "episodic", verb: "record", required: &[("description", String), ("session_id", String), ("event_type", String)], optional: &[("timestamp", String), ("outcome", String), ("context", Object)] },
    OperationSpec { family: "episodic", verb: "record_batch", required: &[("events", Array)], optional: &[] },
    OperationSpec { family: "episodic", verb: "timeline", required: &[("from", String), ("to", String)], optional: &[("event_type", String), ("session_id", String), ("limit", Integer), ("cursor", String)] },
    OperationSpec { family: "episodic", verb: "session", required: &[("session_id", String)], optional: &[("limit", Integer), ("cursor", String)] },
    // graph.
    OperationSpec { family: "graph", verb: "upsert_entity", required: &[("name", String)], optional: &[("entity_type", String), ("properties", Object)] },
    OperationSpec { family: "graph", verb: "upsert_edge", required: &[("source_id", String), ("target_id", String), ("edge_type", String)], optional: &[("strength", Number), ("context", String)] },
    OperationSpec { family: "graph", verb: "find_paths", required: &[("src", String), ("dst", String)], optional: &[("max_hops", Integer)] },
    OperationSpec { family: "graph", verb: "detect_communities", required: &[], optional: &[("resolution", Number)] },
    OperationSpec { family: "graph", verb: "summarise_community", required: &[("community_id", String)], optional: &[] },
    // planning: tasks.
    OperationSpec { family: "planning", verb: "create_task", required: &[("title", String)], optional: &[("priority", String), ("deadline", String), ("triggers", Array), ("dependencies", Array)] },
    OperationSpec { family: "planning", verb: "transition", required: &[("task_id", String), ("status", String)], optional: &[] },
    OperationSpec { family: "planning", verb: "list_tasks", required: &[], optional: &[("status", String)] },
    OperationSpec { family: "planning", verb: "get_task", required: &[("task_id", String)], optional: &[] },
    // consolidation.
    OperationSpec { family: "consolidation", verb: "run", required: &[("window_start", String), ("window_end", String)], optional: &[("strategy", String), ("domain_filter", String)] },
    OperationSpec { family: "consolidation", verb: "status", required: &[], optional: &[] },
    // procedural.
    OperationSpec { family: "procedural", verb: "save", required: &[("name", String), ("steps", Array)], optional: &[("category", String), ("context_predicate", String), ("predecessor_id", String)] },
    OperationSpec { family: "procedural", verb: "list", required: &[], optional: &[("category", String), ("min_effectiveness", Number)] },
    OperationSpec { family: "procedural", verb: "record_execution", required: &[("procedure_id", String), ("success", Bool)], optional: &[] },
    OperationSpec { family: "procedural", verb: "rollback", required: &[("procedure_id", String)], optional: &[] },
    // prospective: triggers.
    OperationSpec { family: "prospective", verb: "activate_due", required: &[], optional: &[("now", String)] },
    OperationSpec { family: "prospective", verb: "notify_event", required: &[("event_id", Integer)], optional: &[] },
    // rag: the unified routed query.
    OperationSpec { family: "rag", verb: "query", required: &[("query", String)], optional: &[("k", Integer), ("domain", String), ("layers", Array), ("cursor", String)] },
    // code: sandboxed snippets over read-only views.
    OperationSpec { family: "code", verb: "run_snippet", required: &[("code", String)], optional: &[("layers", Array)] },
    // agent: self-knowledge.
    OperationSpec { family: "agent", verb: "stats", required: &[], optional: &[("layer", String), ("domain", String), ("since", String)] },
    OperationSpec { family: "agent", verb: "expertise", required: &[], optional: &[("domain", String)] },
];

/// Registry resolving `(family, verb)` pairs.
pub struct Registry;

impl Registry {
    /// Find an operation. `None` maps to `UnknownOperation` in the envelope.
    pub fn resolve(family: &str, verb: &str) -> Option<&'static OperationSpec> {
        OPERATIONS
            .iter()
            .find(|op| op.family == family && op.verb == verb)
    }

    /// All operations grouped by family, for discovery surfaces.
    pub fn by_family() -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut map: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for op in OPERATIONS {
            map.entry(op.family).or_default().push(op.verb);
        }
        map
    }
}
