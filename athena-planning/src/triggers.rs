//! Trigger predicate evaluation.
//!
//! - time: RFC 3339 instant, fires once now passes it.
//! - event: `type:<event_type>` matches the type, anything else is a
//!   case-insensitive substring or regex over the description.
//! - file: substring or regex over `context.file`.

use chrono::{DateTime, Utc};
use regex::Regex;

use athena_core::types::{Event, Trigger, TriggerKind};

/// Whether a time trigger is due at `now`.
pub fn time_due(trigger: &Trigger, now: DateTime<Utc>) -> bool {
    if trigger.kind != TriggerKind::Time {
        return false;
    }
    DateTime::parse_from_rfc3339(&trigger.predicate)
        .map(|t| now >= t.with_timezone(&Utc))
        .unwrap_or(false)
}

/// Whether an event trigger matches the given event.
pub fn event_matches(trigger: &Trigger, event: &Event) -> bool {
    match trigger.kind {
        TriggerKind::Event => {
            if let Some(type_name) = trigger.predicate.strip_prefix("type:") {
                return event.event_type.as_str() == type_name;
            }
            text_matches(&trigger.predicate, &event.description)
        }
        TriggerKind::File => event
            .context
            .file
            .as_deref()
            .map(|f| text_matches(&trigger.predicate, f))
            .unwrap_or(false),
        TriggerKind::Time => false,
    }
}

/// Substring match, upgraded to a regex match when the predicate compiles
/// and looks like one.
fn text_matches(predicate: &str, haystack: &str) -> bool {
    let lowered = haystack.to_lowercase();
    if lowered.contains(&predicate.to_lowercase()) {
        return true;
    }
    if predicate.chars().any(|c| "^$*+?[](){}|\\".contains(c)) {
        if let Ok(re) = Regex::new(predicate) {
            return re.is_match(haystack);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::types::{EventContext, EventDraft, EventType, Outcome};
    use chrono::TimeZone;

    fn event(description: &str, file: Option<&str>) -> Event {
        let draft = EventDraft {
            timestamp: Utc::now(),
            session_id: "s1".into(),
            event_type: EventType::Milestone,
            description: description.into(),
            context: EventContext { file: file.map(String::from), ..Default::default() },
            outcome: Outcome::Success,
        };
        Event {
            id: 1,
            timestamp: draft.timestamp,
            session_id: draft.session_id,
            event_type: draft.event_type,
            description: draft.description,
            context: draft.context,
            outcome: draft.outcome,
            fingerprint: "fp".into(),
            novelty: 1.0,
        }
    }

    #[test]
    fn time_trigger_fires_after_instant() {
        let trigger = Trigger {
            kind: TriggerKind::Time,
            predicate: "2026-01-01T00:00:00Z".into(),
        };
        assert!(!time_due(&trigger, Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap()));
        assert!(time_due(&trigger, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap()));
    }

    #[test]
    fn event_type_predicate_matches_type() {
        let trigger = Trigger { kind: TriggerKind::Event, predicate: "type:milestone".into() };
        assert!(event_matches(&trigger, &event("release cut", None)));
    }

    #[test]
    fn file_trigger_matches_context_file() {
        let trigger = Trigger { kind: TriggerKind::File, predicate: "deploy.sh".into() };
        assert!(event_matches(&trigger, &event("ran script", Some("ops/deploy.sh"))));
        assert!(!event_matches(&trigger, &event("ran script", None)));
    }

    #[test]
    fn regex_predicate_matches_description() {
        let trigger = Trigger { kind: TriggerKind::Event, predicate: r"^release v\d+".into() };
        assert!(event_matches(&trigger, &event("release v42 shipped", None)));
        assert!(!event_matches(&trigger, &event("hotfix shipped", None)));
    }
}
