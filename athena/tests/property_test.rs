//! Property suites for the universal invariants.

use proptest::prelude::*;

use athena_core::types::{Confidence, TaskStatus};

proptest! {
    /// Reinforcement with only contradictions never increases confidence;
    /// with only supports it never decreases.
    #[test]
    fn confidence_monotonicity(
        initial in 0.01f64..0.99,
        supports in 0u32..10,
        contradicts in 0u32..10,
        k in 0.05f64..1.0,
    ) {
        let confidence = Confidence::new(initial);
        if contradicts == 0 {
            let up = confidence.reinforced(supports, 0, k);
            prop_assert!(up.value() >= confidence.value() - 1e-12);
        }
        if supports == 0 {
            let down = confidence.reinforced(0, contradicts, k);
            prop_assert!(down.value() <= confidence.value() + 1e-12);
        }
        // Always clamped.
        let mixed = confidence.reinforced(supports, contradicts, k);
        prop_assert!((0.01..=0.99).contains(&mixed.value()));
    }

    /// A contradiction outweighs a single support at any starting point.
    #[test]
    fn contradictions_dominate_equal_supports(initial in 0.01f64..0.99) {
        let confidence = Confidence::new(initial);
        let mixed = confidence.reinforced(1, 1, 0.25);
        prop_assert!(mixed.value() <= confidence.value() + 1e-12);
    }

    /// No transition ever leaves a terminal state.
    #[test]
    fn terminal_states_are_sinks(
        target in prop::sample::select(vec![
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ]),
    ) {
        prop_assert!(!TaskStatus::Completed.can_transition_to(target));
        prop_assert!(!TaskStatus::Cancelled.can_transition_to(target));
    }

    /// Legal transitions keep the machine inside its five states and reach
    /// a terminal state at most once.
    #[test]
    fn transition_sequences_respect_the_machine(
        steps in prop::collection::vec(
            prop::sample::select(vec![
                TaskStatus::Pending,
                TaskStatus::Active,
                TaskStatus::Blocked,
                TaskStatus::Completed,
                TaskStatus::Cancelled,
            ]),
            0..12,
        ),
    ) {
        let mut state = TaskStatus::Pending;
        let mut terminal_entries = 0;
        for next in steps {
            if state.can_transition_to(next) {
                state = next;
                if state.is_terminal() {
                    terminal_entries += 1;
                }
            }
        }
        prop_assert!(terminal_entries <= 1);
    }
}

mod dedup {
    use std::sync::Arc;

    use proptest::prelude::*;

    use athena_core::config::AthenaConfig;
    use athena_core::deadline::Deadline;
    use athena_core::types::{EventContext, EventDraft, EventType, Outcome};
    use athena_ingest::{RecordOutcome, WritePipeline};
    use athena_storage::StorageEngine;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// `record_event(e); record_event(e)` yields exactly one row for
        /// any description and timestamp.
        #[test]
        fn recording_twice_yields_one_row(
            description in "[a-z]{4,12}( [a-z]{3,10}){1,4}",
            ts_secs in 0i64..1_000_000,
        ) {
            let storage = Arc::new(StorageEngine::open_in_memory(32).unwrap());
            let pipeline = WritePipeline::new(Arc::clone(&storage), &AthenaConfig::default());
            let draft = EventDraft {
                timestamp: chrono::TimeZone::timestamp_opt(&chrono::Utc, ts_secs, 0).unwrap(),
                session_id: "prop".into(),
                event_type: EventType::Decision,
                description,
                context: EventContext::default(),
                outcome: Outcome::Success,
            };

            let first = pipeline.record_event(&draft, Deadline::none()).unwrap();
            let second = pipeline.record_event(&draft, Deadline::none()).unwrap();

            match first {
                RecordOutcome::Recorded(id) => {
                    prop_assert_eq!(second, RecordOutcome::Duplicate { existing_id: id });
                }
                other => prop_assert!(false, "first record was {:?}", other),
            }
        }
    }
}
