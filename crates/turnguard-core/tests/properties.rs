use std::sync::Arc;

use proptest::prelude::*;
use turnguard_core::{
    ContextExtractor, DecisionAggregator, Gate, Judgment, MemorySessionStore, Message, Mode,
    RuleId, RuleSet, Verdict,
};

const RULES: &str = "\
Skipped tests?,turn,block,Explain
Left TODOs?,last,block,List them
Evasive?,turn,notify,Explain
Tip?,turn,suggest,Add a regression test
Another tip?,last,suggest,Document the change
";

fn verdicts(flags: &[bool]) -> Vec<Verdict> {
    flags
        .iter()
        .enumerate()
        .map(|(i, triggered)| {
            Verdict::answered(
                RuleId(i),
                Judgment {
                    triggered: *triggered,
                    explanation: format!("rationale {i}"),
                },
            )
        })
        .collect()
}

fn user_messages() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec(".{0,80}", 0..8).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Message::user(text, i))
            .collect()
    })
}

proptest! {
    #[test]
    fn no_assistant_messages_means_no_context(
        messages in user_messages(),
        policy in proptest::option::of(".{1,40}"),
        min in 0usize..100,
    ) {
        let contexts = ContextExtractor::new(min).extract_all(&messages, policy.as_deref());
        prop_assert!(contexts.is_empty());
    }

    #[test]
    fn block_count_only_grows_through_blocks(
        rounds in prop::collection::vec(prop::collection::vec(any::<bool>(), 5), 1..30),
        max_blocks in 0u32..12,
    ) {
        let rules = RuleSet::from_csv(RULES).unwrap();
        let store = Arc::new(MemorySessionStore::new());
        let aggregator = DecisionAggregator::new(store.clone()).with_max_blocks(max_blocks);
        let ids: Vec<RuleId> = (0..5).map(RuleId).collect();

        let mut previous = 0;
        for flags in rounds {
            let decision = aggregator.decide("session", &rules, &ids, &verdicts(&flags));
            let current = store.count("session");

            if decision.is_block() {
                prop_assert_eq!(current, previous + 1);
            } else {
                prop_assert_eq!(current, previous);
            }
            prop_assert!(current <= max_blocks);

            let block_triggered = flags[0] || flags[1];
            if block_triggered && previous >= max_blocks {
                prop_assert!(!decision.is_block());
                prop_assert_eq!(decision.valve_exhausted, Some(previous));
            }
            previous = current;
        }
    }

    #[test]
    fn suggestions_do_not_depend_on_verdicts(flags in prop::collection::vec(any::<bool>(), 5)) {
        let rules = RuleSet::from_csv(RULES).unwrap();
        let aggregator = DecisionAggregator::new(Arc::new(MemorySessionStore::new()));
        let ids: Vec<RuleId> = (0..5).map(RuleId).collect();

        let decision = aggregator.decide("session", &rules, &ids, &verdicts(&flags));
        prop_assert_eq!(decision.suggestions.len(), 2);
    }

    #[test]
    fn short_final_message_only_skips_last_mode(
        text in "[a-z ]{1,49}",
        policy in "[A-Za-z ]{1,40}",
    ) {
        let messages = vec![Message::user("please fix", 0), Message::assistant(text, 1)];
        let contexts = ContextExtractor::new(50).extract_all(&messages, Some(&policy));

        prop_assert!(contexts.get(Mode::Last).is_none());
        prop_assert!(contexts.get(Mode::Turn).is_some());
        prop_assert!(contexts.get(Mode::ClaudeMd).is_some());
    }

    #[test]
    fn notify_never_coexists_with_block(flags in prop::collection::vec(any::<bool>(), 5)) {
        let rules = RuleSet::from_csv(RULES).unwrap();
        let aggregator = DecisionAggregator::new(Arc::new(MemorySessionStore::new()));
        let ids: Vec<RuleId> = (0..5).map(RuleId).collect();

        let decision = aggregator.decide("session", &rules, &ids, &verdicts(&flags));
        match decision.gate {
            Gate::Block { .. } => prop_assert!(flags[0] || flags[1]),
            Gate::Notify { .. } => prop_assert!(flags[2] && !flags[0] && !flags[1]),
            Gate::Pass => prop_assert!(!flags[0] && !flags[1] && !flags[2]),
        }
    }
}
