//! Folding subtest failures into their top-level test.

use std::collections::BTreeMap;

use crate::event::{TestEvent, is_top_level, top_level_name};

/// Failure output keyed by test name.
pub type Failures = BTreeMap<String, Vec<TestEvent>>;

/// Merges every failed subtest into the entry of its top-level test, so that
/// exactly one report is filed per top-level test.
///
/// A parent's own output comes first, followed by its subtests' output in
/// name order. Parents that never failed themselves get an entry created.
/// Consolidating an already consolidated map returns it unchanged.
pub fn consolidate(failures: Failures) -> Failures {
    let (parents, subtests): (Failures, Failures) = failures
        .into_iter()
        .partition(|(test, _)| is_top_level(test));

    let mut consolidated = Failures::new();
    for (test, events) in parents {
        tracing::debug!(test = %test, "failed parent test");
        consolidated.insert(test, events);
    }
    for (test, events) in subtests {
        let parent = top_level_name(&test);
        tracing::debug!(subtest = %test, parent, "consolidating failed subtest into parent test");
        consolidated
            .entry(parent.to_string())
            .or_default()
            .extend(events);
    }
    consolidated
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::Action;

    fn output(test: &str, text: &str) -> TestEvent {
        TestEvent::new(Action::Output, test).with_output(text)
    }

    fn texts(events: &[TestEvent]) -> Vec<&str> {
        events.iter().map(|e| e.output.as_str()).collect()
    }

    #[test]
    fn test_folds_subtests_into_parent() {
        let mut failures = Failures::new();
        failures.insert("TestA/b".into(), vec![output("TestA/b", "b failed\n")]);
        failures.insert("TestA".into(), vec![output("TestA", "a failed\n")]);
        failures.insert("TestA/a".into(), vec![output("TestA/a", "a/a failed\n")]);
        failures.insert("TestB".into(), vec![output("TestB", "b\n")]);

        let consolidated = consolidate(failures);

        assert_eq!(consolidated.len(), 2);
        assert_eq!(
            texts(&consolidated["TestA"]),
            ["a failed\n", "a/a failed\n", "b failed\n"]
        );
        assert_eq!(texts(&consolidated["TestB"]), ["b\n"]);
    }

    #[test]
    fn test_creates_missing_parent_entry() {
        let mut failures = Failures::new();
        failures.insert("TestA/sub".into(), vec![output("TestA/sub", "x")]);

        let consolidated = consolidate(failures);

        assert_eq!(consolidated.keys().collect::<Vec<_>>(), ["TestA"]);
        assert_eq!(texts(&consolidated["TestA"]), ["x"]);
    }

    #[test]
    fn test_nested_subtests_fold_into_top_level() {
        let mut failures = Failures::new();
        failures.insert("TestA/b/c".into(), vec![output("TestA/b/c", "deep")]);

        let consolidated = consolidate(failures);

        assert!(consolidated.contains_key("TestA"));
        assert!(!consolidated.contains_key("TestA/b"));
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let mut failures = Failures::new();
        failures.insert("TestA/x".into(), vec![output("TestA/x", "1")]);
        failures.insert("TestA/y".into(), vec![output("TestA/y", "2")]);
        failures.insert("TestC".into(), Vec::new());

        let once = consolidate(failures);
        let twice = consolidate(once.clone());

        assert_eq!(once, twice);
    }
}
