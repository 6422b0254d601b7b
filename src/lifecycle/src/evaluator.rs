//! Transition planning
//!
//! Matches a listing snapshot against the lifecycle rules and decides which
//! objects must change storage class. Evaluation is a pure function of its
//! inputs: it never talks to the store, so it can be tested without one.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::model::{ObjectId, StorageClass, StoredObject};
use crate::rule::LifecycleRule;

/// The rule that produced a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReason {
    pub rule_name: String,
    /// Declaration index of the rule.
    pub rule_index: usize,
}

/// A proposed storage class change for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub object: ObjectId,
    pub from: StorageClass,
    pub to: StorageClass,
    pub reason: TransitionReason,
}

impl Transition {
    /// Log this transition
    pub fn log(&self) {
        tracing::debug!(
            object = %self.object,
            from = %self.from,
            to = %self.to,
            rule = %self.reason.rule_name,
            "Planned transition"
        );
    }
}

/// Select the winning rule for `object`: lowest priority number among the
/// matching rules, earliest declaration on ties.
fn select_rule<'a>(
    object: &StoredObject,
    rules: &'a [LifecycleRule],
    now: DateTime<Utc>,
) -> Option<(usize, &'a LifecycleRule)> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.matches(object, now))
        .min_by_key(|(index, rule)| (rule.priority, *index))
}

/// Compute the transitions required for `objects` at `now`.
///
/// At most one transition is emitted per object, never one whose target
/// equals the current class, and output order follows input order.
pub fn evaluate(
    objects: &[StoredObject],
    rules: &[LifecycleRule],
    now: DateTime<Utc>,
) -> Vec<Transition> {
    objects
        .iter()
        .filter_map(|object| {
            let (rule_index, rule) = select_rule(object, rules, now)?;
            if rule.target == object.class {
                return None;
            }
            Some(Transition {
                object: object.id.clone(),
                from: object.class,
                to: rule.target,
                reason: TransitionReason {
                    rule_name: rule.name.clone(),
                    rule_index,
                },
            })
        })
        .collect()
}

/// Holds the rule set loaded at start-up.
#[derive(Debug, Clone)]
pub struct LifecycleEvaluator {
    rules: Arc<[LifecycleRule]>,
}

impl LifecycleEvaluator {
    pub fn new(rules: Vec<LifecycleRule>) -> Self {
        for (index, rule) in rules.iter().enumerate() {
            tracing::info!(index, rule = %rule.display(), "Loaded lifecycle rule");
        }
        if rules.is_empty() {
            tracing::warn!("No lifecycle rules configured, cycles will never plan transitions");
        }
        Self {
            rules: rules.into(),
        }
    }

    pub fn rules(&self) -> &[LifecycleRule] {
        &self.rules
    }

    pub fn evaluate(&self, objects: &[StoredObject], now: DateTime<Utc>) -> Vec<Transition> {
        evaluate(objects, &self.rules, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::SourceClass;
    use std::time::Duration;

    const DAY: u64 = 24 * 3600;

    fn object(name: &str, class: StorageClass, age_days: i64, now: DateTime<Utc>) -> StoredObject {
        StoredObject {
            id: ObjectId::new("uploads", name),
            last_modified: now - chrono::Duration::days(age_days),
            class,
            size: Some(1024),
        }
    }

    fn hot_to_cool() -> LifecycleRule {
        LifecycleRule::new(
            SourceClass::Class(StorageClass::Hot),
            Duration::from_secs(30 * DAY),
            StorageClass::Cool,
        )
        .with_priority(1)
    }

    #[test]
    fn test_old_hot_object_moves_to_cool() {
        let now = Utc::now();
        let objects = vec![object("X", StorageClass::Hot, 31, now)];

        let transitions = evaluate(&objects, &[hot_to_cool()], now);

        assert_eq!(transitions.len(), 1);
        let t = &transitions[0];
        assert_eq!(t.object, ObjectId::new("uploads", "X"));
        assert_eq!(t.from, StorageClass::Hot);
        assert_eq!(t.to, StorageClass::Cool);
        assert_eq!(t.reason.rule_index, 0);
    }

    #[test]
    fn test_young_cool_object_is_left_alone() {
        let now = Utc::now();
        let objects = vec![object("Y", StorageClass::Cool, 5, now)];
        assert!(evaluate(&objects, &[hot_to_cool()], now).is_empty());
    }

    #[test]
    fn test_young_hot_object_is_left_alone() {
        let now = Utc::now();
        let objects = vec![object("Z", StorageClass::Hot, 29, now)];
        assert!(evaluate(&objects, &[hot_to_cool()], now).is_empty());
    }

    #[test]
    fn test_object_already_in_target_class_emits_nothing() {
        let now = Utc::now();
        let to_cool_any = LifecycleRule::new(
            SourceClass::Any,
            Duration::from_secs(DAY),
            StorageClass::Cool,
        );
        let objects = vec![object("c", StorageClass::Cool, 400, now)];
        assert!(evaluate(&objects, &[to_cool_any], now).is_empty());
    }

    #[test]
    fn test_lower_priority_number_wins_regardless_of_order() {
        let now = Utc::now();
        let to_archive = LifecycleRule::new(
            SourceClass::Any,
            Duration::from_secs(90 * DAY),
            StorageClass::Archive,
        )
        .with_priority(0);
        let objects = vec![object("old", StorageClass::Hot, 120, now)];

        let forward = evaluate(&objects, &[hot_to_cool(), to_archive.clone()], now);
        let reversed = evaluate(&objects, &[to_archive, hot_to_cool()], now);

        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].to, StorageClass::Archive);
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].to, StorageClass::Archive);
    }

    #[test]
    fn test_priority_tie_goes_to_first_declared() {
        let now = Utc::now();
        let to_cold = LifecycleRule::new(
            SourceClass::Class(StorageClass::Hot),
            Duration::from_secs(DAY),
            StorageClass::Cold,
        )
        .with_priority(1)
        .with_name("hot-to-cold");
        let objects = vec![object("tie", StorageClass::Hot, 60, now)];

        let transitions = evaluate(&objects, &[to_cold, hot_to_cool()], now);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, StorageClass::Cold);
        assert_eq!(transitions[0].reason.rule_name, "hot-to-cold");
        assert_eq!(transitions[0].reason.rule_index, 0);
    }

    #[test]
    fn test_winning_noop_rule_suppresses_lower_ranked_rules() {
        let now = Utc::now();
        // Highest-priority match keeps archive objects where they are
        let keep = LifecycleRule::new(SourceClass::Any, Duration::ZERO, StorageClass::Archive)
            .with_priority(0);
        let to_cool = LifecycleRule::new(SourceClass::Any, Duration::ZERO, StorageClass::Cool)
            .with_priority(5);
        let objects = vec![object("a", StorageClass::Archive, 10, now)];

        assert!(evaluate(&objects, &[keep, to_cool], now).is_empty());
    }

    #[test]
    fn test_at_most_one_transition_per_object() {
        let now = Utc::now();
        let rules = vec![
            hot_to_cool(),
            LifecycleRule::new(
                SourceClass::Any,
                Duration::from_secs(DAY),
                StorageClass::Cold,
            )
            .with_priority(2),
            LifecycleRule::new(
                SourceClass::Any,
                Duration::from_secs(DAY),
                StorageClass::Archive,
            )
            .with_priority(3),
        ];
        let objects = vec![object("multi", StorageClass::Hot, 100, now)];

        let transitions = evaluate(&objects, &rules, now);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, StorageClass::Cool);
    }

    #[test]
    fn test_output_follows_input_order_and_is_repeatable() {
        let now = Utc::now();
        let objects = vec![
            object("c", StorageClass::Hot, 40, now),
            object("a", StorageClass::Cool, 40, now),
            object("b", StorageClass::Hot, 50, now),
            object("d", StorageClass::Hot, 1, now),
        ];
        let evaluator = LifecycleEvaluator::new(vec![hot_to_cool()]);

        let first = evaluator.evaluate(&objects, now);
        let second = evaluator.evaluate(&objects, now);

        let names: Vec<_> = first.iter().map(|t| t.object.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_rules_no_transitions() {
        let now = Utc::now();
        let objects = vec![object("x", StorageClass::Hot, 1000, now)];
        let evaluator = LifecycleEvaluator::new(vec![]);
        assert!(evaluator.rules().is_empty());
        assert!(evaluator.evaluate(&objects, now).is_empty());
    }
}
