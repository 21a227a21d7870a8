//! # Activation Index
//!
//! Precomputed lookup from an observed rule kind to the rules that must run
//! immediately before it (preactive) or immediately after it (reactive).
//! Built once per run from the full rule tree after initialization — rules
//! may declare their observation flags in their setup hook — and read-only
//! afterwards, so lookups during parallel execution need no locking.
//!
//! Also hosts the pass-composition helpers: which rules are eligible for
//! the main pass, in what order they run, and which rules are split out for
//! parallel scheduling.

use crate::config::RuleConfig;
use crate::rule::{RuleFlags, RuleKey};
use std::collections::HashMap;

/// Immutable per-rule metadata snapshotted when the shared handle tree is
/// built, so ordering, filtering and index lookups never lock the rule.
#[derive(Clone, Debug)]
pub(crate) struct RuleMeta {
    pub key: RuleKey,
    pub flags: RuleFlags,
    pub observes: Option<RuleKey>,
    pub execution_order: Option<u32>,
    pub parallel: bool,
}

impl RuleMeta {
    pub(crate) fn new<M>(
        key: RuleKey,
        flags: RuleFlags,
        observes: Option<RuleKey>,
        config: &RuleConfig<M>,
        parallel: bool,
    ) -> Self {
        Self {
            key,
            flags,
            observes,
            execution_order: config.execution_order,
            parallel,
        }
    }
}

/// A cheaply-cloneable handle to an initialized rule.
pub(crate) trait RuleHandle: Clone {
    fn meta(&self) -> &RuleMeta;
    fn children(&self) -> &[Self];
}

/// The preactive and reactive observation maps for one run.
pub(crate) struct ActivationIndex<R> {
    preactive: HashMap<RuleKey, Vec<R>>,
    reactive: HashMap<RuleKey, Vec<R>>,
}

impl<R: RuleHandle> ActivationIndex<R> {
    /// Walk the full tree — nested rules are indexed no matter what their
    /// parent's own flags are — and bucket observers by observed kind.
    pub fn build(rules: &[R]) -> Self {
        let mut index = Self {
            preactive: HashMap::new(),
            reactive: HashMap::new(),
        };
        index.collect(rules);
        index
    }

    fn collect(&mut self, rules: &[R]) {
        for rule in rules {
            let meta = rule.meta();
            if let Some(observed) = meta.observes {
                if meta.flags.preactive {
                    self.preactive.entry(observed).or_default().push(rule.clone());
                }
                if meta.flags.reactive {
                    self.reactive.entry(observed).or_default().push(rule.clone());
                }
            }
            self.collect(rule.children());
        }
    }

    pub fn preactive_for(&self, key: RuleKey) -> Vec<R> {
        self.preactive.get(&key).cloned().unwrap_or_default()
    }

    pub fn reactive_for(&self, key: RuleKey) -> Vec<R> {
        self.reactive.get(&key).cloned().unwrap_or_default()
    }
}

/// Rules eligible for the main pass: everything that only runs when
/// triggered — preactive, reactive and exception-handler rules — is
/// excluded and waits for its observed rule.
pub(crate) fn filter_activating<R: RuleHandle>(rules: &[R]) -> Vec<R> {
    rules
        .iter()
        .filter(|r| !r.meta().flags.is_triggered_only())
        .cloned()
        .collect()
}

/// Execution order for one batch: rules carrying an execution order first,
/// ascending with ties kept in source order, then the order-less rules in
/// source order. With `exclude_parallel_tail` the order-less tail drops
/// parallel rules (they are scheduled separately).
pub(crate) fn order_for_execution<R: RuleHandle>(rules: &[R], exclude_parallel_tail: bool) -> Vec<R> {
    let mut ordered: Vec<R> = rules
        .iter()
        .filter(|r| r.meta().execution_order.is_some())
        .cloned()
        .collect();
    ordered.sort_by_key(|r| r.meta().execution_order);

    let tail = rules.iter().filter(|r| {
        r.meta().execution_order.is_none() && !(exclude_parallel_tail && r.meta().parallel)
    });
    ordered.extend(tail.cloned());
    ordered
}

/// The rules of one batch scheduled as independent tasks: parallel and
/// order-less, in deterministic key order.
pub(crate) fn parallel_rules<R: RuleHandle>(rules: &[R]) -> Vec<R> {
    let mut parallel: Vec<R> = rules
        .iter()
        .filter(|r| r.meta().parallel && r.meta().execution_order.is_none())
        .cloned()
        .collect();
    parallel.sort_by_key(|r| r.meta().key.as_str());
    parallel
}

/// The exception handler scoped to `failed` at this nesting level, if any.
pub(crate) fn find_local_handler<R: RuleHandle>(level: &[R], failed: RuleKey) -> Option<R> {
    level
        .iter()
        .find(|r| r.meta().flags.exception_handler && r.meta().observes == Some(failed))
        .cloned()
}

/// The global exception handler at this nesting level, if any.
pub(crate) fn find_global_handler<R: RuleHandle>(level: &[R]) -> Option<R> {
    level
        .iter()
        .find(|r| r.meta().flags.global_exception_handler)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Handle {
        meta: RuleMeta,
        children: Vec<Handle>,
    }

    impl RuleHandle for Handle {
        fn meta(&self) -> &RuleMeta {
            &self.meta
        }

        fn children(&self) -> &[Self] {
            &self.children
        }
    }

    fn handle(key: &'static str, order: Option<u32>, parallel: bool) -> Handle {
        Handle {
            meta: RuleMeta {
                key: RuleKey::new(key),
                flags: RuleFlags::default(),
                observes: None,
                execution_order: order,
                parallel,
            },
            children: Vec::new(),
        }
    }

    fn observer(key: &'static str, observed: &'static str, reactive: bool) -> Handle {
        let mut h = handle(key, None, false);
        h.meta.observes = Some(RuleKey::new(observed));
        if reactive {
            h.meta.flags.reactive = true;
        } else {
            h.meta.flags.preactive = true;
        }
        h
    }

    fn keys(rules: &[Handle]) -> Vec<&'static str> {
        rules.iter().map(|r| r.meta.key.as_str()).collect()
    }

    #[test]
    fn ordered_rules_run_first_then_source_order() {
        let rules = vec![
            handle("a", None, false),
            handle("b", Some(2), false),
            handle("c", None, false),
            handle("d", Some(1), false),
        ];
        assert_eq!(keys(&order_for_execution(&rules, false)), ["d", "b", "a", "c"]);
    }

    #[test]
    fn execution_order_ties_keep_insertion_order() {
        let rules = vec![
            handle("a", Some(1), false),
            handle("b", Some(1), false),
            handle("c", Some(0), false),
        ];
        assert_eq!(keys(&order_for_execution(&rules, false)), ["c", "a", "b"]);
    }

    #[test]
    fn parallel_rules_leave_the_ordered_tail() {
        let rules = vec![
            handle("a", None, true),
            handle("b", None, false),
            handle("c", Some(1), true),
        ];
        assert_eq!(keys(&order_for_execution(&rules, true)), ["c", "b"]);
        assert_eq!(keys(&parallel_rules(&rules)), ["a"]);
    }

    #[test]
    fn triggered_rules_are_filtered_from_the_main_pass() {
        let mut hidden = handle("handler", None, false);
        hidden.meta.flags.exception_handler = true;
        let rules = vec![
            handle("a", None, false),
            observer("pre", "a", false),
            observer("re", "a", true),
            hidden,
        ];
        assert_eq!(keys(&filter_activating(&rules)), ["a"]);
    }

    #[test]
    fn index_visits_nested_rules_of_unflagged_parents() {
        let mut parent = handle("parent", None, false);
        parent.children.push(observer("child", "target", true));
        let rules = vec![parent, handle("target", None, false)];
        let index = ActivationIndex::build(&rules);
        assert_eq!(keys(&index.reactive_for(RuleKey::new("target"))), ["child"]);
        assert!(index.preactive_for(RuleKey::new("target")).is_empty());
    }
}
