//! # Rule Configuration
//!
//! Per-rule execution settings. A rule author sets a base [`RuleConfig`];
//! at the start of a run the initializer stamps it with the run id and,
//! when the nesting parent asks for it, overwrites the constraint with the
//! parent's so whole subtrees share one gate.

use crate::context::RunId;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Predicate over the model deciding whether a rule may run.
pub type Constraint<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Execution settings carried by every rule.
pub struct RuleConfig<M> {
    /// Skip execution unless this predicate holds on the current model.
    pub constraint: Option<Constraint<M>>,
    /// Skip the rule unconditionally.
    pub skip: bool,
    /// Tri-state termination request. `Some(true)` set by a rule makes the
    /// engine-wide terminate flag permanently true for the rest of the run.
    pub terminate: Option<bool>,
    /// Rules carrying an order run first, ascending; ties keep insertion
    /// order. Mutually exclusive with parallel scheduling.
    pub execution_order: Option<u32>,
    /// Invoke nested rules before this rule instead of after it.
    pub invoke_nested_rules_first: bool,
    /// Nested rules (and their descendants) inherit this rule's constraint.
    pub nested_rules_inherit_constraint: bool,
    run_id: Option<RunId>,
}

impl<M> RuleConfig<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate execution on a predicate over the model.
    pub fn constrain(mut self, constraint: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.constraint = Some(Arc::new(constraint));
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.execution_order = Some(order);
        self
    }

    /// Request engine-wide termination once this rule has executed.
    pub fn terminate(mut self) -> Self {
        self.terminate = Some(true);
        self
    }

    pub fn nested_first(mut self) -> Self {
        self.invoke_nested_rules_first = true;
        self
    }

    pub fn inherit_constraint(mut self) -> Self {
        self.nested_rules_inherit_constraint = true;
        self
    }

    /// The id of the run this configuration was initialized for, stamped by
    /// the engine; `None` before the rule has been initialized.
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    pub(crate) fn stamp_run(&mut self, run_id: RunId) {
        self.run_id = Some(run_id);
    }
}

impl<M> Default for RuleConfig<M> {
    fn default() -> Self {
        Self {
            constraint: None,
            skip: false,
            terminate: None,
            execution_order: None,
            invoke_nested_rules_first: false,
            nested_rules_inherit_constraint: false,
            run_id: None,
        }
    }
}

impl<M> Clone for RuleConfig<M> {
    fn clone(&self) -> Self {
        Self {
            constraint: self.constraint.clone(),
            skip: self.skip,
            terminate: self.terminate,
            execution_order: self.execution_order,
            invoke_nested_rules_first: self.invoke_nested_rules_first,
            nested_rules_inherit_constraint: self.nested_rules_inherit_constraint,
            run_id: self.run_id,
        }
    }
}

impl<M> fmt::Debug for RuleConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleConfig")
            .field("constrained", &self.constraint.is_some())
            .field("skip", &self.skip)
            .field("terminate", &self.terminate)
            .field("execution_order", &self.execution_order)
            .field("invoke_nested_rules_first", &self.invoke_nested_rules_first)
            .field(
                "nested_rules_inherit_constraint",
                &self.nested_rules_inherit_constraint,
            )
            .field("run_id", &self.run_id)
            .finish()
    }
}

/// Scheduling settings for a parallel rule.
///
/// A parallel rule's lifecycle runs on its own task, detached from the
/// ordered pass and joined when results are requested.
#[derive(Clone, Default)]
pub struct ParallelConfig {
    /// Checked before the rule body starts; an already-cancelled token makes
    /// the rule contribute no result.
    pub cancellation: Option<CancellationToken>,
    /// Runtime to spawn the task on. Defaults to the ambient runtime.
    pub runtime: Option<tokio::runtime::Handle>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn on_runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

impl fmt::Debug for ParallelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelConfig")
            .field("cancellable", &self.cancellation.is_some())
            .field("dedicated_runtime", &self.runtime.is_some())
            .finish()
    }
}
