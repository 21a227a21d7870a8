//! # Synchronous Executor
//!
//! Drives rules in-line on the calling thread, strictly sequentially.
//! Per-rule state machine: optional pre-nested rules → `can_invoke` gate →
//! preactive rules → `before_invoke` → `invoke` → `after_invoke` → record
//! result → terminate-flag update → reactive rules → optional post-nested
//! rules. Nested invocation is position-gated by the rule's configuration
//! and independent of its own `can_invoke` outcome.

use crate::activation::{
    filter_activating, find_global_handler, find_local_handler, order_for_execution,
    ActivationIndex, RuleHandle,
};
use crate::context::RunContext;
use crate::error::{BoxError, CapturedError, EngineError};
use crate::init::SharedRule;
use crate::result::RuleResult;
use crate::rule::RuleKey;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct SyncExecutor<'m, M> {
    model: &'m mut M,
    ctx: RunContext,
    index: ActivationIndex<SharedRule<M>>,
    results: Vec<RuleResult>,
}

impl<'m, M> SyncExecutor<'m, M> {
    pub fn new(model: &'m mut M, ctx: RunContext, tree: &[SharedRule<M>]) -> Self {
        Self {
            model,
            ctx,
            index: ActivationIndex::build(tree),
            results: Vec::new(),
        }
    }

    pub fn run(&mut self, tree: &[SharedRule<M>]) -> Result<(), EngineError> {
        let batch = filter_activating(tree);
        self.execute(&batch, tree)
    }

    pub fn into_results(self) -> Vec<RuleResult> {
        self.results
    }

    /// Run one batch of rules. `level` is the unfiltered rule list of the
    /// current nesting level, the scope exception handlers are looked up in.
    fn execute(
        &mut self,
        batch: &[SharedRule<M>],
        level: &[SharedRule<M>],
    ) -> Result<(), EngineError> {
        for rule in order_for_execution(batch, false) {
            self.run_slot(&rule, level, true)?;
        }
        Ok(())
    }

    fn run_slot(
        &mut self,
        rule: &SharedRule<M>,
        level: &[SharedRule<M>],
        recover: bool,
    ) -> Result<(), EngineError> {
        let nested_first = rule.borrow().core().config.invoke_nested_rules_first;
        if nested_first {
            self.invoke_nested(rule)?;
        }

        if self.can_invoke(rule) {
            let preactive = self.index.preactive_for(rule.key());
            self.execute(&preactive, level)?;

            match self.invoke_lifecycle(rule) {
                Ok(result) => {
                    self.record(result, rule.key());
                    self.update_terminate(rule);
                    let reactive = self.index.reactive_for(rule.key());
                    self.execute(&reactive, level)?;
                }
                Err(error) => self.recover(rule, error, level, recover)?,
            }
        }

        if !nested_first {
            self.invoke_nested(rule)?;
        }
        Ok(())
    }

    fn invoke_nested(&mut self, rule: &SharedRule<M>) -> Result<(), EngineError> {
        let children = rule.children();
        if children.is_empty() {
            return Ok(());
        }
        let batch = filter_activating(children);
        self.execute(&batch, children)
    }

    fn can_invoke(&self, rule: &SharedRule<M>) -> bool {
        if self.ctx.terminated() {
            return false;
        }
        let guard = rule.borrow();
        let config = &guard.core().config;
        if config.skip {
            return false;
        }
        match &config.constraint {
            None => true,
            Some(constraint) => constraint(&*self.model),
        }
    }

    fn invoke_lifecycle(&mut self, rule: &SharedRule<M>) -> Result<RuleResult, BoxError> {
        let key = rule.key();
        let mut guard = rule.borrow_mut();
        debug!(rule = %key, "before_invoke");
        guard.before_invoke(self.model, &self.ctx)?;
        debug!(rule = %key, "invoke");
        let result = guard.invoke(self.model, &self.ctx)?;
        debug!(rule = %key, "after_invoke");
        guard.after_invoke(self.model, &self.ctx)?;
        Ok(result)
    }

    fn record(&mut self, mut result: RuleResult, key: RuleKey) {
        if result.name.is_none() {
            result.name = Some(key.to_string());
        }
        self.results.push(result);
    }

    fn update_terminate(&self, rule: &SharedRule<M>) {
        if !self.ctx.terminated() && rule.borrow().core().config.terminate == Some(true) {
            debug!(rule = %rule.key(), "terminate requested");
            self.ctx.terminate();
        }
    }

    /// Failure cascade: the handler observing the failed rule preempts the
    /// level's global handler; with neither, the failure aborts the run.
    /// A handler's own failure is not re-caught.
    fn recover(
        &mut self,
        failed: &SharedRule<M>,
        error: BoxError,
        level: &[SharedRule<M>],
        recover: bool,
    ) -> Result<(), EngineError> {
        let captured: CapturedError = Arc::from(error);
        if recover {
            let handler = find_local_handler(level, failed.key())
                .or_else(|| find_global_handler(level));
            if let Some(handler) = handler {
                warn!(
                    rule = %failed.key(),
                    handler = %handler.key(),
                    error = %captured,
                    "rule failed; invoking exception handler"
                );
                handler
                    .borrow_mut()
                    .core_mut()
                    .set_unhandled_error(Arc::clone(&captured));
                return self.run_slot(&handler, level, false);
            }
        }
        Err(EngineError::RuleFailed {
            rule: failed.key(),
            source: captured,
        })
    }
}
