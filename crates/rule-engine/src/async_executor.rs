//! # Asynchronous/Parallel Executor
//!
//! Same per-rule state machine as the synchronous executor, but every phase
//! may suspend, and rules flagged parallel are split out of the ordered
//! pass onto independent tasks.
//!
//! For each parallel rule the full `before_invoke → invoke → after_invoke`
//! sequence runs as one spawned task (on the rule's supplied runtime handle
//! if any); the ordered pass continues without waiting. The preactive and
//! reactive batches of a parallel rule run inline around task scheduling.
//! All tasks are joined only when results are requested; a task whose
//! cancellation token was already cancelled before the body started
//! contributes no result.
//!
//! Within the ordered pass rules execute strictly one at a time. Parallel
//! rules guarantee no ordering relative to each other or to the ordered
//! pass — only that all are joined before the run's results are finalized.

use crate::activation::{
    filter_activating, find_global_handler, find_local_handler, order_for_execution,
    parallel_rules, ActivationIndex, RuleHandle,
};
use crate::context::{RunContext, SharedModel};
use crate::error::{BoxError, CapturedError, EngineError};
use crate::init::SharedAsyncRule;
use crate::logger::{RuleLogger, RuleRole, RuleSnapshot};
use crate::result::RuleResult;
use crate::rule::RuleKey;
use crate::BoxFuture;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub(crate) struct AsyncExecutor<M: Send + Sync + 'static> {
    model: SharedModel<M>,
    ctx: RunContext,
    index: ActivationIndex<SharedAsyncRule<M>>,
    logger: Option<Arc<dyn RuleLogger<M>>>,
    results: Vec<RuleResult>,
    parallel: Vec<ParallelSlot<M>>,
}

/// A scheduled parallel rule awaiting its join, with the exception-handler
/// candidates captured from its scheduling level so recovery at join time
/// stays scoped correctly.
struct ParallelSlot<M: Send + Sync + 'static> {
    key: RuleKey,
    handle: JoinHandle<Option<Result<RuleResult, BoxError>>>,
    local_handler: Option<SharedAsyncRule<M>>,
    global_handler: Option<SharedAsyncRule<M>>,
}

impl<M: Send + Sync + 'static> AsyncExecutor<M> {
    pub fn new(
        model: SharedModel<M>,
        ctx: RunContext,
        logger: Option<Arc<dyn RuleLogger<M>>>,
        tree: &[SharedAsyncRule<M>],
    ) -> Self {
        Self {
            model,
            ctx,
            index: ActivationIndex::build(tree),
            logger,
            results: Vec::new(),
            parallel: Vec::new(),
        }
    }

    pub async fn run(&mut self, tree: &[SharedAsyncRule<M>]) -> Result<(), EngineError> {
        let batch = filter_activating(tree);
        self.execute(&batch, tree).await
    }

    /// Join every parallel task and return the run's results: the ordered
    /// pass first, parallel results appended in scheduling order.
    pub async fn finish(mut self) -> Result<Vec<RuleResult>, EngineError> {
        let slots = std::mem::take(&mut self.parallel);
        for slot in slots {
            match slot.handle.await {
                Ok(None) => {}
                Ok(Some(Ok(result))) => self.results.push(result),
                Ok(Some(Err(error))) => {
                    let captured: CapturedError = Arc::from(error);
                    let handler = slot.local_handler.or(slot.global_handler);
                    match handler {
                        Some(handler) => {
                            warn!(
                                rule = %slot.key,
                                handler = %handler.key(),
                                error = %captured,
                                "parallel rule failed; invoking exception handler"
                            );
                            handler
                                .lock()
                                .await
                                .core_mut()
                                .set_unhandled_error(Arc::clone(&captured));
                            self.run_slot(&handler, &[], false).await?;
                        }
                        None => {
                            return Err(EngineError::RuleFailed {
                                rule: slot.key,
                                source: captured,
                            })
                        }
                    }
                }
                Err(join_error) => {
                    return Err(EngineError::RuleFailed {
                        rule: slot.key,
                        source: Arc::new(join_error),
                    })
                }
            }
        }
        Ok(self.results)
    }

    /// Abort and drain every scheduled parallel task. Used on the error
    /// path so no task outlives the run still holding the model handle.
    pub async fn shutdown(mut self) {
        for slot in std::mem::take(&mut self.parallel) {
            slot.handle.abort();
            let _ = slot.handle.await;
        }
    }

    /// Run one batch: parallel members are scheduled first, then the
    /// ordered members execute one at a time. `level` is the unfiltered
    /// rule list of the current nesting level (exception-handler scope).
    fn execute<'a>(
        &'a mut self,
        batch: &'a [SharedAsyncRule<M>],
        level: &'a [SharedAsyncRule<M>],
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            self.schedule_parallel(batch, level).await?;
            for rule in order_for_execution(batch, true) {
                self.run_slot(&rule, level, true).await?;
            }
            Ok(())
        })
    }

    fn run_slot<'a>(
        &'a mut self,
        rule: &'a SharedAsyncRule<M>,
        level: &'a [SharedAsyncRule<M>],
        recover: bool,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let nested_first = rule.lock().await.core().config.invoke_nested_rules_first;
            if nested_first {
                self.invoke_nested(rule).await?;
            }

            if self.can_invoke(rule).await {
                let preactive = self.index.preactive_for(rule.key());
                self.execute(&preactive, level).await?;

                match invoke_hooks(rule, &self.model, &self.ctx).await {
                    Ok(result) => {
                        notify_logger(&self.logger, &self.ctx, rule, &self.model).await;
                        self.results.push(result);
                        let reactive = self.index.reactive_for(rule.key());
                        self.execute(&reactive, level).await?;
                    }
                    Err(error) => self.recover(rule, error, level, recover).await?,
                }
            }

            if !nested_first {
                self.invoke_nested(rule).await?;
            }
            Ok(())
        })
    }

    /// Split out the batch's parallel rules onto independent tasks. Their
    /// preactive/reactive batches run inline here — scheduling, not the
    /// task, is the trigger point.
    async fn schedule_parallel(
        &mut self,
        batch: &[SharedAsyncRule<M>],
        level: &[SharedAsyncRule<M>],
    ) -> Result<(), EngineError> {
        for rule in parallel_rules(batch) {
            let nested_first = rule.lock().await.core().config.invoke_nested_rules_first;
            if nested_first {
                self.invoke_nested(&rule).await?;
            }

            if self.can_invoke(&rule).await {
                let preactive = self.index.preactive_for(rule.key());
                self.execute(&preactive, level).await?;

                self.spawn_parallel(&rule, level);

                let reactive = self.index.reactive_for(rule.key());
                self.execute(&reactive, level).await?;
            }

            if !nested_first {
                self.invoke_nested(&rule).await?;
            }
        }
        Ok(())
    }

    fn spawn_parallel(&mut self, rule: &SharedAsyncRule<M>, level: &[SharedAsyncRule<M>]) {
        let key = rule.key();
        let config = rule.parallel_config().cloned().unwrap_or_default();
        let token = config.cancellation;
        let task_rule = rule.clone();
        let model = self.model.clone();
        let ctx = self.ctx.clone();
        let logger = self.logger.clone();

        debug!(rule = %key, "scheduling parallel rule");
        let body = async move {
            if token.as_ref().is_some_and(|t| t.is_cancelled()) {
                debug!(rule = %key, "parallel rule cancelled before start");
                return None;
            }
            let outcome = invoke_hooks(&task_rule, &model, &ctx).await;
            if outcome.is_ok() {
                notify_logger(&logger, &ctx, &task_rule, &model).await;
            }
            Some(outcome)
        };
        let handle = match config.runtime {
            Some(runtime) => runtime.spawn(body),
            None => tokio::spawn(body),
        };

        self.parallel.push(ParallelSlot {
            key,
            handle,
            local_handler: find_local_handler(level, key),
            global_handler: find_global_handler(level),
        });
    }

    async fn invoke_nested(&mut self, rule: &SharedAsyncRule<M>) -> Result<(), EngineError> {
        let children = rule.children();
        if children.is_empty() {
            return Ok(());
        }
        let batch = filter_activating(children);
        self.execute(&batch, children).await
    }

    async fn can_invoke(&mut self, rule: &SharedAsyncRule<M>) -> bool {
        if self.ctx.terminated() {
            return false;
        }
        let constraint = {
            let guard = rule.lock().await;
            let config = &guard.core().config;
            if config.skip {
                return false;
            }
            config.constraint.clone()
        };
        match constraint {
            None => true,
            Some(constraint) => constraint(&*self.model.read().await),
        }
    }

    async fn recover(
        &mut self,
        failed: &SharedAsyncRule<M>,
        error: BoxError,
        level: &[SharedAsyncRule<M>],
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
                    .lock()
                    .await
                    .core_mut()
                    .set_unhandled_error(Arc::clone(&captured));
                return self.run_slot(&handler, level, false).await;
            }
        }
        Err(EngineError::RuleFailed {
            rule: failed.key(),
            source: captured,
        })
    }
}

/// One rule body: the three lifecycle hooks, the terminate-flag update and
/// the result-name back-fill. Shared by the ordered pass and parallel
/// tasks.
async fn invoke_hooks<M: Send + Sync + 'static>(
    rule: &SharedAsyncRule<M>,
    model: &SharedModel<M>,
    ctx: &RunContext,
) -> Result<RuleResult, BoxError> {
    let key = rule.key();
    let mut guard = rule.lock().await;
    debug!(rule = %key, "before_invoke");
    guard.before_invoke(model, ctx).await?;
    debug!(rule = %key, "invoke");
    let mut result = guard.invoke(model, ctx).await?;
    debug!(rule = %key, "after_invoke");
    guard.after_invoke(model, ctx).await?;

    if !ctx.terminated() && guard.core().config.terminate == Some(true) {
        debug!(rule = %key, "terminate requested");
        ctx.terminate();
    }
    if result.name.is_none() {
        result.name = Some(key.to_string());
    }
    Ok(result)
}

/// Fire-and-forget notification of the logging collaborator after a rule
/// body completes. Sinks are infallible by contract and never fail the run.
async fn notify_logger<M: Send + Sync + 'static>(
    logger: &Option<Arc<dyn RuleLogger<M>>>,
    ctx: &RunContext,
    rule: &SharedAsyncRule<M>,
    model: &SharedModel<M>,
) {
    if let Some(logger) = logger {
        let snapshot = RuleSnapshot {
            rule: rule.key(),
            role: RuleRole::from_flags(&rule.meta().flags),
            observes: rule.meta().observes,
        };
        let guard = model.read().await;
        logger.write(ctx.run_id(), &snapshot, &guard);
    }
}
