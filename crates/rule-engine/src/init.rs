//! # Rule Initializer
//!
//! Turns the caller-supplied rule specs into the shared handle tree the
//! executors drive. For each entry: resolve type tokens through the
//! dependency resolver, stamp the configuration with the run id, inherit
//! the nesting parent's constraint when asked to, run the setup hook, then
//! descend into nested rules with the current rule as the new parent.
//!
//! Children and metadata are read only after the setup hook returns — rules
//! may attach nested rules or declare observation flags during setup.
//!
//! On the asynchronous path the setup hooks of all siblings at one nesting
//! level run concurrently and are joined before descending; a single
//! failing setup fails the whole initialization.

use crate::activation::{RuleHandle, RuleMeta};
use crate::config::{ParallelConfig, RuleConfig};
use crate::context::{RunContext, RunId, SharedModel};
use crate::error::EngineError;
use crate::resolver::{DependencyResolver, ResolvedRule};
use crate::rule::{AsyncRule, AsyncRuleSpec, Rule, RuleKey, RuleSpec};
use crate::BoxFuture;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Cheap handle to an initialized synchronous rule. The rule instance is
/// shared between its position in the tree and the activation index.
pub(crate) struct SharedRule<M> {
    node: Rc<RuleNode<M>>,
}

struct RuleNode<M> {
    meta: RuleMeta,
    children: Vec<SharedRule<M>>,
    cell: RefCell<Box<dyn Rule<M>>>,
}

impl<M> SharedRule<M> {
    fn new(meta: RuleMeta, children: Vec<SharedRule<M>>, rule: Box<dyn Rule<M>>) -> Self {
        Self {
            node: Rc::new(RuleNode {
                meta,
                children,
                cell: RefCell::new(rule),
            }),
        }
    }

    pub fn key(&self) -> RuleKey {
        self.node.meta.key
    }

    pub fn borrow(&self) -> Ref<'_, Box<dyn Rule<M>>> {
        self.node.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Box<dyn Rule<M>>> {
        self.node.cell.borrow_mut()
    }
}

impl<M> Clone for SharedRule<M> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<M> RuleHandle for SharedRule<M> {
    fn meta(&self) -> &RuleMeta {
        &self.node.meta
    }

    fn children(&self) -> &[Self] {
        &self.node.children
    }
}

/// Cheap handle to an initialized asynchronous rule. The lock is taken only
/// while a lifecycle hook runs; metadata and the parallel settings are
/// snapshotted so scheduling never contends with a running hook.
pub(crate) struct SharedAsyncRule<M: Send + Sync + 'static> {
    node: Arc<AsyncRuleNode<M>>,
}

struct AsyncRuleNode<M: Send + Sync + 'static> {
    meta: RuleMeta,
    parallel: Option<ParallelConfig>,
    children: Vec<SharedAsyncRule<M>>,
    cell: Mutex<Box<dyn AsyncRule<M>>>,
}

impl<M: Send + Sync + 'static> SharedAsyncRule<M> {
    fn new(
        meta: RuleMeta,
        parallel: Option<ParallelConfig>,
        children: Vec<SharedAsyncRule<M>>,
        rule: Box<dyn AsyncRule<M>>,
    ) -> Self {
        Self {
            node: Arc::new(AsyncRuleNode {
                meta,
                parallel,
                children,
                cell: Mutex::new(rule),
            }),
        }
    }

    pub fn key(&self) -> RuleKey {
        self.node.meta.key
    }

    pub fn parallel_config(&self) -> Option<&ParallelConfig> {
        self.node.parallel.as_ref()
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Box<dyn AsyncRule<M>>> {
        self.node.cell.lock().await
    }
}

impl<M: Send + Sync + 'static> Clone for SharedAsyncRule<M> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<M: Send + Sync + 'static> RuleHandle for SharedAsyncRule<M> {
    fn meta(&self) -> &RuleMeta {
        &self.node.meta
    }

    fn children(&self) -> &[Self] {
        &self.node.children
    }
}

/// Walks a rule tree once per run, producing the shared handle tree.
pub(crate) struct Initializer<M: Send + Sync + 'static> {
    run_id: RunId,
    resolver: Option<Arc<dyn DependencyResolver<M>>>,
}

impl<M: Send + Sync + 'static> Initializer<M> {
    pub fn new(run_id: RunId, resolver: Option<Arc<dyn DependencyResolver<M>>>) -> Self {
        Self { run_id, resolver }
    }

    fn stamp(&self, config: &mut RuleConfig<M>, parent: Option<&RuleConfig<M>>) {
        config.stamp_run(self.run_id);
        if let Some(parent) = parent {
            if parent.nested_rules_inherit_constraint {
                config.constraint = parent.constraint.clone();
                config.nested_rules_inherit_constraint = true;
            }
        }
    }

    fn resolve_sync(&self, spec: RuleSpec<M>) -> Result<Box<dyn Rule<M>>, EngineError> {
        match spec {
            RuleSpec::Instance(rule) => Ok(rule),
            RuleSpec::Token(key) => match &self.resolver {
                None => Err(EngineError::DependencyResolverNotFound(key)),
                Some(resolver) => match resolver.resolve(key) {
                    Some(ResolvedRule::Sync(rule)) => Ok(rule),
                    _ => Err(EngineError::UnsupportedRule(key)),
                },
            },
        }
    }

    fn resolve_async(&self, spec: AsyncRuleSpec<M>) -> Result<Box<dyn AsyncRule<M>>, EngineError> {
        match spec {
            AsyncRuleSpec::Instance(rule) => Ok(rule),
            AsyncRuleSpec::Token(key) => match &self.resolver {
                None => Err(EngineError::DependencyResolverNotFound(key)),
                Some(resolver) => match resolver.resolve(key) {
                    Some(ResolvedRule::Async(rule)) => Ok(rule),
                    _ => Err(EngineError::UnsupportedRule(key)),
                },
            },
        }
    }

    /// Initialize one nesting level and, recursively, everything below it.
    pub fn initialize(
        &self,
        specs: Vec<RuleSpec<M>>,
        model: &mut M,
        ctx: &RunContext,
        parent: Option<&RuleConfig<M>>,
    ) -> Result<Vec<SharedRule<M>>, EngineError> {
        let mut level = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut rule = self.resolve_sync(spec)?;
            let key = rule.key();
            self.stamp(&mut rule.core_mut().config, parent);
            rule.initialize(model, ctx)
                .map_err(|e| EngineError::InitializeFailed {
                    rule: key,
                    source: Arc::from(e),
                })?;

            let child_specs = rule.core_mut().take_children();
            let own_config = rule.core().config.clone();
            let children = self.initialize(child_specs, model, ctx, Some(&own_config))?;

            let core = rule.core();
            let meta = RuleMeta::new(key, core.flags, core.observes, &core.config, false);
            level.push(SharedRule::new(meta, children, rule));
        }
        Ok(level)
    }

    /// Asynchronous counterpart of [`Initializer::initialize`]: setup hooks
    /// of sibling rules run concurrently on spawned tasks and are all
    /// joined before the level's children are visited.
    pub fn initialize_async<'a>(
        &'a self,
        specs: Vec<AsyncRuleSpec<M>>,
        model: &'a SharedModel<M>,
        ctx: &'a RunContext,
        parent: Option<&'a RuleConfig<M>>,
    ) -> BoxFuture<'a, Result<Vec<SharedAsyncRule<M>>, EngineError>> {
        Box::pin(async move {
            let mut rules = Vec::with_capacity(specs.len());
            let mut keys = Vec::with_capacity(specs.len());
            for spec in specs {
                let mut rule = self.resolve_async(spec)?;
                keys.push(rule.key());
                self.stamp(&mut rule.core_mut().config, parent);
                rules.push(rule);
            }

            let rules = self.run_setup_hooks(rules, &keys, model, ctx).await?;

            let mut level = Vec::with_capacity(rules.len());
            for (mut rule, key) in rules.into_iter().zip(keys) {
                let child_specs = rule.core_mut().take_children();
                let own_config = rule.core().config.clone();
                let children = self
                    .initialize_async(child_specs, model, ctx, Some(&own_config))
                    .await?;

                let core = rule.core();
                let parallel = core.parallel.clone();
                let meta = RuleMeta::new(
                    key,
                    core.flags,
                    core.observes,
                    &core.config,
                    parallel.is_some(),
                );
                level.push(SharedAsyncRule::new(meta, parallel, children, rule));
            }
            Ok(level)
        })
    }

    /// Run every sibling's setup hook concurrently, returning the rules in
    /// their original order or the earliest failure.
    async fn run_setup_hooks(
        &self,
        rules: Vec<Box<dyn AsyncRule<M>>>,
        keys: &[RuleKey],
        model: &SharedModel<M>,
        ctx: &RunContext,
    ) -> Result<Vec<Box<dyn AsyncRule<M>>>, EngineError> {
        let mut set = JoinSet::new();
        let mut task_index = HashMap::new();
        for (index, mut rule) in rules.into_iter().enumerate() {
            let model = model.clone();
            let ctx = ctx.clone();
            let handle = set.spawn(async move {
                let outcome = rule.initialize(&model, &ctx).await;
                (index, rule, outcome)
            });
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<Box<dyn AsyncRule<M>>>> =
            (0..keys.len()).map(|_| None).collect();
        // (index, failure) of the earliest failing sibling
        let mut failure: Option<(usize, EngineError)> = None;
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, (index, rule, Ok(())))) => slots[index] = Some(rule),
                Ok((_, (index, _, Err(e)))) => {
                    let error = EngineError::InitializeFailed {
                        rule: keys[index],
                        source: Arc::from(e),
                    };
                    if failure.as_ref().is_none_or(|(i, _)| index < *i) {
                        failure = Some((index, error));
                    }
                }
                Err(join_error) => {
                    let index = task_index
                        .get(&join_error.id())
                        .copied()
                        .unwrap_or(usize::MAX);
                    let error = EngineError::InitializeFailed {
                        rule: keys.get(index).copied().unwrap_or(RuleKey::new("unknown")),
                        source: Arc::new(join_error),
                    };
                    if failure.as_ref().is_none_or(|(i, _)| index < *i) {
                        failure = Some((index, error));
                    }
                }
            }
        }

        if let Some((_, error)) = failure {
            return Err(error);
        }
        // every slot is filled once no task failed
        Ok(slots.into_iter().flatten().collect())
    }
}
