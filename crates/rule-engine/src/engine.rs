//! # Rule Engine Façade
//!
//! Owns the model slot, the rule entries and the collaborator seams, and
//! wires validation → initialization → execution into one
//! [`execute`](RuleEngine::execute) (synchronous) and one
//! [`execute_async`](RuleEngine::execute_async) call. Each call is one run
//! over one model instance under a fresh run id; run-scoped state is
//! discarded when the results are returned.

use crate::async_executor::AsyncExecutor;
use crate::context::{RunContext, RunId, SharedModel};
use crate::error::EngineError;
use crate::init::Initializer;
use crate::logger::RuleLogger;
use crate::resolver::{DependencyResolver, EngineRule};
use crate::result::RuleResult;
use crate::rule::{AsyncRule, AsyncRuleSpec, Rule, RuleKey, RuleSpec};
use crate::sync_executor::SyncExecutor;
use std::sync::Arc;
use tracing::debug;

/// The rule engine. Generic over the model type the rules operate on.
pub struct RuleEngine<M: Send + Sync + 'static> {
    model: Option<M>,
    entries: Vec<EngineRule<M>>,
    resolver: Option<Arc<dyn DependencyResolver<M>>>,
    logger: Option<Arc<dyn RuleLogger<M>>>,
}

impl<M: Send + Sync + 'static> RuleEngine<M> {
    pub fn new(model: M) -> Self {
        Self {
            model: Some(model),
            entries: Vec::new(),
            resolver: None,
            logger: None,
        }
    }

    /// An engine with an empty model slot; executing before
    /// [`set_model`](Self::set_model) fails with
    /// [`EngineError::ModelInstanceNotFound`].
    pub fn without_model() -> Self {
        Self {
            model: None,
            entries: Vec::new(),
            resolver: None,
            logger: None,
        }
    }

    pub fn set_model(&mut self, model: M) {
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut M> {
        self.model.as_mut()
    }

    /// Resolver consulted for type-token rule entries, top-level and nested.
    pub fn set_resolver(&mut self, resolver: impl DependencyResolver<M> + 'static) {
        self.resolver = Some(Arc::new(resolver));
    }

    /// Optional sink notified after each asynchronous rule's body completes.
    pub fn set_logger(&mut self, logger: impl RuleLogger<M> + 'static) {
        self.logger = Some(Arc::new(logger));
    }

    pub fn add_rule(&mut self, rule: impl Rule<M> + 'static) {
        self.entries.push(EngineRule::Sync(Box::new(rule)));
    }

    /// Add a type token to be resolved at execution time.
    pub fn add_token(&mut self, token: RuleKey) {
        self.entries.push(EngineRule::Token(token));
    }

    pub fn add(&mut self, entry: EngineRule<M>) {
        self.entries.push(entry);
    }

    /// Execute the synchronous rules in-line on the calling thread.
    ///
    /// Consumes the engine's synchronous entries (and tokens); asynchronous
    /// instances are left untouched for [`execute_async`](Self::execute_async).
    pub fn execute(&mut self) -> Result<Vec<RuleResult>, EngineError> {
        let mut model = self.model.take().ok_or(EngineError::ModelInstanceNotFound)?;
        let specs = self.drain_sync_entries();
        if specs.is_empty() {
            self.model = Some(model);
            return Ok(Vec::new());
        }

        let run_id = RunId::new();
        debug!(run_id = %run_id, rules = specs.len(), "executing synchronous rules");
        let ctx = RunContext::new(run_id);
        let initializer = Initializer::new(run_id, self.resolver.clone());

        let outcome = initializer
            .initialize(specs, &mut model, &ctx, None)
            .and_then(|tree| {
                let mut executor = SyncExecutor::new(&mut model, ctx, &tree);
                executor.run(&tree)?;
                Ok(executor.into_results())
            });

        self.model = Some(model);
        outcome
    }

    fn drain_sync_entries(&mut self) -> Vec<RuleSpec<M>> {
        let mut specs = Vec::new();
        let mut rest = Vec::new();
        for entry in self.entries.drain(..) {
            match entry {
                EngineRule::Sync(rule) => specs.push(RuleSpec::Instance(rule)),
                EngineRule::Token(token) => specs.push(RuleSpec::Token(token)),
                other => rest.push(other),
            }
        }
        self.entries = rest;
        specs
    }

    pub fn add_async_rule(&mut self, rule: impl AsyncRule<M> + 'static) {
        self.entries.push(EngineRule::Async(Box::new(rule)));
    }

    /// Execute the asynchronous rules, scheduling parallel ones on their
    /// own tasks and joining everything before returning.
    ///
    /// Consumes the engine's asynchronous entries (and tokens);
    /// synchronous instances are left untouched for [`execute`](Self::execute).
    pub async fn execute_async(&mut self) -> Result<Vec<RuleResult>, EngineError> {
        let model = self.model.take().ok_or(EngineError::ModelInstanceNotFound)?;
        let specs = self.drain_async_entries();
        if specs.is_empty() {
            self.model = Some(model);
            return Ok(Vec::new());
        }

        let run_id = RunId::new();
        debug!(run_id = %run_id, rules = specs.len(), "executing asynchronous rules");
        let ctx = RunContext::new(run_id);
        let shared = SharedModel::new(model);
        let initializer = Initializer::new(run_id, self.resolver.clone());

        let outcome = match initializer
            .initialize_async(specs, &shared, &ctx, None)
            .await
        {
            Err(error) => Err(error),
            Ok(tree) => {
                let mut executor =
                    AsyncExecutor::new(shared.clone(), ctx, self.logger.clone(), &tree);
                match executor.run(&tree).await {
                    Ok(()) => executor.finish().await,
                    Err(error) => {
                        executor.shutdown().await;
                        Err(error)
                    }
                }
            }
        };

        // Reclaim the model. Fails only if a rule stashed a SharedModel
        // clone beyond its hook, in which case the slot stays empty.
        if let Some(model) = shared.try_into_inner() {
            self.model = Some(model);
        }
        outcome
    }

    fn drain_async_entries(&mut self) -> Vec<AsyncRuleSpec<M>> {
        let mut specs = Vec::new();
        let mut rest = Vec::new();
        for entry in self.entries.drain(..) {
            match entry {
                EngineRule::Async(rule) => specs.push(AsyncRuleSpec::Instance(rule)),
                EngineRule::Token(token) => specs.push(AsyncRuleSpec::Token(token)),
                other => rest.push(other),
            }
        }
        self.entries = rest;
        specs
    }
}
