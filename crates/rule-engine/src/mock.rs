//! # Closure-Backed Rules
//!
//! [`FnRule`] and [`AsyncFnRule`] wrap a closure as a rule body so tests
//! (and quick experiments) can exercise the engine without declaring a
//! struct per rule. The wrapped closure is only the `invoke` hook; flags,
//! configuration and nested rules come from the [`RuleCore`] /
//! [`AsyncRuleCore`] attached with `with_core`.

use crate::context::{RunContext, SharedModel};
use crate::error::BoxError;
use crate::result::RuleResult;
use crate::rule::{AsyncRule, AsyncRuleCore, Rule, RuleCore, RuleKey};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

type SyncBody<M> = Box<dyn FnMut(&mut M, &RunContext) -> Result<RuleResult, BoxError>>;

/// A synchronous rule whose body is a closure.
pub struct FnRule<M> {
    key: RuleKey,
    core: RuleCore<M>,
    body: SyncBody<M>,
}

impl<M> FnRule<M> {
    pub fn new(
        key: &'static str,
        body: impl FnMut(&mut M, &RunContext) -> Result<RuleResult, BoxError> + 'static,
    ) -> Self {
        Self {
            key: RuleKey::new(key),
            core: RuleCore::new(),
            body: Box::new(body),
        }
    }

    pub fn with_core(mut self, core: RuleCore<M>) -> Self {
        self.core = core;
        self
    }
}

impl<M> Rule<M> for FnRule<M> {
    fn key(&self) -> RuleKey {
        self.key
    }

    fn core(&self) -> &RuleCore<M> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuleCore<M> {
        &mut self.core
    }

    fn invoke(&mut self, model: &mut M, ctx: &RunContext) -> Result<RuleResult, BoxError> {
        (self.body)(model, ctx)
    }
}

/// Future returned by an [`AsyncFnRule`] body.
pub type AsyncRuleFuture = Pin<Box<dyn Future<Output = Result<RuleResult, BoxError>> + Send>>;

type AsyncBody<M> = Box<dyn FnMut(SharedModel<M>, RunContext) -> AsyncRuleFuture + Send>;

/// An asynchronous rule whose body is a closure returning a boxed future.
///
/// ```ignore
/// AsyncFnRule::new("Score", |model, ctx| Box::pin(async move {
///     let mut m = model.write().await;
///     // ...
///     Ok(RuleResult::new())
/// }))
/// ```
pub struct AsyncFnRule<M: Send + Sync + 'static> {
    key: RuleKey,
    core: AsyncRuleCore<M>,
    body: AsyncBody<M>,
}

impl<M: Send + Sync + 'static> AsyncFnRule<M> {
    pub fn new(
        key: &'static str,
        body: impl FnMut(SharedModel<M>, RunContext) -> AsyncRuleFuture + Send + 'static,
    ) -> Self {
        Self {
            key: RuleKey::new(key),
            core: AsyncRuleCore::new(),
            body: Box::new(body),
        }
    }

    pub fn with_core(mut self, core: AsyncRuleCore<M>) -> Self {
        self.core = core;
        self
    }
}

#[async_trait]
impl<M: Send + Sync + 'static> AsyncRule<M> for AsyncFnRule<M> {
    fn key(&self) -> RuleKey {
        self.key
    }

    fn core(&self) -> &AsyncRuleCore<M> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<M> {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        model: &SharedModel<M>,
        ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        (self.body)(model.clone(), ctx.clone()).await
    }
}
