//! # Rule Traits
//!
//! The contract every unit of business logic implements to be driven by the
//! engine. Two variants exist: [`Rule`] for the single-threaded synchronous
//! path and [`AsyncRule`] for the suspension-capable path. Both share the
//! same lifecycle — `initialize` once per run, then
//! `before_invoke → invoke → after_invoke` per execution slot — and only
//! `invoke` is mandatory; the other hooks default to no-ops.
//!
//! A rule never owns the model. Hooks receive it from the engine: `&mut M`
//! on the synchronous path, a [`SharedModel`] handle on the asynchronous
//! one.
//!
//! Rule state the engine needs — configuration, observation flags, nested
//! children, a captured-failure slot — lives in a [`RuleCore`] /
//! [`AsyncRuleCore`] embedded in the rule struct and exposed through
//! `core()`/`core_mut()`.

use crate::config::{ParallelConfig, RuleConfig};
use crate::context::{RunContext, SharedModel};
use crate::error::{BoxError, CapturedError};
use crate::result::RuleResult;
use async_trait::async_trait;
use std::fmt;

/// Stable identifier of a rule kind.
///
/// Used as the activation-index key and as the target of `observes`.
/// Assigned at authoring time through [`Rule::key`]/[`AsyncRule::key`];
/// [`RuleKey::of`] derives one from the short type name for the common case
/// where the type name is the identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleKey(&'static str);

impl RuleKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Key derived from the unqualified type name of `T`.
    pub fn of<T: ?Sized>() -> Self {
        let name = std::any::type_name::<T>();
        Self(name.rsplit("::").next().unwrap_or(name))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({})", self.0)
    }
}

/// How a rule participates in the run beyond plain ordered execution.
#[derive(Clone, Copy, Default, Debug)]
pub struct RuleFlags {
    /// Runs immediately after the observed rule completes.
    pub reactive: bool,
    /// Runs immediately before the observed rule executes.
    pub preactive: bool,
    /// Recovers failures of the observed rule.
    pub exception_handler: bool,
    /// Recovers any otherwise-unhandled failure at its nesting level.
    pub global_exception_handler: bool,
}

impl RuleFlags {
    /// True when the rule runs only when triggered, never in the main pass.
    pub fn is_triggered_only(&self) -> bool {
        self.reactive || self.preactive || self.exception_handler || self.global_exception_handler
    }
}

/// A nested-rule entry: either a pre-built instance or a token resolved at
/// initialization time through the engine's dependency resolver.
pub enum RuleSpec<M> {
    Instance(Box<dyn Rule<M>>),
    Token(RuleKey),
}

impl<M> RuleSpec<M> {
    pub fn rule(rule: impl Rule<M> + 'static) -> Self {
        Self::Instance(Box::new(rule))
    }
}

/// [`RuleSpec`] for asynchronous nested rules.
pub enum AsyncRuleSpec<M: Send + Sync + 'static> {
    Instance(Box<dyn AsyncRule<M>>),
    Token(RuleKey),
}

impl<M: Send + Sync + 'static> AsyncRuleSpec<M> {
    pub fn rule(rule: impl AsyncRule<M> + 'static) -> Self {
        Self::Instance(Box::new(rule))
    }
}

/// Per-rule engine state embedded in every synchronous rule.
pub struct RuleCore<M> {
    pub config: RuleConfig<M>,
    pub flags: RuleFlags,
    /// The rule kind whose execution (or failure) triggers this rule.
    /// Meaningful only for reactive, preactive and exception-handler rules.
    pub observes: Option<RuleKey>,
    unhandled_error: Option<CapturedError>,
    children: Vec<RuleSpec<M>>,
}

impl<M> RuleCore<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RuleConfig<M>) -> Self {
        self.config = config;
        self
    }

    /// Mark reactive: run immediately after `observed` completes.
    pub fn reactive_to(mut self, observed: RuleKey) -> Self {
        self.flags.reactive = true;
        self.observes = Some(observed);
        self
    }

    /// Mark preactive: run immediately before `observed` executes.
    pub fn preactive_to(mut self, observed: RuleKey) -> Self {
        self.flags.preactive = true;
        self.observes = Some(observed);
        self
    }

    /// Mark as exception handler for failures of `observed`.
    pub fn on_failure_of(mut self, observed: RuleKey) -> Self {
        self.flags.exception_handler = true;
        self.observes = Some(observed);
        self
    }

    /// Mark as global exception handler for its nesting level.
    pub fn on_any_failure(mut self) -> Self {
        self.flags.global_exception_handler = true;
        self
    }

    pub fn with_rule(mut self, rule: impl Rule<M> + 'static) -> Self {
        self.children.push(RuleSpec::rule(rule));
        self
    }

    pub fn with_token(mut self, token: RuleKey) -> Self {
        self.children.push(RuleSpec::Token(token));
        self
    }

    pub fn add_rule(&mut self, rule: impl Rule<M> + 'static) {
        self.children.push(RuleSpec::rule(rule));
    }

    /// A rule is nested iff it owns at least one child rule.
    pub fn is_nested(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn children(&self) -> &[RuleSpec<M>] {
        &self.children
    }

    /// The failure captured from the observed rule, present while an
    /// exception-handler rule is being invoked to recover it.
    pub fn unhandled_error(&self) -> Option<&CapturedError> {
        self.unhandled_error.as_ref()
    }

    pub(crate) fn set_unhandled_error(&mut self, error: CapturedError) {
        self.unhandled_error = Some(error);
    }

    pub(crate) fn take_children(&mut self) -> Vec<RuleSpec<M>> {
        std::mem::take(&mut self.children)
    }
}

impl<M> Default for RuleCore<M> {
    fn default() -> Self {
        Self {
            config: RuleConfig::default(),
            flags: RuleFlags::default(),
            observes: None,
            unhandled_error: None,
            children: Vec::new(),
        }
    }
}

/// Per-rule engine state embedded in every asynchronous rule.
///
/// Same shape as [`RuleCore`] plus parallel scheduling: a rule with
/// `parallel` set runs on its own task, detached from the ordered pass.
/// Parallel scheduling and an execution order are mutually exclusive; a
/// rule carrying both stays in the ordered pass.
pub struct AsyncRuleCore<M: Send + Sync + 'static> {
    pub config: RuleConfig<M>,
    pub flags: RuleFlags,
    pub observes: Option<RuleKey>,
    pub parallel: Option<ParallelConfig>,
    unhandled_error: Option<CapturedError>,
    children: Vec<AsyncRuleSpec<M>>,
}

impl<M: Send + Sync + 'static> AsyncRuleCore<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RuleConfig<M>) -> Self {
        self.config = config;
        self
    }

    pub fn reactive_to(mut self, observed: RuleKey) -> Self {
        self.flags.reactive = true;
        self.observes = Some(observed);
        self
    }

    pub fn preactive_to(mut self, observed: RuleKey) -> Self {
        self.flags.preactive = true;
        self.observes = Some(observed);
        self
    }

    pub fn on_failure_of(mut self, observed: RuleKey) -> Self {
        self.flags.exception_handler = true;
        self.observes = Some(observed);
        self
    }

    pub fn on_any_failure(mut self) -> Self {
        self.flags.global_exception_handler = true;
        self
    }

    /// Schedule this rule on its own task, joined when results are
    /// requested.
    pub fn parallel(mut self, config: ParallelConfig) -> Self {
        self.parallel = Some(config);
        self
    }

    pub fn with_rule(mut self, rule: impl AsyncRule<M> + 'static) -> Self {
        self.children.push(AsyncRuleSpec::rule(rule));
        self
    }

    pub fn with_token(mut self, token: RuleKey) -> Self {
        self.children.push(AsyncRuleSpec::Token(token));
        self
    }

    pub fn add_rule(&mut self, rule: impl AsyncRule<M> + 'static) {
        self.children.push(AsyncRuleSpec::rule(rule));
    }

    pub fn is_nested(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn children(&self) -> &[AsyncRuleSpec<M>] {
        &self.children
    }

    pub fn unhandled_error(&self) -> Option<&CapturedError> {
        self.unhandled_error.as_ref()
    }

    pub(crate) fn set_unhandled_error(&mut self, error: CapturedError) {
        self.unhandled_error = Some(error);
    }

    pub(crate) fn take_children(&mut self) -> Vec<AsyncRuleSpec<M>> {
        std::mem::take(&mut self.children)
    }
}

impl<M: Send + Sync + 'static> Default for AsyncRuleCore<M> {
    fn default() -> Self {
        Self {
            config: RuleConfig::default(),
            flags: RuleFlags::default(),
            observes: None,
            parallel: None,
            unhandled_error: None,
            children: Vec::new(),
        }
    }
}

/// A synchronous rule.
///
/// Only [`invoke`](Rule::invoke) is mandatory. Hooks returning `Err` count
/// as the rule failing; the failure is either recovered by a matching
/// exception-handler rule at the same nesting level or aborts the run.
pub trait Rule<M> {
    /// Stable identity of this rule kind.
    fn key(&self) -> RuleKey;

    fn core(&self) -> &RuleCore<M>;

    fn core_mut(&mut self) -> &mut RuleCore<M>;

    /// One-time setup, called once per run before any rule executes.
    fn initialize(&mut self, _model: &mut M, _ctx: &RunContext) -> Result<(), BoxError> {
        Ok(())
    }

    fn before_invoke(&mut self, _model: &mut M, _ctx: &RunContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// The rule body.
    fn invoke(&mut self, model: &mut M, ctx: &RunContext) -> Result<RuleResult, BoxError>;

    fn after_invoke(&mut self, _model: &mut M, _ctx: &RunContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// An asynchronous rule. Every lifecycle hook may suspend; rules flagged
/// parallel additionally run on their own task.
#[async_trait]
pub trait AsyncRule<M: Send + Sync + 'static>: Send {
    /// Stable identity of this rule kind.
    fn key(&self) -> RuleKey;

    fn core(&self) -> &AsyncRuleCore<M>;

    fn core_mut(&mut self) -> &mut AsyncRuleCore<M>;

    /// One-time setup. Setup hooks of sibling rules at one nesting level
    /// run concurrently; the engine waits for all of them before
    /// descending into nested rules.
    async fn initialize(
        &mut self,
        _model: &SharedModel<M>,
        _ctx: &RunContext,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    async fn before_invoke(
        &mut self,
        _model: &SharedModel<M>,
        _ctx: &RunContext,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// The rule body.
    async fn invoke(
        &mut self,
        model: &SharedModel<M>,
        ctx: &RunContext,
    ) -> Result<RuleResult, BoxError>;

    async fn after_invoke(
        &mut self,
        _model: &SharedModel<M>,
        _ctx: &RunContext,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}
