//! # Rule Engine
//!
//! An in-process rule-execution engine: given a mutable domain model and a
//! set of rules, it executes them in a well-defined order, lets rules react
//! to or precede other rules, runs independent rules in parallel, and
//! recovers from failures without corrupting sibling execution.
//!
//! ## Architecture Overview
//!
//! One run — one [`RuleEngine::execute`] or [`RuleEngine::execute_async`]
//! call over one model instance — flows through three stages:
//!
//! 1. **Initialization** — type tokens are resolved through the
//!    [`DependencyResolver`], each rule's configuration is stamped with the
//!    run id (inheriting the nesting parent's constraint when requested),
//!    and every setup hook runs.
//! 2. **Indexing** — the activation index maps each observed rule kind to
//!    the rules that must run immediately before it (preactive) or after
//!    it (reactive). Built once, read-only for the rest of the run.
//! 3. **Execution** — rules that are neither preactive, reactive nor
//!    exception handlers run in the main pass: execution-order-carrying
//!    rules first, ascending, then the rest in insertion order. Around
//!    every rule the executor drives nested rules, preactive and reactive
//!    observers, the terminate flag and the failure cascade. On the
//!    asynchronous path, rules flagged parallel run on their own tasks and
//!    are joined before the results are returned.
//!
//! ## Core Abstractions
//!
//! ### [`Rule`] / [`AsyncRule`] — The Business Logic
//!
//! A rule implements `invoke` (mandatory) plus optional `initialize`,
//! `before_invoke` and `after_invoke` hooks, and embeds a [`RuleCore`] /
//! [`AsyncRuleCore`] carrying its configuration, observation flags and
//! nested rules:
//!
//! ```rust
//! use rule_engine::{BoxError, Rule, RuleCore, RuleEngine, RuleKey, RuleResult, RunContext};
//!
//! #[derive(Debug)]
//! struct Cart {
//!     total: f64,
//! }
//!
//! #[derive(Default)]
//! struct ApplyDiscount {
//!     core: RuleCore<Cart>,
//! }
//!
//! impl Rule<Cart> for ApplyDiscount {
//!     fn key(&self) -> RuleKey {
//!         RuleKey::of::<Self>()
//!     }
//!
//!     fn core(&self) -> &RuleCore<Cart> {
//!         &self.core
//!     }
//!
//!     fn core_mut(&mut self) -> &mut RuleCore<Cart> {
//!         &mut self.core
//!     }
//!
//!     fn invoke(&mut self, model: &mut Cart, _ctx: &RunContext) -> Result<RuleResult, BoxError> {
//!         model.total *= 0.5;
//!         Ok(RuleResult::new().with_value(model.total))
//!     }
//! }
//!
//! let mut engine = RuleEngine::new(Cart { total: 100.0 });
//! engine.add_rule(ApplyDiscount::default());
//! let results = engine.execute()?;
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].name.as_deref(), Some("ApplyDiscount"));
//! assert_eq!(engine.model().map(|c| c.total), Some(50.0));
//! # Ok::<(), rule_engine::EngineError>(())
//! ```
//!
//! ### [`RunContext`] — Run-Scoped State
//!
//! Every hook receives the run context: the run id, the engine-wide
//! terminate flag, and the shared [`DataStore`] rules use to hand values to
//! one another — including blocking reads with a timeout, so an ordered
//! rule can wait for a value a parallel rule produces.
//!
//! ### Observation
//!
//! A rule marked `reactive_to(key)` runs immediately after the observed
//! rule completes; `preactive_to(key)` immediately before it executes;
//! `on_failure_of(key)` only when the observed rule fails, receiving the
//! captured failure in its core's unhandled-error slot; `on_any_failure()`
//! recovers any otherwise-unhandled failure at its nesting level. Observing
//! rules never run standalone.
//!
//! ## Error Channels
//!
//! Callers inspect two channels: the engine error (run aborted — setup
//! failure or unrecovered rule failure) and the per-result
//! [`RuleResult::error`] field (run completed, but a rule reported a
//! business problem). The engine never interprets business errors.

mod activation;
mod async_executor;
mod init;
mod sync_executor;

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logger;
pub mod mock;
pub mod resolver;
pub mod result;
pub mod rule;
pub mod store;
pub mod tracing;

// Re-export core types for convenience
pub use config::{Constraint, ParallelConfig, RuleConfig};
pub use context::{RunContext, RunId, SharedModel};
pub use engine::RuleEngine;
pub use error::{BoxError, CapturedError, EngineError, StoreTimeout};
pub use logger::{RuleLogger, RuleRole, RuleSnapshot, TracingRuleLogger};
pub use resolver::{DependencyResolver, EngineRule, ResolvedRule};
pub use result::{RuleError, RuleResult, RuleResultsExt};
pub use rule::{AsyncRule, AsyncRuleCore, AsyncRuleSpec, Rule, RuleCore, RuleFlags, RuleKey, RuleSpec};
pub use store::{DataStore, StoredValue, DEFAULT_TIMEOUT};

pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
