//! # Dependency Resolution
//!
//! Rules can be supplied to the engine as pre-built instances or as type
//! tokens ([`RuleKey`]s) resolved at initialization time through a
//! [`DependencyResolver`] — the late-binding seam for containers that
//! construct rules with their own dependencies. Tokens without a resolver
//! fail the run before any rule executes.

use crate::rule::{AsyncRule, Rule, RuleKey};

/// A rule constructed by a [`DependencyResolver`].
pub enum ResolvedRule<M: Send + Sync + 'static> {
    Sync(Box<dyn Rule<M>>),
    Async(Box<dyn AsyncRule<M>>),
}

/// Maps a rule token to a constructed rule instance.
pub trait DependencyResolver<M: Send + Sync + 'static>: Send + Sync {
    /// Construct the rule identified by `key`, or `None` when the key is
    /// unknown to this resolver.
    fn resolve(&self, key: RuleKey) -> Option<ResolvedRule<M>>;
}

/// A top-level entry handed to the engine.
///
/// The synchronous path executes `Sync` entries and tokens resolving to
/// synchronous rules, ignoring `Async` instances; the asynchronous path is
/// the mirror image. A token resolving to the wrong variant fails with
/// [`crate::EngineError::UnsupportedRule`].
pub enum EngineRule<M: Send + Sync + 'static> {
    Sync(Box<dyn Rule<M>>),
    Async(Box<dyn AsyncRule<M>>),
    Token(RuleKey),
}
