//! # Engine Errors
//!
//! This module defines the error types surfaced by the engine itself.
//! Failures produced *inside* a rule body travel as boxed errors and are
//! either recovered by an exception-handler rule or wrapped into
//! [`EngineError::RuleFailed`] when they escape the run.

use crate::rule::RuleKey;
use std::sync::Arc;
use std::time::Duration;

/// Boxed error returned by rule lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A rule failure captured by the engine and handed to exception-handler
/// rules. Shared so the same failure can appear in a handler's slot, in a
/// [`crate::result::RuleError`], and in the engine error channel.
pub type CapturedError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine was executed without a model instance.
    #[error("no model instance found")]
    ModelInstanceNotFound,

    /// A rule token was supplied but no dependency resolver is configured.
    #[error("no dependency resolver configured for rule token '{0}'")]
    DependencyResolverNotFound(RuleKey),

    /// A token did not resolve to a rule of the executing variant.
    #[error("'{0}' could not be resolved to a supported rule kind")]
    UnsupportedRule(RuleKey),

    /// A rule's setup hook failed during initialization.
    #[error("initialization of rule '{rule}' failed: {source}")]
    InitializeFailed {
        rule: RuleKey,
        source: CapturedError,
    },

    /// A rule failed and no exception handler recovered it.
    #[error("rule '{rule}' failed: {source}")]
    RuleFailed {
        rule: RuleKey,
        source: CapturedError,
    },
}

/// Non-fatal outcome of a data-store read that found no value in time.
///
/// Callers treat this like a missing optional value, not a run failure.
#[derive(Debug, thiserror::Error)]
#[error("no value stored under '{key}' within {timeout:?}")]
pub struct StoreTimeout {
    /// The key that was awaited.
    pub key: String,
    /// How long the read waited before giving up.
    pub timeout: Duration,
}
