//! # Rule Logging Collaborator
//!
//! Optional fire-and-forget sink notified after each asynchronous rule's
//! body completes, e.g. to feed an external execution monitor. A sink must
//! never fail the run — the signature is infallible and implementations
//! are expected not to panic.

use crate::context::RunId;
use crate::rule::{RuleFlags, RuleKey};
use tracing::info;

/// How a rule participated in the run, for monitoring purposes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RuleRole {
    Standard,
    Preactive,
    Reactive,
    ExceptionHandler,
}

impl RuleRole {
    pub(crate) fn from_flags(flags: &RuleFlags) -> Self {
        if flags.preactive {
            Self::Preactive
        } else if flags.reactive {
            Self::Reactive
        } else if flags.exception_handler || flags.global_exception_handler {
            Self::ExceptionHandler
        } else {
            Self::Standard
        }
    }
}

/// Snapshot of one rule execution handed to the logging sink.
#[derive(Clone, Copy, Debug)]
pub struct RuleSnapshot {
    pub rule: RuleKey,
    pub role: RuleRole,
    pub observes: Option<RuleKey>,
}

/// Sink for per-rule execution records.
pub trait RuleLogger<M>: Send + Sync {
    fn write(&self, run_id: RunId, snapshot: &RuleSnapshot, model: &M);
}

/// [`RuleLogger`] emitting structured `tracing` events.
#[derive(Clone, Copy, Default, Debug)]
pub struct TracingRuleLogger;

impl<M: std::fmt::Debug> RuleLogger<M> for TracingRuleLogger {
    fn write(&self, run_id: RunId, snapshot: &RuleSnapshot, model: &M) {
        info!(
            run_id = %run_id,
            rule = %snapshot.rule,
            role = ?snapshot.role,
            observes = snapshot.observes.map(|k| k.as_str()),
            model = ?model,
            "rule executed"
        );
    }
}
