//! # Rule Results
//!
//! One [`RuleResult`] is produced per invoked rule. Rules that fail their
//! `can_invoke` gate contribute nothing. Business problems a rule wants to
//! report without aborting the run travel in [`RuleError`]; the engine
//! never interprets them, leaving triage to the caller.

use crate::error::CapturedError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Output of one rule invocation.
///
/// The `name` defaults to the rule's key when the rule leaves it unset; the
/// executor back-fills it before the result is returned.
#[derive(Default)]
pub struct RuleResult {
    pub name: Option<String>,
    /// Arbitrary result payload.
    pub value: Option<Box<dyn Any + Send>>,
    /// Business error reported by the rule. Does not abort the run.
    pub error: Option<RuleError>,
    /// Open key/value bag for anything else the rule wants to hand back.
    pub data: HashMap<String, Box<dyn Any + Send>>,
}

impl RuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Any + Send) -> Self {
        self.value = Some(Box::new(value));
        self
    }

    pub fn with_error(mut self, error: RuleError) -> Self {
        self.error = Some(error);
        self
    }

    /// Insert an entry into the data bag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Any + Send) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Downcast the payload.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|v| v.downcast_ref())
    }

    /// Downcast an entry from the data bag.
    pub fn data_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref())
    }
}

impl fmt::Debug for RuleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleResult")
            .field("name", &self.name)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Business error reported inside a successfully-returned result.
#[derive(Debug, Default)]
pub struct RuleError {
    pub message: Option<String>,
    /// Failure captured from another rule, typically set by exception
    /// handlers re-reporting what they recovered.
    pub source: Option<CapturedError>,
}

impl RuleError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            source: None,
        }
    }

    pub fn from_source(source: CapturedError) -> Self {
        Self {
            message: None,
            source: Some(source),
        }
    }
}

/// Lookup helpers over a finished run's results.
pub trait RuleResultsExt {
    /// First result recorded under `name` (case-insensitive).
    fn find_result(&self, name: &str) -> Option<&RuleResult>;
    /// Every result carrying a business error.
    fn errors(&self) -> Vec<&RuleResult>;
    fn any_error(&self) -> bool;
}

impl RuleResultsExt for [RuleResult] {
    fn find_result(&self, name: &str) -> Option<&RuleResult> {
        self.iter()
            .find(|r| r.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    fn errors(&self) -> Vec<&RuleResult> {
        self.iter().filter(|r| r.error.is_some()).collect()
    }

    fn any_error(&self) -> bool {
        self.iter().any(|r| r.error.is_some())
    }
}
