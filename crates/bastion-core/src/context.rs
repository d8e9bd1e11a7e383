//! Per-request context: predicate cache, evaluation inputs, and strategies.
//!
//! A `RequestContext` is created fresh for every request and dropped with
//! it. It owns the outcome cache, so a predicate is evaluated at most once
//! per cache key per request and every consumer of that key receives the
//! same `Arc<EvaluationOutcome>`.
//!
//! The filtering and message strategies are injected at construction time.
//! The verbose pair lists every missing permission; the terse pair reports
//! a single one and keeps the error message generic.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use bastion_contracts::policy::EvaluationOutcome;

/// Given the granted set (if any) and the required permissions, returns the
/// missing ones, or `None` when nothing is missing.
pub type FilterMissingFn =
    Arc<dyn Fn(Option<&HashSet<String>>, &[String]) -> Option<Vec<String>> + Send + Sync>;

/// Formats the error message for a THROW failure from the missing list.
pub type FormatErrorFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

// ── Strategies ───────────────────────────────────────────────────────────────

/// Every required permission absent from `granted`.
///
/// With no granted set at all, everything required is missing.
pub fn debug_filter_missing_permissions(
    granted: Option<&HashSet<String>>,
    required: &[String],
) -> Option<Vec<String>> {
    let Some(granted) = granted else {
        return Some(required.to_vec());
    };
    let missing: Vec<String> = required
        .iter()
        .filter(|p| !granted.contains(p.as_str()))
        .cloned()
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(missing)
    }
}

/// Only the first required permission absent from `granted`.
pub fn prod_filter_missing_permissions(
    granted: Option<&HashSet<String>>,
    required: &[String],
) -> Option<Vec<String>> {
    let Some(granted) = granted else {
        return Some(required.to_vec());
    };
    required
        .iter()
        .find(|p| !granted.contains(p.as_str()))
        .map(|p| vec![p.clone()])
}

pub fn debug_error_message(missing: &[String]) -> String {
    format!("Missing Permissions: {}", missing.join(", "))
}

pub fn prod_error_message(_missing: &[String]) -> String {
    "Missing Permissions".to_string()
}

/// Which strategy pair a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// List every missing permission, in messages too.
    Debug,
    /// Report one missing permission and keep messages generic.
    #[default]
    Production,
}

impl Verbosity {
    pub fn filter(self) -> FilterMissingFn {
        match self {
            Verbosity::Debug => Arc::new(debug_filter_missing_permissions),
            Verbosity::Production => Arc::new(prod_filter_missing_permissions),
        }
    }

    pub fn format_error(self) -> FormatErrorFn {
        match self {
            Verbosity::Debug => Arc::new(debug_error_message),
            Verbosity::Production => Arc::new(prod_error_message),
        }
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Inputs for [`RequestContext::new`]. Unset strategies fall back to the
/// production pair.
#[derive(Clone, Default)]
pub struct ContextConfig {
    pub granted_permissions: Option<HashSet<String>>,
    pub filter_missing_permissions: Option<FilterMissingFn>,
    pub format_error: Option<FormatErrorFn>,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granted<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_missing_permissions(mut self, filter: FilterMissingFn) -> Self {
        self.filter_missing_permissions = Some(filter);
        self
    }

    pub fn format_error(mut self, format: FormatErrorFn) -> Self {
        self.format_error = Some(format);
        self
    }

    /// Install both strategies of `verbosity`.
    pub fn verbosity(self, verbosity: Verbosity) -> Self {
        self.filter_missing_permissions(verbosity.filter())
            .format_error(verbosity.format_error())
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("granted_permissions", &self.granted_permissions)
            .field("custom_filter", &self.filter_missing_permissions.is_some())
            .field("custom_format", &self.format_error.is_some())
            .finish()
    }
}

// ── Request context ──────────────────────────────────────────────────────────

/// Identifies one request in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct RequestContext {
    id: RequestId,
    granted_permissions: Option<HashSet<String>>,
    filter_missing_permissions: FilterMissingFn,
    format_error: FormatErrorFn,
    outcomes: Mutex<HashMap<String, Arc<EvaluationOutcome>>>,
}

impl RequestContext {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            id: RequestId::new(),
            granted_permissions: config.granted_permissions,
            filter_missing_permissions: config
                .filter_missing_permissions
                .unwrap_or_else(|| Verbosity::Production.filter()),
            format_error: config
                .format_error
                .unwrap_or_else(|| Verbosity::Production.format_error()),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn granted_permissions(&self) -> Option<&HashSet<String>> {
        self.granted_permissions.as_ref()
    }

    /// Return the outcome cached under `cache_key`, evaluating it with
    /// `evaluate` on first use.
    ///
    /// Repeated calls with the same key return the identical `Arc` and never
    /// run `evaluate` again.
    pub fn check_predicate<F>(&self, cache_key: &str, evaluate: F) -> Arc<EvaluationOutcome>
    where
        F: FnOnce(&RequestContext) -> EvaluationOutcome,
    {
        if let Some(hit) = self.lock_outcomes().get(cache_key) {
            debug!(request_id = %self.id, cache_key, "predicate cache hit");
            return Arc::clone(hit);
        }

        // Evaluate without holding the lock; strategies are host code.
        let outcome = Arc::new(evaluate(self));
        debug!(
            request_id = %self.id,
            cache_key,
            satisfied = outcome.is_satisfied(),
            "predicate evaluated"
        );
        Arc::clone(
            self.lock_outcomes()
                .entry(cache_key.to_string())
                .or_insert(outcome),
        )
    }

    /// Permission check through the cache using the injected filter.
    pub fn check_missing_permissions(
        &self,
        required: &[String],
        cache_key: &str,
    ) -> Arc<EvaluationOutcome> {
        self.check_predicate(cache_key, |ctx| {
            EvaluationOutcome::from_failures((ctx.filter_missing_permissions)(
                ctx.granted_permissions(),
                required,
            ))
        })
    }

    /// The THROW error message for `missing`, per the injected formatter.
    pub fn error_message(&self, missing: &[String]) -> String {
        (self.format_error)(missing)
    }

    /// Number of distinct cache keys evaluated so far.
    pub fn cached_outcomes(&self) -> usize {
        self.lock_outcomes().len()
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<EvaluationOutcome>>> {
        // A panicking strategy cannot leave the map half-written.
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("granted_permissions", &self.granted_permissions)
            .field("cached_outcomes", &self.cached_outcomes())
            .finish()
    }
}
