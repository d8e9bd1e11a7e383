//! Enforcement policy and evaluation outcome types.
//!
//! Every annotation instance carries a `Policy`. The enforcement wrappers
//! combine it with the `EvaluationOutcome` of the instance's predicate to
//! decide whether a field aborts or proceeds with side-channel data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a failed predicate is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Policy {
    /// Abort the branch: null the value, record an error, skip the resolver.
    Throw,
    /// Defer to the resolver, passing the failure through the side channel.
    Resolver,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Throw => "THROW",
            Policy::Resolver => "RESOLVER",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THROW" => Ok(Policy::Throw),
            "RESOLVER" => Ok(Policy::Resolver),
            other => Err(format!("unknown policy '{other}', expected THROW or RESOLVER")),
        }
    }
}

/// The result of evaluating one predicate against one logical value.
///
/// Within a request an outcome is shared behind an `Arc`, so every consumer
/// of the same cache key observes the identical object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Satisfied,
    Unsatisfied {
        /// Why the predicate failed: missing permission names, or violation
        /// messages for value constraints.
        reasons: Vec<String>,
    },
}

impl EvaluationOutcome {
    /// Build an outcome from an optional failure list; `None` or an empty
    /// list means satisfied.
    pub fn from_failures(failures: Option<Vec<String>>) -> Self {
        match failures {
            Some(reasons) if !reasons.is_empty() => EvaluationOutcome::Unsatisfied { reasons },
            _ => EvaluationOutcome::Satisfied,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, EvaluationOutcome::Satisfied)
    }

    /// The failure reasons, empty when satisfied.
    pub fn reasons(&self) -> &[String] {
        match self {
            EvaluationOutcome::Satisfied => &[],
            EvaluationOutcome::Unsatisfied { reasons } => reasons,
        }
    }
}
