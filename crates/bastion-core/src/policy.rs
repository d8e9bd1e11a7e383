//! The enforcement decision table.
//!
//! | Policy   | Satisfied | Failed                                   |
//! |----------|-----------|------------------------------------------|
//! | THROW    | Proceed   | Abort: error, null value, skip resolver  |
//! | RESOLVER | Proceed   | Defer: side-channel entry, null the leaf |

use bastion_contracts::policy::{EvaluationOutcome, Policy};

/// What an enforcement wrapper does with one evaluated annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort,
    Defer,
}

pub fn decide(policy: Policy, outcome: &EvaluationOutcome) -> Decision {
    match (policy, outcome.is_satisfied()) {
        (_, true) => Decision::Proceed,
        (Policy::Throw, false) => Decision::Abort,
        (Policy::Resolver, false) => Decision::Defer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        let failed = EvaluationOutcome::Unsatisfied {
            reasons: vec!["x".to_string()],
        };
        assert_eq!(decide(Policy::Throw, &EvaluationOutcome::Satisfied), Decision::Proceed);
        assert_eq!(decide(Policy::Resolver, &EvaluationOutcome::Satisfied), Decision::Proceed);
        assert_eq!(decide(Policy::Throw, &failed), Decision::Abort);
        assert_eq!(decide(Policy::Resolver, &failed), Decision::Defer);
    }
}
