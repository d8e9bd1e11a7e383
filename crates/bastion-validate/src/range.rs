//! `@range`: numeric values must lie within inclusive bounds.
//!
//! Lists are checked element by element (null elements skipped) and fail as
//! a whole when any element fails. Values that are not numbers fail with
//! `Not a number`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use bastion_contracts::{
    directive::{ArgumentDefinition, DefaultValue, DirectiveDeclaration, Location},
    error::{BastionError, BastionResult, FieldError},
    policy::{EvaluationOutcome, Policy},
};
use bastion_core::context::RequestContext;
use bastion_core::visitor::{policy_argument, DirectiveVisitor, Instance, Rule, Subject};

use crate::report::{policy_enum, ValidationError, POLICY_ENUM, VALIDATION_ERRORS};

pub const DEFAULT_NAME: &str = "range";

#[derive(Debug, Clone)]
pub struct Range {
    declaration: DirectiveDeclaration,
}

impl Range {
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    pub fn named(name: &str) -> Self {
        let declaration = DirectiveDeclaration::new(name)
            .description("ensures value is within boundaries. If used on lists, applies to every item.")
            .argument(ArgumentDefinition::new("min", "Float").description("The minimum value (inclusive) to allow"))
            .argument(ArgumentDefinition::new("max", "Float").description("The maximum value (inclusive) to allow"))
            .argument(
                ArgumentDefinition::new("policy", POLICY_ENUM)
                    .description("How to handle validation errors")
                    .default_value(DefaultValue::Enum(Policy::Resolver.as_str().to_string())),
            )
            .locations([
                Location::ArgumentDefinition,
                Location::InputFieldDefinition,
                Location::InputObject,
            ])
            .introduces(policy_enum());
        Self { declaration }
    }

    pub fn type_defs(&self) -> Vec<String> {
        self.declaration.fragments()
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveVisitor for Range {
    fn declaration(&self) -> &DirectiveDeclaration {
        &self.declaration
    }

    fn instantiate(&self, arguments: &Map<String, Value>, location: Location) -> BastionResult<Instance> {
        let name = &self.declaration.name;
        let min = bound(name, arguments, "min")?;
        let max = bound(name, arguments, "max")?;
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(BastionError::InvalidArguments {
                    directive: name.clone(),
                    reason: format!("min {min} is greater than max {max}"),
                });
            }
        }
        let policy = policy_argument(name, arguments, "policy")?;

        debug!(directive = %name, %location, ?min, ?max, %policy, "range rule compiled");
        Ok(Instance::Rule(Arc::new(RangeRule {
            directive: name.clone(),
            min,
            max,
            policy,
        })))
    }
}

fn bound(directive: &str, arguments: &Map<String, Value>, name: &str) -> BastionResult<Option<f64>> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| BastionError::InvalidArguments {
                directive: directive.to_string(),
                reason: format!("'{name}' must be a number"),
            }),
    }
}

#[derive(Debug, Clone)]
pub struct RangeRule {
    directive: String,
    min: Option<f64>,
    max: Option<f64>,
    policy: Policy,
}

impl RangeRule {
    /// Violation message for one non-list value, `None` when it is valid.
    fn check(&self, value: &Value) -> Option<String> {
        let Some(n) = value.as_f64() else {
            return Some("Not a number".to_string());
        };
        match (self.min, self.max) {
            (_, Some(max)) if n > max => Some(format!("More than {}", format_bound(max))),
            (Some(min), _) if n < min => Some(format!("Less than {}", format_bound(min))),
            _ => None,
        }
    }

    fn violations(&self, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    self.violations(item, out);
                }
            }
            other => {
                if let Some(message) = self.check(other) {
                    if !out.contains(&message) {
                        out.push(message);
                    }
                }
            }
        }
    }

    fn cache_key(&self, value: &Value) -> String {
        format!(
            "{}({},{}):{}",
            self.directive,
            self.min.map(format_bound).unwrap_or_default(),
            self.max.map(format_bound).unwrap_or_default(),
            value
        )
    }
}

impl Rule for RangeRule {
    fn directive(&self) -> &str {
        &self.directive
    }

    fn policy(&self) -> Policy {
        self.policy
    }

    fn evaluate(&self, subject: &Subject<'_>, ctx: &RequestContext) -> Arc<EvaluationOutcome> {
        let Subject::Value { value, .. } = subject else {
            // Only legal on inputs; nothing to check on an object field.
            return Arc::new(EvaluationOutcome::Satisfied);
        };
        ctx.check_predicate(&self.cache_key(value), |_| {
            let mut messages = Vec::new();
            self.violations(value, &mut messages);
            EvaluationOutcome::from_failures(Some(messages))
        })
    }

    fn failure(&self, outcome: &EvaluationOutcome, _ctx: &RequestContext) -> FieldError {
        FieldError::validation(outcome.reasons().join(", "))
    }

    fn slot(&self) -> &str {
        VALIDATION_ERRORS
    }

    fn report(&self, outcome: &EvaluationOutcome, subject: &Subject<'_>) -> Vec<Value> {
        let Subject::Value { value, path } = subject else {
            return Vec::new();
        };
        let error = ValidationError {
            path: path.iter().map(ToString::to_string).collect(),
            message: outcome.reasons().join(", "),
            value: (*value).clone(),
        };
        serde_json::to_value(error).map(|v| vec![v]).unwrap_or_default()
    }
}

/// Integral bounds print without a fraction: `2.0` as `2`.
fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use bastion_contracts::response::PathSegment;

    use super::*;

    fn rule(min: Option<f64>, max: Option<f64>) -> RangeRule {
        RangeRule {
            directive: DEFAULT_NAME.to_string(),
            min,
            max,
            policy: Policy::Throw,
        }
    }

    fn violations(rule: &RangeRule, value: Value) -> Vec<String> {
        let mut out = Vec::new();
        rule.violations(&value, &mut out);
        out
    }

    #[test]
    fn bounds_are_inclusive() {
        let r = rule(Some(0.0), Some(2.0));
        assert!(violations(&r, json!(0)).is_empty());
        assert!(violations(&r, json!(2)).is_empty());
        assert_eq!(violations(&r, json!(3)), vec!["More than 2"]);
        assert_eq!(violations(&r, json!(-1)), vec!["Less than 0"]);
    }

    #[test]
    fn lists_check_every_element() {
        let r = rule(None, Some(100.0));
        assert!(violations(&r, json!([1, null, 100])).is_empty());
        assert_eq!(violations(&r, json!([1, 101, 500])), vec!["More than 100"]);
        assert_eq!(violations(&r, json!([[1], [200]])), vec!["More than 100"]);
    }

    #[test]
    fn non_numbers_fail() {
        let r = rule(None, Some(1.0));
        assert_eq!(violations(&r, json!("3")), vec!["Not a number"]);
        assert_eq!(violations(&r, json!({ "n": 1 })), vec!["Not a number"]);
    }

    #[test]
    fn fractional_bounds_keep_their_fraction() {
        assert_eq!(format_bound(2.0), "2");
        assert_eq!(format_bound(-3.0), "-3");
        assert_eq!(format_bound(2.5), "2.5");
    }

    #[test]
    fn same_value_shares_one_outcome() {
        let r = rule(None, Some(0.0));
        let ctx = RequestContext::default();
        let value = json!(5);
        let path = Vec::new();
        let subject = Subject::Value { value: &value, path: &path };
        let first = r.evaluate(&subject, &ctx);
        let second = r.evaluate(&subject, &ctx);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.reasons(), ["More than 0".to_string()].as_slice());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let args = json!({ "min": 5, "max": 1, "policy": "THROW" }).as_object().cloned().unwrap();
        let err = Range::new()
            .instantiate(&args, Location::ArgumentDefinition)
            .unwrap_err();
        assert!(matches!(err, BastionError::InvalidArguments { .. }));
    }

    #[test]
    fn reported_path_is_all_strings() {
        let r = RangeRule { policy: Policy::Resolver, ..rule(None, Some(1.0)) };
        let ctx = RequestContext::default();
        let value = json!(5);
        let path = vec![PathSegment::from("pages"), PathSegment::from(1), PathSegment::from("size")];
        let subject = Subject::Value { value: &value, path: &path };
        let outcome = r.evaluate(&subject, &ctx);
        let reported = r.report(&outcome, &subject);
        assert_eq!(
            reported,
            vec![json!({ "path": ["pages", "1", "size"], "message": "More than 1", "value": 5 })]
        );
    }
}
