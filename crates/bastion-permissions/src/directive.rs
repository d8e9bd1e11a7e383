//! `@hasPermissions`: the caller must hold every listed permission.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use bastion_contracts::{
    directive::{ArgumentDefinition, DefaultValue, DirectiveDeclaration, EnumDeclaration, Location},
    error::{BastionError, BastionResult, FieldError},
    policy::{EvaluationOutcome, Policy},
};
use bastion_core::context::RequestContext;
use bastion_core::visitor::{policy_argument, DirectiveVisitor, Instance, Rule, Subject};

pub const DEFAULT_NAME: &str = "hasPermissions";

/// Side-channel slot listing the permissions a RESOLVER-policy check found
/// missing.
pub const MISSING_PERMISSIONS: &str = "missingPermissions";

/// The `@hasPermissions` implementation, registrable under any name.
#[derive(Debug, Clone)]
pub struct HasPermissions {
    declaration: DirectiveDeclaration,
}

impl HasPermissions {
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    pub fn named(name: &str) -> Self {
        let policy_enum = policy_enum_name(name);
        let declaration = DirectiveDeclaration::new(name)
            .description("ensures it has permissions before calling the resolver")
            .argument(
                ArgumentDefinition::new("permissions", "[String!]!")
                    .description("All permissions required by this field (or object). All must be fulfilled"),
            )
            .argument(
                ArgumentDefinition::new("policy", policy_enum.clone())
                    .description("How to handle missing permissions")
                    .default_value(DefaultValue::Enum(Policy::Throw.as_str().to_string())),
            )
            .locations([
                Location::ArgumentDefinition,
                Location::FieldDefinition,
                Location::InputFieldDefinition,
                Location::InputObject,
                Location::Object,
            ])
            .introduces(
                EnumDeclaration::new(policy_enum)
                    .value(
                        Policy::Resolver.as_str(),
                        Some("Field resolver is responsible to evaluate it using `missingPermissions` injected argument"),
                    )
                    .value(
                        Policy::Throw.as_str(),
                        Some("Field resolver is not called if permissions are missing, it throws `ForbiddenError`"),
                    ),
            );
        Self { declaration }
    }

    /// The generated SDL fragments: the directive, then its policy enum.
    pub fn type_defs(&self) -> Vec<String> {
        self.declaration.fragments()
    }
}

impl Default for HasPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveVisitor for HasPermissions {
    fn declaration(&self) -> &DirectiveDeclaration {
        &self.declaration
    }

    fn instantiate(&self, arguments: &Map<String, Value>, location: Location) -> BastionResult<Instance> {
        let name = &self.declaration.name;
        let permissions = arguments
            .get("permissions")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(name, "'permissions' must be a list of strings"))?
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(name, "'permissions' must be a list of strings"))
            })
            .collect::<BastionResult<Vec<String>>>()?;
        let policy = policy_argument(name, arguments, "policy")?;

        debug!(directive = %name, %location, ?permissions, %policy, "permission rule compiled");
        Ok(Instance::Rule(Arc::new(PermissionRule::new(name, permissions, policy))))
    }
}

/// One compiled `@hasPermissions` application.
#[derive(Debug, Clone)]
pub struct PermissionRule {
    directive: String,
    required: Vec<String>,
    policy: Policy,
    cache_key: String,
}

impl PermissionRule {
    pub fn new(directive: &str, required: Vec<String>, policy: Policy) -> Self {
        let cache_key = cache_key(&required);
        Self {
            directive: directive.to_string(),
            required,
            policy,
            cache_key,
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }
}

impl Rule for PermissionRule {
    fn directive(&self) -> &str {
        &self.directive
    }

    fn policy(&self) -> Policy {
        self.policy
    }

    /// The requirement is static, so fields and input values with the same
    /// permission list share one outcome per request.
    fn evaluate(&self, _subject: &Subject<'_>, ctx: &RequestContext) -> Arc<EvaluationOutcome> {
        ctx.check_missing_permissions(&self.required, &self.cache_key)
    }

    fn failure(&self, outcome: &EvaluationOutcome, ctx: &RequestContext) -> FieldError {
        FieldError::forbidden(ctx.error_message(outcome.reasons()))
    }

    fn slot(&self) -> &str {
        MISSING_PERMISSIONS
    }

    fn report(&self, outcome: &EvaluationOutcome, _subject: &Subject<'_>) -> Vec<Value> {
        outcome.reasons().iter().cloned().map(Value::String).collect()
    }
}

/// `hasPermissions` -> `HasPermissionsDirectivePolicy`.
fn policy_enum_name(directive: &str) -> String {
    let mut chars = directive.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{capitalized}DirectivePolicy")
}

/// Declared order is part of the key: the terse strategy reports the first
/// missing permission in that order.
fn cache_key(required: &[String]) -> String {
    format!("{MISSING_PERMISSIONS}:{}", required.join(","))
}

fn invalid(directive: &str, reason: &str) -> BastionError {
    BastionError::InvalidArguments {
        directive: directive.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bastion_core::context::ContextConfig;

    use super::*;

    #[test]
    fn policy_enum_name_capitalizes() {
        assert_eq!(policy_enum_name("hasPermissions"), "HasPermissionsDirectivePolicy");
        assert_eq!(policy_enum_name("auth"), "AuthDirectivePolicy");
    }

    #[test]
    fn cache_key_keeps_declared_order() {
        let a = cache_key(&["y".to_string(), "x".to_string()]);
        let b = cache_key(&["x".to_string(), "y".to_string()]);
        assert_ne!(a, b);
        assert_eq!(b, "missingPermissions:x,y");
    }

    #[test]
    fn terse_strategy_reports_first_missing_in_each_declared_order() {
        let ctx = RequestContext::new(ContextConfig::new().granted(Vec::<String>::new()));
        let subject = Subject::Field { parent_type: "Query", field: "test" };
        let yx = PermissionRule::new(DEFAULT_NAME, vec!["y".to_string(), "x".to_string()], Policy::Resolver);
        let xy = PermissionRule::new(DEFAULT_NAME, vec!["x".to_string(), "y".to_string()], Policy::Resolver);

        assert_eq!(yx.evaluate(&subject, &ctx).reasons(), ["y".to_string()].as_slice());
        assert_eq!(xy.evaluate(&subject, &ctx).reasons(), ["x".to_string()].as_slice());
        assert_eq!(ctx.cached_outcomes(), 2);
    }
}
