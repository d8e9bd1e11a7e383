//! The enforcement wrapper installed around object field resolvers.
//!
//! `EnforcedResolver` runs the field's attached instances in declared
//! order. A rule that fails under THROW ends the resolution with its error
//! and the wrapped resolver never runs. A rule that fails under RESOLVER
//! merges its report into the side channel and resolution continues.
//! Middlewares receive a `Next` continuation for the rest of the chain.
//!
//! After the field-level instances, the argument checks (if any) walk the
//! coerced arguments once, and finally the host resolver is called with
//! the possibly nulled arguments and the accumulated side channel.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use bastion_contracts::error::FieldResult;

use crate::context::RequestContext;
use crate::inputs::ArgumentEnforcer;
use crate::policy::{decide, Decision};
use crate::resolver::{Arguments, ResolveInfo, Resolver};
use crate::visitor::{Attached, Instance, Subject};

/// A directive implementation that wraps field resolution itself.
///
/// Middlewares may inspect or rewrite the resolve info (for example to put
/// data into the side channel) and decide whether to call `next`.
pub trait FieldMiddleware: Send + Sync {
    fn resolve(
        &self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
        next: Next<'_>,
    ) -> FieldResult<Value>;
}

/// The remainder of an enforcement chain.
pub struct Next<'a> {
    chain: &'a EnforcedResolver,
    index: usize,
}

impl Next<'_> {
    pub fn run(
        self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        self.chain.run_from(self.index, parent, args, ctx, info)
    }
}

pub struct EnforcedResolver {
    parent_type: String,
    field: String,
    steps: Vec<Attached>,
    arguments: Option<ArgumentEnforcer>,
    inner: Arc<dyn Resolver>,
}

impl EnforcedResolver {
    pub fn new(
        parent_type: impl Into<String>,
        field: impl Into<String>,
        steps: Vec<Attached>,
        arguments: Option<ArgumentEnforcer>,
        inner: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            parent_type: parent_type.into(),
            field: field.into(),
            steps,
            arguments,
            inner,
        }
    }

    fn run_from(
        &self,
        index: usize,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        let Some(step) = self.steps.get(index) else {
            return self.finish(parent, args, ctx, info);
        };

        let rule = match &step.instance {
            Instance::Middleware(middleware) => {
                let next = Next {
                    chain: self,
                    index: index + 1,
                };
                return middleware.resolve(parent, args, ctx, info, next);
            }
            Instance::Rule(rule) => rule,
        };

        // A malformed slot is a developer error whether or not this rule fails.
        info.failures.list(rule.slot())?;

        let subject = Subject::Field {
            parent_type: &self.parent_type,
            field: &self.field,
        };
        let outcome = rule.evaluate(&subject, ctx);

        match decide(rule.policy(), &outcome) {
            Decision::Proceed => self.run_from(index + 1, parent, args, ctx, info),
            Decision::Abort => {
                warn!(
                    request_id = %ctx.id(),
                    directive = %step.directive,
                    field = %format!("{}.{}", self.parent_type, self.field),
                    "field aborted by directive"
                );
                Err(rule.failure(&outcome, ctx))
            }
            Decision::Defer => {
                debug!(
                    request_id = %ctx.id(),
                    directive = %step.directive,
                    field = %format!("{}.{}", self.parent_type, self.field),
                    "directive failure deferred to resolver"
                );
                let mut info = info.clone();
                info.failures
                    .merge(rule.slot(), rule.report(&outcome, &subject))?;
                self.run_from(index + 1, parent, args, ctx, &info)
            }
        }
    }

    fn finish(
        &self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        let Some(enforcer) = &self.arguments else {
            return self.inner.resolve(parent, args, ctx, info);
        };

        let checked = enforcer.enforce(args, ctx)?;
        if checked.failures.is_empty() {
            return self.inner.resolve(parent, &checked.arguments, ctx, info);
        }

        let mut info = info.clone();
        info.failures.absorb(checked.failures)?;
        self.inner.resolve(parent, &checked.arguments, ctx, &info)
    }
}

impl Resolver for EnforcedResolver {
    fn resolve(
        &self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        self.run_from(0, parent, args, ctx, info)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Map};

    use bastion_contracts::{
        directive::{ArgumentDefinition, DefaultValue, DirectiveDeclaration, Location},
        error::{BastionResult, FieldError},
        policy::{EvaluationOutcome, Policy},
        response::PathSegment,
    };

    use crate::builder::SchemaBuilder;
    use crate::context::ContextConfig;
    use crate::executor::{execute, FieldSelection, Query};
    use crate::resolver::{from_fn, ResolverMap};
    use crate::schema::{
        DirectiveApplication, FieldDefinition, InputObjectType, InputValueDefinition, ObjectType,
        Schema, TypeDeclarations,
    };
    use crate::visitor::{DirectiveVisitor, InheritanceMode, Instance, Rule, Subject};

    use super::*;

    // ── Test directives ──────────────────────────────────────────────────────

    /// `@requires(token: String!, policy: String = THROW)`: satisfied when the
    /// caller was granted `token`.
    #[derive(Debug)]
    struct RequiresRule {
        token: String,
        policy: Policy,
    }

    impl Rule for RequiresRule {
        fn directive(&self) -> &str {
            "requires"
        }

        fn policy(&self) -> Policy {
            self.policy
        }

        fn evaluate(&self, _: &Subject<'_>, ctx: &RequestContext) -> Arc<EvaluationOutcome> {
            let required = [self.token.clone()];
            ctx.check_missing_permissions(&required, &format!("requires:{}", self.token))
        }

        fn failure(&self, _: &EvaluationOutcome, _: &RequestContext) -> FieldError {
            FieldError::forbidden(format!("needs {}", self.token))
        }

        fn slot(&self) -> &str {
            "missingTokens"
        }

        fn report(&self, outcome: &EvaluationOutcome, _: &Subject<'_>) -> Vec<Value> {
            outcome.reasons().iter().map(|r| json!(r)).collect()
        }
    }

    struct Requires {
        declaration: DirectiveDeclaration,
    }

    impl Requires {
        fn new() -> Self {
            Self {
                declaration: DirectiveDeclaration::new("requires")
                    .argument(ArgumentDefinition::new("token", "String!"))
                    .argument(
                        ArgumentDefinition::new("policy", "String")
                            .default_value(DefaultValue::Enum("THROW".to_string())),
                    )
                    .repeatable(true)
                    .locations([
                        Location::ArgumentDefinition,
                        Location::FieldDefinition,
                        Location::InputFieldDefinition,
                        Location::InputObject,
                        Location::Object,
                    ]),
            }
        }
    }

    impl DirectiveVisitor for Requires {
        fn declaration(&self) -> &DirectiveDeclaration {
            &self.declaration
        }

        fn instantiate(&self, arguments: &Map<String, Value>, _: Location) -> BastionResult<Instance> {
            let token = arguments
                .get("token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let policy = crate::visitor::policy_argument("requires", arguments, "policy")?;
            Ok(Instance::Rule(Arc::new(RequiresRule { token, policy })))
        }
    }

    /// `@inject(value: String!)`: writes a raw value into the side channel.
    struct Inject {
        declaration: DirectiveDeclaration,
    }

    struct InjectMiddleware {
        value: Value,
    }

    impl FieldMiddleware for InjectMiddleware {
        fn resolve(
            &self,
            parent: &Value,
            args: &Arguments,
            ctx: &RequestContext,
            info: &ResolveInfo,
            next: Next<'_>,
        ) -> FieldResult<Value> {
            let mut info = info.clone();
            info.failures.set("missingTokens", self.value.clone());
            next.run(parent, args, ctx, &info)
        }
    }

    impl DirectiveVisitor for Inject {
        fn declaration(&self) -> &DirectiveDeclaration {
            &self.declaration
        }

        fn instantiate(&self, arguments: &Map<String, Value>, _: Location) -> BastionResult<Instance> {
            let value = arguments.get("value").cloned().unwrap_or(Value::Null);
            Ok(Instance::Middleware(Arc::new(InjectMiddleware { value })))
        }
    }

    fn inject() -> Arc<Inject> {
        Arc::new(Inject {
            declaration: DirectiveDeclaration::new("inject")
                .argument(ArgumentDefinition::new("value", "String!"))
                .locations([Location::FieldDefinition, Location::Object, Location::ArgumentDefinition]),
        })
    }

    fn requires(token: &str) -> DirectiveApplication {
        DirectiveApplication::new("requires").arg("token", json!(token))
    }

    fn requires_deferred(token: &str) -> DirectiveApplication {
        requires(token).arg("policy", json!("RESOLVER"))
    }

    fn ctx(granted: &[&str]) -> RequestContext {
        RequestContext::new(ContextConfig::new().granted(granted.iter().copied()))
    }

    fn run(schema: &Schema, query: &Query, ctx: &RequestContext) -> bastion_contracts::response::ExecutionResult {
        execute(schema, query, &Value::Null, ctx, &Map::new())
    }

    /// A resolver that counts calls and echoes its arguments and side channel.
    fn echo(calls: &Arc<AtomicUsize>) -> impl Resolver + 'static {
        let calls = Arc::clone(calls);
        from_fn(move |_, args, _, info| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({
                "args": Value::Object(args.clone()),
                "missing": info.failures.get("missingTokens").cloned().unwrap_or(Value::Null),
                "paths": info.failures.failed_paths().len(),
            }))
        })
    }

    fn build(declarations: TypeDeclarations, resolvers: ResolverMap, mode: InheritanceMode) -> Schema {
        SchemaBuilder::new(declarations)
            .resolvers(resolvers)
            .directive(Arc::new(Requires::new()))
            .directive(inject())
            .inheritance(mode)
            .build()
            .unwrap()
    }

    // ── Object fields ────────────────────────────────────────────────────────

    #[test]
    fn throw_failure_nulls_field_and_skips_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new().object(
            ObjectType::new("Query")
                .field(FieldDefinition::new("secret", "JSON").directive(requires("a")))
                .field(FieldDefinition::new("open", "JSON")),
        );
        let schema = build(
            declarations.scalar("JSON"),
            ResolverMap::new()
                .field("Query", "secret", echo(&calls))
                .field("Query", "open", from_fn(|_, _, _, _| Ok(json!("ok")))),
            InheritanceMode::Override,
        );

        let query = Query::new()
            .select(FieldSelection::new("secret"))
            .select(FieldSelection::new("open"));
        let result = run(&schema, &query, &ctx(&[]));
        assert_eq!(result.data, json!({ "secret": null, "open": "ok" }));
        assert_eq!(result.messages(), vec!["needs a"]);
        assert_eq!(result.errors[0].path, vec![PathSegment::from("secret")]);
        assert_eq!(result.errors[0].code(), Some("FORBIDDEN"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "resolver must not run");
    }

    #[test]
    fn stacked_instances_short_circuit_in_declared_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new().scalar("JSON").object(
            ObjectType::new("Query").field(
                FieldDefinition::new("f", "JSON")
                    .directive(requires("b"))
                    .directive(requires("c")),
            ),
        );
        let schema = build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(&calls)),
            InheritanceMode::Override,
        );

        let context = ctx(&[]);
        let result = run(&schema, &Query::new().select(FieldSelection::new("f")), &context);
        assert_eq!(result.messages(), vec!["needs b"]);
        assert_eq!(context.cached_outcomes(), 1, "`c` must not be evaluated");

        let context = ctx(&["b"]);
        let result = run(&schema, &Query::new().select(FieldSelection::new("f")), &context);
        assert_eq!(result.messages(), vec!["needs c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_throw_failure_stops_later_instances() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new().scalar("JSON").object(
            ObjectType::new("Query")
                .directive(requires("type"))
                .field(FieldDefinition::new("f", "JSON").directive(DirectiveApplication::new("inject").arg("value", json!("x")))),
        );
        let schema = build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(&calls)),
            InheritanceMode::Override,
        );
        let result = run(&schema, &Query::new().select(FieldSelection::new("f")), &ctx(&[]));
        assert_eq!(result.messages(), vec!["needs type"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resolver_policy_passes_failures_to_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new().scalar("JSON").object(
            ObjectType::new("Query").field(FieldDefinition::new("f", "JSON").directive(requires_deferred("z"))),
        );
        let schema = build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(&calls)),
            InheritanceMode::Override,
        );
        let result = run(&schema, &Query::new().select(FieldSelection::new("f")), &ctx(&["a"]));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.data["f"]["missing"], json!(["z"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_side_channel_is_configuration_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new().scalar("JSON").object(
            ObjectType::new("Query").field(
                FieldDefinition::new("f", "JSON")
                    .directive(DirectiveApplication::new("inject").arg("value", json!("not a list")))
                    .directive(requires_deferred("z")),
            ),
        );
        let schema = build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(&calls)),
            InheritanceMode::Override,
        );
        let result = run(&schema, &Query::new().select(FieldSelection::new("f")), &ctx(&["z"]));
        assert_eq!(result.data, json!({ "f": null }));
        assert_eq!(result.messages(), vec!["The missingTokens field is not an array!"]);
        assert_eq!(result.errors[0].code(), Some("INTERNAL_SERVER_ERROR"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // ── Inheritance ──────────────────────────────────────────────────────────

    fn inherited(mode: InheritanceMode) -> Schema {
        let declarations = TypeDeclarations::new().object(
            ObjectType::new("Query")
                .directive(requires("x"))
                .field(FieldDefinition::new("plain", "String"))
                .field(FieldDefinition::new("special", "String").directive(requires("y"))),
        );
        build(declarations, ResolverMap::new(), mode)
    }

    fn both_fields() -> Query {
        Query::new()
            .select(FieldSelection::new("plain"))
            .select(FieldSelection::new("special"))
    }

    #[test]
    fn field_instance_overrides_type_instance() {
        let schema = inherited(InheritanceMode::Override);
        let root = json!({ "plain": "p", "special": "s" });

        let result = execute(&schema, &both_fields(), &root, &ctx(&["x"]), &Map::new());
        assert_eq!(result.data, json!({ "plain": "p", "special": null }));
        assert_eq!(result.messages(), vec!["needs y"]);

        // Only `y` is needed on the overriding field.
        let result = execute(&schema, &both_fields(), &root, &ctx(&["y"]), &Map::new());
        assert_eq!(result.data, json!({ "plain": null, "special": "s" }));
    }

    #[test]
    fn stack_mode_requires_both() {
        let schema = inherited(InheritanceMode::Stack);
        let root = json!({ "plain": "p", "special": "s" });
        let result = execute(&schema, &both_fields(), &root, &ctx(&["y"]), &Map::new());
        assert_eq!(result.data, json!({ "plain": null, "special": null }));
        assert_eq!(result.messages(), vec!["needs x", "needs x"]);
    }

    // ── Arguments and inputs ─────────────────────────────────────────────────

    fn input_schema(calls: &Arc<AtomicUsize>) -> Schema {
        let declarations = TypeDeclarations::new()
            .scalar("JSON")
            .input(
                InputObjectType::new("Inner")
                    .field(InputValueDefinition::new("soft", "Int").directive(requires_deferred("s")))
                    .field(InputValueDefinition::new("hard", "Int").directive(requires("h")))
                    .field(InputValueDefinition::new("free", "Int")),
            )
            .input(InputObjectType::new("Outer").field(InputValueDefinition::new("items", "[Inner]")))
            .object(
                ObjectType::new("Query").field(
                    FieldDefinition::new("f", "JSON")
                        .argument(InputValueDefinition::new("outer", "Outer"))
                        .argument(InputValueDefinition::new("again", "Inner"))
                        .argument(InputValueDefinition::new("n", "Int").directive(requires_deferred("s"))),
                ),
            );
        build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(calls)),
            InheritanceMode::Override,
        )
    }

    #[test]
    fn deferred_input_failures_null_only_failing_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = input_schema(&calls);
        let query = Query::new().select(
            FieldSelection::new("f")
                .arg("outer", json!({ "items": [{ "soft": 1, "free": 2 }, null, { "free": 3 }] }))
                .arg("n", json!(4)),
        );
        let context = ctx(&["h"]);
        let result = run(&schema, &query, &context);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            result.data["f"]["args"],
            json!({
                "outer": { "items": [{ "soft": null, "free": 2 }, null, { "free": 3 }] },
                "n": null,
            })
        );
        assert_eq!(result.data["f"]["missing"], json!(["s"]));
        assert_eq!(result.data["f"]["paths"], json!(2));
        // Both `s` checks share one cached outcome.
        assert_eq!(context.cached_outcomes(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throw_anywhere_in_arguments_aborts_the_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = input_schema(&calls);
        let query = Query::new().select(
            FieldSelection::new("f")
                .arg("n", json!(1))
                .arg("again", json!({ "soft": 1, "hard": 2 })),
        );
        let result = run(&schema, &query, &ctx(&[]));
        assert_eq!(result.data, json!({ "f": null }));
        assert_eq!(result.messages(), vec!["needs h"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stacked_input_instances_stop_at_first_throw() {
        let calls = Arc::new(AtomicUsize::new(0));
        let declarations = TypeDeclarations::new()
            .scalar("JSON")
            .input(
                InputObjectType::new("Pair").field(
                    InputValueDefinition::new("v", "Int")
                        .directive(requires("p"))
                        .directive(requires_deferred("q")),
                ),
            )
            .object(
                ObjectType::new("Query").field(
                    FieldDefinition::new("f", "JSON")
                        .argument(
                            InputValueDefinition::new("n", "Int")
                                .directive(requires("a"))
                                .directive(requires_deferred("b")),
                        )
                        .argument(InputValueDefinition::new("pair", "Pair")),
                ),
            );
        let schema = build(
            declarations,
            ResolverMap::new().field("Query", "f", echo(&calls)),
            InheritanceMode::Override,
        );

        let context = ctx(&[]);
        let query = Query::new().select(FieldSelection::new("f").arg("n", json!(1)));
        let result = run(&schema, &query, &context);
        assert_eq!(result.data, json!({ "f": null }));
        assert_eq!(result.messages(), vec!["needs a"]);
        assert_eq!(context.cached_outcomes(), 1, "`b` must not be evaluated");

        let context = ctx(&[]);
        let query = Query::new().select(FieldSelection::new("f").arg("pair", json!({ "v": 1 })));
        let result = run(&schema, &query, &context);
        assert_eq!(result.messages(), vec!["needs p"]);
        assert_eq!(context.cached_outcomes(), 1, "`q` must not be evaluated");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn absent_and_null_inputs_are_not_checked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = input_schema(&calls);
        let query = Query::new().select(
            FieldSelection::new("f")
                .arg("again", json!({ "hard": null, "free": 1 }))
                .arg("n", Value::Null),
        );
        let context = ctx(&[]);
        let result = run(&schema, &query, &context);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.data["f"]["missing"], Value::Null);
        assert_eq!(context.cached_outcomes(), 0);
    }

    #[test]
    fn middleware_on_argument_is_rejected() {
        let declarations = TypeDeclarations::new().object(
            ObjectType::new("Query").field(
                FieldDefinition::new("f", "Int").argument(
                    InputValueDefinition::new("n", "Int")
                        .directive(DirectiveApplication::new("inject").arg("value", json!("x"))),
                ),
            ),
        );
        let err = SchemaBuilder::new(declarations)
            .directive(inject())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            bastion_contracts::error::BastionError::DisallowedLocation { .. }
        ));
    }
}
