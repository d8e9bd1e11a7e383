//! Demo scenarios.
//!
//! Each scenario declares a small schema, applies directives to it, and runs
//! one query against it for the caller described by the CLI flags. Results
//! are printed as GraphQL-style JSON responses.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use bastion_contracts::error::BastionResult;
use bastion_contracts::response::ExecutionResult;
use bastion_core::{
    executor::{execute, FieldSelection, Query},
    resolver::{from_fn, ResolverMap},
    schema::{
        DirectiveApplication, FieldDefinition, InputObjectType, InputValueDefinition, ObjectType,
        Schema, TypeDeclarations,
    },
    SchemaBuilder, Settings,
};
use bastion_permissions::{HasPermissions, MissingPermissionsExt};
use bastion_validate::{common_type_defs, Range, ValidationErrorsExt};

/// Who the query runs as: `None` means no permission set at all.
pub type Grant<'a> = Option<&'a [String]>;

fn has(permissions: &[&str]) -> DirectiveApplication {
    DirectiveApplication::new("hasPermissions").arg("permissions", json!(permissions))
}

fn print_result(title: &str, result: &ExecutionResult) {
    println!("── {title}");
    match serde_json::to_string_pretty(result) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => println!("<unprintable result: {e}>"),
    }
    println!();
}

fn describe_grant(granted: Grant<'_>) -> String {
    match granted {
        None => "no permission set".to_string(),
        Some([]) => "empty permission set".to_string(),
        Some(list) => list.join(", "),
    }
}

/// Keep the first character of the user part: `user@x.com` -> `u***@x.com`.
fn mask(email: &str) -> String {
    match email.split_once('@') {
        Some((user, domain)) => {
            let mut chars = user.chars();
            let first: String = chars.next().map(String::from).unwrap_or_default();
            format!("{first}{}@{domain}", "*".repeat(chars.count()))
        }
        None => email.to_string(),
    }
}

// ── Scenario 1: masked email ──────────────────────────────────────────────────

fn mask_email_schema(settings: &Settings) -> BastionResult<Schema> {
    let declarations = TypeDeclarations::new()
        .object(
            ObjectType::new("User")
                .field(FieldDefinition::new("name", "String"))
                .field(
                    FieldDefinition::new("email", "String")
                        .directive(has(&["user:email"]).arg("policy", json!("RESOLVER"))),
                )
                .field(FieldDefinition::new("ssn", "String").directive(has(&["user:ssn", "admin"]))),
        )
        .object(ObjectType::new("Query").field(FieldDefinition::new("me", "User")));

    let resolvers = ResolverMap::new().field(
        "User",
        "email",
        from_fn(|parent, _, _, info| {
            let email = parent.get("email").and_then(Value::as_str).unwrap_or_default();
            match info.missing_permissions()? {
                Some(_) => Ok(json!(mask(email))),
                None => Ok(json!(email)),
            }
        }),
    );

    SchemaBuilder::new(declarations)
        .resolvers(resolvers)
        .directive(Arc::new(HasPermissions::new()))
        .inheritance(settings.inheritance)
        .build()
}

/// A RESOLVER-policy field masks its value; a THROW-policy field is nulled.
pub fn mask_email(settings: &Settings, granted: Grant<'_>) -> BastionResult<()> {
    let schema = mask_email_schema(settings)?;
    let query = Query::new().select(
        FieldSelection::new("me")
            .select(FieldSelection::new("name"))
            .select(FieldSelection::new("email"))
            .select(FieldSelection::new("ssn")),
    );
    let root = json!({
        "me": { "name": "Ada", "email": "ada@example.com", "ssn": "000-12-3456" }
    });

    let ctx = settings.context(granted.map(|g| g.iter().cloned()));
    info!(request = %ctx.id(), "running mask-email");
    let result = execute(&schema, &query, &root, &ctx, &Default::default());
    print_result(&format!("mask-email as [{}]", describe_grant(granted)), &result);
    Ok(())
}

// ── Scenario 2: whole-object annotation ───────────────────────────────────────

/// An object-level annotation guards every field; a field's own annotation
/// of the same directive overrides it (or stacks, per settings).
pub fn whole_object(settings: &Settings, granted: Grant<'_>) -> BastionResult<()> {
    let declarations = TypeDeclarations::new()
        .object(
            ObjectType::new("Invoice")
                .directive(has(&["billing:read"]))
                .field(FieldDefinition::new("number", "String"))
                .field(FieldDefinition::new("total", "Float"))
                .field(FieldDefinition::new("notes", "String").directive(has(&["billing:notes"]))),
        )
        .object(ObjectType::new("Query").field(FieldDefinition::new("invoice", "Invoice")));
    let schema = SchemaBuilder::new(declarations)
        .directive(Arc::new(HasPermissions::new()))
        .inheritance(settings.inheritance)
        .build()?;

    let query = Query::new().select(
        FieldSelection::new("invoice")
            .select(FieldSelection::new("number"))
            .select(FieldSelection::new("total"))
            .select(FieldSelection::new("notes")),
    );
    let root = json!({
        "invoice": { "number": "INV-0042", "total": 129.5, "notes": "net 30" }
    });

    let ctx = settings.context(granted.map(|g| g.iter().cloned()));
    info!(request = %ctx.id(), inheritance = ?settings.inheritance, "running whole-object");
    let result = execute(&schema, &query, &root, &ctx, &Default::default());
    print_result(&format!("whole-object as [{}]", describe_grant(granted)), &result);
    Ok(())
}

// ── Scenario 3: input validation ──────────────────────────────────────────────

/// Range checks on arguments and input fields: the THROW argument aborts the
/// call, RESOLVER values are nulled and reported to the resolver.
pub fn validate_input(settings: &Settings, _granted: Grant<'_>) -> BastionResult<()> {
    let declarations = TypeDeclarations::new()
        .input(
            InputObjectType::new("Page")
                .field(
                    InputValueDefinition::new("size", "Int")
                        .directive(DirectiveApplication::new("range").arg("min", json!(1)).arg("max", json!(100))),
                )
                .field(InputValueDefinition::new("cursor", "String")),
        )
        .object(
            ObjectType::new("Query").field(
                FieldDefinition::new("items", "String")
                    .argument(InputValueDefinition::new("page", "Page"))
                    .argument(
                        InputValueDefinition::new("depth", "Int").directive(
                            DirectiveApplication::new("range")
                                .arg("max", json!(3))
                                .arg("policy", json!("THROW")),
                        ),
                    ),
            ),
        );
    let resolvers = ResolverMap::new().field(
        "Query",
        "items",
        from_fn(|_, args, _, info| {
            let errors = info.validation_errors()?.unwrap_or_default();
            Ok(json!({
                "receivedArguments": args,
                "validationErrors": errors,
            })
            .to_string()
            .into())
        }),
    );
    let schema = SchemaBuilder::new(declarations)
        .resolvers(resolvers)
        .directive(Arc::new(Range::new()))
        .inheritance(settings.inheritance)
        .build()?;

    let root = Value::Null;
    let cases = [
        ("valid page", json!({ "size": 20, "cursor": "abc" }), json!(2)),
        ("page size out of range", json!({ "size": 500, "cursor": "abc" }), json!(2)),
        ("depth out of range", json!({ "size": 20 }), json!(9)),
    ];
    for (title, page, depth) in cases {
        let query = Query::new().select(
            FieldSelection::new("items")
                .var("page", "page")
                .var("depth", "depth"),
        );
        let variables = json!({ "page": page, "depth": depth })
            .as_object()
            .cloned()
            .unwrap_or_default();
        let ctx = settings.context(None::<Vec<String>>);
        let result = execute(&schema, &query, &root, &ctx, &variables);
        print_result(&format!("validate-input: {title}"), &result);
    }
    Ok(())
}

// ── Scenario 4: SDL ───────────────────────────────────────────────────────────

fn sdl_fragments(settings: &Settings) -> BastionResult<Vec<String>> {
    let declarations =
        TypeDeclarations::new().object(ObjectType::new("Query").field(FieldDefinition::new("ping", "String")));
    let schema = SchemaBuilder::new(declarations)
        .directive(Arc::new(HasPermissions::new()))
        .directive(Arc::new(Range::new()))
        .inheritance(settings.inheritance)
        .build()?;

    let mut fragments = schema.directive_sdl();
    // The output type is not introduced by any directive.
    fragments.extend(common_type_defs().first().cloned());
    Ok(fragments)
}

/// Print the directive declarations a host would add to its type definitions.
pub fn print_sdl(settings: &Settings) -> BastionResult<()> {
    for fragment in sdl_fragments(settings)? {
        println!("{fragment}");
    }
    Ok(())
}
