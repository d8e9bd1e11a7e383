//! Directive implementations and the attachment layer.
//!
//! A `DirectiveVisitor` owns one directive declaration and compiles each
//! application of it into an `Instance`: either a `Rule` (a predicate plus
//! a policy) or a `FieldMiddleware`. The builder asks the registry to
//! compile every application it finds, one routine per `Location`, and
//! then installs the instances at the right resolution point.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use bastion_contracts::{
    directive::{DirectiveDeclaration, Location},
    error::{BastionError, BastionResult, FieldError},
    policy::{EvaluationOutcome, Policy},
    response::PathSegment,
};

use crate::context::RequestContext;
use crate::enforce::FieldMiddleware;
use crate::schema::DirectiveApplication;

/// What a rule is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// An object field about to resolve. The requirement is static, so
    /// there is no value yet.
    Field { parent_type: &'a str, field: &'a str },
    /// A present, non-null input value at `path` in the field's arguments.
    Value { value: &'a Value, path: &'a [PathSegment] },
}

/// One compiled annotation instance: a fixed-shape predicate and the policy
/// enforcing it.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Name of the directive this rule came from.
    fn directive(&self) -> &str;

    fn policy(&self) -> Policy;

    /// Evaluate through the request cache.
    fn evaluate(&self, subject: &Subject<'_>, ctx: &RequestContext) -> Arc<EvaluationOutcome>;

    /// The error recorded when this rule fails under THROW.
    fn failure(&self, outcome: &EvaluationOutcome, ctx: &RequestContext) -> FieldError;

    /// Side-channel slot the rule reports deferred failures into.
    fn slot(&self) -> &str;

    /// Slot entries describing a deferred failure.
    fn report(&self, outcome: &EvaluationOutcome, subject: &Subject<'_>) -> Vec<Value>;
}

/// A compiled directive application.
#[derive(Clone)]
pub enum Instance {
    Rule(Arc<dyn Rule>),
    Middleware(Arc<dyn FieldMiddleware>),
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Rule(rule) => f.debug_tuple("Rule").field(rule).finish(),
            Instance::Middleware(_) => f.write_str("Middleware"),
        }
    }
}

/// An implementation of one directive.
pub trait DirectiveVisitor: Send + Sync {
    fn declaration(&self) -> &DirectiveDeclaration;

    /// Compile one application. `arguments` have already been checked
    /// against the declaration and carry its defaults.
    fn instantiate(&self, arguments: &Map<String, Value>, location: Location) -> BastionResult<Instance>;
}

/// An instance together with the directive name it was applied as.
#[derive(Debug, Clone)]
pub struct Attached {
    pub directive: String,
    pub instance: Instance,
}

impl Attached {
    pub fn rule(&self) -> Option<&Arc<dyn Rule>> {
        match &self.instance {
            Instance::Rule(rule) => Some(rule),
            Instance::Middleware(_) => None,
        }
    }
}

/// How a whole-type annotation combines with a field's own annotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    /// A field's own instance of a directive replaces the type-level one.
    #[default]
    Override,
    /// Type-level instances run first, then the field's own.
    Stack,
}

/// Combine type-level and field-level instances for one field.
pub fn inherit(type_level: &[Attached], own: &[Attached], mode: InheritanceMode) -> Vec<Attached> {
    match mode {
        InheritanceMode::Stack => type_level.iter().chain(own).cloned().collect(),
        InheritanceMode::Override => type_level
            .iter()
            .filter(|t| !own.iter().any(|o| o.directive == t.directive))
            .chain(own)
            .cloned()
            .collect(),
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Directive implementations by name.
#[derive(Default, Clone)]
pub struct DirectiveRegistry {
    visitors: BTreeMap<String, Arc<dyn DirectiveVisitor>>,
}

impl DirectiveRegistry {
    /// Register `visitor` under its declared name.
    ///
    /// Registering an identical declaration twice is a no-op. A different
    /// declaration under a taken name, or an introduced enum that clashes
    /// with one introduced by another directive, is rejected.
    pub fn register(&mut self, visitor: Arc<dyn DirectiveVisitor>) -> BastionResult<()> {
        let declaration = visitor.declaration();
        if let Some(existing) = self.visitors.get(&declaration.name) {
            if existing.declaration() == declaration {
                return Ok(());
            }
            return Err(BastionError::DuplicateDirective {
                name: declaration.name.clone(),
            });
        }

        for introduced in &declaration.introduced_enums {
            let clash = self
                .visitors
                .values()
                .flat_map(|v| v.declaration().introduced_enums.iter())
                .any(|e| e.name == introduced.name && e != introduced);
            if clash {
                return Err(BastionError::DuplicateDirective {
                    name: declaration.name.clone(),
                });
            }
        }

        debug!(directive = %declaration.name, "directive registered");
        self.visitors.insert(declaration.name.clone(), visitor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DirectiveVisitor>> {
        self.visitors.get(name)
    }

    /// Declarations sorted by directive name.
    pub fn declarations(&self) -> Vec<DirectiveDeclaration> {
        self.visitors.values().map(|v| v.declaration().clone()).collect()
    }

    /// Compile every application on one element, in declared order.
    ///
    /// `element` describes the element for error messages, e.g.
    /// `field Query.test`.
    pub fn compile(
        &self,
        applications: &[DirectiveApplication],
        location: Location,
        element: &str,
    ) -> BastionResult<Vec<Attached>> {
        let mut attached = Vec::with_capacity(applications.len());
        for (index, application) in applications.iter().enumerate() {
            let visitor = self
                .get(&application.name)
                .ok_or_else(|| BastionError::UnknownDirective {
                    directive: application.name.clone(),
                    element: element.to_string(),
                })?;
            let declaration = visitor.declaration();

            if !declaration.allows(location) {
                return Err(BastionError::DisallowedLocation {
                    directive: application.name.clone(),
                    location: location.to_string(),
                    element: element.to_string(),
                });
            }

            let repeated = applications[..index]
                .iter()
                .any(|earlier| earlier.name == application.name);
            if repeated && !declaration.repeatable {
                return Err(BastionError::InvalidSchema {
                    reason: format!(
                        "non-repeatable directive '@{}' used more than once on {element}",
                        application.name
                    ),
                });
            }

            let arguments = declaration.resolve_arguments(&application.arguments)?;
            let instance = visitor.instantiate(&arguments, location)?;
            if matches!(instance, Instance::Middleware(_)) && is_input_location(location) {
                return Err(BastionError::DisallowedLocation {
                    directive: application.name.clone(),
                    location: location.to_string(),
                    element: element.to_string(),
                });
            }

            attached.push(Attached {
                directive: application.name.clone(),
                instance,
            });
        }
        Ok(attached)
    }
}

fn is_input_location(location: Location) -> bool {
    matches!(
        location,
        Location::ArgumentDefinition | Location::InputFieldDefinition | Location::InputObject
    )
}

/// Read a `Policy` argument.
pub fn policy_argument(
    directive: &str,
    arguments: &Map<String, Value>,
    name: &str,
) -> BastionResult<Policy> {
    let raw = arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| BastionError::InvalidArguments {
            directive: directive.to_string(),
            reason: format!("'{name}' must be THROW or RESOLVER"),
        })?;
    raw.parse().map_err(|reason| BastionError::InvalidArguments {
        directive: directive.to_string(),
        reason,
    })
}
