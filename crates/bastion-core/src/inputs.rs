//! Enforcement for arguments and input object fields.
//!
//! Inputs are coerced before any resolver runs, so their annotations cannot
//! wrap a resolver. Instead the builder compiles a plan per input object
//! type (only for types that carry rules, directly or through a nested
//! field) and an `ArgumentEnforcer` per object field. At request time the
//! enforcer walks the coerced arguments once:
//!
//! - absent and null values are skipped, along with everything below them;
//! - the first THROW failure anywhere aborts the whole field call;
//! - RESOLVER failures are collected, their value is nulled in the copy of
//!   the arguments handed to the resolver, and the walk continues.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_graphql_parser::types::{BaseType, Type};
use serde_json::Value;
use tracing::{debug, warn};

use bastion_contracts::{error::FieldResult, failure::FailureInfo, response::PathSegment};

use crate::context::RequestContext;
use crate::policy::{decide, Decision};
use crate::resolver::Arguments;
use crate::schema::underlying_type;
use crate::visitor::{Rule, Subject};

/// Rules of one argument or input field, plus its type for descending.
#[derive(Debug, Clone)]
pub struct InputValuePlan {
    pub name: String,
    pub ty: Type,
    pub rules: Vec<Arc<dyn Rule>>,
}

/// Plans for every input object type that needs walking.
#[derive(Debug, Default)]
pub struct InputPlans {
    objects: HashMap<String, Vec<InputValuePlan>>,
}

impl InputPlans {
    /// Build plans from the rules of every input object type, dropping
    /// types and fields that can never reach a rule.
    pub fn new(mut objects: HashMap<String, Vec<InputValuePlan>>) -> Self {
        let mut needed: HashSet<String> = objects
            .iter()
            .filter(|(_, fields)| fields.iter().any(|f| !f.rules.is_empty()))
            .map(|(name, _)| name.clone())
            .collect();

        loop {
            let newly: Vec<String> = objects
                .iter()
                .filter(|(name, _)| !needed.contains(*name))
                .filter(|(_, fields)| fields.iter().any(|f| needed.contains(underlying_type(&f.ty))))
                .map(|(name, _)| name.clone())
                .collect();
            if newly.is_empty() {
                break;
            }
            needed.extend(newly);
        }

        objects.retain(|name, _| needed.contains(name));
        for fields in objects.values_mut() {
            fields.retain(|f| !f.rules.is_empty() || needed.contains(underlying_type(&f.ty)));
        }
        Self { objects }
    }

    /// Whether values of `ty` may contain something to check.
    pub fn needs_walk(&self, ty: &Type) -> bool {
        self.objects.contains_key(underlying_type(ty))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Arguments after enforcement: the copy passed to the resolver and the
/// side-channel data the walk produced.
#[derive(Debug)]
pub struct CheckedArguments {
    pub arguments: Arguments,
    pub failures: FailureInfo,
}

/// Argument checks of one object field.
#[derive(Debug, Clone)]
pub struct ArgumentEnforcer {
    arguments: Vec<InputValuePlan>,
    plans: Arc<InputPlans>,
}

impl ArgumentEnforcer {
    /// `None` when none of `arguments` can reach a rule.
    pub fn new(arguments: Vec<InputValuePlan>, plans: Arc<InputPlans>) -> Option<Self> {
        let arguments: Vec<InputValuePlan> = arguments
            .into_iter()
            .filter(|a| !a.rules.is_empty() || plans.needs_walk(&a.ty))
            .collect();
        if arguments.is_empty() {
            None
        } else {
            Some(Self { arguments, plans })
        }
    }

    pub fn enforce(&self, args: &Arguments, ctx: &RequestContext) -> FieldResult<CheckedArguments> {
        let mut walk = InputWalk {
            ctx,
            plans: &self.plans,
            failures: FailureInfo::default(),
            nulled: Vec::new(),
        };

        let mut path = Vec::new();
        for plan in &self.arguments {
            if let Some(value) = args.get(&plan.name) {
                path.push(PathSegment::Key(plan.name.clone()));
                walk.visit(plan, value, &mut path)?;
                path.pop();
            }
        }

        let mut root = Value::Object(args.clone());
        for nulled in &walk.nulled {
            null_at(&mut root, nulled);
        }
        let arguments = match root {
            Value::Object(map) => map,
            _ => args.clone(),
        };

        if !walk.nulled.is_empty() {
            debug!(
                request_id = %ctx.id(),
                nulled = walk.nulled.len(),
                "input values nulled by deferred directives"
            );
        }
        Ok(CheckedArguments {
            arguments,
            failures: walk.failures,
        })
    }
}

struct InputWalk<'a> {
    ctx: &'a RequestContext,
    plans: &'a InputPlans,
    failures: FailureInfo,
    nulled: Vec<Vec<PathSegment>>,
}

impl InputWalk<'_> {
    fn visit(&mut self, plan: &InputValuePlan, value: &Value, path: &mut Vec<PathSegment>) -> FieldResult<()> {
        if value.is_null() {
            return Ok(());
        }

        let mut deferred = false;
        for rule in &plan.rules {
            let subject = Subject::Value { value, path };
            let outcome = rule.evaluate(&subject, self.ctx);
            match decide(rule.policy(), &outcome) {
                Decision::Proceed => {}
                Decision::Abort => {
                    warn!(
                        request_id = %self.ctx.id(),
                        directive = rule.directive(),
                        path = %bastion_contracts::response::dotted(path),
                        "field call aborted by input directive"
                    );
                    return Err(rule.failure(&outcome, self.ctx));
                }
                Decision::Defer => {
                    self.failures.merge(rule.slot(), rule.report(&outcome, &subject))?;
                    deferred = true;
                }
            }
        }

        if deferred {
            self.failures.record_path(path.clone());
            self.nulled.push(path.clone());
        }

        // Keep descending even below a nulled value: a THROW failure deeper
        // in the tree still aborts the call.
        self.descend(&plan.ty, value, path)
    }

    fn descend(&mut self, ty: &Type, value: &Value, path: &mut Vec<PathSegment>) -> FieldResult<()> {
        match (&ty.base, value) {
            (BaseType::List(inner), Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    if item.is_null() {
                        continue;
                    }
                    path.push(PathSegment::Index(index));
                    self.descend(inner, item, path)?;
                    path.pop();
                }
                Ok(())
            }
            (BaseType::Named(name), Value::Object(fields)) => {
                let Some(plans) = self.plans.objects.get(name.as_str()) else {
                    return Ok(());
                };
                for plan in plans {
                    if let Some(field_value) = fields.get(&plan.name) {
                        path.push(PathSegment::Key(plan.name.clone()));
                        self.visit(plan, field_value, path)?;
                        path.pop();
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn null_at(root: &mut Value, path: &[PathSegment]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        let next = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return,
        }
    }
    match (last, current) {
        (PathSegment::Key(key), Value::Object(map)) => {
            if let Some(slot) = map.get_mut(key) {
                *slot = Value::Null;
            }
        }
        (PathSegment::Index(index), Value::Array(items)) => {
            if let Some(slot) = items.get_mut(*index) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}
