//! Field resolvers and the resolution info passed to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql_parser::types::Type;
use serde_json::{Map, Value};

use bastion_contracts::{error::FieldResult, failure::FailureInfo, response::PathSegment};

use crate::context::RequestContext;

/// Coerced arguments of one field call.
pub type Arguments = Map<String, Value>;

/// What a resolver knows about the position it is resolving.
///
/// `failures` is the side channel: enforcement wrappers fill it with the
/// failures of RESOLVER-policy annotations before the resolver runs.
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    pub parent_type: String,
    pub field_name: String,
    pub return_type: Type,
    pub path: Vec<PathSegment>,
    pub failures: FailureInfo,
}

/// Produces the value of one object field.
///
/// Implementations must not block; the same resolver may be driven from a
/// synchronous or an asynchronous execution loop.
pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value>;
}

impl<F> Resolver for F
where
    F: Fn(&Value, &Arguments, &RequestContext, &ResolveInfo) -> FieldResult<Value> + Send + Sync,
{
    fn resolve(
        &self,
        parent: &Value,
        args: &Arguments,
        ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        self(parent, args, ctx, info)
    }
}

/// Pin a closure to the resolver signature so its parameter types can be
/// inferred.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&Value, &Arguments, &RequestContext, &ResolveInfo) -> FieldResult<Value> + Send + Sync,
{
    f
}

/// Reads the field's own name off the parent object; `null` when absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyResolver;

impl Resolver for PropertyResolver {
    fn resolve(
        &self,
        parent: &Value,
        _args: &Arguments,
        _ctx: &RequestContext,
        info: &ResolveInfo,
    ) -> FieldResult<Value> {
        Ok(parent.get(&info.field_name).cloned().unwrap_or(Value::Null))
    }
}

/// Host-supplied resolvers keyed by type and field name.
#[derive(Clone, Default)]
pub struct ResolverMap {
    types: HashMap<String, HashMap<String, Arc<dyn Resolver>>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(
        mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        resolver: impl Resolver + 'static,
    ) -> Self {
        self.insert(type_name, field, Arc::new(resolver));
        self
    }

    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(field.into(), resolver);
    }

    pub(crate) fn get(&self, type_name: &str, field: &str) -> Option<Arc<dyn Resolver>> {
        self.types.get(type_name).and_then(|fields| fields.get(field)).cloned()
    }

    /// Every `(type, field)` pair that has a resolver.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().flat_map(|(type_name, fields)| {
            fields.keys().map(move |field| (type_name.as_str(), field.as_str()))
        })
    }
}
