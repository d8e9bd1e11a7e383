//! A small, sequential reference executor.
//!
//! It takes an already parsed selection tree (`Query`) and walks it from the
//! schema's query root. Errors are recorded against the response path of
//! the failing field, the position becomes null, and a null in a non-null
//! position propagates to the nearest nullable parent.

use async_graphql_parser::types::{BaseType, Type};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use bastion_contracts::{
    error::FieldError,
    failure::FailureInfo,
    response::{ExecutionResult, GraphqlError, PathSegment},
};

use crate::context::RequestContext;
use crate::resolver::{Arguments, ResolveInfo};
use crate::schema::{CompiledField, Schema};

/// An argument as written in a query.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Literal(Value),
    /// Reference to a top-level variable.
    Variable(String),
}

/// One selected field, with its sub-selection when the field returns an
/// object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, ArgumentValue)>,
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), ArgumentValue::Literal(value)));
        self
    }

    pub fn var(mut self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.arguments
            .push((name.into(), ArgumentValue::Variable(variable.into())));
        self
    }

    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Key of this field in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A query operation: the selections on the query root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub selections: Vec<FieldSelection>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.selections.push(selection);
        self
    }
}

/// Execute `query` against `schema`.
///
/// Never fails as a whole: every problem is reported in `errors` with the
/// affected positions set to null.
pub fn execute(
    schema: &Schema,
    query: &Query,
    root: &Value,
    ctx: &RequestContext,
    variables: &Map<String, Value>,
) -> ExecutionResult {
    let mut execution = Execution {
        schema,
        ctx,
        variables,
        errors: Vec::new(),
    };
    let mut path = Vec::new();
    let data = execution
        .select(&schema.query_type, &query.selections, root, &mut path)
        .map(Value::Object)
        .unwrap_or(Value::Null);

    debug!(
        request_id = %ctx.id(),
        errors = execution.errors.len(),
        "query executed"
    );
    ExecutionResult {
        data,
        errors: execution.errors,
    }
}

struct Execution<'a> {
    schema: &'a Schema,
    ctx: &'a RequestContext,
    variables: &'a Map<String, Value>,
    errors: Vec<GraphqlError>,
}

/// A null that must propagate to the parent position.
struct Bubble;

impl Execution<'_> {
    /// Resolve `selections` on an object of type `type_name`. `Err` means a
    /// non-null field came back null and the whole object is null.
    ///
    /// Every selection resolves even after a sibling bubbled, so each
    /// independent failure still records its error.
    fn select(
        &mut self,
        type_name: &str,
        selections: &[FieldSelection],
        parent: &Value,
        path: &mut Vec<PathSegment>,
    ) -> Result<Map<String, Value>, Bubble> {
        let mut out = Map::new();
        let mut bubbled = false;
        for selection in selections {
            path.push(PathSegment::Key(selection.response_key().to_string()));
            let value = self.field(type_name, selection, parent, path);
            path.pop();
            match value {
                Ok(value) => {
                    out.insert(selection.response_key().to_string(), value);
                }
                Err(Bubble) => bubbled = true,
            }
        }
        if bubbled {
            Err(Bubble)
        } else {
            Ok(out)
        }
    }

    fn field(
        &mut self,
        type_name: &str,
        selection: &FieldSelection,
        parent: &Value,
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, Bubble> {
        let schema = self.schema;
        let Some(field) = schema
            .object(type_name)
            .and_then(|object| object.field(&selection.name))
        else {
            let message = format!("Cannot query field \"{}\" on type \"{}\".", selection.name, type_name);
            self.errors.push(GraphqlError::new(message).at(path.clone()));
            return Ok(Value::Null);
        };

        let resolved = self.coerce_arguments(field, selection).and_then(|args| {
            let info = ResolveInfo {
                parent_type: type_name.to_string(),
                field_name: field.name.clone(),
                return_type: field.ty.clone(),
                path: path.clone(),
                failures: FailureInfo::default(),
            };
            field.resolver.resolve(parent, &args, self.ctx, &info)
        });

        match resolved {
            Ok(value) => self.complete(&field.ty, &selection.selections, value, path),
            Err(error) => {
                if matches!(error, FieldError::Configuration(_)) {
                    warn!(
                        request_id = %self.ctx.id(),
                        path = %bastion_contracts::response::dotted(path),
                        %error,
                        "configuration error during resolution"
                    );
                }
                self.errors.push(GraphqlError::from_field_error(&error, path.clone()));
                null_for(&field.ty)
            }
        }
    }

    fn coerce_arguments(&self, field: &CompiledField, selection: &FieldSelection) -> Result<Arguments, FieldError> {
        let mut args = Arguments::new();
        for (name, raw) in &selection.arguments {
            if !field.arguments.iter().any(|a| &a.name == name) {
                return Err(FieldError::validation(format!(
                    "Unknown argument \"{name}\" on field \"{}\".",
                    field.name
                )));
            }
            let value = match raw {
                ArgumentValue::Literal(value) => Some(value.clone()),
                ArgumentValue::Variable(variable) => self.variables.get(variable).cloned(),
            };
            if let Some(value) = value {
                args.insert(name.clone(), value);
            }
        }

        for argument in &field.arguments {
            if !args.contains_key(&argument.name) {
                if let Some(default) = &argument.default {
                    args.insert(argument.name.clone(), default.clone());
                }
            }
            let missing = args.get(&argument.name).map_or(true, Value::is_null);
            if !argument.ty.nullable && missing {
                return Err(FieldError::validation(format!(
                    "Argument \"{}\" of required type \"{}\" was not provided.",
                    argument.name, argument.ty
                )));
            }
        }
        Ok(args)
    }

    fn complete(
        &mut self,
        ty: &Type,
        selections: &[FieldSelection],
        value: Value,
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, Bubble> {
        if value.is_null() {
            if !ty.nullable {
                self.errors
                    .push(GraphqlError::new("Cannot return null for non-nullable field").at(path.clone()));
                return Err(Bubble);
            }
            return Ok(Value::Null);
        }

        let completed = match &ty.base {
            BaseType::List(inner) => self.complete_list(ty, inner, selections, value, path),
            BaseType::Named(name) => {
                if self.schema.object(name.as_str()).is_none() {
                    value
                } else {
                    match self.select(name.as_str(), selections, &value, path) {
                        Ok(map) => Value::Object(map),
                        Err(Bubble) => Value::Null,
                    }
                }
            }
        };

        // An inner failure already recorded its error; only the null moves up.
        if completed.is_null() && !ty.nullable {
            Err(Bubble)
        } else {
            Ok(completed)
        }
    }

    /// `null` when the value is not a list or a non-null item bubbled.
    fn complete_list(
        &mut self,
        ty: &Type,
        item_ty: &Type,
        selections: &[FieldSelection],
        value: Value,
        path: &mut Vec<PathSegment>,
    ) -> Value {
        let Value::Array(items) = value else {
            self.errors
                .push(GraphqlError::new(format!("Expected a list for type \"{ty}\"")).at(path.clone()));
            return Value::Null;
        };
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            path.push(PathSegment::Index(index));
            let completed = self.complete(item_ty, selections, item, path);
            path.pop();
            match completed {
                Ok(v) => out.push(v),
                Err(Bubble) => return Value::Null,
            }
        }
        Value::Array(out)
    }
}

fn null_for(ty: &Type) -> Result<Value, Bubble> {
    if !ty.nullable {
        Err(Bubble)
    } else {
        Ok(Value::Null)
    }
}
