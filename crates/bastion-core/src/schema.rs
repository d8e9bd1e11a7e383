//! Schema declarations and the compiled schema.
//!
//! Hosts describe their types with the declaration structs below (the SDL
//! parser is not part of this workspace). `SchemaBuilder` turns them into a
//! `Schema` whose field resolvers already carry the enforcement wrappers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_graphql_parser::types::{BaseType, Type};
use serde_json::{Map, Value};

use bastion_contracts::{
    directive::{DirectiveDeclaration, EnumDeclaration},
    error::{BastionError, BastionResult},
};

use crate::resolver::Resolver;

/// Names of the scalars every schema knows about.
pub const BUILTIN_SCALARS: [&str; 5] = ["Boolean", "Float", "ID", "Int", "String"];

// ── Type references ──────────────────────────────────────────────────────────

/// Parse an SDL type reference such as `[Int!]!`.
pub fn parse_type(raw: &str) -> BastionResult<Type> {
    let ty = Type::new(raw.trim()).ok_or_else(|| invalid_type(raw))?;
    if is_name(underlying_type(&ty)) {
        Ok(ty)
    } else {
        Err(invalid_type(raw))
    }
}

/// The innermost named type of `ty`.
pub fn underlying_type(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(inner) => underlying_type(inner),
    }
}

// The parser keeps whatever sits between the wrappers, `Int!!` included.
fn is_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid_type(raw: &str) -> BastionError {
    BastionError::InvalidSchema {
        reason: format!("malformed type reference '{raw}'"),
    }
}

// ── Declarations ─────────────────────────────────────────────────────────────

/// One application of a directive to a schema element, with its raw
/// arguments as written.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveApplication {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl DirectiveApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }
}

/// An argument of an object field, or a field of an input object.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub name: String,
    /// SDL type reference, parsed at build time.
    pub ty: String,
    pub default: Option<Value>,
    pub directives: Vec<DirectiveApplication>,
}

impl InputValueDefinition {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            directives: Vec::new(),
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn directive(mut self, directive: DirectiveApplication) -> Self {
        self.directives.push(directive);
        self
    }
}

/// A field of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: String,
    pub arguments: Vec<InputValueDefinition>,
    pub directives: Vec<DirectiveApplication>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
        }
    }

    pub fn argument(mut self, argument: InputValueDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn directive(mut self, directive: DirectiveApplication) -> Self {
        self.directives.push(directive);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub directives: Vec<DirectiveApplication>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            directives: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn directive(mut self, directive: DirectiveApplication) -> Self {
        self.directives.push(directive);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectType {
    pub name: String,
    pub fields: Vec<InputValueDefinition>,
    pub directives: Vec<DirectiveApplication>,
}

impl InputObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            directives: Vec::new(),
        }
    }

    pub fn field(mut self, field: InputValueDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn directive(mut self, directive: DirectiveApplication) -> Self {
        self.directives.push(directive);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    Object(ObjectType),
    InputObject(InputObjectType),
    Enum(EnumDeclaration),
    Scalar(String),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Object(t) => &t.name,
            TypeDefinition::InputObject(t) => &t.name,
            TypeDefinition::Enum(t) => &t.name,
            TypeDefinition::Scalar(name) => name,
        }
    }
}

/// Everything a host declares: its types and the name of the query root.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDeclarations {
    pub query_type: String,
    pub types: Vec<TypeDefinition>,
}

impl Default for TypeDeclarations {
    fn default() -> Self {
        Self {
            query_type: "Query".to_string(),
            types: Vec::new(),
        }
    }
}

impl TypeDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = name.into();
        self
    }

    pub fn object(mut self, object: ObjectType) -> Self {
        self.types.push(TypeDefinition::Object(object));
        self
    }

    pub fn input(mut self, input: InputObjectType) -> Self {
        self.types.push(TypeDefinition::InputObject(input));
        self
    }

    pub fn enumeration(mut self, declaration: EnumDeclaration) -> Self {
        self.types.push(TypeDefinition::Enum(declaration));
        self
    }

    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.types.push(TypeDefinition::Scalar(name.into()));
        self
    }
}

// ── Compiled schema ──────────────────────────────────────────────────────────

/// A field argument after type parsing.
#[derive(Debug, Clone)]
pub struct CompiledArgument {
    pub name: String,
    pub ty: Type,
    pub default: Option<Value>,
}

/// An executable object field.
#[derive(Clone)]
pub struct CompiledField {
    pub name: String,
    pub ty: Type,
    pub arguments: Vec<CompiledArgument>,
    /// The installed resolver: either the host's own, or an enforcement
    /// wrapper around it.
    pub resolver: Arc<dyn Resolver>,
    /// Whether an enforcement wrapper was installed.
    pub enforced: bool,
}

impl fmt::Debug for CompiledField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .field("enforced", &self.enforced)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CompiledObject {
    pub name: String,
    pub fields: Vec<CompiledField>,
}

impl CompiledObject {
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// An executable schema produced by `SchemaBuilder`.
#[derive(Debug)]
pub struct Schema {
    pub(crate) query_type: String,
    pub(crate) objects: HashMap<String, CompiledObject>,
    pub(crate) directives: Vec<DirectiveDeclaration>,
}

impl Schema {
    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn object(&self, name: &str) -> Option<&CompiledObject> {
        self.objects.get(name)
    }

    /// Registered directive declarations, sorted by name.
    pub fn directives(&self) -> &[DirectiveDeclaration] {
        &self.directives
    }

    /// SDL fragments for every registered directive and the enums they
    /// introduce. Enums shared by several directives print once.
    pub fn directive_sdl(&self) -> Vec<String> {
        let mut printed_enums: Vec<&str> = Vec::new();
        let mut fragments = Vec::new();
        for declaration in &self.directives {
            fragments.push(declaration.to_sdl());
            for enumeration in &declaration.introduced_enums {
                if !printed_enums.contains(&enumeration.name.as_str()) {
                    printed_enums.push(&enumeration.name);
                    fragments.push(enumeration.to_sdl());
                }
            }
        }
        fragments
    }
}
