//! Directive declaration types.
//!
//! A `DirectiveDeclaration` is the static signature of one annotation: its
//! name, typed arguments, legal attachment points, and any enum types it
//! introduces into the schema. Declarations are immutable once built and
//! print to deterministic SDL so hosts can snapshot them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BastionError, BastionResult};

/// A schema element an annotation may be attached to.
///
/// Variant order is alphabetical by SDL name so a `BTreeSet<Location>`
/// prints in the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    /// An argument of an object field.
    ArgumentDefinition,
    /// A field of an object type.
    FieldDefinition,
    /// A field of an input object type.
    InputFieldDefinition,
    /// A whole input object type.
    InputObject,
    /// A whole object type.
    Object,
}

impl Location {
    /// The SDL spelling of this location.
    pub fn as_str(self) -> &'static str {
        match self {
            Location::ArgumentDefinition => "ARGUMENT_DEFINITION",
            Location::FieldDefinition => "FIELD_DEFINITION",
            Location::InputFieldDefinition => "INPUT_FIELD_DEFINITION",
            Location::InputObject => "INPUT_OBJECT",
            Location::Object => "OBJECT",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A default value in a declaration.
///
/// Enum defaults print bare (`THROW`) while everything else prints as a
/// GraphQL literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Enum(String),
    Value(Value),
}

impl DefaultValue {
    /// The runtime value used when the argument is omitted.
    pub fn to_value(&self) -> Value {
        match self {
            DefaultValue::Enum(name) => Value::String(name.clone()),
            DefaultValue::Value(v) => v.clone(),
        }
    }

    fn to_sdl(&self) -> String {
        match self {
            DefaultValue::Enum(name) => name.clone(),
            DefaultValue::Value(v) => graphql_literal(v),
        }
    }
}

/// One typed argument of a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    pub name: String,
    /// SDL type reference, e.g. `[String!]!`.
    pub ty: String,
    pub description: Option<String>,
    pub default: Option<DefaultValue>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            description: None,
            default: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Non-null arguments without a default must be supplied.
    pub fn is_required(&self) -> bool {
        self.ty.ends_with('!') && self.default.is_none()
    }
}

/// One value of an introduced enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub description: Option<String>,
}

/// An enum type introduced alongside a directive (e.g. its policy enum).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDeclaration {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValue>,
}

impl EnumDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: Vec::new(),
        }
    }

    pub fn value(mut self, name: impl Into<String>, description: Option<&str>) -> Self {
        self.values.push(EnumValue {
            name: name.into(),
            description: description.map(str::to_string),
        });
        self
    }

    /// Print this enum as an SDL type definition.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        push_description(&mut out, "", self.description.as_deref());
        out.push_str(&format!("enum {} {{\n", self.name));
        for value in &self.values {
            push_description(&mut out, "  ", value.description.as_deref());
            out.push_str(&format!("  {}\n", value.name));
        }
        out.push_str("}\n");
        out
    }
}

/// The full declarative signature of one annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveDeclaration {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<ArgumentDefinition>,
    pub locations: BTreeSet<Location>,
    /// Whether the directive may appear more than once on one element.
    pub repeatable: bool,
    /// Enum types this directive's arguments refer to.
    pub introduced_enums: Vec<EnumDeclaration>,
}

impl DirectiveDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            locations: BTreeSet::new(),
            repeatable: false,
            introduced_enums: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.locations.extend(locations);
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    pub fn introduces(mut self, declaration: EnumDeclaration) -> Self {
        self.introduced_enums.push(declaration);
        self
    }

    pub fn allows(&self, location: Location) -> bool {
        self.locations.contains(&location)
    }

    /// Fill in declared defaults for `applied` and reject anything that does
    /// not fit the signature.
    ///
    /// Returns `BastionError::InvalidArguments` for unknown argument names
    /// and for required arguments that were not supplied.
    pub fn resolve_arguments(&self, applied: &Map<String, Value>) -> BastionResult<Map<String, Value>> {
        if let Some(unknown) = applied
            .keys()
            .find(|k| !self.arguments.iter().any(|a| &a.name == *k))
        {
            return Err(BastionError::InvalidArguments {
                directive: self.name.clone(),
                reason: format!("unknown argument '{unknown}'"),
            });
        }

        let mut resolved = Map::new();
        for argument in &self.arguments {
            match (applied.get(&argument.name), &argument.default) {
                (Some(v), _) => {
                    resolved.insert(argument.name.clone(), v.clone());
                }
                (None, Some(default)) => {
                    resolved.insert(argument.name.clone(), default.to_value());
                }
                (None, None) if argument.is_required() => {
                    return Err(BastionError::InvalidArguments {
                        directive: self.name.clone(),
                        reason: format!("missing required argument '{}'", argument.name),
                    });
                }
                (None, None) => {}
            }
        }
        Ok(resolved)
    }

    /// Print the `directive @name(...) on ...` definition.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        push_description(&mut out, "", self.description.as_deref());
        out.push_str("directive @");
        out.push_str(&self.name);
        if !self.arguments.is_empty() {
            out.push_str("(\n");
            for argument in &self.arguments {
                push_description(&mut out, "  ", argument.description.as_deref());
                out.push_str(&format!("  {}: {}", argument.name, argument.ty));
                if let Some(default) = &argument.default {
                    out.push_str(" = ");
                    out.push_str(&default.to_sdl());
                }
                out.push('\n');
            }
            out.push(')');
        }
        if self.repeatable {
            out.push_str(" repeatable");
        }
        let locations: Vec<&str> = self.locations.iter().map(|l| l.as_str()).collect();
        out.push_str(" on ");
        out.push_str(&locations.join(" | "));
        out.push('\n');
        out
    }

    /// The directive definition followed by every introduced enum, each as
    /// its own SDL fragment.
    pub fn fragments(&self) -> Vec<String> {
        std::iter::once(self.to_sdl())
            .chain(self.introduced_enums.iter().map(EnumDeclaration::to_sdl))
            .collect()
    }
}

fn push_description(out: &mut String, indent: &str, description: Option<&str>) {
    if let Some(d) = description {
        out.push_str(&format!("{indent}\"\"\"{d}\"\"\"\n"));
    }
}

/// Print a JSON value as a GraphQL input literal.
pub fn graphql_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(graphql_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(fields) => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", graphql_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}
