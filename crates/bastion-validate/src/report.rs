//! Validation failures as seen by resolvers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bastion_contracts::{
    directive::EnumDeclaration,
    error::{FieldError, FieldResult},
    policy::Policy,
};
use bastion_core::resolver::ResolveInfo;
use bastion_core::schema::{FieldDefinition, ObjectType};

/// Side-channel slot holding `ValidationError` entries.
pub const VALIDATION_ERRORS: &str = "validationErrors";

/// Name of the policy enum shared by every validation directive.
pub const POLICY_ENUM: &str = "ValidateDirectivePolicy";

/// One input value that failed a RESOLVER-policy validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Where the value sits in the field's arguments, e.g. `["arg", "0", "n"]`.
    /// List indexes are stringified to match `path: [String!]!`.
    pub path: Vec<String>,
    pub message: String,
    /// The rejected value as it was received.
    pub value: Value,
}

/// The policy enum every validation directive introduces.
pub fn policy_enum() -> EnumDeclaration {
    EnumDeclaration::new(POLICY_ENUM)
        .value(
            Policy::Resolver.as_str(),
            Some("Field resolver is responsible to evaluate it using `validationErrors` injected in resolve info"),
        )
        .value(
            Policy::Throw.as_str(),
            Some("Field resolver is not called if a validation error occurs, it throws `UserInputError`"),
        )
}

/// Output type a host can expose to return validation errors to callers.
pub fn validated_input_error_type() -> ObjectType {
    ObjectType::new("ValidatedInputError")
        .field(FieldDefinition::new("path", "[String!]!"))
        .field(FieldDefinition::new("message", "String!"))
}

/// SDL of the common types: the output type above and the policy enum.
pub fn common_type_defs() -> Vec<String> {
    let object = validated_input_error_type();
    let mut sdl = format!("type {} {{\n", object.name);
    for field in &object.fields {
        sdl.push_str(&format!("  {}: {}\n", field.name, field.ty));
    }
    sdl.push_str("}\n");
    vec![sdl, policy_enum().to_sdl()]
}

/// Typed access to the `validationErrors` side channel.
pub trait ValidationErrorsExt {
    /// Failures of RESOLVER-policy validations on this field's arguments;
    /// `None` when every value passed.
    fn validation_errors(&self) -> FieldResult<Option<Vec<ValidationError>>>;
}

impl ValidationErrorsExt for ResolveInfo {
    fn validation_errors(&self) -> FieldResult<Option<Vec<ValidationError>>> {
        let Some(entries) = self.failures.list(VALIDATION_ERRORS)? else {
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }
        entries
            .iter()
            .map(|entry| {
                serde_json::from_value(entry.clone()).map_err(|e| {
                    FieldError::Configuration(format!("malformed {VALIDATION_ERRORS} entry: {e}"))
                })
            })
            .collect::<FieldResult<Vec<_>>>()
            .map(Some)
    }
}
