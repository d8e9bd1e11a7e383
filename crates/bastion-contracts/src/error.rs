//! Error types for schema building and request execution.
//!
//! `BastionError` covers everything detected while building a schema or
//! loading configuration. `FieldError` is what a single field resolution
//! fails with at request time; the executor turns it into a response error
//! and nulls the field.

use thiserror::Error;

/// Schema-build and configuration errors.
#[derive(Debug, Error)]
pub enum BastionError {
    /// Two directive implementations claim the same name with different
    /// signatures, or an introduced type clashes with an existing one.
    #[error("directive '{name}' is already declared with an incompatible signature")]
    DuplicateDirective { name: String },

    /// A directive was applied to an element kind it does not declare.
    #[error("directive '@{directive}' may not be used on {location} ({element})")]
    DisallowedLocation {
        directive: String,
        location: String,
        element: String,
    },

    /// A directive was applied but no implementation is registered for it.
    #[error("unknown directive '@{directive}' on {element}")]
    UnknownDirective { directive: String, element: String },

    /// Applied directive arguments do not fit the declaration.
    #[error("invalid arguments for directive '@{directive}': {reason}")]
    InvalidArguments { directive: String, reason: String },

    /// A type reference names a type that is not declared.
    #[error("unknown type '{name}' referenced by {element}")]
    UnknownType { name: String, element: String },

    /// A resolver was supplied for a field that is not declared.
    #[error("resolver supplied for unknown field '{type_name}.{field}'")]
    UnknownField { type_name: String, field: String },

    /// Structural problems in the declarations themselves.
    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used by the schema-building side of the workspace.
pub type BastionResult<T> = Result<T, BastionError>;

/// A failure of one field resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// An authorization annotation with THROW policy failed.
    #[error("{message}")]
    Forbidden { message: String },

    /// A validation annotation with THROW policy failed.
    #[error("{message}")]
    Validation { message: String },

    /// A developer error discovered while resolving, such as a malformed
    /// side-channel slot.
    #[error("{0}")]
    Configuration(String),

    /// Any other failure raised by a resolver.
    #[error("{message}")]
    Resolver { message: String },
}

impl FieldError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn resolver(message: impl Into<String>) -> Self {
        Self::Resolver {
            message: message.into(),
        }
    }

    /// The `extensions.code` reported alongside this error, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            FieldError::Forbidden { .. } => Some("FORBIDDEN"),
            FieldError::Validation { .. } => Some("BAD_USER_INPUT"),
            FieldError::Configuration(_) => Some("INTERNAL_SERVER_ERROR"),
            FieldError::Resolver { .. } => None,
        }
    }
}

/// Result of one field resolution.
pub type FieldResult<T> = Result<T, FieldError>;
