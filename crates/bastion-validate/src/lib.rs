//! # bastion-validate
//!
//! Input validation directives for the bastion runtime.
//!
//! Validation directives attach to arguments, input fields and whole input
//! objects. With RESOLVER policy (the default here) an invalid value is
//! replaced by `null` in the arguments the resolver receives, and a
//! [`ValidationError`] describing it is added to the `validationErrors`
//! side channel, readable through [`ValidationErrorsExt`]. With THROW
//! policy the whole field call fails with a `BAD_USER_INPUT` error.
//!
//! ```graphql
//! type Query {
//!   page(size: Int @range(min: 1, max: 100, policy: THROW)): [Item!]
//! }
//! ```

pub mod range;
pub mod report;

pub use range::{Range, RangeRule};
pub use report::{
    common_type_defs, policy_enum, validated_input_error_type, ValidationError, ValidationErrorsExt,
    POLICY_ENUM, VALIDATION_ERRORS,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
