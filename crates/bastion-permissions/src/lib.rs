//! # bastion-permissions
//!
//! The `@hasPermissions` directive family for the bastion runtime.
//!
//! ```graphql
//! type User @hasPermissions(permissions: ["user:read"]) {
//!   name: String
//!   email: String @hasPermissions(permissions: ["user:email"], policy: RESOLVER)
//! }
//! ```
//!
//! With the default THROW policy a caller lacking a permission gets `null`
//! and a `FORBIDDEN` error at that position, and the resolver never runs.
//! With RESOLVER policy the resolver runs anyway and reads what is missing
//! through [`MissingPermissionsExt::missing_permissions`], e.g. to mask the
//! value instead of hiding it.
//!
//! Granted permissions and the verbosity of missing lists and messages come
//! from the request's `RequestContext`.

pub mod directive;
pub mod info;

pub use directive::{HasPermissions, PermissionRule, DEFAULT_NAME, MISSING_PERMISSIONS};
pub use info::MissingPermissionsExt;

// ── Tests ─────────────────────────────────────────────────────────────────────
