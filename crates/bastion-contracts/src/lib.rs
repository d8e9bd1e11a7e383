//! # bastion-contracts
//!
//! Shared types, declarations, and error contracts for the bastion
//! directive runtime.
//!
//! All crates in the workspace import from here. No enforcement logic lives
//! in this crate, only data definitions, SDL printing, and error types.

pub mod directive;
pub mod error;
pub mod failure;
pub mod policy;
pub mod response;
