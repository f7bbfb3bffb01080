//! Authorization primitives for ScribeVault.
//!
//! Tokens are issued elsewhere; this module only models the verified
//! caller and the ownership rules applied to files and folders.

pub mod permission;
mod role;

pub use permission::{can_place, require_owner};
pub use role::{Caller, Role};
