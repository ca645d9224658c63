//! Path authority: application-layer filesystem mediation.
//!
//! Every path the translator names is resolved to canonical form and
//! checked against the allowed roots and the deny-list before any action
//! may touch it. There is no kernel-level isolation here: the checks in
//! this module are the boundary.
//!
//! The security model is layered:
//!
//! 1. Closed action catalogue: unknown actions never reach a handler
//! 2. Canonical path checks: traversal and links are resolved first
//! 3. Deny-list: protected locations win over the allow-list
//! 4. Confirmation: destructive actions always ask the operator
mod defaults;
mod paths;

pub use defaults::{default_denied_paths, DENIED_COMPONENTS};
pub use paths::{resolve, PathAuthority, PathDenial, PathVerdict};
