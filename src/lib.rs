//! Wardgate - Role-based permission engine for hospital operations
//!
//! Decides whether a staff role may perform an action on a module, keeps the
//! permission matrix in sync with the remote settings endpoint, and falls
//! back to a built-in baseline when that endpoint is unavailable.

pub mod engine;

pub use engine::rbac::{
    Action, ChangeBroadcaster, DefaultPolicyProvider, Gate, PermissionEvaluator, PermissionMatrix,
    PermissionService, Role,
};
