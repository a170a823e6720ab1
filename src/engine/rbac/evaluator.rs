//! Permission Evaluator
//!
//! The public question every gated call site asks: may this role perform
//! this action on this module? Answers are deny-by-default and always come
//! from one store snapshot.

use std::sync::Arc;

use super::error::AccessDenied;
use super::policy::{Action, PermissionMatrix, Role};
use super::store::{PolicyStore, StoreState};

/// Evaluates queries against the live store
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    store: PolicyStore,
}

impl PermissionEvaluator {
    pub fn new(store: PolicyStore) -> Self {
        Self { store }
    }

    /// Check if `role` may perform `action` on `module`
    pub fn has_permission(&self, role: Role, module: &str, action: Action) -> bool {
        self.store.get().allows(role, module, action)
    }

    /// String form for call sites that hold raw identifiers.
    /// Unknown roles or actions are denied, not errors.
    pub fn has_permission_str(&self, role: &str, module: &str, action: &str) -> bool {
        match (role.parse::<Role>(), action.parse::<Action>()) {
            (Ok(role), Ok(action)) => self.has_permission(role, module, action),
            _ => false,
        }
    }

    /// Pin the current matrix for a batch of consistent checks
    pub fn snapshot(&self) -> PermissionSnapshot {
        PermissionSnapshot {
            matrix: self.store.get(),
            generation: self.store.generation(),
        }
    }

    pub fn gate(&self, role: Role) -> Gate {
        Gate {
            role,
            evaluator: self.clone(),
        }
    }

    pub fn state(&self) -> StoreState {
        self.store.state()
    }
}

/// Immutable view of one matrix generation
#[derive(Debug, Clone)]
pub struct PermissionSnapshot {
    matrix: Arc<PermissionMatrix>,
    generation: u64,
}

impl PermissionSnapshot {
    pub fn has_permission(&self, role: Role, module: &str, action: Action) -> bool {
        self.matrix.allows(role, module, action)
    }

    /// Actions `role` may perform on `module`, in CRUD order
    pub fn allowed_actions(&self, role: Role, module: &str) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.matrix.allows(role, module, *action))
            .collect()
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Capability check bound to the role of the current identity
#[derive(Debug, Clone)]
pub struct Gate {
    role: Role,
    evaluator: PermissionEvaluator,
}

impl Gate {
    pub fn role(&self) -> Role {
        self.role
    }

    /// For conditional rendering
    pub fn allows(&self, module: &str, action: Action) -> bool {
        self.evaluator.has_permission(self.role, module, action)
    }

    /// For guarding a server-side action before it runs
    pub fn require(&self, module: &str, action: Action) -> Result<(), AccessDenied> {
        if self.allows(module, action) {
            Ok(())
        } else {
            tracing::debug!(role = %self.role, module, %action, "permission denied");
            Err(AccessDenied {
                role: self.role,
                module: module.to_string(),
                action,
            })
        }
    }
}
