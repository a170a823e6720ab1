//! Permission Matrix Model
//!
//! Roles, actions and the role -> module -> action -> allowed matrix

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::ParseError;

/// Functional areas known to the application
pub const KNOWN_MODULES: [&str; 10] = [
    "patients",
    "appointments",
    "prescriptions",
    "billing",
    "inventory",
    "vitals",
    "records",
    "reports",
    "staff",
    "settings",
];

/// Canonical module id: trimmed and ASCII-lowercased.
/// Every read and write of a module key goes through here.
pub fn module_key(module: &str) -> Cow<'_, str> {
    let trimmed = module.trim();
    if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(trimmed.to_ascii_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Doctor,
    Nurse,
    Receptionist,
    Pharmacist,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Administrator,
        Role::Doctor,
        Role::Nurse,
        Role::Receptionist,
        Role::Pharmacist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Pharmacist => "pharmacist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    /// Case-insensitive; `ADMINISTRATOR` and `nurse` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == lowered)
            .ok_or_else(|| ParseError::UnknownRole(s.to_string()))
    }
}

/// Operation kinds (CRUD vocabulary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == lowered)
            .ok_or_else(|| ParseError::UnknownAction(s.to_string()))
    }
}

/// One (module, action) -> allowed flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub module: String,
    pub action: Action,
    pub allowed: bool,
}

/// A single flag that differs between two matrices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChange {
    pub role: Role,
    pub module: String,
    pub action: Action,
    pub allowed: bool,
}

/// All permission entries for one role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePolicy {
    modules: BTreeMap<String, BTreeMap<Action, bool>>,
}

impl RolePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored flag, or `None` when there is no entry
    pub fn entry(&self, module: &str, action: Action) -> Option<bool> {
        self.modules
            .get(&*module_key(module))
            .and_then(|actions| actions.get(&action))
            .copied()
    }

    /// Deny-by-default lookup
    pub fn allows(&self, module: &str, action: Action) -> bool {
        self.entry(module, action).unwrap_or(false)
    }

    pub fn set(&mut self, module: &str, action: Action, allowed: bool) {
        self.modules
            .entry(module_key(module).into_owned())
            .or_default()
            .insert(action, allowed);
    }

    /// Set every action for one module
    pub fn set_all(&mut self, module: &str, allowed: bool) {
        let actions = self.modules.entry(module_key(module).into_owned()).or_default();
        for action in Action::ALL {
            actions.insert(action, allowed);
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|m| m.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = PermissionEntry> + '_ {
        self.modules.iter().flat_map(|(module, actions)| {
            actions.iter().map(move |(action, allowed)| PermissionEntry {
                module: module.clone(),
                action: *action,
                allowed: *allowed,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(|a| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill in an explicit `false` for every known module/action without an entry
    pub fn normalize(&mut self) {
        for module in KNOWN_MODULES {
            let actions = self.modules.entry(module.to_string()).or_default();
            for action in Action::ALL {
                actions.entry(action).or_insert(false);
            }
        }
        // Modules outside the registry still get a complete action set
        for actions in self.modules.values_mut() {
            for action in Action::ALL {
                actions.entry(action).or_insert(false);
            }
        }
    }
}

impl FromIterator<PermissionEntry> for RolePolicy {
    fn from_iter<I: IntoIterator<Item = PermissionEntry>>(iter: I) -> Self {
        let mut policy = RolePolicy::new();
        for entry in iter {
            policy.set(&entry.module, entry.action, entry.allowed);
        }
        policy
    }
}

/// Role -> RolePolicy. Always replaced wholesale across the network boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    roles: BTreeMap<Role, RolePolicy>,
}

impl PermissionMatrix {
    /// Create an empty matrix (denies everything)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(&self, role: Role) -> Option<&RolePolicy> {
        self.roles.get(&role)
    }

    pub fn policy_mut(&mut self, role: Role) -> &mut RolePolicy {
        self.roles.entry(role).or_default()
    }

    pub fn insert_policy(&mut self, role: Role, policy: RolePolicy) {
        self.roles.insert(role, policy);
    }

    pub fn roles(&self) -> impl Iterator<Item = (Role, &RolePolicy)> {
        self.roles.iter().map(|(role, policy)| (*role, policy))
    }

    /// Check if a role may perform an action on a module
    pub fn allows(&self, role: Role, module: &str, action: Action) -> bool {
        self.roles
            .get(&role)
            .map(|policy| policy.allows(module, action))
            .unwrap_or(false)
    }

    pub fn set(&mut self, role: Role, module: &str, action: Action, allowed: bool) {
        self.policy_mut(role).set(module, action, allowed);
    }

    /// Grant or revoke all four actions for one (role, module) pair
    pub fn toggle_all(&mut self, role: Role, module: &str, allowed: bool) {
        self.policy_mut(role).set_all(module, allowed);
    }

    pub fn is_empty(&self) -> bool {
        self.roles.values().all(|policy| policy.is_empty())
    }

    /// Complete copy: every role, every known module, every action
    pub fn normalized(mut self) -> Self {
        for role in Role::ALL {
            self.policy_mut(role).normalize();
        }
        self
    }

    /// Flags in `self` that differ from `previous`, missing entries read as `false`
    pub fn changes_from(&self, previous: &PermissionMatrix) -> Vec<PermissionChange> {
        let mut changes = Vec::new();
        for role in Role::ALL {
            let mut modules: Vec<&str> = Vec::new();
            for matrix in [self, previous] {
                if let Some(policy) = matrix.policy(role) {
                    modules.extend(policy.modules());
                }
            }
            modules.sort_unstable();
            modules.dedup();

            for module in modules {
                for action in Action::ALL {
                    let now = self.allows(role, module, action);
                    if now != previous.allows(role, module, action) {
                        changes.push(PermissionChange {
                            role,
                            module: module.to_string(),
                            action,
                            allowed: now,
                        });
                    }
                }
            }
        }
        changes
    }

    /// True when both matrices answer every query identically
    pub fn equivalent(&self, other: &PermissionMatrix) -> bool {
        self.changes_from(other).is_empty()
    }
}
