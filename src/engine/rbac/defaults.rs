//! Default Policy Provider
//!
//! Compiled-in baseline used before the first load and whenever a load fails

use std::sync::OnceLock;

use super::policy::{Action, PermissionMatrix, Role, KNOWN_MODULES};

/// (role, module, [create, read, update, delete])
const BASELINE: &[(Role, &str, [bool; 4])] = &[
    (Role::Doctor, "patients", [true, true, true, false]),
    (Role::Doctor, "appointments", [true, true, true, false]),
    (Role::Doctor, "prescriptions", [true, true, true, false]),
    (Role::Doctor, "vitals", [true, true, true, false]),
    (Role::Doctor, "records", [true, true, true, false]),
    (Role::Doctor, "reports", [false, true, false, false]),
    (Role::Nurse, "patients", [false, true, false, false]),
    (Role::Nurse, "appointments", [false, true, false, false]),
    (Role::Nurse, "prescriptions", [false, true, false, false]),
    (Role::Nurse, "vitals", [true, true, true, false]),
    (Role::Nurse, "records", [false, true, false, false]),
    (Role::Receptionist, "patients", [true, true, true, false]),
    (Role::Receptionist, "appointments", [true, true, true, true]),
    (Role::Receptionist, "billing", [true, true, false, false]),
    (Role::Pharmacist, "prescriptions", [false, true, true, false]),
    (Role::Pharmacist, "inventory", [true, true, true, false]),
    (Role::Pharmacist, "patients", [false, true, false, false]),
];

static DEFAULTS: OnceLock<PermissionMatrix> = OnceLock::new();

/// Source of the organization's baseline policy
pub struct DefaultPolicyProvider;

impl DefaultPolicyProvider {
    /// The baseline matrix, normalized so every entry is explicit
    pub fn defaults() -> PermissionMatrix {
        DEFAULTS.get_or_init(build_defaults).clone()
    }
}

fn build_defaults() -> PermissionMatrix {
    let mut matrix = PermissionMatrix::new();

    for module in KNOWN_MODULES {
        matrix.toggle_all(Role::Administrator, module, true);
    }

    for (role, module, flags) in BASELINE {
        for (action, allowed) in Action::ALL.iter().zip(flags) {
            matrix.set(*role, module, *action, *allowed);
        }
    }

    matrix.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nurse_vitals_baseline() {
        let defaults = DefaultPolicyProvider::defaults();
        assert!(defaults.allows(Role::Nurse, "vitals", Action::Read));
        assert!(defaults.allows(Role::Nurse, "vitals", Action::Create));
        assert!(defaults.allows(Role::Nurse, "vitals", Action::Update));
        assert!(!defaults.allows(Role::Nurse, "vitals", Action::Delete));
    }

    #[test]
    fn test_doctor_cannot_delete_patients() {
        let defaults = DefaultPolicyProvider::defaults();
        assert!(defaults.allows(Role::Doctor, "patients", Action::Create));
        assert!(defaults.allows(Role::Doctor, "patients", Action::Update));
        assert!(!defaults.allows(Role::Doctor, "patients", Action::Delete));
        assert!(!defaults.allows(Role::Nurse, "patients", Action::Update));
    }

    #[test]
    fn test_administrator_has_everything() {
        let defaults = DefaultPolicyProvider::defaults();
        for module in KNOWN_MODULES {
            for action in Action::ALL {
                assert!(defaults.allows(Role::Administrator, module, action));
            }
        }
    }

    #[test]
    fn test_defaults_are_complete() {
        let defaults = DefaultPolicyProvider::defaults();
        for role in Role::ALL {
            let policy = defaults.policy(role).expect("every role present");
            assert_eq!(policy.len(), KNOWN_MODULES.len() * Action::ALL.len());
        }
        assert_eq!(defaults, DefaultPolicyProvider::defaults());
    }
}
