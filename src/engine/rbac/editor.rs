//! Policy Editor
//!
//! Administrative working copy of the matrix. Edits stay local until `save`
//! writes the whole matrix; a failed save keeps the unsaved-changes flag.

use std::sync::Arc;

use super::defaults::DefaultPolicyProvider;
use super::error::PersistError;
use super::policy::{Action, PermissionChange, PermissionMatrix, Role};
use super::service::PermissionService;

pub struct PolicyEditor {
    base: Arc<PermissionMatrix>,
    draft: PermissionMatrix,
    dirty: bool,
}

impl PolicyEditor {
    pub fn new(base: Arc<PermissionMatrix>) -> Self {
        Self {
            draft: (*base).clone(),
            base,
            dirty: false,
        }
    }

    pub fn draft(&self) -> &PermissionMatrix {
        &self.draft
    }

    /// True when there are edits not yet written
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set(&mut self, role: Role, module: &str, action: Action, allowed: bool) {
        self.draft.set(role, module, action, allowed);
        self.dirty = true;
    }

    pub fn toggle_all(&mut self, role: Role, module: &str, allowed: bool) {
        self.draft.toggle_all(role, module, allowed);
        self.dirty = true;
    }

    pub fn reset_to_defaults(&mut self) {
        self.draft = DefaultPolicyProvider::defaults();
        self.dirty = true;
    }

    /// Drop all edits and return to the matrix the editor was opened with
    pub fn discard(&mut self) {
        self.draft = (*self.base).clone();
        self.dirty = false;
    }

    /// Edits relative to the base matrix
    pub fn pending_changes(&self) -> Vec<PermissionChange> {
        self.draft.changes_from(&self.base)
    }

    /// Persist the draft through the service
    pub async fn save(&mut self, service: &PermissionService) -> Result<(), PersistError> {
        service.save(self.draft.clone()).await?;
        self.base = service.store().get();
        self.draft = (*self.base).clone();
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::SyncConfig;
    use crate::engine::rbac::broadcast::ChangeBroadcaster;
    use crate::engine::rbac::loader::{MemoryPolicyTransport, PolicyLoader};

    #[test]
    fn test_edits_mark_dirty_and_discard_resets() {
        let mut editor = PolicyEditor::new(Arc::new(DefaultPolicyProvider::defaults()));
        assert!(!editor.is_dirty());

        editor.set(Role::Nurse, "patients", Action::Update, true);
        assert!(editor.is_dirty());
        assert_eq!(editor.pending_changes().len(), 1);

        editor.discard();
        assert!(!editor.is_dirty());
        assert!(editor.pending_changes().is_empty());
        assert!(!editor.draft().allows(Role::Nurse, "patients", Action::Update));
    }

    #[test]
    fn test_toggle_all_in_draft() {
        let mut editor = PolicyEditor::new(Arc::new(DefaultPolicyProvider::defaults()));
        editor.toggle_all(Role::Pharmacist, "billing", true);

        let changes = editor.pending_changes();
        assert_eq!(changes.len(), 4);
        assert!(changes
            .iter()
            .all(|c| c.role == Role::Pharmacist && c.module == "billing" && c.allowed));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_dirty() {
        let transport = MemoryPolicyTransport::new();
        let service = PermissionService::new(
            PolicyLoader::new(Arc::new(transport.clone())),
            ChangeBroadcaster::new(),
            SyncConfig::default(),
        );

        let mut editor = service.editor();
        editor.set(Role::Nurse, "patients", Action::Update, true);

        transport.set_offline(true);
        assert!(editor.save(&service).await.is_err());
        assert!(editor.is_dirty());
        assert!(editor.draft().allows(Role::Nurse, "patients", Action::Update));

        transport.set_offline(false);
        editor.save(&service).await.unwrap();
        assert!(!editor.is_dirty());
        assert!(editor.pending_changes().is_empty());
        assert!(service
            .evaluator()
            .has_permission(Role::Nurse, "patients", Action::Update));
    }
}
