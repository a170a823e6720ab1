//! Permission Service
//!
//! Composition root for one consumer: store, loader, evaluator and sync
//! scheduler, with an explicit start/stop lifecycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::broadcast::{ChangeBroadcaster, PolicyChanged};
use super::editor::PolicyEditor;
use super::error::PersistError;
use super::evaluator::PermissionEvaluator;
use super::loader::PolicyLoader;
use super::policy::PermissionMatrix;
use super::scheduler::{RefreshOutcome, Refresher, SyncScheduler};
use super::store::{PolicyStore, StoreState};
use crate::engine::config::{Config, SyncConfig};

/// Consumer lifecycle as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    /// Not syncing (before `start` or after `stop`)
    Init,
    Loading,
    Ready,
    /// Serving defaults or a stale matrix after a failed load
    Degraded,
}

pub struct PermissionService {
    id: Uuid,
    store: PolicyStore,
    loader: PolicyLoader,
    refresher: Refresher,
    evaluator: PermissionEvaluator,
    broadcaster: ChangeBroadcaster,
    scheduler: SyncScheduler,
    sync: SyncConfig,
    started: bool,
}

impl PermissionService {
    pub fn new(loader: PolicyLoader, broadcaster: ChangeBroadcaster, sync: SyncConfig) -> Self {
        let id = Uuid::new_v4();
        let store = PolicyStore::new();
        let refresher = Refresher::new(loader.clone(), store.clone());
        let scheduler = SyncScheduler::new(refresher.clone(), broadcaster.clone(), id)
            .with_broadcast_reload(sync.reload_on_broadcast);

        Self {
            id,
            evaluator: PermissionEvaluator::new(store.clone()),
            store,
            loader,
            refresher,
            broadcaster,
            scheduler,
            sync,
            started: false,
        }
    }

    /// HTTP-backed service from a loaded config
    pub fn from_config(config: &Config, broadcaster: ChangeBroadcaster) -> Result<Self, reqwest::Error> {
        let loader = PolicyLoader::from_config(&config.endpoint)?;
        Ok(Self::new(loader, broadcaster, config.sync.clone()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn loader(&self) -> &PolicyLoader {
        &self.loader
    }

    pub fn broadcaster(&self) -> &ChangeBroadcaster {
        &self.broadcaster
    }

    /// Initial load, then periodic and broadcast-driven sync
    pub async fn start(&mut self) -> RefreshOutcome {
        self.started = true;
        let outcome = self.refresher.refresh().await;
        self.scheduler.start(self.sync.refresh_interval());
        tracing::info!(service = %self.id, ?outcome, "permission service started");
        outcome
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
        self.started = false;
    }

    /// One out-of-band refresh
    pub async fn reload(&self) -> RefreshOutcome {
        self.refresher.refresh().await
    }

    pub fn status(&self) -> ConsumerStatus {
        if !self.started {
            return ConsumerStatus::Init;
        }
        match self.store.state() {
            StoreState::Loading => ConsumerStatus::Loading,
            StoreState::Ready => ConsumerStatus::Ready,
            StoreState::Error { .. } => ConsumerStatus::Degraded,
        }
    }

    /// Write a full matrix. On success the local store is updated and every
    /// other consumer on the broadcaster is told to reload. On failure
    /// nothing local changes.
    pub async fn save(&self, matrix: PermissionMatrix) -> Result<(), PersistError> {
        self.loader.persist(&matrix).await?;
        self.store.replace(matrix.normalized());
        self.broadcaster.publish(PolicyChanged::new(self.id));
        Ok(())
    }

    /// Draft editor seeded from the current snapshot
    pub fn editor(&self) -> PolicyEditor {
        PolicyEditor::new(self.store.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::defaults::DefaultPolicyProvider;
    use crate::engine::rbac::loader::MemoryPolicyTransport;
    use crate::engine::rbac::error::LoadError;
    use crate::engine::rbac::loader::PolicyTransport;
    use crate::engine::rbac::policy::{Action, Role};
    use crate::engine::rbac::wire::WirePayload;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn service_over(transport: &MemoryPolicyTransport, broadcaster: &ChangeBroadcaster) -> PermissionService {
        PermissionService::new(
            PolicyLoader::new(Arc::new(transport.clone())),
            broadcaster.clone(),
            SyncConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_states() {
        let transport = MemoryPolicyTransport::new();
        transport.set_offline(true);
        let mut service = service_over(&transport, &ChangeBroadcaster::new());

        assert_eq!(service.status(), ConsumerStatus::Init);
        assert!(service.evaluator().has_permission(Role::Nurse, "vitals", Action::Create));

        assert_eq!(service.start().await, RefreshOutcome::Degraded);
        assert_eq!(service.status(), ConsumerStatus::Degraded);
        assert_eq!(*service.store().get(), DefaultPolicyProvider::defaults());

        transport.set_offline(false);
        service.save(DefaultPolicyProvider::defaults()).await.unwrap();
        assert_eq!(service.reload().await, RefreshOutcome::Updated);
        assert_eq!(service.status(), ConsumerStatus::Ready);

        service.stop().await;
        assert_eq!(service.status(), ConsumerStatus::Init);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_changes_nothing() {
        let transport = MemoryPolicyTransport::new();
        let broadcaster = ChangeBroadcaster::new();
        let service = service_over(&transport, &broadcaster);

        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let _sub = {
            let events = Arc::clone(&events);
            broadcaster.subscribe(move |e| events.lock().unwrap().push(e.origin))
        };

        transport.set_offline(true);
        let mut matrix = DefaultPolicyProvider::defaults();
        matrix.set(Role::Nurse, "patients", Action::Update, true);

        assert!(service.save(matrix.clone()).await.is_err());
        assert!(!service.evaluator().has_permission(Role::Nurse, "patients", Action::Update));
        assert!(events.lock().unwrap().is_empty());

        transport.set_offline(false);
        service.save(matrix).await.unwrap();
        assert!(service.evaluator().has_permission(Role::Nurse, "patients", Action::Update));
        assert_eq!(*events.lock().unwrap(), vec![service.id()]);
    }

    /// Reads the document immediately but answers late
    struct LaggingTransport {
        inner: MemoryPolicyTransport,
    }

    #[async_trait]
    impl PolicyTransport for LaggingTransport {
        async fn fetch(&self) -> Result<String, LoadError> {
            let body = self.inner.fetch().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            body
        }

        async fn store(&self, payload: &WirePayload) -> Result<(), PersistError> {
            self.inner.store(payload).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_wins_over_reload_in_flight() {
        let inner = MemoryPolicyTransport::new();
        let service = PermissionService::new(
            PolicyLoader::new(Arc::new(LaggingTransport { inner: inner.clone() })),
            ChangeBroadcaster::new(),
            SyncConfig::default(),
        );
        service.save(DefaultPolicyProvider::defaults()).await.unwrap();

        let mut matrix = DefaultPolicyProvider::defaults();
        matrix.set(Role::Nurse, "patients", Action::Update, true);

        let (reloaded, saved) = tokio::join!(service.reload(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            service.save(matrix).await
        });
        saved.unwrap();

        assert_eq!(reloaded, RefreshOutcome::Superseded);
        assert!(service.evaluator().has_permission(Role::Nurse, "patients", Action::Update));
        assert_eq!(service.status(), ConsumerStatus::Init);
        assert_eq!(service.store().state(), StoreState::Ready);

        // The next reload sees the saved document
        assert_eq!(service.reload().await, RefreshOutcome::Updated);
        assert!(service.evaluator().has_permission(Role::Nurse, "patients", Action::Update));
    }
}
