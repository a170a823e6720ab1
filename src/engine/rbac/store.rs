//! Policy Store
//!
//! Shared holder of the current matrix snapshot and its freshness state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::defaults::DefaultPolicyProvider;
use super::policy::PermissionMatrix;

/// Freshness of the held matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreState {
    /// A load is running (or none has completed yet)
    Loading,
    /// Matrix came from the remote store
    Ready,
    /// Last load failed; holding last good matrix or defaults
    Error { reason: String },
}

#[derive(Debug)]
struct Inner {
    snapshot: RwLock<Arc<PermissionMatrix>>,
    state: RwLock<StoreState>,
    ever_loaded: RwLock<Option<DateTime<Utc>>>,
    generation: AtomicU64,
}

/// Cheaply clonable handle; clones share the same snapshot
#[derive(Debug, Clone)]
pub struct PolicyStore {
    inner: Arc<Inner>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore {
    /// New store seeded with the defaults, in `Loading` state
    pub fn new() -> Self {
        Self::with_matrix(DefaultPolicyProvider::defaults())
    }

    pub fn with_matrix(matrix: PermissionMatrix) -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshot: RwLock::new(Arc::new(matrix)),
                state: RwLock::new(StoreState::Loading),
                ever_loaded: RwLock::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot. Holding it never blocks a later `replace`.
    pub fn get(&self) -> Arc<PermissionMatrix> {
        match self.inner.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new matrix from the remote store and mark `Ready`
    pub fn replace(&self, matrix: PermissionMatrix) {
        self.swap(matrix, None);
        self.mark_ready();
    }

    /// `replace`, but only if nothing was swapped in since `generation`.
    /// Returns false and leaves the store untouched otherwise.
    pub fn replace_if_current(&self, matrix: PermissionMatrix, generation: u64) -> bool {
        if !self.swap(matrix, Some(generation)) {
            return false;
        }
        self.mark_ready();
        true
    }

    /// Swap in a fallback matrix without claiming it is fresh
    pub fn replace_degraded(&self, matrix: PermissionMatrix, reason: &str) {
        self.swap(matrix, None);
        self.mark_error(reason);
    }

    /// `replace_degraded`, guarded like `replace_if_current`
    pub fn replace_degraded_if_current(
        &self,
        matrix: PermissionMatrix,
        reason: &str,
        generation: u64,
    ) -> bool {
        if !self.swap(matrix, Some(generation)) {
            return false;
        }
        self.mark_error(reason);
        true
    }

    fn swap(&self, matrix: PermissionMatrix, expected: Option<u64>) -> bool {
        let next = Arc::new(matrix);
        let mut snapshot = self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Generation only moves under the snapshot write lock
        if let Some(expected) = expected {
            if self.inner.generation.load(Ordering::SeqCst) != expected {
                return false;
            }
        }
        *snapshot = next;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn mark_ready(&self) {
        self.set_state(StoreState::Ready);
        let mut loaded = self
            .inner
            .ever_loaded
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *loaded = Some(Utc::now());
    }

    pub fn state(&self) -> StoreState {
        self.inner
            .state
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn mark_loading(&self) {
        self.set_state(StoreState::Loading);
    }

    pub fn mark_error(&self, reason: &str) {
        self.set_state(StoreState::Error {
            reason: reason.to_string(),
        });
    }

    fn set_state(&self, state: StoreState) {
        let mut current = self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = state;
    }

    /// When the last successful remote load landed
    pub fn last_loaded_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .ever_loaded
            .read()
            .map(|t| *t)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn has_loaded(&self) -> bool {
        self.last_loaded_at().is_some()
    }

    /// Number of swaps performed so far
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}
