//! RBAC Module
//!
//! Role-based permission matrix, its remote synchronization and the gate
//! every call site consults

pub mod policy;
pub mod defaults;
pub mod error;
pub mod wire;
pub mod store;
pub mod loader;
pub mod broadcast;
pub mod scheduler;
pub mod evaluator;
pub mod editor;
pub mod service;

pub use policy::{
    module_key, Action, PermissionChange, PermissionEntry, PermissionMatrix, Role, RolePolicy,
    KNOWN_MODULES,
};
pub use defaults::DefaultPolicyProvider;
pub use error::{AccessDenied, LoadError, ParseError, PersistError};
pub use store::{PolicyStore, StoreState};
pub use loader::{HttpPolicyTransport, LoadOutcome, MemoryPolicyTransport, PolicyLoader, PolicyTransport};
pub use broadcast::{ChangeBroadcaster, PolicyChanged, Subscription};
pub use scheduler::{RefreshOutcome, Refresher, SyncScheduler};
pub use evaluator::{Gate, PermissionEvaluator, PermissionSnapshot};
pub use editor::PolicyEditor;
pub use service::{ConsumerStatus, PermissionService};
