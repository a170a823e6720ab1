// Wardgate Engine - Core module structure
pub mod config;
pub mod rbac;
pub mod api;
pub mod cli;
pub mod observability;

pub use config::Config;
pub use rbac::PermissionService;
