//! Wardgate CLI Module
//! Command-line interface for inspecting and editing the permission matrix

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::config::Config;
use crate::engine::rbac::{Action, Role};

#[derive(Parser, Debug)]
#[command(name = "wardgate")]
#[command(author = "Wardgate Team")]
#[command(version)]
#[command(about = "Role-based permission engine for hospital operations", long_about = None)]
pub struct Cli {
    /// Directory holding wardgate.config.json
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project.clone().unwrap_or_else(Config::default_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ToggleMode {
    Allow,
    Deny,
}

impl ToggleMode {
    pub fn allowed(&self) -> bool {
        matches!(self, ToggleMode::Allow)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default wardgate.config.json
    Init {
        /// Permissions endpoint base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Ask whether a role may perform an action on a module
    Check {
        role: Role,
        module: String,
        action: Action,
    },

    /// Print the current permission matrix
    Show {
        /// Only this role
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Allow one action and save
    Grant {
        role: Role,
        module: String,
        action: Action,
    },

    /// Deny one action and save
    Revoke {
        role: Role,
        module: String,
        action: Action,
    },

    /// Allow or deny all four actions for a module and save
    ToggleAll {
        role: Role,
        module: String,
        #[arg(value_enum)]
        mode: ToggleMode,
    },

    /// Replace the remote matrix with the built-in defaults
    Reset,

    /// Run the reference permissions endpoint
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "54321")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Require this bearer token on writes
        #[arg(long)]
        admin_token: Option<String>,
    },

    /// Keep a synced copy and report every change until Ctrl+C
    Watch,
}
