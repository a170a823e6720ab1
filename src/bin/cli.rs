//! Wardgate CLI - Main entry point for CLI binary
//!
//! This binary provides the `wardgate` tool for inspecting and editing the
//! permission matrix and for running the reference endpoint locally.

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use wardgate_lib::engine::{
    api::{create_router, ApiState},
    cli::{
        formatter::{format_flags, CliFormatter},
        Cli, Commands, OutputFormat,
    },
    config::{Config, EndpointConfig, CONFIG_FILE},
    observability::init_tracing,
    rbac::{
        Action, ChangeBroadcaster, LoadError, PermissionService, PolicyEditor, RefreshOutcome,
        Role,
    },
};

fn main() {
    let cli = Cli::parse();
    init_tracing("warn");

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&e.to_string());
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { base_url, force } => {
            cmd_init(&project_dir, base_url, force, json_output)?;
        }
        Commands::Check { role, module, action } => {
            cmd_check(&project_dir, role, &module, action, json_output)?;
        }
        Commands::Show { role } => {
            cmd_show(&project_dir, role, json_output)?;
        }
        Commands::Grant { role, module, action } => {
            cmd_edit(&project_dir, Edit::Set(role, module, action, true), json_output)?;
        }
        Commands::Revoke { role, module, action } => {
            cmd_edit(&project_dir, Edit::Set(role, module, action, false), json_output)?;
        }
        Commands::ToggleAll { role, module, mode } => {
            cmd_edit(&project_dir, Edit::ToggleAll(role, module, mode.allowed()), json_output)?;
        }
        Commands::Reset => {
            cmd_edit(&project_dir, Edit::Reset, json_output)?;
        }
        Commands::Serve { port, host, admin_token } => {
            cmd_serve(&host, port, admin_token)?;
        }
        Commands::Watch => {
            cmd_watch(&project_dir)?;
        }
    }

    Ok(())
}

fn cmd_init(
    project_dir: &Path,
    base_url: Option<String>,
    force: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = project_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        return Err(format!("Config already exists: {} (use --force)", config_path.display()).into());
    }

    std::fs::create_dir_all(project_dir)?;
    let mut config = Config::default();
    if let Some(url) = base_url {
        config.endpoint = EndpointConfig::for_base_url(&url);
    }
    config.validate()?;
    config.save(project_dir)?;

    if json {
        println!("{}", serde_json::json!({
            "success": true,
            "config": config_path.display().to_string(),
        }));
    } else {
        CliFormatter::success(&format!("Wrote {}", config_path.display()));
        CliFormatter::kv("Endpoint", &config.endpoint.permissions_url());
        CliFormatter::kv("Refresh", &format!("{} ms", config.sync.refresh_interval_ms));
    }

    Ok(())
}

/// Build a service for this project and run one load
async fn loaded_service(project_dir: &Path) -> Result<PermissionService, Box<dyn std::error::Error>> {
    let config = Config::load_or_default(project_dir)?;
    let service = PermissionService::from_config(&config, ChangeBroadcaster::new())?;
    if service.reload().await == RefreshOutcome::Degraded {
        CliFormatter::warning("Permission endpoint unavailable; showing built-in defaults");
    }
    Ok(service)
}

#[tokio::main]
async fn cmd_check(
    project_dir: &Path,
    role: Role,
    module: &str,
    action: Action,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = loaded_service(project_dir).await?;
    let allowed = service.evaluator().has_permission(role, module, action);

    if json {
        println!("{}", serde_json::json!({
            "role": role,
            "module": module,
            "action": action,
            "allowed": allowed,
            "state": service.store().state(),
        }));
    } else if allowed {
        CliFormatter::success(&format!("{} may {} {}", role, action, module));
    } else {
        CliFormatter::error(&format!("{} may not {} {}", role, action, module));
    }

    Ok(())
}

#[tokio::main]
async fn cmd_show(project_dir: &Path, only: Option<Role>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let service = loaded_service(project_dir).await?;
    let snapshot = service.evaluator().snapshot();
    let roles: Vec<Role> = match only {
        Some(role) => vec![role],
        None => Role::ALL.to_vec(),
    };

    if json {
        let mut out = serde_json::Map::new();
        for role in &roles {
            let mut modules = serde_json::Map::new();
            if let Some(policy) = snapshot.matrix().policy(*role) {
                for module in policy.modules() {
                    modules.insert(module.to_string(), serde_json::json!(format_flags(policy, module)));
                }
            }
            out.insert(role.to_string(), serde_json::Value::Object(modules));
        }
        println!("{}", serde_json::Value::Object(out));
        return Ok(());
    }

    for role in roles {
        CliFormatter::header(role.as_str());
        match snapshot.matrix().policy(role) {
            Some(policy) => CliFormatter::role_table(policy),
            None => CliFormatter::item("no permissions"),
        }
    }

    Ok(())
}

/// One administrative change applied to a draft
enum Edit {
    Set(Role, String, Action, bool),
    ToggleAll(Role, String, bool),
    Reset,
}

impl Edit {
    fn apply(self, editor: &mut PolicyEditor) {
        match self {
            Edit::Set(role, module, action, allowed) => editor.set(role, &module, action, allowed),
            Edit::ToggleAll(role, module, allowed) => editor.toggle_all(role, &module, allowed),
            Edit::Reset => editor.reset_to_defaults(),
        }
    }
}

#[tokio::main]
async fn cmd_edit(project_dir: &Path, edit: Edit, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(project_dir)?;
    let service = PermissionService::from_config(&config, ChangeBroadcaster::new())?;

    // Edits must start from the real remote policy; an empty document means defaults
    let outcome = service.loader().load().await;
    match outcome.error {
        None | Some(LoadError::Empty) => {}
        Some(err) => return Err(format!("Refusing to edit, current policy unavailable: {}", err).into()),
    }

    let mut editor = PolicyEditor::new(Arc::new(outcome.matrix));
    edit.apply(&mut editor);
    let changes = editor.pending_changes();

    if changes.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "success": true, "changes": [] }));
        } else {
            CliFormatter::info("No changes");
        }
        return Ok(());
    }

    editor.save(&service).await?;

    if json {
        println!("{}", serde_json::json!({ "success": true, "changes": changes }));
    } else {
        CliFormatter::success(&format!("Saved {} change(s)", changes.len()));
        for change in &changes {
            CliFormatter::change(change);
        }
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(host: &str, port: u16, admin_token: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = ApiState::new();
    if let Some(token) = &admin_token {
        state = state.with_admin_token(token);
    }
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    CliFormatter::header("Wardgate permissions endpoint");
    CliFormatter::kv("Listening", &format!("http://{}", addr));
    CliFormatter::kv("Writes", if admin_token.is_some() { "token required" } else { "open" });
    CliFormatter::info("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn cmd_watch(project_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(project_dir)?;
    let mut service = PermissionService::from_config(&config, ChangeBroadcaster::new())?;

    let outcome = service.start().await;
    CliFormatter::header("Watching permissions");
    CliFormatter::kv("Endpoint", &config.endpoint.permissions_url());
    CliFormatter::kv("Status", &format!("{:?}", service.status()));
    if outcome == RefreshOutcome::Degraded {
        CliFormatter::warning("Using built-in defaults until the endpoint responds");
    }

    let mut previous = service.store().get();
    let mut seen_generation = service.store().generation();
    let mut last_status = service.status();
    let mut poll = tokio::time::interval(std::time::Duration::from_millis(250));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                let status = service.status();
                if status != last_status {
                    CliFormatter::kv("Status", &format!("{:?}", status));
                    last_status = status;
                }

                let generation = service.store().generation();
                if generation == seen_generation {
                    continue;
                }
                seen_generation = generation;

                let current = service.store().get();
                for change in current.changes_from(&previous) {
                    CliFormatter::change(&change);
                }
                previous = current;
            }
        }
    }

    service.stop().await;
    CliFormatter::info("Stopped");
    Ok(())
}
