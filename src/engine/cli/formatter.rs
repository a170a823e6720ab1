//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;

use crate::engine::rbac::{Action, PermissionChange, RolePolicy};

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print one role's permissions as a module x CRUD table
    pub fn role_table(policy: &RolePolicy) {
        let width = policy.modules().map(|m| m.len()).max().unwrap_or(6).max(6);
        println!(
            "  {:<width$}  {}",
            "module".bright_white().bold(),
            "C R U D".bright_white().bold(),
            width = width
        );
        println!("  {}", "─".repeat(width + 9).bright_black());
        for module in policy.modules() {
            let flags = format_flags(policy, module)
                .chars()
                .map(|c| {
                    if c == '-' {
                        c.to_string().bright_black().to_string()
                    } else {
                        c.to_string().green().to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {:<width$}  {}", module, flags, width = width);
        }
    }

    /// Print one changed flag
    pub fn change(change: &PermissionChange) {
        let marker = if change.allowed {
            "+".green().bold()
        } else {
            "-".red().bold()
        };
        println!("  {} {}", marker, format_change(change));
    }
}

/// `CRU-` style summary of one module's flags
pub fn format_flags(policy: &RolePolicy, module: &str) -> String {
    Action::ALL
        .iter()
        .map(|action| {
            if policy.allows(module, *action) {
                action.as_str().chars().next().unwrap_or('?').to_ascii_uppercase()
            } else {
                '-'
            }
        })
        .collect()
}

pub fn format_change(change: &PermissionChange) -> String {
    format!(
        "{} {} {} {}",
        change.role,
        if change.allowed { "may now" } else { "may no longer" },
        change.action,
        change.module
    )
}
