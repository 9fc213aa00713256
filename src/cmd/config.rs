//! Configuration view and validation commands (`taskboard config`).

use std::path::Path;

use anyhow::Result;

use taskboard::config::{BoardToml, CONFIG_DIR, CONFIG_FILE};

use super::super::ConfigCommands;

/// Load `taskboard.toml` for `project_dir` with environment overrides applied.
pub fn load_config(project_dir: &Path) -> Result<BoardToml> {
    let mut toml = BoardToml::load_or_default(&project_dir.join(CONFIG_DIR))?;
    toml.apply_env()?;
    Ok(toml)
}

fn print_config(toml: &BoardToml) {
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!("  db_path = \"{}\"", toml.server.db_path.display());
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();
    println!("[limits]");
    println!("  max_boards_per_user = {}", toml.limits.max_boards_per_user);
    println!();
    println!("[events]");
    println!("  heartbeat_interval_secs = {}", toml.events.heartbeat_interval_secs);
    println!("  idle_timeout_secs = {}", toml.events.idle_timeout_secs);
    println!("  subscriber_buffer = {}", toml.events.subscriber_buffer);
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Taskboard Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No taskboard.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();
            println!("Effective values (with env overrides):");
            print_config(&load_config(project_dir)?);
        }
        Some(ConfigCommands::Validate) => {
            let toml = load_config(project_dir)?;
            let problems = toml.validate();
            if problems.is_empty() {
                if config_path.exists() {
                    println!("Configuration is valid: {}", config_path.display());
                } else {
                    println!("No taskboard.toml found; defaults are valid.");
                }
            } else {
                for problem in &problems {
                    eprintln!("  - {}", problem);
                }
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                anyhow::bail!("taskboard.toml already exists at {}", config_path.display());
            }
            std::fs::create_dir_all(&config_dir)?;
            BoardToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
