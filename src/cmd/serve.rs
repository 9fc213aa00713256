//! Server commands: `taskboard serve` and `taskboard init`.

use std::path::{Path, PathBuf};

use anyhow::Result;

use taskboard::board::server::{self, ServerConfig};

use super::config::load_config;

/// Relative paths are taken from the project directory.
fn resolve(project_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_dir.join(path)
    }
}

/// Layer CLI flags over the file and environment settings.
fn server_config(
    project_dir: &Path,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<ServerConfig> {
    let toml = load_config(project_dir)?;
    let problems = toml.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }

    let mut config = toml.server_config();
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(db_path) = db_path {
        config.db_path = db_path;
    }
    config.dev_mode |= dev;
    config.db_path = resolve(project_dir, config.db_path);
    Ok(config)
}

pub async fn cmd_serve(
    project_dir: &Path,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let config = server_config(project_dir, port, db_path, dev)?;
    server::start_server(config).await
}

pub fn cmd_init(project_dir: &Path, db_path: Option<PathBuf>) -> Result<()> {
    let config = server_config(project_dir, None, db_path, false)?;
    server::open_database(&config.db_path)?;
    println!("Board database initialized at {}", config.db_path.display());
    Ok(())
}
