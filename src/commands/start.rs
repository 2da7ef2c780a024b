use anyhow::Result;
use colored::Colorize;
use logvault::{config, init_tracing, server};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pid::PidFile;

/// Execute the start command
///
/// This will:
/// 1. Load configuration
/// 2. Initialize logging with the configured level and format
/// 3. Create PID file
/// 4. Start the server
pub async fn execute(config_path: &Path, pid_file: Option<PathBuf>) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    println!(
        "{} {}",
        "Starting logvault".green(),
        format!("({}:{})", cfg.server.host, cfg.server.port).cyan()
    );
    info!(config = %config_path.display(), "Starting logvault");

    // Create PID file to prevent multiple instances
    let pid_file = PidFile::create(pid_file)?;
    info!(pid_file = %pid_file.path().display(), "PID file locked");

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
