use anyhow::{bail, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::pid::PidFile;

#[cfg(unix)]
use logvault::signals::send_signal_to_pid;
#[cfg(unix)]
use nix::libc;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Execute the stop command
///
/// SIGTERM lets the server drain connections and flush buffered syslog
/// records. With `force`, SIGKILL follows once `timeout` seconds pass.
#[cfg(unix)]
pub async fn execute(pid_file: Option<PathBuf>, force: bool, timeout: u64) -> Result<()> {
    let pid = PidFile::read(pid_file)?;

    println!("{} {}", "Stopping logvault".yellow(), format!("(PID: {})", pid).cyan());
    send_signal_to_pid(pid, SignalKind::terminate())?;
    println!("  Sent SIGTERM, waiting for buffered logs to flush...");

    if wait_for_exit(pid, Duration::from_secs(timeout)).await? {
        println!("{}", "  Server stopped".green());
        info!(pid, "Server stopped");
        return Ok(());
    }

    if !force {
        bail!(
            "Server still running after {} seconds. Use --force to kill it.",
            timeout
        );
    }

    println!("{}", "  Timeout reached, sending SIGKILL...".red());
    info!(pid, "Force killing server");
    send_signal_to_pid(pid, SignalKind::from_raw(libc::SIGKILL))?;

    if wait_for_exit(pid, Duration::from_secs(1)).await? {
        println!("{}", "  Server killed; unflushed drain records are lost".yellow());
        Ok(())
    } else {
        bail!("Process {} survived SIGKILL", pid)
    }
}

#[cfg(not(unix))]
pub async fn execute(_pid_file: Option<PathBuf>, _force: bool, _timeout: u64) -> Result<()> {
    bail!("Stop command is not supported on this platform")
}

/// Poll until the process is gone; false when `timeout` elapses first
#[cfg(unix)]
async fn wait_for_exit(pid: u32, timeout: Duration) -> Result<bool> {
    use std::io::Write;

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !is_process_running(pid) {
            println!();
            return Ok(true);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        print!(".");
        std::io::stdout().flush()?;
    }
    println!();
    Ok(!is_process_running(pid))
}

/// Probe with SIGCONT; EPERM still means the process exists
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGCONT) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
