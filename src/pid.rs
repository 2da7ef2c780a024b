//! PID file handling for the start/stop commands
//!
//! The running server holds an exclusive lock on its PID file, so a second
//! instance pointed at the same file refuses to start.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_PID_FILE: &str = "./data/logvault.pid";

pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Create and lock the PID file, writing the current process id
    pub fn create(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_PID_FILE));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open PID file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "Another instance is already running (PID file {} is locked)",
                path.display()
            )
        })?;

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), "PID file created");
        Ok(Self { path, file })
    }

    /// Read the process id stored in the PID file
    pub fn read(path: Option<PathBuf>) -> Result<u32> {
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_PID_FILE));
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read PID file {} (is the server running?)",
                path.display()
            )
        })?;
        content
            .trim()
            .parse()
            .with_context(|| format!("Invalid PID in {}", path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("logvault.pid");

        let pid_file = PidFile::create(Some(path.clone())).unwrap();
        assert_eq!(pid_file.path(), path.as_path());
        assert_eq!(PidFile::read(Some(path.clone())).unwrap(), std::process::id());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_instance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logvault.pid");

        let _first = PidFile::create(Some(path.clone())).unwrap();
        let second = PidFile::create(Some(path));
        assert!(second.is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PidFile::read(Some(dir.path().join("absent.pid"))).is_err());
    }
}
