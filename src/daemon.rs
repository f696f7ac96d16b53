use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{error, info, warn};

const PIDFILE_NAME: &str = "cliptrail.pid";

/// Get the path for the pidfile
pub fn get_pidfile_path() -> Result<PathBuf> {
    // Try XDG_RUNTIME_DIR first (modern Linux)
    if let Some(runtime_dir) = dirs::runtime_dir() {
        return Ok(runtime_dir.join(PIDFILE_NAME));
    }

    // Try /var/run/user/<uid>/ (systemd systems)
    let uid = nix::unistd::getuid();
    let var_run_user = PathBuf::from(format!("/var/run/user/{}", uid));
    if var_run_user.exists() {
        return Ok(var_run_user.join(PIDFILE_NAME));
    }

    // Fallback to ~/.local/run/
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".local").join("run").join(PIDFILE_NAME))
}

/// Read PID from pidfile
pub fn read_pidfile(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;

    let pid = contents
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid PID in pidfile: {}", contents))?;

    Ok(Some(pid))
}

/// Check if a process with the given PID is running
pub fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks that the process exists
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Exclusive claim on the history database for this process
///
/// Removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path`, failing if another live monitor already holds it
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let own_pid = process::id();

        if let Some(pid) = read_pidfile(&path)? {
            if pid != own_pid && is_process_running(pid) {
                bail!("ClipTrail is already running with PID {}", pid);
            }
            info!("Found stale pidfile for PID {}, removing", pid);
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale pidfile: {:?}", path))?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create pidfile directory")?;
        }

        // Owner read/write only
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("Failed to create pidfile: {:?}", path))?;
        write!(file, "{}", own_pid)?;

        info!("Wrote PID {} to {:?}", own_pid, path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Removed pidfile: {:?}", self.path),
            Err(e) => warn!("Failed to remove pidfile {:?}: {}", self.path, e),
        }
    }
}

/// Stop the running monitor; returns `false` when none was running
pub fn stop_running(path: &Path) -> Result<bool> {
    let Some(pid) = read_pidfile(path)? else {
        info!("ClipTrail is not running (no pidfile)");
        return Ok(false);
    };

    if !is_process_running(pid) {
        info!("ClipTrail is not running (stale pidfile)");
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove pidfile: {:?}", path))?;
        return Ok(false);
    }

    info!("Sending SIGTERM to ClipTrail with PID {}", pid);
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;

    // Give the shutdown grace period time to drain
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(100));
        if !is_process_running(pid) {
            info!("ClipTrail stopped successfully");
            return Ok(true);
        }
    }

    error!("ClipTrail did not stop gracefully, sending SIGKILL");
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL)?;
    std::thread::sleep(Duration::from_millis(100));

    if is_process_running(pid) {
        return Err(anyhow!("Failed to stop ClipTrail"));
    }

    let _ = fs::remove_file(path);
    info!("ClipTrail forcefully stopped");
    Ok(true)
}
