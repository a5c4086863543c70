//! Host module - pre-run environment reset
//!
//! Runs on the same host reuse the temp directory and process table, so
//! every run starts by killing browsers left behind by earlier runs and
//! removing their profile directories and captures.
//!
//! Profiles are named `<marker><owner pid>-<random>`. An entry is only
//! reclaimed once its owner pid is gone, so runs in parallel on the same host
//! leave each other alone. Untagged entries count as orphaned.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::config::CleanupConfig;
use crate::core::{PilotError, Result};

/// What a reset pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Processes sent SIGKILL
    pub killed: usize,
    /// Temp entries removed
    pub purged: usize,
    /// Kills or removals that did not go through
    pub failures: usize,
}

/// Brings the host back to a clean state before a run
#[async_trait]
pub trait EnvironmentReset: Send + Sync {
    async fn reset(&self) -> Result<CleanupReport>;
}

/// Kills orphaned browsers by command-line marker and purges orphaned temp
/// entries by prefix
#[derive(Debug, Clone)]
pub struct HostCleanup {
    markers: Vec<String>,
    temp_prefixes: Vec<String>,
    temp_root: PathBuf,
}

impl HostCleanup {
    pub fn new(markers: Vec<String>, temp_prefixes: Vec<String>) -> Self {
        Self {
            markers,
            temp_prefixes,
            temp_root: std::env::temp_dir(),
        }
    }

    pub fn from_config(config: &CleanupConfig) -> Self {
        Self::new(config.process_markers.clone(), config.temp_prefixes.clone())
    }

    /// Purge a different directory than the system temp dir
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    /// Blocking reset pass
    pub fn reset_now(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        self.kill_orphans(&mut report);
        self.purge_temp(&mut report);
        report
    }

    #[cfg(target_os = "linux")]
    fn kill_orphans(&self, report: &mut CleanupReport) {
        if self.markers.is_empty() {
            return;
        }

        let own_pid = std::process::id();
        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "cannot scan /proc");
                report.failures += 1;
                return;
            }
        };

        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            if pid as u32 == own_pid {
                continue;
            }
            // Processes can exit between listing and reading
            let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
                continue;
            };
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            if !self
                .markers
                .iter()
                .any(|marker| is_orphaned(&cmdline, marker))
            {
                continue;
            }

            match kill_process(pid) {
                Ok(true) => {
                    debug!(pid, "killed orphaned browser process");
                    report.killed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(pid, error = %e, "failed to kill orphaned process");
                    report.failures += 1;
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn kill_orphans(&self, _report: &mut CleanupReport) {
        if !self.markers.is_empty() {
            warn!("process scanning is not supported on this platform, skipping");
        }
    }

    fn purge_temp(&self, report: &mut CleanupReport) {
        if self.temp_prefixes.is_empty() {
            return;
        }

        let entries = match fs::read_dir(&self.temp_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.temp_root.display(), error = %e, "cannot list temp dir");
                report.failures += 1;
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !self
                .temp_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()) && is_orphaned(&name, prefix))
            {
                continue;
            }

            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let removed = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            match removed {
                Ok(()) => {
                    debug!(path = %path.display(), "purged stale temp entry");
                    report.purged += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to purge temp entry");
                    report.failures += 1;
                }
            }
        }
    }
}

#[async_trait]
impl EnvironmentReset for HostCleanup {
    async fn reset(&self) -> Result<CleanupReport> {
        let cleanup = self.clone();
        tokio::task::spawn_blocking(move || cleanup.reset_now())
            .await
            .map_err(|e| PilotError::Other(format!("cleanup task failed: {}", e)))
    }
}

/// The owner pid written right after `marker`, as in `<marker><pid>-...`
pub fn owner_pid(text: &str, marker: &str) -> Option<i32> {
    if marker.is_empty() {
        return None;
    }
    let rest = &text[text.find(marker)? + marker.len()..];
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || !rest[digits_end..].starts_with('-') {
        return None;
    }
    rest[..digits_end].parse().ok()
}

/// Whether the entry tagged by `marker` in `text` has no living owner
pub fn is_orphaned(text: &str, marker: &str) -> bool {
    if marker.is_empty() || !text.contains(marker) {
        return false;
    }
    match owner_pid(text, marker) {
        Some(pid) => !process_alive(pid),
        None => true,
    }
}

/// Signal 0 probe. A process we may not signal still exists.
#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return false;
    }
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    true
}

/// SIGKILL a process. `Ok(false)` when it was already gone.
#[cfg(target_os = "linux")]
fn kill_process(pid: i32) -> std::result::Result<bool, nix::errno::Errno> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}
