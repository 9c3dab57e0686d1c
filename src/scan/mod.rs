//! Malware scanning for uploaded files
//!
//! This module provides a trait-based abstraction for batch malware scanning
//! of temp files before they are promoted to permanent storage. Scanning is
//! a defense-in-depth measure; combine it with the upload pipeline's
//! extension and MIME-type allow-lists rather than relying on it alone.
//!
//! The production backend shells out to ClamAV's `clamscan`; tests and
//! development deployments can substitute [`NoOpScanner`] or a mock.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Result type for scan operations
pub type ScanOutcome<T> = Result<T, ScanError>;

/// Scanner errors
///
/// A *detection* is not an error; it is the non-zero count returned by
/// [`MalwareScanner::scan`]. Errors mean the scanner itself could not run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner process could not be spawned or awaited
    #[error("scanner I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The scanner ran but reported an internal failure
    #[error("scanner failed: {0}")]
    Failed(String),
}

/// Trait for malware scanning backends
///
/// Contract: given a batch of file paths, scan them (optionally removing
/// infected files) and return the number of infections found. A non-zero
/// count invalidates the whole batch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// Scans `paths` and returns the number of infected files.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner is unavailable or crashes; detection
    /// results are never errors.
    async fn scan(&self, paths: &[PathBuf]) -> ScanOutcome<u32>;

    /// Name of the scanner implementation
    fn name(&self) -> &'static str;
}

/// No-op scanner that never finds anything
///
/// Useful for development and for deployments where scanning happens
/// elsewhere (e.g. at the storage provider).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpScanner;

impl NoOpScanner {
    /// Creates a new no-op scanner
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MalwareScanner for NoOpScanner {
    async fn scan(&self, _paths: &[PathBuf]) -> ScanOutcome<u32> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "NoOp Scanner"
    }
}

/// ClamAV scanner invoked as an external `clamscan` process
///
/// Runs `clamscan -r [--remove] <paths...>` and derives the infection count
/// from the summary output, falling back to the process exit code (clamscan
/// exits 0 when clean, 1 when at least one infection was found).
#[derive(Debug, Clone)]
pub struct ClamAvScanner {
    command: String,
    remove_infected: bool,
}

impl Default for ClamAvScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ClamAvScanner {
    /// Creates a scanner invoking `clamscan` from `$PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            command: "clamscan".to_string(),
            remove_infected: true,
        }
    }

    /// Creates a scanner from settings
    #[must_use]
    pub fn from_settings(settings: &crate::config::ScanSettings) -> Self {
        Self {
            command: settings.command.clone(),
            remove_infected: settings.remove_infected,
        }
    }

    /// Overrides the scanner executable
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Whether infected files are removed by the scanner
    #[must_use]
    pub fn remove_infected(mut self, remove: bool) -> Self {
        self.remove_infected = remove;
        self
    }
}

#[async_trait]
impl MalwareScanner for ClamAvScanner {
    async fn scan(&self, paths: &[PathBuf]) -> ScanOutcome<u32> {
        if paths.is_empty() {
            return Ok(0);
        }

        let mut command = Command::new(&self.command);
        command.arg("-r");
        if self.remove_infected {
            command.arg("--remove");
        }
        command.args(paths);

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let count = parse_infected_count(&stdout, output.status.code());
        match count {
            Some(infected) => {
                tracing::debug!(files = paths.len(), infected, "scan complete");
                Ok(infected)
            }
            None => Err(ScanError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "ClamAV Scanner"
    }
}

/// Extracts the infection count from clamscan output.
///
/// Prefers the `Infected files: N` summary line; falls back to the exit code
/// (0 clean, 1 infected). Exit code 2 means the scan itself failed.
fn parse_infected_count(stdout: &str, exit_code: Option<i32>) -> Option<u32> {
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Infected files:") {
            if let Ok(count) = rest.trim().parse::<u32>() {
                return Some(count);
            }
        }
    }
    match exit_code {
        Some(0) => Some(0),
        Some(1) => Some(1),
        _ => None,
    }
}
