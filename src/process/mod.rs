//! External process execution: result model, generic runner, and the
//! specialized BIOS flash invoker.
//!
//! The installer dispatcher consumes [`ExecutionResult`]s; it never touches
//! process plumbing itself. The generic/BIOS split is an explicit tagged
//! variant so outcome classification pattern-matches on the tag instead of
//! probing for field presence.

pub mod bios;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

pub use bios::{BiosUpdater, WinuptpBiosUpdater};

#[cfg(test)]
pub use bios::MockBiosUpdater;

/// Why a process invocation produced no usable exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    LaunchFailed(String),
    Timeout,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::LaunchFailed(msg) => write!(f, "process launch failed: {}", msg),
            ExecutionError::Timeout => write!(f, "process timed out"),
        }
    }
}

/// Exit-code-and-streams outcome of an ordinary installer process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenericInfo {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub runtime: Duration,
}

/// Post-flash action a BIOS tool demands.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiosAction {
    None,
    Shutdown,
    Reboot,
}

/// Firmware-update outcome carrying the tool's side-channel information.
///
/// `success_override`, when present, replaces the exit-code-in-success-set
/// test entirely: flash tools have their own exit-code conventions that do
/// not follow the package's declared success codes.
#[derive(Debug, Clone, PartialEq)]
pub struct BiosUpdateInfo {
    pub exit_code: Option<i32>,
    pub action_needed: BiosAction,
    pub success_override: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub log_message: String,
    pub runtime: Duration,
}

/// Tagged process outcome payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionInfo {
    Generic(GenericInfo),
    BiosUpdate(BiosUpdateInfo),
}

impl ExecutionInfo {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionInfo::Generic(info) => info.exit_code,
            ExecutionInfo::BiosUpdate(info) => info.exit_code,
        }
    }

    pub fn runtime(&self) -> Duration {
        match self {
            ExecutionInfo::Generic(info) => info.runtime,
            ExecutionInfo::BiosUpdate(info) => info.runtime,
        }
    }
}

/// Terminal result of one external process invocation, consumed exactly
/// once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub error: Option<ExecutionError>,
    pub info: ExecutionInfo,
}

/// Generic external process execution collaborator.
///
/// The invocation blocks until the process terminates; timeout and
/// cancellation policy live behind this seam, not in the dispatcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, executable: &Path, arguments: &str, working_dir: &Path)
    -> ExecutionResult;
}

/// Production runner on top of `tokio::process`.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    #[tracing::instrument(skip(self))]
    async fn run(
        &self,
        executable: &Path,
        arguments: &str,
        working_dir: &Path,
    ) -> ExecutionResult {
        let start = Instant::now();
        // Vendor argument tails in this catalog format are whitespace-
        // delimited; embedded spaces only ever occur in the executable
        // path, which the resolver has already consumed.
        let args: Vec<&str> = arguments.split_whitespace().collect();

        let output = tokio::process::Command::new(executable)
            .args(&args)
            .current_dir(working_dir)
            .output()
            .await;

        match output {
            Ok(output) => ExecutionResult {
                error: None,
                info: ExecutionInfo::Generic(GenericInfo {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    runtime: start.elapsed(),
                }),
            },
            Err(err) => ExecutionResult {
                error: Some(ExecutionError::LaunchFailed(err.to_string())),
                info: ExecutionInfo::Generic(GenericInfo {
                    runtime: start.elapsed(),
                    ..GenericInfo::default()
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display() {
        assert_eq!(
            ExecutionError::LaunchFailed("no such file".to_string()).to_string(),
            "process launch failed: no such file"
        );
        assert_eq!(ExecutionError::Timeout.to_string(), "process timed out");
    }

    #[test]
    fn test_execution_info_accessors() {
        let info = ExecutionInfo::Generic(GenericInfo {
            exit_code: Some(7),
            runtime: Duration::from_millis(120),
            ..GenericInfo::default()
        });
        assert_eq!(info.exit_code(), Some(7));
        assert_eq!(info.runtime(), Duration::from_millis(120));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_exit_code_and_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner;

        let result = runner
            .run(Path::new("echo"), "hello world", dir.path())
            .await;
        assert!(result.error.is_none());
        match result.info {
            ExecutionInfo::Generic(info) => {
                assert_eq!(info.exit_code, Some(0));
                assert_eq!(info.stdout.trim(), "hello world");
            }
            ExecutionInfo::BiosUpdate(_) => panic!("expected generic info"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_nonzero_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner;

        let result = runner.run(Path::new("false"), "", dir.path()).await;
        assert!(result.error.is_none());
        assert_eq!(result.info.exit_code(), Some(1));
    }

    #[tokio::test]
    async fn test_tokio_runner_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner;

        let result = runner
            .run(Path::new("/nonexistent/installer.exe"), "/quiet", dir.path())
            .await;
        assert!(matches!(
            result.error,
            Some(ExecutionError::LaunchFailed(_))
        ));
        assert_eq!(result.info.exit_code(), None);
    }
}
