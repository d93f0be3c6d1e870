//! Specialized invoker for recognized BIOS flash tools.
//!
//! Flash tools report their outcome through their own exit-code
//! conventions and demand a specific post-flash action; the generic
//! exit-code-in-success-set classification does not apply to them. This
//! invoker runs the tool and translates its exit code into the
//! BIOS-flavored result payload the dispatcher classifies on.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::process::{
    BiosAction, BiosUpdateInfo, ExecutionError, ExecutionInfo, ExecutionResult, ProcessRunner,
};
use crate::resolver::resolve_command;
use crate::runtime::Runtime;

/// BIOS-update collaborator: runs a flash command and always returns a
/// BIOS-flavored result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BiosUpdater: Send + Sync {
    async fn flash(&self, command: &str, working_dir: &Path) -> ExecutionResult;
}

/// Production invoker for the Lenovo-style flash tools (`winuptp`,
/// `wflash2`, vendor `flash.cmd` wrappers).
///
/// Exit-code interpretation:
/// - `0` — flash staged, reboot required to apply
/// - `1` — flash staged, shutdown required to apply
/// - anything else — flash failed
pub struct WinuptpBiosUpdater<R, P>
where
    R: Runtime,
    P: ProcessRunner,
{
    runtime: Arc<R>,
    runner: Arc<P>,
}

impl<R, P> WinuptpBiosUpdater<R, P>
where
    R: Runtime,
    P: ProcessRunner,
{
    pub fn new(runtime: Arc<R>, runner: Arc<P>) -> Self {
        Self { runtime, runner }
    }
}

#[async_trait]
impl<R, P> BiosUpdater for WinuptpBiosUpdater<R, P>
where
    R: Runtime + 'static,
    P: ProcessRunner + 'static,
{
    #[tracing::instrument(skip(self))]
    async fn flash(&self, command: &str, working_dir: &Path) -> ExecutionResult {
        let Some(resolution) = resolve_command(self.runtime.as_ref(), command, working_dir)
        else {
            return ExecutionResult {
                error: Some(ExecutionError::LaunchFailed(format!(
                    "could not resolve flash tool from {:?}",
                    command
                ))),
                info: ExecutionInfo::BiosUpdate(BiosUpdateInfo {
                    exit_code: None,
                    action_needed: BiosAction::None,
                    success_override: Some(false),
                    timestamp: Utc::now(),
                    log_message: String::new(),
                    runtime: std::time::Duration::ZERO,
                }),
            };
        };

        debug!(
            "flashing via {:?} {}",
            resolution.executable, resolution.arguments
        );
        let result = self
            .runner
            .run(&resolution.executable, &resolution.arguments, working_dir)
            .await;

        let (exit_code, log_message, runtime) = match result.info {
            ExecutionInfo::Generic(info) => {
                let log = if info.stderr.is_empty() {
                    info.stdout
                } else {
                    format!("{}\n{}", info.stdout, info.stderr)
                };
                (info.exit_code, log.trim().to_string(), info.runtime)
            }
            ExecutionInfo::BiosUpdate(info) => {
                (info.exit_code, info.log_message, info.runtime)
            }
        };

        let (action_needed, success_override) = match (&result.error, exit_code) {
            (Some(_), _) => (BiosAction::None, Some(false)),
            (None, Some(0)) => (BiosAction::Reboot, Some(true)),
            (None, Some(1)) => (BiosAction::Shutdown, Some(true)),
            (None, _) => (BiosAction::None, Some(false)),
        };

        ExecutionResult {
            error: result.error,
            info: ExecutionInfo::BiosUpdate(BiosUpdateInfo {
                exit_code,
                action_needed,
                success_override,
                timestamp: Utc::now(),
                log_message,
                runtime,
            }),
        }
    }
}
