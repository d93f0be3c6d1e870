//! Installer dispatch and outcome classification.
//!
//! One call per package: build the concrete invocation for the package's
//! install type, route recognized BIOS flash tools to the specialized
//! invoker, and classify the heterogeneous result signals (exit codes,
//! BIOS side-channel info, declared success-code lists) into a normalized
//! [`PackageInstallResult`].

use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::flagstore::{BiosUpdateFlag, FlagStore};
use crate::model::{
    InstallType, Package, PackageFile, PackageInstallResult, PendingAction, RebootType,
};
use crate::process::{
    BiosAction, BiosUpdater, ExecutionError, ExecutionInfo, ExecutionResult, GenericInfo,
    ProcessRunner,
};
use crate::resolver::resolve_command;
use crate::runtime::Runtime;

/// Driver-install exit code meaning "succeeded, reboot before use".
/// Always accepted for INF installs regardless of the declared set.
const EXIT_REBOOT_REQUIRED: i32 = 3010;

/// Recorded when an installer ran but exited outside the accepted set.
pub const EXIT_CODE_MISMATCH: &str = "installer exit code not in declared success set";

/// Substrings identifying known BIOS flash tools in a vendor command.
const BIOS_TOOL_SIGNATURES: [&str; 3] = ["winuptp", "wflash2", "flash.cmd"];

/// True when the vendor command invokes a recognized BIOS flash tool.
pub fn is_bios_flash_command(command: &str) -> bool {
    let lowered = command.to_lowercase();
    BIOS_TOOL_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

/// Some vendors ship the overwrite flag misspelled; the tool rejects the
/// misspelling outright, so it is corrected before invocation.
fn correct_vendor_typo(command: &str) -> String {
    command.replace("-overwirte", "-overwrite")
}

/// Bundles the collaborators one installation needs and dispatches purely
/// on the package's declared install type.
pub struct Dispatcher<R, P, B, F>
where
    R: Runtime,
    P: ProcessRunner,
    B: BiosUpdater,
    F: FlagStore,
{
    runtime: Arc<R>,
    runner: Arc<P>,
    bios: Arc<B>,
    flags: Arc<F>,
}

impl<R, P, B, F> Dispatcher<R, P, B, F>
where
    R: Runtime + 'static,
    P: ProcessRunner + 'static,
    B: BiosUpdater + 'static,
    F: FlagStore + 'static,
{
    pub fn new(runtime: Arc<R>, runner: Arc<P>, bios: Arc<B>, flags: Arc<F>) -> Self {
        Self {
            runtime,
            runner,
            bios,
            flags,
        }
    }

    /// Install one package from its already-fetched installer file.
    ///
    /// Returns `None` for install types this crate does not handle; the
    /// caller logs nothing further and continues with the next package.
    #[tracing::instrument(skip(self, pkg, installer_file))]
    pub async fn install(
        &self,
        pkg: &Package,
        installer_file: &PackageFile,
        working_dir: &Path,
    ) -> Option<PackageInstallResult> {
        match &pkg.installer.install_type {
            InstallType::Cmd => Some(self.install_cmd(pkg, installer_file, working_dir).await),
            InstallType::Inf => Some(self.install_inf(pkg, working_dir).await),
            InstallType::Other(kind) => {
                warn!(
                    "package {} has unsupported install type {:?}, skipping",
                    pkg.id, kind
                );
                None
            }
        }
    }

    async fn install_cmd(
        &self,
        pkg: &Package,
        installer_file: &PackageFile,
        working_dir: &Path,
    ) -> PackageInstallResult {
        let command = &pkg.installer.command;
        let result = if is_bios_flash_command(command) {
            debug!("package {} routes to the BIOS flash invoker", pkg.id);
            self.bios.flash(command, working_dir).await
        } else {
            let corrected = correct_vendor_typo(command);
            match resolve_command(self.runtime.as_ref(), &corrected, working_dir) {
                Some(resolution) => {
                    self.runner
                        .run(&resolution.executable, &resolution.arguments, working_dir)
                        .await
                }
                None => unresolvable(&corrected),
            }
        };

        let success = classify_success(&result, &pkg.installer.success_codes);

        if success && let ExecutionInfo::BiosUpdate(info) = &result.info {
            let flag = BiosUpdateFlag {
                timestamp: info.timestamp,
                action_needed: info.action_needed,
                package_hash: installer_file.checksum.clone(),
            };
            if let Err(err) = self.flags.record_bios_update(&flag) {
                warn!("failed to record BIOS update flag: {:#}", err);
            }
        }

        let pending_action = if !success {
            PendingAction::None
        } else {
            match &result.info {
                ExecutionInfo::BiosUpdate(info) => match info.action_needed {
                    BiosAction::Shutdown => PendingAction::Shutdown,
                    BiosAction::Reboot => PendingAction::RebootMandatory,
                    BiosAction::None => PendingAction::None,
                },
                ExecutionInfo::Generic(_) => match pkg.reboot_type {
                    RebootType::NotRequired => PendingAction::None,
                    RebootType::Recommended => PendingAction::RebootSuggested,
                    RebootType::Required => PendingAction::RebootMandatory,
                },
            }
        };

        into_record(pkg, result, success, pending_action)
    }

    async fn install_inf(&self, pkg: &Package, working_dir: &Path) -> PackageInstallResult {
        let result = match &pkg.installer.inf_file {
            Some(inf) => {
                let arguments = format!("/add-driver {} /install", inf.display());
                self.runner
                    .run(Path::new("pnputil.exe"), &arguments, working_dir)
                    .await
            }
            None => ExecutionResult {
                error: Some(ExecutionError::LaunchFailed(
                    "package declares an INF install but names no INF file".to_string(),
                )),
                info: ExecutionInfo::Generic(GenericInfo::default()),
            },
        };

        let exit_code = result.info.exit_code();
        let success = result.error.is_none()
            && exit_code.is_some_and(|code| {
                code == 0
                    || code == EXIT_REBOOT_REQUIRED
                    || pkg.installer.success_codes.contains(&code)
            });
        let pending_action = if success && exit_code == Some(EXIT_REBOOT_REQUIRED) {
            PendingAction::RebootSuggested
        } else {
            PendingAction::None
        };

        into_record(pkg, result, success, pending_action)
    }
}

/// Success: the process ran to completion, and either the BIOS tool's own
/// verdict (when present) or the exit-code-in-declared-set test holds.
fn classify_success(result: &ExecutionResult, success_codes: &BTreeSet<i32>) -> bool {
    if result.error.is_some() {
        return false;
    }
    if let ExecutionInfo::BiosUpdate(info) = &result.info
        && let Some(verdict) = info.success_override
    {
        return verdict;
    }
    result
        .info
        .exit_code()
        .is_some_and(|code| success_codes.contains(&code))
}

fn unresolvable(command: &str) -> ExecutionResult {
    ExecutionResult {
        error: Some(ExecutionError::LaunchFailed(format!(
            "could not resolve an executable from {:?}",
            command
        ))),
        info: ExecutionInfo::Generic(GenericInfo::default()),
    }
}

fn into_record(
    pkg: &Package,
    result: ExecutionResult,
    success: bool,
    pending_action: PendingAction,
) -> PackageInstallResult {
    let failure_reason = match (&result.error, success) {
        (Some(err), _) => err.to_string(),
        (None, false) => EXIT_CODE_MISMATCH.to_string(),
        (None, true) => String::new(),
    };

    let exit_code = result.info.exit_code();
    let runtime = result.info.runtime();
    let (stdout, stderr, log_output) = match result.info {
        ExecutionInfo::Generic(info) => (info.stdout, info.stderr, String::new()),
        ExecutionInfo::BiosUpdate(info) => (String::new(), String::new(), info.log_message),
    };

    PackageInstallResult {
        id: pkg.id.clone(),
        title: pkg.title.clone(),
        package_type: pkg.package_type.clone(),
        success,
        failure_reason,
        pending_action,
        exit_code,
        stdout,
        stderr,
        log_output,
        runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flagstore::MockFlagStore;
    use crate::model::{FileKind, InstallerSpec};
    use crate::process::{BiosUpdateInfo, MockBiosUpdater, MockProcessRunner};
    use crate::runtime::MockRuntime;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::time::Duration;

    fn package(install_type: InstallType, reboot_type: RebootType, codes: &[i32]) -> Package {
        Package {
            id: "pkg-1".to_string(),
            title: "Test Package".to_string(),
            package_type: "Driver".to_string(),
            reboot_type,
            files: vec![],
            installer: InstallerSpec {
                install_type,
                command: String::new(),
                success_codes: codes.iter().copied().collect(),
                inf_file: None,
            },
            base_location: None,
        }
    }

    fn installer_file(checksum: &str) -> PackageFile {
        PackageFile {
            kind: FileKind::Installer,
            location: "setup.exe".to_string(),
            checksum: checksum.to_string(),
            local_path: Some(PathBuf::from("/work/setup.exe")),
        }
    }

    fn generic_result(exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            error: None,
            info: ExecutionInfo::Generic(GenericInfo {
                exit_code: Some(exit_code),
                stdout: "out".to_string(),
                stderr: String::new(),
                runtime: Duration::from_secs(2),
            }),
        }
    }

    fn bios_result(success: bool, action: BiosAction) -> ExecutionResult {
        ExecutionResult {
            error: None,
            info: ExecutionInfo::BiosUpdate(BiosUpdateInfo {
                exit_code: Some(0),
                action_needed: action,
                success_override: Some(success),
                timestamp: Utc::now(),
                log_message: "flash log".to_string(),
                runtime: Duration::from_secs(30),
            }),
        }
    }

    /// Runtime where exactly the given executable resolves.
    fn runtime_with_executable(path: &str) -> MockRuntime {
        let exe = PathBuf::from(path);
        let mut runtime = MockRuntime::new();
        runtime.expect_is_file().returning(move |p| p == exe.as_path());
        runtime
            .expect_canonicalize()
            .returning(|p| Ok(p.to_path_buf()));
        runtime.expect_system_path_dirs().returning(Vec::new);
        runtime.expect_system_pathext().returning(Vec::new);
        runtime
    }

    fn no_flag_writes() -> MockFlagStore {
        let mut flags = MockFlagStore::new();
        flags.expect_record_bios_update().never();
        flags
    }

    #[test]
    fn test_bios_flash_command_detection() {
        assert!(is_bios_flash_command("winuptp.exe -s"));
        assert!(is_bios_flash_command("WINUPTP64.EXE -s"));
        assert!(is_bios_flash_command("wflash2x64.exe /quiet"));
        assert!(is_bios_flash_command("START /WAIT Flash.cmd /sccm"));
        assert!(!is_bios_flash_command("setup.exe /quiet"));
    }

    #[test]
    fn test_vendor_typo_correction() {
        assert_eq!(
            correct_vendor_typo("setup.exe -overwirte -s"),
            "setup.exe -overwrite -s"
        );
        assert_eq!(
            correct_vendor_typo("setup.exe -overwrite"),
            "setup.exe -overwrite"
        );
    }

    #[tokio::test]
    async fn test_cmd_success_with_reboot_type_required() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| generic_result(0));

        let dispatcher = Dispatcher::new(
            Arc::new(runtime_with_executable("/work/setup.exe")),
            Arc::new(runner),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::Required, &[0]);
        pkg.installer.command = "/work/setup.exe /quiet".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.pending_action, PendingAction::RebootMandatory);
        assert!(result.failure_reason.is_empty());
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_cmd_exit_code_mismatch() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| generic_result(2));

        let dispatcher = Dispatcher::new(
            Arc::new(runtime_with_executable("/work/setup.exe")),
            Arc::new(runner),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::Recommended, &[0, 1]);
        pkg.installer.command = "/work/setup.exe /quiet".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failure_reason, EXIT_CODE_MISMATCH);
        // Failure never carries a pending action.
        assert_eq!(result.pending_action, PendingAction::None);
    }

    #[tokio::test]
    async fn test_cmd_typo_corrected_before_invocation() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_, arguments, _| arguments == "-overwrite -s")
            .returning(|_, _, _| generic_result(0));

        let dispatcher = Dispatcher::new(
            Arc::new(runtime_with_executable("/work/setup.exe")),
            Arc::new(runner),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::NotRequired, &[0]);
        pkg.installer.command = "/work/setup.exe -overwirte -s".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.pending_action, PendingAction::None);
    }

    #[tokio::test]
    async fn test_cmd_unresolvable_command_is_launch_failure() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_file().returning(|_| false);
        runtime.expect_system_path_dirs().returning(Vec::new);
        runtime.expect_system_pathext().returning(Vec::new);

        let dispatcher = Dispatcher::new(
            Arc::new(runtime),
            Arc::new(MockProcessRunner::new()),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::NotRequired, &[0]);
        pkg.installer.command = "ghost.exe /quiet".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.failure_reason.contains("launch failed"));
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_bios_route_overrides_reboot_type() {
        let mut bios = MockBiosUpdater::new();
        bios.expect_flash()
            .returning(|_, _| bios_result(true, BiosAction::Reboot));

        let mut flags = MockFlagStore::new();
        flags
            .expect_record_bios_update()
            .withf(|flag| flag.package_hash == "deadbeef" && flag.action_needed == BiosAction::Reboot)
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(MockProcessRunner::new()),
            Arc::new(bios),
            Arc::new(flags),
        );

        // RebootType says nothing is needed; the BIOS side-channel wins.
        let mut pkg = package(InstallType::Cmd, RebootType::NotRequired, &[0]);
        pkg.installer.command = "winuptp.exe -s".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("deadbeef"), Path::new("/work"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.pending_action, PendingAction::RebootMandatory);
        assert_eq!(result.log_output, "flash log");
    }

    #[tokio::test]
    async fn test_bios_shutdown_action() {
        let mut bios = MockBiosUpdater::new();
        bios.expect_flash()
            .returning(|_, _| bios_result(true, BiosAction::Shutdown));

        let mut flags = MockFlagStore::new();
        flags
            .expect_record_bios_update()
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(MockProcessRunner::new()),
            Arc::new(bios),
            Arc::new(flags),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::Required, &[0]);
        pkg.installer.command = "wflash2x64.exe /quiet".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();
        assert_eq!(result.pending_action, PendingAction::Shutdown);
    }

    #[tokio::test]
    async fn test_failed_bios_flash_writes_no_flag() {
        let mut bios = MockBiosUpdater::new();
        bios.expect_flash()
            .returning(|_, _| bios_result(false, BiosAction::None));

        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(MockProcessRunner::new()),
            Arc::new(bios),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Cmd, RebootType::NotRequired, &[0]);
        pkg.installer.command = "winuptp.exe -s".to_string();

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();

        // The tool's own verdict overrides the exit code being 0.
        assert!(!result.success);
        assert_eq!(result.failure_reason, EXIT_CODE_MISMATCH);
    }

    #[tokio::test]
    async fn test_inf_3010_always_accepted() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|executable, arguments, _| {
                executable == Path::new("pnputil.exe")
                    && arguments == "/add-driver drivers/net.inf /install"
            })
            .returning(|_, _, _| generic_result(3010));

        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(runner),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        // Declared set is {0} only; 3010 must still count as success.
        let mut pkg = package(InstallType::Inf, RebootType::NotRequired, &[0]);
        pkg.installer.inf_file = Some(PathBuf::from("drivers/net.inf"));

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.pending_action, PendingAction::RebootSuggested);
    }

    #[tokio::test]
    async fn test_inf_clean_success_has_no_pending_action() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| generic_result(0));

        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(runner),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let mut pkg = package(InstallType::Inf, RebootType::Required, &[]);
        pkg.installer.inf_file = Some(PathBuf::from("x.inf"));

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();
        assert!(result.success);
        // The INF path does not consult the package reboot type.
        assert_eq!(result.pending_action, PendingAction::None);
    }

    #[tokio::test]
    async fn test_inf_without_inf_file_fails() {
        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(MockProcessRunner::new()),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let pkg = package(InstallType::Inf, RebootType::NotRequired, &[0]);

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.failure_reason.contains("INF"));
    }

    #[tokio::test]
    async fn test_unsupported_install_type_is_skipped() {
        let dispatcher = Dispatcher::new(
            Arc::new(MockRuntime::new()),
            Arc::new(MockProcessRunner::new()),
            Arc::new(MockBiosUpdater::new()),
            Arc::new(no_flag_writes()),
        );

        let pkg = package(
            InstallType::Other("FIRMWARE-BLOB".to_string()),
            RebootType::NotRequired,
            &[0],
        );

        let result = dispatcher
            .install(&pkg, &installer_file("abc"), Path::new("/work"))
            .await;
        assert!(result.is_none());
    }
}
