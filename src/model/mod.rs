//! Package data model shared by the resolver, locator, and installer.
//!
//! Packages are produced by an external catalog stage and passed in
//! read-only; nothing in this crate mutates them. The serde derives exist
//! for the JSON manifest consumed by the CLI and for the machine-readable
//! result output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Role of a file within a package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum FileKind {
    /// The file that performs the installation when executed.
    Installer,
    /// Readmes, license texts, auxiliary payloads.
    Other(String),
}

impl From<String> for FileKind {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("installer") {
            FileKind::Installer
        } else {
            FileKind::Other(value)
        }
    }
}

impl From<FileKind> for String {
    fn from(value: FileKind) -> Self {
        match value {
            FileKind::Installer => "INSTALLER".to_string(),
            FileKind::Other(s) => s,
        }
    }
}

/// One file belonging to a package.
///
/// `location` is the vendor-authored path or URL exactly as it appears in
/// the catalog; `local_path` is filled in by the fetch stage once the file
/// is on disk and never changes afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageFile {
    pub kind: FileKind,
    pub location: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// How a package installs, as declared by the vendor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum InstallType {
    /// Free-form command line, possibly naming a BIOS flash tool.
    Cmd,
    /// Driver installation from an INF file.
    Inf,
    /// Anything else; not installable by this crate.
    Other(String),
}

impl From<String> for InstallType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("cmd") {
            InstallType::Cmd
        } else if value.eq_ignore_ascii_case("inf") {
            InstallType::Inf
        } else {
            InstallType::Other(value)
        }
    }
}

impl From<InstallType> for String {
    fn from(value: InstallType) -> Self {
        match value {
            InstallType::Cmd => "CMD".to_string(),
            InstallType::Inf => "INF".to_string(),
            InstallType::Other(s) => s,
        }
    }
}

/// Vendor-declared installer invocation details. Immutable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstallerSpec {
    pub install_type: InstallType,
    #[serde(default)]
    pub command: String,
    /// Exit codes the vendor declares as success for this package.
    #[serde(default)]
    pub success_codes: BTreeSet<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inf_file: Option<PathBuf>,
}

/// Vendor reboot requirement codes: 0 (none), 3 (recommended), 5 (required).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum RebootType {
    NotRequired,
    Recommended,
    Required,
}

impl TryFrom<u8> for RebootType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RebootType::NotRequired),
            3 => Ok(RebootType::Recommended),
            5 => Ok(RebootType::Required),
            other => Err(format!("unknown reboot type code {}", other)),
        }
    }
}

impl From<RebootType> for u8 {
    fn from(value: RebootType) -> Self {
        match value {
            RebootType::NotRequired => 0,
            RebootType::Recommended => 3,
            RebootType::Required => 5,
        }
    }
}

/// A vendor update unit: metadata, files, and an installer specification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Package {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Vendor category, e.g. "BIOS", "Driver", "Firmware".
    #[serde(default)]
    pub package_type: String,
    pub reboot_type: RebootType,
    #[serde(default)]
    pub files: Vec<PackageFile>,
    pub installer: InstallerSpec,
    /// Base location the package's file locations resolve against,
    /// typically the directory or URL the catalog entry was served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_location: Option<String>,
}

impl Package {
    /// The file that carries the installer, if the package declares one.
    pub fn installer_file(&self) -> Option<&PackageFile> {
        self.files.iter().find(|f| f.kind == FileKind::Installer)
    }
}

/// System action required to finalize an installed update.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingAction {
    None,
    RebootSuggested,
    RebootMandatory,
    Shutdown,
}

/// Terminal per-package outcome record, written once.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageInstallResult {
    pub id: String,
    pub title: String,
    pub package_type: String,
    pub success: bool,
    #[serde(default)]
    pub failure_reason: String,
    pub pending_action: PendingAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub log_output: String,
    pub runtime: Duration,
}
