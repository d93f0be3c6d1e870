//! Environment and system information operations.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    /// The process environment of a service running under the machine
    /// account carries the machine-scope variables, which is the context
    /// installers are dispatched from.
    #[tracing::instrument(skip(self))]
    pub(crate) fn system_path_dirs_impl(&self) -> Vec<PathBuf> {
        match env::var_os("PATH") {
            Some(paths) => env::split_paths(&paths).collect(),
            None => Vec::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn system_pathext_impl(&self) -> Vec<String> {
        match env::var("PATHEXT") {
            Ok(exts) => exts
                .split(';')
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn current_dir_impl(&self) -> Result<PathBuf> {
        env::current_dir().context("Failed to determine current directory")
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_privileged_impl(&self) -> bool {
        #[cfg(unix)]
        return nix::unistd::geteuid().as_raw() == 0;

        #[cfg(windows)]
        return is_elevated::is_elevated();
    }
}
