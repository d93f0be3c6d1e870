//! Persistent "most recent BIOS update" flag.
//!
//! One mutable slot, externally persisted: initialized on the first
//! successful BIOS install, overwritten on each subsequent one, never
//! deleted by this crate. Writes are unconditional overwrites with no
//! read-modify-write; serializing concurrent writers is the caller's
//! responsibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::process::BiosAction;
use crate::runtime::Runtime;

/// Payload of the single documented write operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BiosUpdateFlag {
    pub timestamp: DateTime<Utc>,
    pub action_needed: BiosAction,
    pub package_hash: String,
}

/// Flag-store collaborator. Durability and read-back are its concern.
#[cfg_attr(test, mockall::automock)]
pub trait FlagStore: Send + Sync {
    /// Record the most recent successful BIOS update. Last write wins.
    fn record_bios_update(&self, flag: &BiosUpdateFlag) -> Result<()>;
}

/// Flag store backed by a JSON file at a well-known location.
pub struct FileFlagStore<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
}

impl<R: Runtime> FileFlagStore<R> {
    pub fn new(runtime: Arc<R>, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    /// The store at the machine's state directory.
    pub fn at_default_location(runtime: Arc<R>) -> Result<Self> {
        let dir = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .context("No state directory available for the BIOS update flag")?;
        Ok(Self::new(runtime, dir.join("vupi").join("last_bios_update.json")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl<R: Runtime> FlagStore for FileFlagStore<R> {
    #[tracing::instrument(skip(self, flag))]
    fn record_bios_update(&self, flag: &BiosUpdateFlag) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        let json =
            serde_json::to_vec_pretty(flag).context("Failed to serialize BIOS update flag")?;
        let mut writer = self
            .runtime
            .create_file(&self.path)
            .with_context(|| format!("Failed to create flag file at {:?}", self.path))?;
        writer
            .write_all(&json)
            .context("Failed to write BIOS update flag")?;
        debug!("recorded BIOS update flag at {:?}", self.path);
        Ok(())
    }
}
