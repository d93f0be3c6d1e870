//! Extractor for .tar.gz / .tgz archives.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::path::Path;
use std::sync::Arc;
use tar::Archive;

use super::{Extractor, is_safe_entry_path};
use crate::runtime::Runtime;

pub struct TarGzExtractor<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> TarGzExtractor<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime + 'static> Extractor for TarGzExtractor<R> {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let reader = self
            .runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        let mut archive = Archive::new(GzDecoder::new(reader));
        self.runtime.create_dir_all(extract_to)?;

        for entry in archive
            .entries()
            .context("Failed to read tar.gz archive")?
        {
            let mut entry = entry.context("Failed to read tar.gz entry")?;
            let entry_path = entry
                .path()
                .context("Failed to read tar.gz entry path")?
                .into_owned();

            if !is_safe_entry_path(&entry_path) {
                debug!("Skipping entry with unsafe path {:?}", entry_path);
                continue;
            }

            let full_path = extract_to.join(&entry_path);

            if entry.header().entry_type().is_dir() {
                self.runtime.create_dir_all(&full_path)?;
                continue;
            }
            if !entry.header().entry_type().is_file() {
                debug!("Skipping non-regular entry {:?}", entry_path);
                continue;
            }

            if let Some(parent) = full_path.parent() {
                self.runtime.create_dir_all(parent)?;
            }
            let mut dest_file = self.runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            #[cfg(unix)]
            if let Ok(mode) = entry.header().mode()
                && let Err(e) = self.runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }

        Ok(())
    }
}
