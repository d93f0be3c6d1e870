//! Sequential package processing: locate, fetch, extract, dispatch.
//!
//! Packages are processed independently and in submission order; each one
//! is fully resolved and installed before the next begins. A failure that
//! can be localized to one package never aborts the remainder: packages
//! whose installer cannot be acquired are skipped with a warning and
//! produce no result record.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::Extractor;
use crate::fetch::Fetcher;
use crate::flagstore::FlagStore;
use crate::installer::Dispatcher;
use crate::locator::{ProbeClient, locate};
use crate::model::{Package, PackageInstallResult};
use crate::process::{BiosUpdater, ProcessRunner};
use crate::runtime::Runtime;

/// Wires the collaborators one batch of packages flows through.
pub struct Pipeline<R, P, B, F, D, E>
where
    R: Runtime,
    P: ProcessRunner,
    B: BiosUpdater,
    F: FlagStore,
    D: Fetcher,
    E: Extractor,
{
    runtime: Arc<R>,
    dispatcher: Dispatcher<R, P, B, F>,
    fetcher: Arc<D>,
    extractor: Arc<E>,
    probe: Option<ProbeClient>,
}

impl<R, P, B, F, D, E> Pipeline<R, P, B, F, D, E>
where
    R: Runtime + 'static,
    P: ProcessRunner + 'static,
    B: BiosUpdater + 'static,
    F: FlagStore + 'static,
    D: Fetcher + 'static,
    E: Extractor + 'static,
{
    pub fn new(
        runtime: Arc<R>,
        dispatcher: Dispatcher<R, P, B, F>,
        fetcher: Arc<D>,
        extractor: Arc<E>,
        probe: Option<ProbeClient>,
    ) -> Self {
        Self {
            runtime,
            dispatcher,
            fetcher,
            extractor,
            probe,
        }
    }

    /// Process packages sequentially, emitting one result per package that
    /// reached a recognized install type, in submission order.
    #[tracing::instrument(skip(self, packages))]
    pub async fn process_packages(
        &self,
        packages: &[Package],
        work_root: &Path,
    ) -> Vec<PackageInstallResult> {
        let mut results = Vec::new();
        for pkg in packages {
            info!("processing package {} ({})", pkg.id, pkg.title);
            match self.process_one(pkg, work_root).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {
                    // Unsupported install type; already warned by the
                    // dispatcher.
                }
                Err(err) => warn!("skipping package {}: {:#}", pkg.id, err),
            }
        }
        results
    }

    async fn process_one(
        &self,
        pkg: &Package,
        work_root: &Path,
    ) -> Result<Option<PackageInstallResult>> {
        let Some(installer_file) = pkg.installer_file() else {
            bail!("package declares no installer file");
        };

        let work_dir = work_root.join(&pkg.id);
        self.runtime
            .create_dir_all(&work_dir)
            .with_context(|| format!("Failed to create work directory {:?}", work_dir))?;

        let locator = locate(
            self.runtime.as_ref(),
            &installer_file.location,
            pkg.base_location.as_deref(),
            self.probe.as_ref(),
        )
        .await;
        if !locator.valid {
            bail!(
                "installer location {:?} did not resolve: {}",
                installer_file.location,
                locator.error_message
            );
        }

        let local = self
            .fetcher
            .fetch(&locator, &work_dir)
            .await
            .with_context(|| format!("Failed to fetch {:?}", locator.absolute_location))?;

        let dispatch_dir = self.unpack_if_archived(&local, &work_dir)?;

        let mut fetched = installer_file.clone();
        fetched.local_path = Some(local);

        Ok(self.dispatcher.install(pkg, &fetched, &dispatch_dir).await)
    }

    /// Installer archives are unpacked next to the download; the install
    /// command then resolves inside the extraction directory.
    fn unpack_if_archived(&self, local: &Path, work_dir: &Path) -> Result<PathBuf> {
        if !self.extractor.can_handle(local) {
            return Ok(work_dir.to_path_buf());
        }
        let extract_dir = work_dir.join("extracted");
        self.extractor
            .extract(local, &extract_dir)
            .with_context(|| format!("Failed to extract {:?}", local))?;
        Ok(extract_dir)
    }
}
