//! Fetch collaborator: materialize a located resource as a local file.
//!
//! The locator decides *what* a location is; this stage only moves bytes.
//! HTTP bodies are streamed straight to disk. There is deliberately no
//! retry or backoff here: a failed transfer fails the package and the
//! pipeline moves on.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::locator::{Locator, LocatorKind};
use crate::runtime::Runtime;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Materialize the located resource inside `dest_dir` and return the
    /// resulting local path.
    async fn fetch(&self, locator: &Locator, dest_dir: &Path) -> Result<PathBuf>;
}

/// Production fetcher: HTTP download for `Http` locators, local copy for
/// `File` locators.
pub struct HttpFetcher<R: Runtime> {
    runtime: Arc<R>,
    client: Client,
}

impl<R: Runtime> HttpFetcher<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            client: Client::new(),
        }
    }

    async fn download(&self, location: &str, dest_dir: &Path) -> Result<PathBuf> {
        let file_name = url_file_name(location).unwrap_or_else(|| "download.bin".to_string());
        let dest = dest_dir.join(file_name);
        info!("Downloading {} to {:?}...", location, dest);

        let response = self
            .client
            .get(location)
            .send()
            .await
            .context("Failed to start download request")?;
        let mut response = response
            .error_for_status()
            .context("Download request was refused")?;

        let mut writer = self
            .runtime
            .create_file(&dest)
            .with_context(|| format!("Failed to create file at {:?}", dest))?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(dest)
    }

    fn copy_local(&self, location: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source = Path::new(location);
        let file_name = source
            .file_name()
            .with_context(|| format!("{:?} has no file name", source))?;
        let dest = dest_dir.join(file_name);
        debug!("Copying {:?} to {:?}...", source, dest);
        self.runtime
            .copy(source, &dest)
            .with_context(|| format!("Failed to copy {:?}", source))?;
        Ok(dest)
    }
}

#[async_trait]
impl<R: Runtime + 'static> Fetcher for HttpFetcher<R> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, locator: &Locator, dest_dir: &Path) -> Result<PathBuf> {
        if !locator.valid {
            bail!("cannot fetch from invalid locator: {}", locator.error_message);
        }
        match locator.kind {
            LocatorKind::Http => self.download(&locator.absolute_location, dest_dir).await,
            LocatorKind::File => self.copy_local(&locator.absolute_location, dest_dir),
            LocatorKind::Unknown => bail!("cannot fetch from an unclassified locator"),
        }
    }
}

/// Decoded final path segment of a URL, if it has one.
fn url_file_name(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(urlencoding::decode(segment).ok()?.into_owned())
}
