//! Extraction collaborator: unpack a fetched installer archive into the
//! package's working directory.
//!
//! Vendor installers arrive either as bare executables or as `.zip` /
//! `.tar.gz` bundles whose contents include the real installer. Extraction
//! failure is fatal to that package only.

mod tar_gz;
mod zip;

use anyhow::{Result, anyhow};
use std::path::{Component, Path};
use std::sync::Arc;

use crate::runtime::Runtime;

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Format-specific archive extractor.
#[cfg_attr(test, mockall::automock)]
pub trait Extractor: Send + Sync {
    /// Check if this extractor can handle the given archive format.
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into the specified directory.
    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive
/// format.
pub struct InstallerExtractor<R: Runtime> {
    tar_gz: TarGzExtractor<R>,
    zip: ZipExtractor<R>,
}

impl<R: Runtime> InstallerExtractor<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            tar_gz: TarGzExtractor::new(runtime.clone()),
            zip: ZipExtractor::new(runtime),
        }
    }
}

impl<R: Runtime + 'static> Extractor for InstallerExtractor<R> {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self))]
    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// An entry path is safe when it is relative and never climbs out of the
/// extraction directory.
pub(crate) fn is_safe_entry_path(path: &Path) -> bool {
    !path.is_absolute()
        && path
            .components()
            .all(|c| !matches!(c, Component::ParentDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_is_safe_entry_path() {
        assert!(is_safe_entry_path(Path::new("setup.exe")));
        assert!(is_safe_entry_path(Path::new("sub/dir/setup.exe")));
        assert!(!is_safe_entry_path(Path::new("../evil.exe")));
        assert!(!is_safe_entry_path(Path::new("sub/../../evil.exe")));
        #[cfg(unix)]
        assert!(!is_safe_entry_path(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_dispatcher_can_handle() {
        let extractor = InstallerExtractor::new(Arc::new(RealRuntime));
        assert!(extractor.can_handle(&PathBuf::from("pkg.zip")));
        assert!(extractor.can_handle(&PathBuf::from("pkg.tar.gz")));
        assert!(extractor.can_handle(&PathBuf::from("pkg.tgz")));
        assert!(!extractor.can_handle(&PathBuf::from("setup.exe")));
    }

    #[test]
    fn test_dispatcher_rejects_unknown_format() {
        let extractor = InstallerExtractor::new(Arc::new(RealRuntime));
        let dir = tempfile::tempdir().unwrap();
        assert!(
            extractor
                .extract(&dir.path().join("setup.exe"), dir.path())
                .is_err()
        );
    }
}
