//! Extractor for .zip archives.

use anyhow::{Context, Result};
use log::debug;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

use super::{Extractor, is_safe_entry_path};
use crate::runtime::Runtime;

pub struct ZipExtractor<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> ZipExtractor<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime + 'static> Extractor for ZipExtractor<R> {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract(&self, archive_path: &Path, extract_to: &Path) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = self
            .runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // The zip format needs Read + Seek; Runtime::open only hands out a
        // reader, so buffer the archive. Vendor installer bundles are small.
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
        let cursor = std::io::Cursor::new(buffer);

        let mut archive = ZipArchive::new(cursor).context("Failed to parse ZIP archive")?;
        self.runtime.create_dir_all(extract_to)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) if is_safe_entry_path(&path) => path,
                _ => {
                    debug!("Skipping entry with unsafe path");
                    continue;
                }
            };

            let full_path = extract_to.join(&entry_path);

            if entry.is_dir() {
                self.runtime.create_dir_all(&full_path)?;
            } else {
                if let Some(parent) = full_path.parent() {
                    self.runtime.create_dir_all(parent)?;
                }
                let mut dest_file = self.runtime.create_file(&full_path)?;
                std::io::copy(&mut entry, &mut dest_file)
                    .with_context(|| format!("Failed to extract file {:?}", full_path))?;

                // Installer payloads must stay executable (Unix only).
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode()
                    && let Err(e) = self.runtime.set_permissions(&full_path, mode)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;

    fn create_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options: FileOptions<()> = FileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_can_handle_zip_only() {
        let extractor = ZipExtractor::new(Arc::new(RealRuntime));
        assert!(extractor.can_handle(Path::new("pkg.zip")));
        assert!(extractor.can_handle(Path::new("PKG.ZIP")));
        assert!(!extractor.can_handle(Path::new("pkg.tar.gz")));
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("pkg.zip");
        std::fs::write(
            &archive_path,
            create_zip(&[("setup.exe", "installer"), ("drivers/x.inf", "[Version]")]),
        )
        .unwrap();

        let extract_to = dir.path().join("unpacked");
        let extractor = ZipExtractor::new(Arc::new(RealRuntime));
        extractor.extract(&archive_path, &extract_to).unwrap();

        assert_eq!(
            std::fs::read_to_string(extract_to.join("setup.exe")).unwrap(),
            "installer"
        );
        assert_eq!(
            std::fs::read_to_string(extract_to.join("drivers/x.inf")).unwrap(),
            "[Version]"
        );
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("pkg.zip");
        std::fs::write(&archive_path, b"not a zip").unwrap();

        let extractor = ZipExtractor::new(Arc::new(RealRuntime));
        assert!(
            extractor
                .extract(&archive_path, &dir.path().join("unpacked"))
                .is_err()
        );
    }
}
