use crate::error::ExtractError;
use crate::types::ArchiveKind;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{ArchiveCodec, CodecResult, check_cancelled};
use super::shared::{ensure_parent, sanitize_entry_path};

/// Archive codec for ZIP files
pub struct ZipCodec;

impl ZipCodec {
    fn open(archive_path: &Path) -> CodecResult<zip::ZipArchive<std::fs::File>> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to open ZIP archive: {e}"))
        })?;

        zip::ZipArchive::new(file).map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to read ZIP archive: {e}"))
        })
    }

    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_zip_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> CodecResult<Option<PathBuf>> {
        let file_path = match file.enclosed_name().and_then(sanitize_entry_path) {
            Some(relative) => dest_path.join(relative),
            None => {
                warn!(entry = file.name(), "skipping ZIP entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path).map_err(|e| {
                ExtractError::failed(archive_path, format!("failed to create directory: {e}"))
            })?;
            return Ok(None);
        }

        ensure_parent(&file_path, archive_path)?;

        let mut outfile = std::fs::File::create(&file_path).map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to create output file: {e}"))
        })?;

        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            ExtractError::failed(
                archive_path,
                format!("failed to extract {}: {e}", file.name()),
            )
        })?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            // Keep owner write so a merge or cleanup can still touch the file
            let perms = std::fs::Permissions::from_mode(mode | 0o200);
            if let Err(e) = std::fs::set_permissions(&file_path, perms) {
                debug!(?file_path, error = %e, "could not apply ZIP entry permissions");
            }
        }

        Ok(Some(file_path))
    }
}

impl ArchiveCodec for ZipCodec {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn list_entries(&self, archive_path: &Path) -> CodecResult<Vec<PathBuf>> {
        let archive = Self::open(archive_path)?;
        Ok(archive.file_names().map(PathBuf::from).collect())
    }

    fn extract_all(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        cancel: &CancellationToken,
    ) -> CodecResult<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let mut archive = Self::open(archive_path)?;
        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            check_cancelled(cancel, archive_path)?;

            let file = archive.by_index(i).map_err(|e| {
                ExtractError::failed(archive_path, format!("failed to read ZIP entry: {e}"))
            })?;

            if let Some(file_path) = Self::extract_zip_entry(file, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }
}
