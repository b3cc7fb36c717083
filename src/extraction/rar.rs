use crate::error::ExtractError;
use crate::types::ArchiveKind;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{ArchiveCodec, CodecResult, check_cancelled};
use super::shared::{ensure_parent, sanitize_entry_path};

/// Archive codec for RAR files (backed by the bundled unrar library)
pub struct RarCodec;

impl RarCodec {
    fn convert_unrar_error(e: unrar::error::UnrarError, archive_path: &Path) -> ExtractError {
        ExtractError::failed(archive_path, e.to_string())
    }
}

impl ArchiveCodec for RarCodec {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Rar
    }

    fn list_entries(&self, archive_path: &Path) -> CodecResult<Vec<PathBuf>> {
        let listing = unrar::Archive::new(archive_path)
            .open_for_listing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut names = Vec::new();
        for header in listing {
            let header = header.map_err(|e| Self::convert_unrar_error(e, archive_path))?;
            names.push(header.filename);
        }
        Ok(names)
    }

    fn extract_all(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        cancel: &CancellationToken,
    ) -> CodecResult<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting RAR extraction");

        let mut at_header = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut extracted_files = Vec::new();

        loop {
            check_cancelled(cancel, archive_path)?;

            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(Self::convert_unrar_error(e, archive_path)),
            };

            let header = at_file.entry();
            let sanitized = sanitize_entry_path(&header.filename);
            let is_directory = header.is_directory();

            let file_path = match sanitized {
                Some(relative) if !is_directory => dest_path.join(relative),
                Some(relative) => {
                    let dir = dest_path.join(relative);
                    std::fs::create_dir_all(&dir).map_err(|e| {
                        ExtractError::failed(archive_path, format!("failed to create directory: {e}"))
                    })?;
                    at_header = at_file
                        .skip()
                        .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
                    continue;
                }
                None => {
                    warn!(entry = ?header.filename, "skipping RAR entry with unsafe path");
                    at_header = at_file
                        .skip()
                        .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
                    continue;
                }
            };

            ensure_parent(&file_path, archive_path)?;
            at_header = at_file
                .extract_to(&file_path)
                .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
            extracted_files.push(file_path);
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "RAR extraction successful"
        );

        Ok(extracted_files)
    }
}
