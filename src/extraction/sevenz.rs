use crate::error::ExtractError;
use crate::types::ArchiveKind;
use sevenz_rust::{Password, SevenZReader};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{ArchiveCodec, CodecResult};
use super::shared::sanitize_entry_path;

/// Archive codec for 7z files
pub struct SevenZipCodec;

impl ArchiveCodec for SevenZipCodec {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::SevenZip
    }

    fn list_entries(&self, archive_path: &Path) -> CodecResult<Vec<PathBuf>> {
        let reader = SevenZReader::open(archive_path, Password::empty()).map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to read 7z archive: {e}"))
        })?;

        Ok(reader
            .archive()
            .files
            .iter()
            .map(|entry| PathBuf::from(entry.name()))
            .collect())
    }

    fn extract_all(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        cancel: &CancellationToken,
    ) -> CodecResult<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting 7z extraction");

        let mut extracted_files = Vec::new();
        let mut cancelled = false;

        // The library's default extract fn joins entry names unchecked, so entries are
        // written here after sanitizing
        let result = sevenz_rust::decompress_file_with_extract_fn(
            archive_path,
            dest_path,
            |entry, reader, _unchecked_dest| {
                if cancel.is_cancelled() {
                    cancelled = true;
                    return Ok(false);
                }

                let Some(relative) = sanitize_entry_path(Path::new(entry.name())) else {
                    warn!(entry = entry.name(), "skipping 7z entry with unsafe path");
                    return Ok(true);
                };
                let file_path = dest_path.join(relative);

                if entry.is_directory() {
                    std::fs::create_dir_all(&file_path)?;
                    return Ok(true);
                }

                if let Some(parent) = file_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut outfile = std::fs::File::create(&file_path)?;
                std::io::copy(reader, &mut outfile)?;
                extracted_files.push(file_path);
                Ok(true)
            },
        );

        if cancelled {
            return Err(ExtractError::Cancelled {
                archive: archive_path.to_path_buf(),
            });
        }

        result.map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to extract 7z archive: {e}"))
        })?;

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "7z extraction successful"
        );

        Ok(extracted_files)
    }
}
