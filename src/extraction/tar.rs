use crate::error::ExtractError;
use crate::types::ArchiveKind;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{ArchiveCodec, CodecResult, check_cancelled};
use super::shared::{ensure_parent, sanitize_entry_path};

/// Archive codec for tarballs, optionally gzip-compressed
pub struct TarCodec {
    gzip: bool,
}

impl TarCodec {
    /// Codec for `.tar`
    pub fn plain() -> Self {
        Self { gzip: false }
    }

    /// Codec for `.tar.gz` / `.tgz`
    pub fn gzip() -> Self {
        Self { gzip: true }
    }

    fn open(&self, archive_path: &Path) -> CodecResult<tar::Archive<Box<dyn Read>>> {
        let file = File::open(archive_path).map_err(|e| {
            ExtractError::failed(archive_path, format!("failed to open tar archive: {e}"))
        })?;
        let reader = BufReader::new(file);
        let reader: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(reader))
        } else {
            Box::new(reader)
        };
        Ok(tar::Archive::new(reader))
    }

    fn read_error(archive_path: &Path, e: std::io::Error) -> ExtractError {
        ExtractError::failed(archive_path, format!("failed to read tar archive: {e}"))
    }
}

impl ArchiveCodec for TarCodec {
    fn kind(&self) -> ArchiveKind {
        if self.gzip {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Tar
        }
    }

    fn list_entries(&self, archive_path: &Path) -> CodecResult<Vec<PathBuf>> {
        let mut archive = self.open(archive_path)?;
        let mut names = Vec::new();

        for entry in archive
            .entries()
            .map_err(|e| Self::read_error(archive_path, e))?
        {
            let entry = entry.map_err(|e| Self::read_error(archive_path, e))?;
            let path = entry.path().map_err(|e| Self::read_error(archive_path, e))?;
            names.push(path.into_owned());
        }

        Ok(names)
    }

    fn extract_all(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        cancel: &CancellationToken,
    ) -> CodecResult<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, gzip = self.gzip, "attempting tar extraction");

        let mut archive = self.open(archive_path)?;
        let mut extracted_files = Vec::new();

        for entry in archive
            .entries()
            .map_err(|e| Self::read_error(archive_path, e))?
        {
            check_cancelled(cancel, archive_path)?;

            let mut entry = entry.map_err(|e| Self::read_error(archive_path, e))?;
            let entry_path = entry
                .path()
                .map_err(|e| Self::read_error(archive_path, e))?
                .into_owned();

            let Some(relative) = sanitize_entry_path(&entry_path) else {
                warn!(entry = ?entry_path, "skipping tar entry with unsafe path");
                continue;
            };
            let file_path = dest_path.join(relative);

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                std::fs::create_dir_all(&file_path).map_err(|e| {
                    ExtractError::failed(archive_path, format!("failed to create directory: {e}"))
                })?;
                continue;
            }
            if !entry_type.is_file() {
                // Links and special files are not needed for course submissions
                debug!(entry = ?entry_path, ?entry_type, "skipping non-regular tar entry");
                continue;
            }

            ensure_parent(&file_path, archive_path)?;
            entry.unpack(&file_path).map_err(|e| {
                ExtractError::failed(
                    archive_path,
                    format!("failed to extract {}: {e}", entry_path.display()),
                )
            })?;
            extracted_files.push(file_path);
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "tar extraction successful"
        );

        Ok(extracted_files)
    }
}
