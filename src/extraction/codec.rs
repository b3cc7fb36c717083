use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::error::ExtractError;
use crate::types::ArchiveKind;

use super::rar::RarCodec;
use super::sevenz::SevenZipCodec;
use super::tar::TarCodec;
use super::zip::ZipCodec;

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, ExtractError>;

/// Decompression capability for one archive format
///
/// Implementations are blocking and are run on the blocking thread pool. `extract_all`
/// must check `cancel` before each archive member and stop with
/// [`ExtractError::Cancelled`] once it is set; the member being written may finish.
pub trait ArchiveCodec: Send + Sync {
    /// Format handled by this codec
    fn kind(&self) -> ArchiveKind;

    /// Entry paths stored in the archive, in archive order
    fn list_entries(&self, archive: &Path) -> CodecResult<Vec<PathBuf>>;

    /// Extract every entry below `dest`, returning the files written
    fn extract_all(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> CodecResult<Vec<PathBuf>>;
}

/// Codec for a format
pub fn codec_for(kind: ArchiveKind) -> Box<dyn ArchiveCodec> {
    match kind {
        ArchiveKind::Zip => Box::new(ZipCodec),
        ArchiveKind::Tar => Box::new(TarCodec::plain()),
        ArchiveKind::TarGz => Box::new(TarCodec::gzip()),
        ArchiveKind::SevenZip => Box::new(SevenZipCodec),
        ArchiveKind::Rar => Box::new(RarCodec),
    }
}

/// Stop with `Cancelled` if shutdown was requested
pub(crate) fn check_cancelled(cancel: &CancellationToken, archive: &Path) -> CodecResult<()> {
    if cancel.is_cancelled() {
        Err(ExtractError::Cancelled {
            archive: archive.to_path_buf(),
        })
    } else {
        Ok(())
    }
}
