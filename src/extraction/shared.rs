use crate::types::ArchiveKind;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use super::codec::CodecResult;
use crate::error::ExtractError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = b"\x1f\x8b";
const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xbc\xaf\x27\x1c";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Detect archive format from the file's leading bytes
///
/// Returns `None` when the header matches no known format (including empty files);
/// the caller then falls back to the file name.
pub fn sniff_archive_kind(path: &Path) -> std::io::Result<Option<ArchiveKind>> {
    let mut header = Vec::with_capacity(TAR_MAGIC_OFFSET + TAR_MAGIC.len());
    std::fs::File::open(path)?
        .take((TAR_MAGIC_OFFSET + TAR_MAGIC.len()) as u64)
        .read_to_end(&mut header)?;

    Ok(kind_from_header(&header))
}

/// Match a header against the known magic numbers
pub fn kind_from_header(header: &[u8]) -> Option<ArchiveKind> {
    if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if header.starts_with(SEVEN_ZIP_MAGIC) {
        Some(ArchiveKind::SevenZip)
    } else if header.starts_with(RAR_MAGIC) {
        Some(ArchiveKind::Rar)
    } else if header.starts_with(GZIP_MAGIC) {
        Some(ArchiveKind::TarGz)
    } else if header.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC) {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

/// Turn an archive entry name into a relative path that stays inside the destination
///
/// Root, prefix and `.` components are dropped; `..` rejects the entry. Returns `None`
/// for entries that would be empty or escape.
pub fn sanitize_entry_path(entry: &Path) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in entry.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }

    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Create `path`'s parent directories
pub(crate) fn ensure_parent(path: &Path, archive: &Path) -> CodecResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ExtractError::failed(archive, format!("failed to create parent directories: {e}"))
        })?;
    }
    Ok(())
}
