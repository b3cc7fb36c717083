use crate::config::{DestinationPolicy, WatchConfig};
use crate::error::ExtractError;
use crate::extraction::{
    ArchiveCodec, Extractor, RarCodec, codec_for, extract_blocking, kind_from_header,
    sanitize_entry_path,
};
use crate::filter::{ArchiveFilter, STAGING_PREFIX};
use crate::types::{ArchiveKind, ExtractionOutcome, ReadyArchive};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn extractor(policy: DestinationPolicy) -> Extractor {
    let filter = ArchiveFilter::from_config(&WatchConfig::new("/unused"));
    Extractor::new(filter, policy, CancellationToken::new())
}

fn ready(extractor: &Extractor, archive: &Path) -> ReadyArchive {
    extractor.ready_archive(archive).unwrap()
}

/// Create a ZIP archive with the given entries (stored, uncompressed)
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

fn append_tar_entries<W: std::io::Write>(builder: &mut ::tar::Builder<W>, files: &[(&str, &[u8])]) {
    for (name, content) in files {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
}

/// Create an uncompressed tarball
fn create_tar_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut builder = ::tar::Builder::new(file);
    append_tar_entries(&mut builder, files);
    builder.finish().unwrap();
}

/// Create a gzip-compressed tarball
fn create_tar_gz_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = ::tar::Builder::new(encoder);
    append_tar_entries(&mut builder, files);
    builder.into_inner().unwrap().finish().unwrap();
}

fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

/// Relative paths of every file below `dir`, sorted
fn files_under(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

fn assert_no_staging_left(dir: &Path) {
    let leftovers: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(STAGING_PREFIX))
        })
        .collect();
    assert!(leftovers.is_empty(), "staging residue: {leftovers:?}");
}

// ---------------------------------------------------------------------------
// Successful extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zip_extracts_into_directory_named_after_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw1.zip");
    create_zip_archive(
        &archive,
        &[("main.cpp", b"int main() {}"), ("docs/README.md", b"# hw1")],
    );

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(result.success(), "unexpected outcome: {:?}", result.outcome);
    assert_eq!(result.destination, temp_dir.path().join("hw1"));
    assert_eq!(
        files_under(&result.destination),
        vec!["docs/README.md", "main.cpp"]
    );
    assert_eq!(
        std::fs::read(result.destination.join("main.cpp")).unwrap(),
        b"int main() {}"
    );

    match result.outcome {
        ExtractionOutcome::Extracted { files } => {
            assert_eq!(files.len(), 2);
            assert!(files.iter().all(|f| f.starts_with(&result.destination)));
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
    assert_no_staging_left(temp_dir.path());
    assert!(archive.exists(), "archive itself is left in place");
}

#[tokio::test]
async fn tar_and_tar_gz_extract() {
    let temp_dir = TempDir::new().unwrap();
    let tar_path = temp_dir.path().join("lab1.tar");
    let tgz_path = temp_dir.path().join("lab2.tar.gz");
    let short_tgz_path = temp_dir.path().join("lab3.tgz");
    let files: &[(&str, &[u8])] = &[("src/lib.rs", b"pub fn f() {}"), ("Makefile", b"all:")];
    create_tar_archive(&tar_path, files);
    create_tar_gz_archive(&tgz_path, files);
    create_tar_gz_archive(&short_tgz_path, files);

    let extractor = extractor(DestinationPolicy::Skip);
    for (archive, dest) in [
        (&tar_path, "lab1"),
        (&tgz_path, "lab2"),
        (&short_tgz_path, "lab3"),
    ] {
        let result = extractor.extract(ready(&extractor, archive)).await;
        assert!(result.success(), "{archive:?}: {:?}", result.outcome);
        assert_eq!(result.destination, temp_dir.path().join(dest));
        assert_eq!(files_under(&result.destination), vec!["Makefile", "src/lib.rs"]);
    }
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn seven_zip_extracts() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    std::fs::create_dir_all(source.join("sub")).unwrap();
    std::fs::write(source.join("a.txt"), b"alpha").unwrap();
    std::fs::write(source.join("sub").join("b.txt"), b"beta").unwrap();

    let watch = temp_dir.path().join("watch");
    std::fs::create_dir(&watch).unwrap();
    let archive = watch.join("project.7z");
    create_7z_archive(&archive, &source);

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(result.success(), "unexpected outcome: {:?}", result.outcome);
    let extracted = files_under(&result.destination);
    assert!(extracted.iter().any(|f| f.ends_with("a.txt")), "{extracted:?}");
    assert!(extracted.iter().any(|f| f.ends_with("b.txt")), "{extracted:?}");
    assert_no_staging_left(&watch);
}

#[tokio::test]
async fn content_decides_codec_when_name_disagrees() {
    let temp_dir = TempDir::new().unwrap();
    // A tarball that was saved with a .zip name
    let archive = temp_dir.path().join("mislabeled.zip");
    create_tar_archive(&archive, &[("a.txt", b"tar inside")]);

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(result.success(), "unexpected outcome: {:?}", result.outcome);
    assert_eq!(files_under(&result.destination), vec!["a.txt"]);
}

// ---------------------------------------------------------------------------
// Failures leave nothing behind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn truncated_zip_fails_cleanly_then_complete_download_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw2.zip");
    let payload = vec![b'x'; 64 * 1024];
    create_zip_archive(&archive, &[("big.bin", &payload), ("small.txt", b"hi")]);

    // Keep only the first half, as an interrupted download would
    let complete = std::fs::read(&archive).unwrap();
    std::fs::write(&archive, &complete[..complete.len() / 2]).unwrap();

    let extractor = extractor(DestinationPolicy::Skip);
    let failed = extractor.extract(ready(&extractor, &archive)).await;

    assert!(!failed.success());
    assert!(
        matches!(failed.error(), Some(ExtractError::ExtractionFailed { .. })),
        "unexpected outcome: {:?}",
        failed.outcome
    );
    assert_eq!(failed.error().map(ExtractError::code), Some("extraction_failed"));
    assert!(!failed.destination.exists(), "no partial destination");
    assert_no_staging_left(temp_dir.path());
    assert!(extractor.locks().is_empty(), "lock released after failure");

    // Re-download finishes: same name, full content
    std::fs::write(&archive, &complete).unwrap();
    let retried = extractor.extract(ready(&extractor, &archive)).await;

    assert!(retried.success(), "unexpected outcome: {:?}", retried.outcome);
    assert_eq!(files_under(&retried.destination), vec!["big.bin", "small.txt"]);
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn empty_file_with_archive_name_fails() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("empty.zip");
    std::fs::write(&archive, b"").unwrap();

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(
        result.error(),
        Some(ExtractError::ExtractionFailed { .. })
    ));
    assert!(!result.destination.exists());
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn cancelled_extraction_leaves_no_destination() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw3.zip");
    create_zip_archive(&archive, &[("a.txt", b"a"), ("b.txt", b"b")]);

    let cancel = CancellationToken::new();
    let filter = ArchiveFilter::from_config(&WatchConfig::new("/unused"));
    let extractor = Extractor::new(filter, DestinationPolicy::Skip, cancel.clone());
    cancel.cancel();

    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(result.error(), Some(ExtractError::Cancelled { .. })));
    assert!(!result.destination.exists());
    assert_no_staging_left(temp_dir.path());
    assert!(extractor.locks().is_empty());
}

// ---------------------------------------------------------------------------
// Destination policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skip_policy_leaves_existing_destination_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw4.zip");
    create_zip_archive(&archive, &[("main.cpp", b"new"), ("extra.txt", b"new")]);

    let destination = temp_dir.path().join("hw4");
    std::fs::create_dir(&destination).unwrap();
    std::fs::write(destination.join("main.cpp"), b"student edits").unwrap();

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(
        result.error(),
        Some(ExtractError::DestinationExists { destination: d }) if d == &destination
    ));
    assert_eq!(files_under(&destination), vec!["main.cpp"]);
    assert_eq!(
        std::fs::read(destination.join("main.cpp")).unwrap(),
        b"student edits"
    );
    assert_no_staging_left(temp_dir.path());

    // Running again changes nothing either
    let again = extractor.extract(ready(&extractor, &archive)).await;
    assert!(matches!(
        again.error(),
        Some(ExtractError::DestinationExists { .. })
    ));
    assert_eq!(files_under(&destination), vec!["main.cpp"]);
}

#[tokio::test]
async fn destination_that_is_a_file_is_never_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("notes.zip");
    create_zip_archive(&archive, &[("a.txt", b"a")]);
    let destination = temp_dir.path().join("notes");
    std::fs::write(&destination, b"a plain file").unwrap();

    for policy in [DestinationPolicy::Skip, DestinationPolicy::Merge] {
        let extractor = extractor(policy);
        let result = extractor.extract(ready(&extractor, &archive)).await;
        assert!(
            matches!(result.error(), Some(ExtractError::DestinationExists { .. })),
            "{policy}: {:?}",
            result.outcome
        );
    }
    assert_eq!(std::fs::read(&destination).unwrap(), b"a plain file");
}

#[test]
fn empty_directory_appearing_before_the_final_move_is_not_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw1.zip");
    create_zip_archive(&archive, &[("main.cpp", b"int main() {}")]);

    // Created after the policy check passed, right before staging moves into place
    let destination = temp_dir.path().join("hw1");
    std::fs::create_dir(&destination).unwrap();

    let err = extract_blocking(
        ArchiveKind::Zip,
        &archive,
        &destination,
        false,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(
        matches!(err, ExtractError::DestinationExists { destination: ref d } if d == &destination),
        "{err:?}"
    );
    assert!(files_under(&destination).is_empty());
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn merge_policy_adds_missing_files_only_and_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw5.zip");
    create_zip_archive(
        &archive,
        &[
            ("main.cpp", b"from archive"),
            ("tests/test.cpp", b"tests"),
            ("README", b"readme"),
        ],
    );

    let destination = temp_dir.path().join("hw5");
    std::fs::create_dir(&destination).unwrap();
    std::fs::write(destination.join("main.cpp"), b"student edits").unwrap();

    let extractor = extractor(DestinationPolicy::Merge);
    let first = extractor.extract(ready(&extractor, &archive)).await;

    match &first.outcome {
        ExtractionOutcome::Merged { added, kept } => {
            assert_eq!(*kept, 1);
            assert_eq!(added.len(), 2);
        }
        other => panic!("expected Merged, got {other:?}"),
    }
    assert!(first.success());
    assert_eq!(
        files_under(&destination),
        vec!["README", "main.cpp", "tests/test.cpp"]
    );
    assert_eq!(
        std::fs::read(destination.join("main.cpp")).unwrap(),
        b"student edits",
        "existing files are never overwritten"
    );

    let second = extractor.extract(ready(&extractor, &archive)).await;
    match &second.outcome {
        ExtractionOutcome::Merged { added, kept } => {
            assert!(added.is_empty());
            assert_eq!(*kept, 3);
        }
        other => panic!("expected Merged, got {other:?}"),
    }
    assert_eq!(
        files_under(&destination),
        vec!["README", "main.cpp", "tests/test.cpp"]
    );
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn failed_merge_leaves_destination_as_it_was() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw9.zip");
    create_zip_archive(&archive, &[("a.txt", b"a"), ("sub/b.txt", b"b")]);

    // `sub` is a file, so `sub/b.txt` cannot be placed
    let destination = temp_dir.path().join("hw9");
    std::fs::create_dir(&destination).unwrap();
    std::fs::write(destination.join("sub"), b"not a directory").unwrap();

    let extractor = extractor(DestinationPolicy::Merge);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(
        matches!(result.error(), Some(ExtractError::ExtractionFailed { .. })),
        "{:?}",
        result.outcome
    );
    assert_eq!(files_under(&destination), vec!["sub"]);
    assert_eq!(
        std::fs::read(destination.join("sub")).unwrap(),
        b"not a directory"
    );
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn merge_creates_directories_that_hold_no_files() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw8.zip");
    {
        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options = ::zip::write::FileOptions::default();
        writer.add_directory("build/", options).unwrap();
        writer.start_file("a.txt", options).unwrap();
        std::io::Write::write_all(&mut writer, b"a").unwrap();
        writer.finish().unwrap();
    }

    let destination = temp_dir.path().join("hw8");
    std::fs::create_dir(&destination).unwrap();

    let extractor = extractor(DestinationPolicy::Merge);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    match &result.outcome {
        ExtractionOutcome::Merged { added, kept } => {
            assert_eq!(added, &vec![destination.join("a.txt")]);
            assert_eq!(*kept, 0);
        }
        other => panic!("expected Merged, got {other:?}"),
    }
    assert!(destination.join("build").is_dir());
    assert_no_staging_left(temp_dir.path());
}

#[tokio::test]
async fn merge_policy_without_destination_extracts_normally() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw6.zip");
    create_zip_archive(&archive, &[("a.txt", b"a")]);

    let extractor = extractor(DestinationPolicy::Merge);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(result.outcome, ExtractionOutcome::Extracted { .. }));
    assert_eq!(files_under(&result.destination), vec!["a.txt"]);
}

// ---------------------------------------------------------------------------
// Format dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unconfigured_rar_is_unsupported_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw7.rar");
    std::fs::write(&archive, b"Rar!\x1a\x07\x01\x00 not really a rar").unwrap();

    let filter = ArchiveFilter::new(&[".zip", ".tar.gz"], &[]);
    let extractor = Extractor::new(filter, DestinationPolicy::Skip, CancellationToken::new());
    let ready = ReadyArchive {
        path: archive.clone(),
        kind: Some(ArchiveKind::Rar),
        destination: temp_dir.path().join("hw7"),
    };

    let result = extractor.extract(ready).await;

    assert!(matches!(
        result.error(),
        Some(ExtractError::UnsupportedFormat { .. })
    ));
    assert_eq!(result.error().map(ExtractError::code), Some("unsupported_format"));
    assert_eq!(files_under(temp_dir.path()), vec!["hw7.rar"]);
}

// No crate in the dependency tree can write RAR archives (unrar only reads them), so
// there is no well-formed RAR fixture here. These cover the codec's error paths;
// well-formed RAR content goes through the same unrar calls.
#[tokio::test]
async fn corrupt_rar_fails_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw12.rar");
    std::fs::write(&archive, b"Rar!\x1a\x07\x01\x00 not really a rar").unwrap();

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(
        matches!(result.error(), Some(ExtractError::ExtractionFailed { .. })),
        "{:?}",
        result.outcome
    );
    assert!(!temp_dir.path().join("hw12").exists());
    assert_no_staging_left(temp_dir.path());

    assert!(RarCodec.list_entries(&archive).is_err());
    assert!(matches!(
        extractor.list_entries(&archive).await,
        Err(ExtractError::ExtractionFailed { .. })
    ));
}

#[test]
fn every_kind_has_a_matching_codec() {
    for kind in [
        ArchiveKind::Zip,
        ArchiveKind::Tar,
        ArchiveKind::TarGz,
        ArchiveKind::SevenZip,
        ArchiveKind::Rar,
    ] {
        assert_eq!(codec_for(kind).kind(), kind);
    }
}

#[tokio::test]
async fn disabled_kind_is_unsupported_even_behind_an_enabled_name() {
    let temp_dir = TempDir::new().unwrap();
    // RAR content saved under a .zip name, with RAR support turned off
    let archive = temp_dir.path().join("sneaky.zip");
    std::fs::write(&archive, b"Rar!\x1a\x07\x00 payload").unwrap();

    let filter = ArchiveFilter::new(&[".zip"], &[]);
    let extractor = Extractor::new(filter, DestinationPolicy::Skip, CancellationToken::new());
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(
        result.error(),
        Some(ExtractError::UnsupportedFormat { .. })
    ));
    assert_eq!(files_under(temp_dir.path()), vec!["sneaky.zip"]);
}

#[tokio::test]
async fn tar_xz_has_no_codec() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("lab.tar.xz");
    std::fs::write(&archive, b"\xfd7zXZ\x00 compressed bytes").unwrap();

    let filter = ArchiveFilter::new(&[".zip", ".tar.xz"], &[]);
    let extractor = Extractor::new(filter, DestinationPolicy::Skip, CancellationToken::new());
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(matches!(
        result.error(),
        Some(ExtractError::UnsupportedFormat { .. })
    ));
    assert!(!temp_dir.path().join("lab").exists());
}

#[test]
fn magic_bytes_identify_formats() {
    assert_eq!(kind_from_header(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
    assert_eq!(kind_from_header(b"PK\x05\x06"), Some(ArchiveKind::Zip));
    assert_eq!(
        kind_from_header(b"7z\xbc\xaf\x27\x1c\x00\x04"),
        Some(ArchiveKind::SevenZip)
    );
    assert_eq!(kind_from_header(b"Rar!\x1a\x07\x00"), Some(ArchiveKind::Rar));
    assert_eq!(kind_from_header(b"\x1f\x8b\x08\x00"), Some(ArchiveKind::TarGz));

    let mut tar_header = vec![0u8; 512];
    tar_header[257..262].copy_from_slice(b"ustar");
    assert_eq!(kind_from_header(&tar_header), Some(ArchiveKind::Tar));

    assert_eq!(kind_from_header(b""), None);
    assert_eq!(kind_from_header(b"\xfd7zXZ\x00"), None);
    assert_eq!(kind_from_header(b"plain text"), None);
}

// ---------------------------------------------------------------------------
// Entry path safety
// ---------------------------------------------------------------------------

#[test]
fn entry_paths_are_confined_to_destination() {
    assert_eq!(
        sanitize_entry_path(Path::new("a/b.txt")),
        Some(PathBuf::from("a/b.txt"))
    );
    assert_eq!(
        sanitize_entry_path(Path::new("./a.txt")),
        Some(PathBuf::from("a.txt"))
    );
    assert_eq!(
        sanitize_entry_path(Path::new("/etc/passwd")),
        Some(PathBuf::from("etc/passwd"))
    );
    assert_eq!(sanitize_entry_path(Path::new("../evil.txt")), None);
    assert_eq!(sanitize_entry_path(Path::new("a/../../evil.txt")), None);
    assert_eq!(sanitize_entry_path(Path::new("/")), None);
}

#[tokio::test]
async fn zip_traversal_entries_never_escape() {
    let temp_dir = TempDir::new().unwrap();
    let watch = temp_dir.path().join("watch");
    std::fs::create_dir(&watch).unwrap();
    let archive = watch.join("evil.zip");
    create_zip_archive(
        &archive,
        &[("ok.txt", b"fine"), ("../escaped.txt", b"gotcha")],
    );

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(result.success(), "unexpected outcome: {:?}", result.outcome);
    assert_eq!(files_under(&result.destination), vec!["ok.txt"]);
    assert!(!watch.join("escaped.txt").exists());
    assert!(!temp_dir.path().join("escaped.txt").exists());
}

#[tokio::test]
async fn tar_traversal_entries_never_escape() {
    let temp_dir = TempDir::new().unwrap();
    let watch = temp_dir.path().join("watch");
    std::fs::create_dir(&watch).unwrap();
    let archive = watch.join("evil.tar");

    let file = std::fs::File::create(&archive).unwrap();
    let mut builder = ::tar::Builder::new(file);
    append_tar_entries(&mut builder, &[("ok.txt", b"fine")]);

    // The builder refuses `..` in names, so write the raw header bytes
    let content: &[u8] = b"gotcha";
    let mut header = ::tar::Header::new_gnu();
    let name = b"../escaped.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(::tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, content).unwrap();
    builder.finish().unwrap();
    drop(builder);

    let extractor = extractor(DestinationPolicy::Skip);
    let result = extractor.extract(ready(&extractor, &archive)).await;

    assert!(result.success(), "unexpected outcome: {:?}", result.outcome);
    assert_eq!(files_under(&result.destination), vec!["ok.txt"]);
    assert!(!watch.join("escaped.txt").exists());
    assert!(!temp_dir.path().join("escaped.txt").exists());
}

// ---------------------------------------------------------------------------
// Concurrency guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_triggers_extract_exactly_once() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw8.zip");
    create_zip_archive(&archive, &[("a.txt", b"a")]);

    let extractor = extractor(DestinationPolicy::Skip);
    let request = ready(&extractor, &archive);

    let (first, second) = tokio::join!(
        extractor.extract(request.clone()),
        extractor.extract(request)
    );

    let outcomes = [&first.outcome, &second.outcome];
    let extracted = outcomes
        .iter()
        .filter(|o| matches!(o, ExtractionOutcome::Extracted { .. }))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, ExtractionOutcome::Duplicate))
        .count();
    assert_eq!((extracted, duplicates), (1, 1), "{outcomes:?}");
    assert_eq!(files_under(&first.destination), vec!["a.txt"]);
    assert!(extractor.locks().is_empty());
}

#[tokio::test]
async fn held_lock_makes_trigger_a_duplicate_without_side_effects() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("hw9.zip");
    create_zip_archive(&archive, &[("a.txt", b"a")]);

    let extractor = extractor(DestinationPolicy::Skip);
    let guard = extractor.locks().try_acquire(&archive).unwrap();

    let result = extractor.extract(ready(&extractor, &archive)).await;
    assert!(matches!(result.outcome, ExtractionOutcome::Duplicate));
    assert!(result.error().is_none());
    assert!(!result.destination.exists());

    drop(guard);
    let result = extractor.extract(ready(&extractor, &archive)).await;
    assert!(result.success());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_entries_reports_archive_contents_without_extracting() {
    let temp_dir = TempDir::new().unwrap();
    let zip_path = temp_dir.path().join("hw10.zip");
    create_zip_archive(&zip_path, &[("a.txt", b"a"), ("dir/b.txt", b"b")]);
    let tgz_path = temp_dir.path().join("hw11.tgz");
    create_tar_gz_archive(&tgz_path, &[("c.txt", b"c")]);

    let extractor = extractor(DestinationPolicy::Skip);

    let mut zip_entries = extractor.list_entries(&zip_path).await.unwrap();
    zip_entries.sort();
    assert_eq!(
        zip_entries,
        vec![PathBuf::from("a.txt"), PathBuf::from("dir/b.txt")]
    );
    assert_eq!(
        extractor.list_entries(&tgz_path).await.unwrap(),
        vec![PathBuf::from("c.txt")]
    );
    assert!(!temp_dir.path().join("hw10").exists());

    let unsupported = extractor.list_entries(&temp_dir.path().join("notes.txt")).await;
    assert!(matches!(
        unsupported,
        Err(ExtractError::UnsupportedFormat { .. })
    ));
}
