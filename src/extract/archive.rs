//! Archive extraction strategy (§4.5 step 1): zip, tar(+gz/bz2/xz), 7z, rar,
//! and single-stream gz/bz2/xz, recursively, with a bounded recursion depth.
//!
//! Grounded directly in
//! `original_source/apps/file-brain/services/extraction/archive_strategy.py`'s
//! `ArchiveExtractionStrategy`: try each archive format in turn
//! (`_try_zip`/`_try_tar`/`_try_7z`/`_try_rar`/`_try_gzip`/`_try_bz2`/`_try_xz`),
//! recurse into nested archives up to `max_depth`, run the inner strategy
//! chain (rich-document, basic) against every leaf member via a temp file,
//! and concatenate with a stable per-member header. Archive-format dispatch
//! idiom (one `try_*` per format, first success wins) follows
//! `other_examples/21f41fa0_fossas-foundation-libs__archive-src-lib.rs.rs`.

use std::io::{Cursor, Read};
use std::path::Path;

use log::{debug, warn};

use super::{ExtractError, Extracted, ExtractionStrategy, Metadata};

const DEFAULT_MAX_DEPTH: u32 = 5;
const DEFAULT_MAX_MEMBER_SIZE: usize = 100 * 1024 * 1024;

const COMPOUND_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tbz2", ".txz"];
const SINGLE_EXTENSIONS: &[&str] = &[
    "zip", "jar", "war", "ear", "apk", "tar", "tgz", "tbz2", "txz", "7z", "7za", "rar", "gz",
    "gzip", "bz2", "bzip2", "xz", "lzma",
];

pub fn is_likely_archive(path: &Path) -> bool {
    let name_lower = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if COMPOUND_EXTENSIONS.iter().any(|ext| name_lower.ends_with(ext)) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SINGLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

struct Member {
    name: String,
    content: String,
    metadata: Metadata,
}

pub struct ArchiveStrategy {
    inner_strategies: Vec<Box<dyn ExtractionStrategy>>,
    max_depth: u32,
    max_member_size: usize,
}

impl ArchiveStrategy {
    pub fn new(inner_strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self {
            inner_strategies,
            max_depth: DEFAULT_MAX_DEPTH,
            max_member_size: DEFAULT_MAX_MEMBER_SIZE,
        }
    }

    fn parse_recursively(&self, data: &[u8], name: &str, depth: u32, out: &mut Vec<Member>) {
        if depth >= self.max_depth {
            warn!("archive: max recursion depth reached at {name}");
            return;
        }

        match extract_members(data, name) {
            Some(members) => {
                for (member_name, member_data) in members {
                    if member_data.len() > self.max_member_size {
                        warn!("archive: skipping oversized member {member_name}");
                        continue;
                    }
                    if is_likely_archive(Path::new(&member_name)) {
                        if let Some(_nested) = extract_members(&member_data, &member_name) {
                            debug!("archive: nested archive found at {member_name}");
                            self.parse_recursively(&member_data, &member_name, depth + 1, out);
                            continue;
                        }
                    }
                    if let Some(member) = self.extract_with_inner_chain(&member_data, &member_name) {
                        out.push(member);
                    }
                }
            }
            None => {
                // Not a container format recognized by `extract_members` (e.g.
                // a single-stream gz/bz2/xz already decompressed above into
                // one synthetic member); nothing further to do here.
            }
        }
    }

    fn extract_with_inner_chain(&self, data: &[u8], name: &str) -> Option<Member> {
        if data.len() > self.max_member_size {
            warn!("archive: skipping oversized member {name}");
            return None;
        }

        let dir = tempfile::tempdir().ok()?;
        let suffix = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let tmp_path = dir.path().join(format!("member{suffix}"));
        std::fs::write(&tmp_path, data).ok()?;

        for strategy in &self.inner_strategies {
            if !strategy.can_extract(&tmp_path) {
                continue;
            }
            match strategy.extract(&tmp_path) {
                Ok(extracted) if !extracted.content.trim().is_empty() => {
                    return Some(Member {
                        name: name.to_string(),
                        content: extracted.content,
                        metadata: extracted.metadata,
                    });
                }
                Ok(_) => continue,
                Err(err) => {
                    debug!("archive: inner strategy failed for {name}: {err}");
                    continue;
                }
            }
        }
        None
    }
}

impl ExtractionStrategy for ArchiveStrategy {
    fn can_extract(&self, path: &Path) -> bool {
        is_likely_archive(path)
    }

    fn extract(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let data = std::fs::read(path).map_err(|e| ExtractError::Ordinary(e.to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive")
            .to_string();

        let mut members = Vec::new();
        self.parse_recursively(&data, &name, 0, &mut members);

        if members.is_empty() {
            return Err(ExtractError::Ordinary(format!(
                "no extractable content found in archive: {name}"
            )));
        }

        let content = concatenate(&members, &name);
        let mut metadata = Metadata::new();
        metadata.insert("extraction_method".to_string(), "archive_parsing".to_string());
        metadata.insert("is_archive".to_string(), "true".to_string());
        metadata.insert("files_extracted".to_string(), members.len().to_string());

        Ok(Extracted { content, metadata })
    }
}

fn concatenate(members: &[Member], archive_name: &str) -> String {
    let mut out = format!("# Archive: {archive_name}\n## Extracted Files ({} files)\n\n", members.len());
    for (i, member) in members.iter().enumerate() {
        out.push_str(&format!("### File {}: {}\n\n", i + 1, member.name));
        if member.content.trim().is_empty() {
            out.push_str("*(No extractable content)*\n");
        } else {
            out.push_str(&member.content);
            out.push('\n');
        }
        out.push_str("\n---\n\n");
    }
    out
}

/// Try each archive format in turn; first success wins. Returns `None` if
/// `data` doesn't match any recognized archive format.
fn extract_members(data: &[u8], name: &str) -> Option<Vec<(String, Vec<u8>)>> {
    try_zip(data)
        .or_else(|| try_tar(data))
        .or_else(|| try_7z(data))
        .or_else(|| try_rar(data, name))
        .or_else(|| try_gzip(data))
        .or_else(|| try_bz2(data))
        .or_else(|| try_xz(data))
}

fn try_zip(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).ok()?;
    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).ok()?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).ok()?;
        files.push((name, buf));
    }
    if files.is_empty() { None } else { Some(files) }
}

fn try_tar(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(Cursor::new(data));
    let mut files = Vec::new();
    for entry in archive.entries().ok()? {
        let mut entry = entry.ok()?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().ok()?.to_string_lossy().to_string();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).ok()?;
        files.push((name, buf));
    }
    if files.is_empty() { None } else { Some(files) }
}

fn try_7z(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    let cursor = Cursor::new(data);
    let len = data.len() as u64;
    let mut reader = sevenz_rust::SevenZReader::new(cursor, len, sevenz_rust::Password::empty()).ok()?;
    reader
        .for_each_entries(|entry, reader| {
            if entry.is_directory() {
                return Ok(true);
            }
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            files.push((entry.name().to_string(), buf));
            Ok(true)
        })
        .ok()?;
    if files.is_empty() { None } else { Some(files) }
}

/// `unrar` wraps the proprietary `libunrar` and only operates on files on
/// disk, so `data` is spilled to a temp file first (the original's own
/// `_try_rar` goes through a similar in-memory `io.BytesIO` shim that the
/// underlying C library does not need; here the constraint is the other
/// way around, hence the temp file).
fn try_rar(data: &[u8], name: &str) -> Option<Vec<(String, Vec<u8>)>> {
    if !name.to_lowercase().ends_with(".rar") {
        return None;
    }
    let dir = tempfile::tempdir().ok()?;
    let archive_path = dir.path().join("archive.rar");
    std::fs::write(&archive_path, data).ok()?;
    let extract_dir = dir.path().join("out");
    std::fs::create_dir_all(&extract_dir).ok()?;

    let mut archive = unrar::Archive::new(&archive_path).open_for_processing().ok()?;
    let mut files = Vec::new();
    while let Some(header) = archive.read_header().ok()? {
        let is_file = !header.entry().is_directory();
        archive = if is_file {
            header.extract_with_base(&extract_dir).ok()?
        } else {
            header.skip().ok()?
        };
    }
    for entry in walkdir::WalkDir::new(&extract_dir).into_iter().flatten() {
        if entry.file_type().is_file() {
            if let Ok(content) = std::fs::read(entry.path()) {
                let rel = entry
                    .path()
                    .strip_prefix(&extract_dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();
                files.push((rel, content));
            }
        }
    }
    if files.is_empty() { None } else { Some(files) }
}

fn try_gzip(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    use flate2::read::GzDecoder;
    let mut decoder = GzDecoder::new(Cursor::new(data));
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf).ok()?;
    Some(vec![("decompressed".to_string(), buf)])
}

fn try_bz2(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    use bzip2::read::BzDecoder;
    let mut decoder = BzDecoder::new(Cursor::new(data));
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf).ok()?;
    Some(vec![("decompressed".to_string(), buf)])
}

fn try_xz(data: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    use xz2::read::XzDecoder;
    let mut decoder = XzDecoder::new(Cursor::new(data));
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf).ok()?;
    Some(vec![("decompressed".to_string(), buf)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::basic::BasicStrategy;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options: zip::write::FileOptions =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                std::io::Write::write_all(&mut writer, content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn recognizes_archive_extensions() {
        assert!(is_likely_archive(Path::new("a.zip")));
        assert!(is_likely_archive(Path::new("a.tar.gz")));
        assert!(is_likely_archive(Path::new("a.7z")));
        assert!(!is_likely_archive(Path::new("a.txt")));
    }

    #[test]
    fn extracts_plain_text_members_from_a_zip() {
        let zip_bytes = make_zip(&[("a.txt", b"hello from a"), ("b.txt", b"hello from b")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, &zip_bytes).unwrap();

        let strategy = ArchiveStrategy::new(vec![Box::new(BasicStrategy::default())]);
        assert!(strategy.can_extract(&path));
        let result = strategy.extract(&path).unwrap();
        assert!(result.content.contains("hello from a"));
        assert!(result.content.contains("hello from b"));
        assert_eq!(result.metadata.get("files_extracted").unwrap(), "2");
    }

    #[test]
    fn empty_zip_is_an_ordinary_failure() {
        let zip_bytes = make_zip(&[]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.zip");
        std::fs::write(&path, &zip_bytes).unwrap();

        let strategy = ArchiveStrategy::new(vec![Box::new(BasicStrategy::default())]);
        let err = strategy.extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Ordinary(_)));
    }
}
