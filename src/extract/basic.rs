//! Basic extraction strategy (§4.5 step 3): last resort, always succeeds.
//!
//! Streams the file in fixed-size blocks — the same `BufReader::with_capacity`
//! + fixed-buffer loop the teacher uses for hashing (`engine/hashing.rs`) —
//! detects the encoding with `encoding_rs`/`chardetng`, keeps only
//! printable/whitespace code points, collapses runs of whitespace, and
//! truncates at `max_text_size`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chardetng::EncodingDetector;

use super::{ExtractError, Extracted, ExtractionStrategy, Metadata};

const READ_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_MAX_TEXT_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct BasicStrategy {
    max_text_size: usize,
}

impl Default for BasicStrategy {
    fn default() -> Self {
        Self {
            max_text_size: DEFAULT_MAX_TEXT_SIZE,
        }
    }
}

impl BasicStrategy {
    pub fn with_max_text_size(max_text_size: usize) -> Self {
        Self { max_text_size }
    }
}

impl ExtractionStrategy for BasicStrategy {
    /// Always applicable — this is the terminal strategy in the chain.
    fn can_extract(&self, _path: &Path) -> bool {
        true
    }

    fn extract(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let file = File::open(path).map_err(|e| ExtractError::Ordinary(e.to_string()))?;
        let raw = read_bounded(file, self.max_text_size).map_err(|e| ExtractError::Ordinary(e.to_string()))?;

        let mut detector = EncodingDetector::new();
        detector.feed(&raw, true);
        let encoding = detector.guess(None, true);
        let (decoded, _, _) = encoding.decode(&raw);

        let filtered = filter_and_collapse(&decoded);

        let mut metadata = Metadata::new();
        metadata.insert("extraction_method".to_string(), "basic".to_string());
        metadata.insert("detected_encoding".to_string(), encoding.name().to_string());

        Ok(Extracted {
            content: filtered,
            metadata,
        })
    }
}

fn read_bounded(mut file: File, max_bytes: usize) -> std::io::Result<Vec<u8>> {
    let mut reader = std::io::BufReader::with_capacity(READ_CHUNK_SIZE, &mut file);
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    let mut out = Vec::new();
    loop {
        if out.len() >= max_bytes {
            break;
        }
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        let take = n.min(max_bytes - out.len());
        out.extend_from_slice(&buffer[..take]);
    }
    Ok(out)
}

/// Keep printable/whitespace code points, collapse runs of whitespace to a
/// single space. Returns an empty string when nothing survives (binary
/// files), per spec §4.5.
fn filter_and_collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        let keep = ch.is_whitespace() || !ch.is_control();
        if !keep {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_text_unchanged_modulo_whitespace_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello   world\n\n\nfoo").unwrap();

        let strategy = BasicStrategy::default();
        assert!(strategy.can_extract(&file));
        let result = strategy.extract(&file).unwrap();
        assert_eq!(result.content, "hello world foo");
    }

    #[test]
    fn binary_content_with_no_printable_text_yields_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        std::fs::write(&file, [0u8, 1, 2, 3, 4, 5]).unwrap();

        let strategy = BasicStrategy::default();
        let result = strategy.extract(&file).unwrap();
        assert_eq!(result.content, "");
    }

    #[test]
    fn truncates_at_max_text_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a".repeat(1000)).unwrap();

        let strategy = BasicStrategy::with_max_text_size(10);
        let result = strategy.extract(&file).unwrap();
        assert!(result.content.len() <= 10);
    }
}
