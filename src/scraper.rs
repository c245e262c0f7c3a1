//! Best-effort extraction of timing and size from compressor stdout logs.
//!
//! Nothing here fails: a missing log or marker becomes `None`, and the row is
//! still recorded.

use log::warn;
use std::path::Path;

const TIME_MARKER: &str = "[YC] time: ";
const SIZE_MARKER: &str = "[YC] size: ";

fn marker_value(line: &str, marker: &str) -> Option<Option<u64>> {
    let start = line.find(marker)? + marker.len();
    let token = line[start..].split_whitespace().next().unwrap_or("");
    match token.parse() {
        Ok(value) => Some(Some(value)),
        Err(_) => {
            warn!("unparsable value after `{}`: {:?}", marker.trim_end(), line);
            Some(None)
        }
    }
}

/// Elapsed milliseconds and encoded byte size. The last marker of each kind
/// wins.
pub fn parse_encode_log(text: &str) -> (Option<u64>, Option<u64>) {
    let mut time = None;
    let mut size = None;
    for line in text.lines() {
        if let Some(value) = marker_value(line, TIME_MARKER) {
            time = value;
        } else if let Some(value) = marker_value(line, SIZE_MARKER) {
            size = value;
        }
    }
    (time, size)
}

/// Elapsed milliseconds from the first time marker.
pub fn parse_decode_log(text: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| marker_value(line, TIME_MARKER))
        .flatten()
}

fn read_log(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("cannot read log {}: {}", path.display(), err);
            None
        }
    }
}

pub fn scrape_encode_log(path: &Path) -> (Option<u64>, Option<u64>) {
    read_log(path)
        .map(|text| parse_encode_log(&text))
        .unwrap_or((None, None))
}

pub fn scrape_decode_log(path: &Path) -> Option<u64> {
    read_log(path).and_then(|text| parse_decode_log(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_log() {
        assert_eq!(
            parse_encode_log("[YC] time: 1234\n[YC] size: 5678 bytes\n"),
            (Some(1234), Some(5678))
        );
        assert_eq!(parse_encode_log(""), (None, None));

        let noisy = "Encoder options:\n  -qp 16\n[YC] size: 42 bytes\nDone.\n";
        assert_eq!(parse_encode_log(noisy), (None, Some(42)));
    }

    #[test]
    fn test_decode_log() {
        assert_eq!(parse_decode_log("loading\n[YC] time: 87\n"), Some(87));
        assert_eq!(parse_decode_log("[YC] time: 87\n[YC] time: 99\n"), Some(87));
        assert_eq!(parse_decode_log("Failed loading the input mesh\n"), None);
    }

    #[test]
    fn test_unparsable_value() {
        assert_eq!(parse_encode_log("[YC] time: soon\n"), (None, None));
        assert_eq!(parse_decode_log("[YC] time: \n"), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("encode.log");
        assert_eq!(scrape_encode_log(&missing), (None, None));
        assert_eq!(scrape_decode_log(&missing), None);
    }

    #[test]
    fn test_scrape_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encode.log");
        std::fs::write(&path, "[YC] time: 12\n[YC] size: 3456 bytes\n").unwrap();
        assert_eq!(scrape_encode_log(&path), (Some(12), Some(3456)));
    }
}
