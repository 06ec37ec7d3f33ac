//! Byte-range parsing for `Range: bytes=...` headers, used by the Streaming
//! Server (C8) when serving manifests and segments. Pure logic, no I/O: the
//! caller resolves a content length first, then asks this module whether
//! the header is satisfiable against it.

use std::path::Path;

/// An inclusive byte range resolved against a known content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// The requested range cannot be satisfied against the resource's length;
/// the caller should reply `416 Range Not Satisfiable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeUnsatisfiable;

/// Parses a `Range: bytes=start-end` header value against `total_len`.
///
/// Returns `Ok(None)` when the header isn't a single-range `bytes=` spec
/// this server understands (multi-range requests fall in here too) — the
/// caller should fall back to serving the full body. Returns
/// `Ok(Some(range))` for a satisfiable range, `Err(RangeUnsatisfiable)`
/// otherwise.
pub fn parse_range(header_value: &str, total_len: u64) -> Result<Option<ByteRange>, RangeUnsatisfiable> {
    let Some(spec) = header_value.strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return Err(RangeUnsatisfiable);
    };

    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().map_err(|_| RangeUnsatisfiable)?;
        if suffix_len == 0 || total_len == 0 {
            return Err(RangeUnsatisfiable);
        }
        let len = suffix_len.min(total_len);
        return Ok(Some(ByteRange { start: total_len - len, end: total_len - 1 }));
    }

    let start: u64 = start_str.parse().map_err(|_| RangeUnsatisfiable)?;
    if total_len == 0 || start >= total_len {
        return Err(RangeUnsatisfiable);
    }

    let end = if end_str.is_empty() {
        total_len - 1
    } else {
        let parsed: u64 = end_str.parse().map_err(|_| RangeUnsatisfiable)?;
        parsed.min(total_len - 1)
    };

    if end < start {
        return Err(RangeUnsatisfiable);
    }

    Ok(Some(ByteRange { start, end }))
}

/// Content-Type for a path served out of a content directory, derived from
/// the output container per §6.3.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "mp4" | "m4s" | "m4a" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "ts" => "video/mp2t",
        "mpd" => "application/dash+xml",
        "m3u8" => "application/vnd.apple.mpegurl",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_header_falls_back_to_full_body() {
        assert_eq!(parse_range("nonsense", 100), Ok(None));
    }

    #[test]
    fn multi_range_is_unrecognized() {
        assert_eq!(parse_range("bytes=0-10,20-30", 100), Ok(None));
    }

    #[test]
    fn basic_range_is_satisfied() {
        let range = parse_range("bytes=500000-999999", 1_000_000).unwrap().unwrap();
        assert_eq!(range.start, 500_000);
        assert_eq!(range.end, 999_999);
        assert_eq!(range.len(), 500_000);
    }

    #[test]
    fn open_ended_range_reaches_end_of_content() {
        let range = parse_range("bytes=900-", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 900, end: 999 });
    }

    #[test]
    fn suffix_range_takes_last_n_bytes() {
        let range = parse_range("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 900, end: 999 });
    }

    #[test]
    fn suffix_range_longer_than_content_clamps_to_whole_body() {
        let range = parse_range("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 999 });
    }

    #[test]
    fn end_beyond_content_length_clamps() {
        let range = parse_range("bytes=0-999999", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 999 });
    }

    #[test]
    fn start_at_or_past_content_length_is_unsatisfiable() {
        assert_eq!(parse_range("bytes=1000-", 1000), Err(RangeUnsatisfiable));
        assert_eq!(parse_range("bytes=1000-1005", 1000), Err(RangeUnsatisfiable));
    }

    #[test]
    fn inverted_range_is_unsatisfiable() {
        assert_eq!(parse_range("bytes=500-100", 1000), Err(RangeUnsatisfiable));
    }

    #[test]
    fn empty_content_is_never_satisfiable() {
        assert_eq!(parse_range("bytes=0-10", 0), Err(RangeUnsatisfiable));
    }

    #[test]
    fn content_type_matches_container_conventions() {
        assert_eq!(content_type_for(Path::new("out.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("seg-0.m4s")), "video/mp4");
        assert_eq!(content_type_for(Path::new("manifest.mpd")), "application/dash+xml");
        assert_eq!(content_type_for(Path::new("master.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for(Path::new("seg-0.ts")), "video/mp2t");
        assert_eq!(content_type_for(Path::new("clip.webm")), "video/webm");
        assert_eq!(content_type_for(Path::new("clip.mkv")), "video/x-matroska");
    }
}
