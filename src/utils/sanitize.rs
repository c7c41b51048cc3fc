//! Model output sanitization for logs and retry prompts.
//!
//! Strips base64 data URIs and long hex blobs, then truncates oversized text
//! to a head/tail excerpt. Used when echoing a rejected model response or an
//! error body, so a runaway answer cannot flood the log or the next prompt.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum excerpt size in bytes.
pub const DEFAULT_MAX_EXCERPT_BYTES: usize = 2_048;

/// Minimum length of a contiguous hex string to be stripped.
const MIN_HEX_BLOB_LEN: usize = 200;
const TAIL_SHARE_DIVISOR: usize = 4;

static BASE64_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data:[a-zA-Z0-9/+\-\.]+;base64,[A-Za-z0-9+/=]+").unwrap());

static HEX_BLOB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"[0-9a-fA-F]{{{},}}", MIN_HEX_BLOB_LEN)).unwrap());

/// Produce a bounded, blob-free excerpt of `text`.
///
/// 1. Replace `data:...;base64,...` URIs with a placeholder.
/// 2. Replace hex blobs (>= 200 hex chars) with a placeholder.
/// 3. Keep a head and a tail of the result when it is longer than `max_bytes`.
pub fn excerpt(text: &str, max_bytes: usize) -> String {
    let mut out = BASE64_URI_RE
        .replace_all(text, |caps: &regex::Captures| {
            format!("[base64 data removed, {} bytes]", caps[0].len())
        })
        .into_owned();

    out = HEX_BLOB_RE
        .replace_all(&out, |caps: &regex::Captures| {
            format!("[hex data removed, {} chars]", caps[0].len())
        })
        .into_owned();

    if out.len() <= max_bytes {
        return out;
    }

    let total = out.len();
    let tail_budget = max_bytes / TAIL_SHARE_DIVISOR;
    let head = take_prefix_charsafe(&out, max_bytes - tail_budget);
    let tail = take_suffix_charsafe(&out, tail_budget);
    let truncated = total.saturating_sub(head.len() + tail.len());
    if tail.is_empty() {
        format!("{head}...[truncated {truncated} bytes]")
    } else {
        format!("{head}...[truncated {truncated} bytes]...{tail}")
    }
}

fn take_prefix_charsafe(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn take_suffix_charsafe(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        let input = "```json\n{\"entries\": []}\n```";
        assert_eq!(excerpt(input, DEFAULT_MAX_EXCERPT_BYTES), input);
    }

    #[test]
    fn test_strips_base64_data_uri() {
        let b64 = "A".repeat(500);
        let input = format!("before data:image/png;base64,{b64} after");
        let result = excerpt(&input, DEFAULT_MAX_EXCERPT_BYTES);
        assert!(!result.contains(&b64));
        assert!(result.contains("[base64 data removed,"));
        assert!(result.ends_with(" after"));
    }

    #[test]
    fn test_strips_long_hex_blob() {
        let hex = "ab".repeat(150);
        let result = excerpt(&format!("digest {hex}"), DEFAULT_MAX_EXCERPT_BYTES);
        assert_eq!(result, "digest [hex data removed, 300 chars]");
    }

    #[test]
    fn test_truncates_keeping_head_and_tail() {
        let input = format!("HEAD{}TAIL", "x".repeat(5_000));
        let result = excerpt(&input, 400);
        assert!(result.starts_with("HEAD"));
        assert!(result.ends_with("TAIL"));
        assert!(result.contains("[truncated "));
        assert!(result.len() < 500);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let input = "é".repeat(1_000);
        let result = excerpt(&input, 101);
        assert!(result.contains("[truncated "));
        // Would have panicked on a split code point.
        assert!(result.starts_with('é'));
    }

    #[test]
    fn test_tiny_budget_has_no_tail() {
        let result = excerpt("abcdefghij", 3);
        assert_eq!(result, "abc...[truncated 7 bytes]");
    }
}
