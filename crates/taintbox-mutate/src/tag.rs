//! Image tag derivation.
//!
//! `tag = [prefix-]suite-case_id-carrier-timestamp`, sanitized to the tag
//! grammar `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`. Whenever sanitization or
//! shortening changes the text, an 8-hex SHA-256 digest of the original
//! is appended so that distinct inputs keep distinct tags.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use taintbox_common::constants::MAX_TAG_LENGTH;
use taintbox_common::types::{Carrier, sanitize_component};

const DIGEST_CHARS: usize = 8;

/// Inputs of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRequest<'a> {
    /// Optional leading component; blank means none.
    pub prefix: &'a str,
    /// Suite name.
    pub suite: &'a str,
    /// Case id.
    pub case_id: &'a str,
    /// Carrier of the case.
    pub carrier: Carrier,
    /// Formatted UTC timestamp of the build attempt.
    pub timestamp: &'a str,
}

/// A generated tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    /// Grammar-valid tag text.
    pub value: String,
    /// Whether characters had to be substituted or the tag shortened.
    pub sanitized: bool,
}

/// Formats `at` with a `strftime` pattern.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>, format: &str) -> String {
    at.format(format).to_string()
}

/// Derives the tag for one build attempt.
#[must_use]
pub fn generate_tag(request: &TagRequest<'_>) -> ImageTag {
    let prefix = request.prefix.trim();
    let mut parts = Vec::with_capacity(5);
    if !prefix.is_empty() {
        parts.push(prefix);
    }
    parts.extend([
        request.suite,
        request.case_id,
        request.carrier.as_str(),
        request.timestamp,
    ]);
    let raw = parts.join("-");

    let mut value = sanitize_component(&raw);
    if value.starts_with(['.', '-']) {
        value.replace_range(..1, "_");
    }
    let changed = value != raw;
    if !changed && value.len() <= MAX_TAG_LENGTH {
        return ImageTag {
            value,
            sanitized: false,
        };
    }

    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    value.truncate(MAX_TAG_LENGTH - DIGEST_CHARS - 1);
    value.push('-');
    value.push_str(&digest[..DIGEST_CHARS]);
    tracing::warn!(raw = %raw, tag = %value, "image tag required sanitization");
    ImageTag {
        value,
        sanitized: true,
    }
}

/// Checks `tag` against the image tag grammar.
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= MAX_TAG_LENGTH
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn request<'a>(case_id: &'a str, carrier: Carrier) -> TagRequest<'a> {
        TagRequest {
            prefix: "",
            suite: "suite",
            case_id,
            carrier,
            timestamp: "20261016120000",
        }
    }

    #[test]
    fn plain_inputs_produce_expected_tag() {
        let tag = generate_tag(&request("c1", Carrier::Label));
        assert_eq!(tag.value, "suite-c1-label-20261016120000");
        assert!(!tag.sanitized);
        assert!(is_valid_tag(&tag.value));
    }

    #[test]
    fn prefix_is_prepended() {
        let tag = generate_tag(&TagRequest {
            prefix: "nightly",
            ..request("c1", Carrier::Env)
        });
        assert_eq!(tag.value, "nightly-suite-c1-env-20261016120000");
    }

    #[test]
    fn generation_is_deterministic() {
        let req = request("c/1 x", Carrier::File);
        assert_eq!(generate_tag(&req), generate_tag(&req));
    }

    #[test]
    fn forbidden_chars_are_replaced_and_flagged() {
        let tag = generate_tag(&request("ns/case:1 two", Carrier::Label));
        assert!(tag.sanitized);
        assert!(is_valid_tag(&tag.value));
        assert!(tag.value.starts_with("suite-ns-case-1-two-label-20261016120000-"));
    }

    #[test]
    fn ids_colliding_after_substitution_keep_distinct_tags() {
        let a = generate_tag(&request("c/1", Carrier::Label));
        let b = generate_tag(&request("c:1", Carrier::Label));
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn distinct_carriers_keep_distinct_tags() {
        let a = generate_tag(&request("c1", Carrier::Label));
        let b = generate_tag(&request("c1", Carrier::Env));
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn leading_separator_is_replaced() {
        let tag = generate_tag(&TagRequest {
            prefix: "-x",
            ..request("c1", Carrier::Label)
        });
        assert!(tag.value.starts_with("_x-suite"));
        assert!(is_valid_tag(&tag.value));
    }

    #[test]
    fn overlong_tag_is_shortened_with_digest() {
        let long_id = "a".repeat(200);
        let tag = generate_tag(&request(&long_id, Carrier::Label));
        assert_eq!(tag.value.len(), MAX_TAG_LENGTH);
        assert!(tag.sanitized);
        assert!(is_valid_tag(&tag.value));
    }

    #[test]
    fn timestamp_with_colons_is_sanitized() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().expect("valid date");
        let ts = format_timestamp(at, "%Y-%m-%dT%H:%M:%S");
        assert_eq!(ts, "2026-10-16T12:00:00");
        let tag = generate_tag(&TagRequest {
            timestamp: &ts,
            ..request("c1", Carrier::Label)
        });
        assert!(is_valid_tag(&tag.value));
    }

    #[test]
    fn is_valid_tag_rejects_bad_input() {
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag(".hidden"));
        assert!(!is_valid_tag("a/b"));
        assert!(!is_valid_tag(&"a".repeat(129)));
    }
}
