//! Art-URL classification and provider-specific thumbnail shrinking.

use std::path::PathBuf;

/// Classified form of the art-URL string a media player reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtReference {
    /// Empty or whitespace-only value; the player has no artwork.
    NoArt,
    /// `data:` URL carrying a base64 image payload.
    Embedded { payload: String },
    /// `file://` URL pointing at a local image, percent-decoded.
    LocalFile { path: PathBuf },
    /// `http://` or `https://` URL.
    Remote { url: String },
    /// Any other scheme, including non-base64 `data:` URLs.
    Unsupported,
}

pub fn classify(raw: &str) -> ArtReference {
    let raw = raw.trim();
    if raw.is_empty() {
        return ArtReference::NoArt;
    }
    if let Some(rest) = raw.strip_prefix("data:") {
        return match rest.split_once(";base64,") {
            Some((_, payload)) => ArtReference::Embedded {
                payload: payload.to_string(),
            },
            None => ArtReference::Unsupported,
        };
    }
    if let Some(encoded) = raw.strip_prefix("file://") {
        let path = match urlencoding::decode(encoded) {
            Ok(decoded) => PathBuf::from(decoded.as_ref()),
            Err(_) => PathBuf::from(encoded),
        };
        return ArtReference::LocalFile { path };
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return ArtReference::Remote {
            url: raw.to_string(),
        };
    }
    ArtReference::Unsupported
}

/// One provider-specific URL rewrite: a host predicate and a transform that
/// requests a bounded thumbnail size instead of the full-size artwork.
struct ProviderRule {
    matches: fn(&str) -> bool,
    rewrite: fn(&str) -> String,
}

const PROVIDER_RULES: [ProviderRule; 3] = [
    ProviderRule {
        matches: |url| url.contains("i.scdn.co"),
        rewrite: rewrite_dimension_segment,
    },
    ProviderRule {
        matches: |url| url.contains("googleusercontent.com") || url.contains("ytimg.com"),
        rewrite: rewrite_size_suffix,
    },
    ProviderRule {
        matches: |url| url.contains("lastfm"),
        rewrite: rewrite_scale_segment,
    },
];

/// Rewrites a remote art URL to request a small thumbnail where the provider
/// is recognized. Rules are checked in order, first match wins; unrecognized
/// hosts pass through unchanged.
pub fn shrink_remote_url(url: &str) -> String {
    for rule in &PROVIDER_RULES {
        if (rule.matches)(url) {
            return (rule.rewrite)(url);
        }
    }
    url.to_string()
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    let mut cursor = start;
    while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
        cursor += 1;
    }
    cursor
}

/// Replaces the first `/<W>x<H>/` path segment (Spotify sizing) with
/// `/64x64/`.
fn rewrite_dimension_segment(url: &str) -> String {
    let bytes = url.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'/' {
            index += 1;
            continue;
        }
        let width_end = digit_run_end(bytes, index + 1);
        if width_end == index + 1 || width_end >= bytes.len() || bytes[width_end] != b'x' {
            index += 1;
            continue;
        }
        let height_end = digit_run_end(bytes, width_end + 1);
        if height_end > width_end + 1 && height_end < bytes.len() && bytes[height_end] == b'/' {
            return format!("{}/64x64/{}", &url[..index], &url[height_end + 1..]);
        }
        index += 1;
    }
    url.to_string()
}

/// Replaces the first `/<N>s/` path segment (Last.fm sizing) with `/64s/`.
fn rewrite_scale_segment(url: &str) -> String {
    let bytes = url.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'/' {
            index += 1;
            continue;
        }
        let digits_end = digit_run_end(bytes, index + 1);
        if digits_end > index + 1
            && digits_end + 1 < bytes.len()
            && bytes[digits_end] == b's'
            && bytes[digits_end + 1] == b'/'
        {
            return format!("{}/64s/{}", &url[..index], &url[digits_end + 2..]);
        }
        index += 1;
    }
    url.to_string()
}

/// Rewrites Google/YouTube `=s<N>` size suffixes to `=s64`, appending one
/// when the URL has no size suffix at all.
fn rewrite_size_suffix(url: &str) -> String {
    if !url.contains("=s") {
        return format!("{url}=s64");
    }
    let bytes = url.as_bytes();
    let mut index = 0;
    while index + 1 < bytes.len() {
        if bytes[index] == b'=' && bytes[index + 1] == b's' {
            let digits_start = index + 2;
            let mut cursor = digits_start;
            while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
                cursor += 1;
            }
            if cursor > digits_start {
                return format!("{}=s64{}", &url[..index], &url[cursor..]);
            }
        }
        index += 1;
    }
    url.to_string()
}
