use crate::model::DecodedImage;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Marker that opens an inline PNG payload inside the bundle.
pub const INLINE_IMAGE_PREFIX: &str = "data:image/png;base64,";

// Shortest-match pair of identical quote characters, single or double.
static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*?)"|'(.*?)'"#).expect("literal pattern is valid"));

/// The flattened bundle content: first line dropped (generated bundles open
/// with a comment line that never carries payloads), remaining lines joined
/// with no separators so offsets stay continuous. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleText(String);

impl BundleText {
    /// Flattens raw bundle text as fetched.
    pub fn flatten(raw: &str) -> Self {
        Self(raw.lines().skip(1).collect())
    }

    /// Wraps text that is already a single flattened line (saved bundles,
    /// fixtures).
    pub fn from_flattened(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every quoted string literal in scan order: shortest match between a
    /// pair of identical quote characters, either kind, with no escape or
    /// nesting awareness. A literal containing an unescaped copy of its own
    /// delimiter terminates early; downstream offset arithmetic depends on
    /// exactly these boundaries.
    pub fn string_literals(&self) -> Vec<&str> {
        STRING_LITERAL_RE
            .captures_iter(&self.0)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .collect()
    }

    /// Decodes every inline PNG payload, in scan order.
    ///
    /// The terminating delimiter for each occurrence is whatever character
    /// immediately precedes the prefix (the quote that opened the literal in
    /// generated bundles). The scan resumes one character past the *start*
    /// of the current match, so overlapping occurrences re-trigger; kept
    /// bug-for-bug with the producing tool's observed shapes and pinned by
    /// fixtures.
    pub fn inline_images(&self) -> Vec<DecodedImage> {
        let text = self.0.as_str();
        let mut images = Vec::new();
        let mut from = 0;
        while let Some(rel) = text[from..].find(INLINE_IMAGE_PREFIX) {
            let idx = from + rel;
            from = idx + 1;
            let Some(delim) = text[..idx].chars().next_back() else {
                // A prefix at offset zero has no delimiter to pair with.
                continue;
            };
            let rest = &text[idx..];
            let end = rest.find(delim).unwrap_or(rest.len());
            let payload = rest[..end].replace(INLINE_IMAGE_PREFIX, "");
            match STANDARD.decode(payload.as_bytes()) {
                Ok(bytes) => images.push(DecodedImage::new(bytes)),
                Err(err) => {
                    warn!(offset = idx, error = %err, "skipping undecodable inline image payload");
                }
            }
        }
        images
    }
}
