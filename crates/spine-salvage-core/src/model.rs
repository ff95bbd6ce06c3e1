use crate::skeleton::SkeletonDoc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// One named sub-image packed inside a page.
///
/// The manifest format enforces no uniqueness; duplicate names are kept in
/// order, never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtlasRegion {
    pub name: String,
}

/// One virtual texture sheet: a name plus the regions packed into it, in
/// manifest order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasPage {
    pub name: String,
    pub regions: Vec<AtlasRegion>,
    /// Absolute URL of the packaged page texture, once resolved against the
    /// document base. `None` until correlation, or when the content-hash
    /// pattern is absent from the bundle.
    pub texture: Option<Url>,
}

impl AtlasPage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regions: Vec::new(),
            texture: None,
        }
    }
}

/// A parsed packing manifest plus its correlated skeleton document.
///
/// Created as a draft by the manifest parser, then mutated in place by the
/// correlator (skeleton attached, page textures filled) before being frozen
/// into a [`ResolvedAsset`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasContent {
    pub pages: Vec<AtlasPage>,
    /// Manifest-global scale. When several `scale:` lines occur the last one
    /// wins, a quirk of the source format preserved verbatim.
    pub scale: f32,
    /// The unescaped, tab-stripped manifest text; this is what persistence
    /// writes back out as the `.atlas` file.
    pub raw_text: String,
    pub skeleton: SkeletonDoc,
}

impl AtlasContent {
    /// Project name, by convention the name of the first page.
    pub fn project_name(&self) -> Option<&str> {
        self.pages.first().map(|p| p.name.as_str())
    }

    /// Total number of regions across all pages.
    pub fn region_count(&self) -> usize {
        self.pages.iter().map(|p| p.regions.len()).sum()
    }
}

/// A fully correlated asset: manifest content, the per-page texture URLs
/// that resolved, and the pages that did not. Partial resolution is a valid
/// outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub content: AtlasContent,
    /// Resolved texture URL per page name.
    pub textures: BTreeMap<String, Url>,
    /// Pages whose content-hash pattern was absent from the bundle, in page
    /// order.
    pub unresolved_pages: Vec<String>,
}

impl ResolvedAsset {
    pub fn project_name(&self) -> Option<&str> {
        self.content.project_name()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved_pages.is_empty()
    }
}

/// Raw bytes of one inline base64 image lifted from the bundle. The core
/// attaches no name; identity (e.g. content-hash filenames) is the caller's
/// concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Why a manifest candidate was dropped. Candidate failures are recorded,
/// not thrown; the run continues with the remaining candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipReason {
    /// The candidate text failed the structural manifest parse.
    MalformedManifest(String),
    /// No descriptor payload was found at any probe offset, its terminator
    /// was missing, or the delimited text was not valid JSON.
    MissingDescriptor(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MalformedManifest(msg) => write!(f, "malformed manifest: {msg}"),
            SkipReason::MissingDescriptor(msg) => write!(f, "missing descriptor: {msg}"),
        }
    }
}

/// One skipped manifest candidate, by discovery order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedCandidate {
    /// Ordinal of the candidate in discovery order.
    pub index: usize,
    pub reason: SkipReason,
}

/// Everything one correlation run produced, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct SalvageReport {
    pub assets: Vec<ResolvedAsset>,
    /// Inline base64 images harvested from the bundle, in scan order.
    pub inline_images: Vec<DecodedImage>,
    /// Candidates dropped by asset-fatal failures.
    pub skipped: Vec<SkippedCandidate>,
    /// True when a cancellation flag stopped the run early; `assets` holds
    /// whatever completed before the poll.
    pub cancelled: bool,
}

impl SalvageReport {
    /// Returns a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let unresolved: usize = self.assets.iter().map(|a| a.unresolved_pages.len()).sum();
        format!(
            "Assets: {}, Inline images: {}, Skipped candidates: {}, Unresolved pages: {}{}",
            self.assets.len(),
            self.inline_images.len(),
            self.skipped.len(),
            unresolved,
            if self.cancelled { ", cancelled" } else { "" },
        )
    }

    /// True when every candidate produced an asset and every page resolved.
    pub fn is_clean(&self) -> bool {
        !self.cancelled
            && self.skipped.is_empty()
            && self.assets.iter().all(|a| a.is_fully_resolved())
    }
}
