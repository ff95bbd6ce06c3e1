//! Core library for recovering Spine animation assets embedded in minified
//! web bundles.
//!
//! - Scanning: flatten the bundle, lift quoted string literals and inline
//!   base64 images out of the opaque text
//! - Parsing: the packing-manifest format (pages, regions, global scale)
//! - Correlation: pair each manifest with its adjacent skeleton descriptor
//!   via positional offsets and resolve page textures through content-hash
//!   patterns
//!
//! The bundle is treated as text, never as a program; the heuristics target
//! one producing tool's code-generation template and fail closed on shapes
//! it never emitted. Network fetch, persistence and converter invocation
//! live with callers.
//!
//! Quick example:
//! ```ignore
//! use spine_salvage_core::prelude::*;
//! use url::Url;
//! # fn main() -> anyhow::Result<()> {
//! let raw = std::fs::read_to_string("vendors.js")?;
//! let bundle = BundleText::flatten(&raw);
//! let base = Url::parse("https://example.com/event/index.html")?;
//! let report = correlate(&bundle, &base, &CorrelateConfig::default())?;
//! println!("{}", report.summary());
//! # Ok(()) }
//! ```

pub mod atlas;
pub mod correlate;
pub mod error;
pub mod model;
pub mod scanner;
pub mod skeleton;

pub use atlas::*;
pub use correlate::*;
pub use error::*;
pub use model::*;
pub use scanner::*;
pub use skeleton::*;

/// Convenience prelude for common types and functions.
/// Importing `spine_salvage_core::prelude::*` brings the primary APIs into
/// scope.
pub mod prelude {
    pub use crate::atlas::parse_atlas;
    pub use crate::correlate::{
        CancelFlag, CorrelateConfig, DEFAULT_IMAGES_PATH, DESCRIPTOR_PROBE_OFFSETS, correlate,
        is_manifest_candidate, resolve_against,
    };
    pub use crate::error::{Result, SalvageError};
    pub use crate::model::{
        AtlasContent, AtlasPage, AtlasRegion, DecodedImage, ResolvedAsset, SalvageReport,
        SkipReason, SkippedCandidate,
    };
    pub use crate::scanner::{BundleText, INLINE_IMAGE_PREFIX};
    pub use crate::skeleton::{SkeletonDoc, normalize_spine_version};
}
