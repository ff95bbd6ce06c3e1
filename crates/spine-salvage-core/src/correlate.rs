use crate::atlas::parse_atlas;
use crate::error::{Result, SalvageError};
use crate::model::{ResolvedAsset, SalvageReport, SkipReason, SkippedCandidate};
use crate::scanner::BundleText;
use crate::skeleton::SkeletonDoc;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument, warn};
use url::Url;

/// Character counts between the end of a manifest literal and the start of
/// its skeleton-descriptor literal in the generated call expression. Tied to
/// the producing tool's code-generation template, which has shipped two
/// shapes so far; both are probed per candidate, newest first. If the
/// upstream bundler changes its call-site shape again, the new value must be
/// re-derived from a fresh captured bundle; it cannot be inferred from the
/// data alone.
pub const DESCRIPTOR_PROBE_OFFSETS: [usize; 2] = [37, 36];

/// Relative marker written into every skeleton document before hand-off.
/// The persistence layer owns the real policy and may overwrite it.
pub const DEFAULT_IMAGES_PATH: &str = "./images";

/// Cooperative cancellation, polled between candidates. Cloning shares the
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs for one correlation run.
#[derive(Debug, Clone)]
pub struct CorrelateConfig {
    /// Descriptor offsets to probe, most likely template variant first.
    pub descriptor_offsets: Vec<usize>,
    /// Value written into each skeleton's image-path field.
    pub images_path: String,
    /// Optional cancellation flag, polled between candidates.
    pub cancel: Option<CancelFlag>,
}

impl Default for CorrelateConfig {
    fn default() -> Self {
        Self {
            descriptor_offsets: DESCRIPTOR_PROBE_OFFSETS.to_vec(),
            images_path: DEFAULT_IMAGES_PATH.to_string(),
            cancel: None,
        }
    }
}

/// The triple condition separating embedded manifest payloads from ordinary
/// path references elsewhere in the bundle. Heuristic: it can both over- and
/// under-match on bundle shapes the producing template never emitted.
pub fn is_manifest_candidate(literal: &str) -> bool {
    literal.contains(".png") && !literal.starts_with("http") && !literal.starts_with("images/")
}

/// Resolves `reference` against the document base URL: absolute references
/// pass through, root-relative paths resolve against scheme+host, and plain
/// relative paths resolve against the base with its filename dropped.
pub fn resolve_against(base: &Url, reference: &str) -> std::result::Result<Url, url::ParseError> {
    base.join(reference)
}

/// Walks every manifest candidate in the flattened bundle and assembles the
/// recovered assets.
///
/// Candidates are processed sequentially in discovery order so diagnostics
/// are reproducible. Asset-fatal failures (malformed manifest, descriptor
/// not located) are recorded on the report and skipped; only an empty
/// candidate set is an error, so callers can tell "nothing embedded here"
/// from a quiet success. Inline images are harvested in the same pass.
#[instrument(skip_all)]
pub fn correlate(
    bundle: &BundleText,
    base_url: &Url,
    cfg: &CorrelateConfig,
) -> Result<SalvageReport> {
    let text = bundle.as_str();
    let candidates: Vec<&str> = bundle
        .string_literals()
        .into_iter()
        .filter(|lit| is_manifest_candidate(lit))
        .collect();
    if candidates.is_empty() {
        return Err(SalvageError::NoCandidates);
    }
    debug!(
        bundle_bytes = bundle.len(),
        candidates = candidates.len(),
        "selected manifest candidates"
    );

    let mut assets: Vec<ResolvedAsset> = Vec::new();
    let mut skipped: Vec<SkippedCandidate> = Vec::new();
    let mut cancelled = false;

    for (index, literal) in candidates.iter().enumerate() {
        if cfg.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            cancelled = true;
            break;
        }

        let mut draft = match parse_atlas(literal) {
            Ok(draft) if draft.pages.is_empty() => {
                skip(
                    &mut skipped,
                    index,
                    SkipReason::MalformedManifest("manifest has no pages".to_string()),
                );
                continue;
            }
            Ok(draft) => draft,
            Err(err) => {
                skip(
                    &mut skipped,
                    index,
                    SkipReason::MalformedManifest(err.to_string()),
                );
                continue;
            }
        };

        match locate_descriptor(text, literal, &cfg.descriptor_offsets) {
            Ok(doc) => draft.skeleton = doc,
            Err(msg) => {
                skip(&mut skipped, index, SkipReason::MissingDescriptor(msg));
                continue;
            }
        }
        draft.skeleton.set_images_path(&cfg.images_path);

        let project = draft.project_name().unwrap_or_default().to_string();
        let mut textures: BTreeMap<String, Url> = BTreeMap::new();
        let mut unresolved: Vec<String> = Vec::new();
        for page in draft.pages.iter_mut() {
            match resolve_page_texture(text, &page.name, base_url) {
                Some(url) => {
                    textures.insert(page.name.clone(), url.clone());
                    page.texture = Some(url);
                }
                None => {
                    warn!(
                        project = %project,
                        page = %page.name,
                        "page texture hash not found in bundle"
                    );
                    unresolved.push(page.name.clone());
                }
            }
        }

        assets.push(ResolvedAsset {
            content: draft,
            textures,
            unresolved_pages: unresolved,
        });
    }

    Ok(SalvageReport {
        assets,
        inline_images: bundle.inline_images(),
        skipped,
        cancelled,
    })
}

fn skip(skipped: &mut Vec<SkippedCandidate>, index: usize, reason: SkipReason) {
    warn!(candidate = index, %reason, "skipping manifest candidate");
    skipped.push(SkippedCandidate { index, reason });
}

/// Finds the skeleton descriptor adjacent to `literal`.
///
/// The descriptor starts `offset` characters past the end of the manifest
/// literal's first occurrence; the character just before that start is the
/// descriptor literal's opening quote and doubles as its terminator. A probe
/// counts only when that character is a quote and the delimited slice parses
/// as JSON, which is what makes the template variant detectable per
/// candidate.
fn locate_descriptor(
    text: &str,
    literal: &str,
    offsets: &[usize],
) -> std::result::Result<SkeletonDoc, String> {
    let Some(pos) = text.find(literal) else {
        return Err("manifest literal not found in bundle text".to_string());
    };
    let base = pos + literal.len();
    for &offset in offsets {
        let start = base + offset;
        if start == 0 || start > text.len() || !text.is_char_boundary(start) {
            continue;
        }
        let Some(quote) = text[..start].chars().next_back() else {
            continue;
        };
        if quote != '\'' && quote != '"' {
            continue;
        }
        let rest = &text[start..];
        let Some(end) = rest.find(quote) else {
            // Terminator never occurs again before end-of-text.
            continue;
        };
        match SkeletonDoc::from_json(&rest[..end]) {
            Ok(doc) => return Ok(doc),
            Err(err) => {
                debug!(offset, error = %err, "descriptor probe did not parse as JSON");
            }
        }
    }
    Err(format!("no descriptor payload at probe offsets {offsets:?}"))
}

/// Recovers the content-hash for `page_name` and builds its absolute texture
/// URL. The packaged filename carries a doubled period before the extension
/// (an artifact of the producing template), and the pattern keeps it
/// verbatim.
fn resolve_page_texture(text: &str, page_name: &str, base_url: &Url) -> Option<Url> {
    let pattern = format!(r"images/{}\.(.*?)\.\.png", regex::escape(page_name));
    let re = Regex::new(&pattern).ok()?;
    let hash = re.captures(text)?.get(1)?.as_str();
    let reference = format!("images/{page_name}.{hash}..png");
    resolve_against(base_url, &reference).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_filter_triple_condition() {
        assert!(is_manifest_candidate("hero.png\\nregion"));
        assert!(!is_manifest_candidate("http://cdn/hero.png"));
        assert!(!is_manifest_candidate("https://cdn/hero.png"));
        assert!(!is_manifest_candidate("images/hero.png"));
        assert!(!is_manifest_candidate("no textures here"));
        // the extension may occur anywhere, not only at the end
        assert!(is_manifest_candidate("a.png\\nb.png\\nregion"));
    }

    #[test]
    fn relative_reference_resolves_against_base_directory() {
        let base = Url::parse("https://h/p/index.html").expect("base");
        let url = resolve_against(&base, "images/pageA.deadbeef..png").expect("join");
        assert_eq!(url.as_str(), "https://h/p/images/pageA.deadbeef..png");
    }

    #[test]
    fn root_relative_reference_resolves_against_host() {
        let base = Url::parse("https://h/p/index.html").expect("base");
        let url = resolve_against(&base, "/assets/x.png").expect("join");
        assert_eq!(url.as_str(), "https://h/assets/x.png");
    }

    #[test]
    fn absolute_reference_passes_through() {
        let base = Url::parse("https://h/p/index.html").expect("base");
        let url = resolve_against(&base, "http://other.example/y.png").expect("join");
        assert_eq!(url.as_str(), "http://other.example/y.png");
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
