use crate::error::{Result, SalvageError};
use crate::model::{AtlasContent, AtlasPage, AtlasRegion};
use crate::skeleton::SkeletonDoc;

/// Parses one packing-manifest text blob into pages, regions and the
/// manifest-global scale.
///
/// The text usually arrives as captured from a quoted bundle literal, so
/// control sequences are unescaped and literal tabs removed before the line
/// machine runs. Rules per non-empty line, in priority order:
/// 1. ends with `.png`: flush the open page, open a new one named by the
///    line minus that suffix;
/// 2. contains `:`: attribute line; only `scale:` is recognized (last write
///    wins), everything else is ignored for forward compatibility;
/// 3. otherwise: a region appended to the open page. A region with no open
///    page is a structural error for this manifest only.
pub fn parse_atlas(content: &str) -> Result<AtlasContent> {
    let text: String = unescape(content).replace('\t', "");
    let mut pages: Vec<AtlasPage> = Vec::new();
    let mut current: Option<AtlasPage> = None;
    let mut scale = 1.0f32;

    for line in text.lines().filter(|l| !l.is_empty()) {
        if let Some(name) = line.strip_suffix(".png") {
            if let Some(done) = current.take() {
                pages.push(done);
            }
            current = Some(AtlasPage::new(name));
            continue;
        }
        if line.contains(':') {
            if let Some(value) = line.strip_prefix("scale:") {
                scale = value.replace(' ', "").parse::<f32>().map_err(|err| {
                    SalvageError::MalformedManifest(format!("bad scale value {value:?}: {err}"))
                })?;
            }
            continue;
        }
        match current.as_mut() {
            Some(page) => page.regions.push(AtlasRegion {
                name: line.to_string(),
            }),
            None => {
                return Err(SalvageError::MalformedManifest(format!(
                    "region {line:?} before any page header"
                )));
            }
        }
    }
    if let Some(done) = current.take() {
        pages.push(done);
    }

    Ok(AtlasContent {
        pages,
        scale,
        raw_text: text,
        skeleton: SkeletonDoc::default(),
    })
}

/// Decodes backslash control sequences the way the bundle generator writes
/// them into quoted literals. Unrecognized escapes keep both the backslash
/// and the following character.
fn unescape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
