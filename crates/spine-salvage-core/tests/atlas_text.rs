use spine_salvage_core::prelude::*;

#[test]
fn page_count_matches_texture_header_lines() {
    let atlas = parse_atlas("a.png\nr1\nb.png\nr2\nr3\nc.png").expect("parse");
    assert_eq!(atlas.pages.len(), 3);
    let names: Vec<&str> = atlas.pages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    assert_eq!(atlas.project_name(), Some("a"));
}

#[test]
fn region_order_and_duplicates_preserved() {
    let atlas = parse_atlas("sheet.png\nwalk\nwalk\nidle\nwalk").expect("parse");
    assert_eq!(atlas.pages.len(), 1);
    let regions: Vec<&str> = atlas.pages[0]
        .regions
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(regions, ["walk", "walk", "idle", "walk"]);
    assert_eq!(atlas.region_count(), 4);
}

#[test]
fn last_scale_line_wins() {
    let atlas = parse_atlas("a.png\nscale: 1.0\nr1\nb.png\nscale: 0.5\nr2").expect("parse");
    assert_eq!(atlas.scale, 0.5);
}

#[test]
fn scale_defaults_to_one() {
    let atlas = parse_atlas("a.png\nr1").expect("parse");
    assert_eq!(atlas.scale, 1.0);
}

#[test]
fn region_before_any_page_header_is_structural() {
    let err = parse_atlas("stray_region\na.png\nr1").unwrap_err();
    assert!(matches!(err, SalvageError::MalformedManifest(_)));
}

#[test]
fn unknown_attribute_lines_are_ignored() {
    let atlas = parse_atlas("a.png\nsize: 1024,1024\nformat: RGBA8888\nfilter: Linear,Linear\nr1")
        .expect("parse");
    assert_eq!(atlas.pages.len(), 1);
    assert_eq!(atlas.pages[0].regions.len(), 1);
    assert_eq!(atlas.scale, 1.0);
}

#[test]
fn empty_lines_are_skipped() {
    let atlas = parse_atlas("a.png\n\nr1\n\n\nr2\n").expect("parse");
    assert_eq!(atlas.pages[0].regions.len(), 2);
}

#[test]
fn trailing_page_is_flushed_at_end_of_input() {
    let atlas = parse_atlas("a.png\nr1\nlast.png").expect("parse");
    assert_eq!(atlas.pages.len(), 2);
    assert_eq!(atlas.pages[1].name, "last");
    assert!(atlas.pages[1].regions.is_empty());
}

#[test]
fn page_name_strips_one_extension_suffix() {
    let atlas = parse_atlas("chapter.1.png\nr1").expect("parse");
    assert_eq!(atlas.pages[0].name, "chapter.1");
}

#[test]
fn attribute_only_text_parses_with_zero_pages() {
    let atlas = parse_atlas("scale: 2.0").expect("parse");
    assert!(atlas.pages.is_empty());
    assert_eq!(atlas.scale, 2.0);
    assert_eq!(atlas.project_name(), None);
}

#[test]
fn escaped_literal_text_is_unescaped_before_parsing() {
    // as captured from a quoted bundle literal: backslash sequences, tabs
    let atlas = parse_atlas(r"hero.png\n\tscale: 0.25\n\thead\n\tbody").expect("parse");
    assert_eq!(atlas.pages.len(), 1);
    assert_eq!(atlas.pages[0].name, "hero");
    assert_eq!(atlas.scale, 0.25);
    let regions: Vec<&str> = atlas.pages[0]
        .regions
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(regions, ["head", "body"]);
    // raw_text keeps the unescaped, tab-stripped form
    assert_eq!(atlas.raw_text, "hero.png\nscale: 0.25\nhead\nbody");
}
