use spine_salvage_core::prelude::*;

#[test]
fn flatten_drops_exactly_the_first_line() {
    let raw = "#!shebang or banner comment\nvar a=1;\nvar b=2;";
    let bundle = BundleText::flatten(raw);
    assert_eq!(bundle.as_str(), "var a=1;var b=2;");
    // offset arithmetic downstream depends on len tracking the joined text
    assert_eq!(bundle.len(), "var a=1;var b=2;".len());
}

#[test]
fn flatten_of_single_line_input_is_empty() {
    let bundle = BundleText::flatten("only line");
    assert!(bundle.is_empty());
}

#[test]
fn from_flattened_is_a_passthrough() {
    let bundle = BundleText::from_flattened("a\nb");
    assert_eq!(bundle.as_str(), "a\nb");
}

#[test]
fn literals_come_back_in_scan_order_across_quote_kinds() {
    let bundle = BundleText::from_flattened(r#"x="alpha";y='beta';z="gamma""#);
    assert_eq!(bundle.string_literals(), ["alpha", "beta", "gamma"]);
}

#[test]
fn quotes_pair_by_kind() {
    // a double quote inside a single-quoted literal does not terminate it
    let bundle = BundleText::from_flattened(r#"'don"t panic'"#);
    assert_eq!(bundle.string_literals(), [r#"don"t panic"#]);
}

#[test]
fn matching_is_non_greedy() {
    let bundle = BundleText::from_flattened(r#""a""b""#);
    assert_eq!(bundle.string_literals(), ["a", "b"]);
}

#[test]
fn unescaped_delimiter_terminates_a_literal_early() {
    // the scanner is escape-unaware: `ab"cd` stored with an interior quote
    // splits at the first closing quote, and the tail pairs with the next one
    let bundle = BundleText::from_flattened(r#""ab"cd"e""#);
    assert_eq!(bundle.string_literals(), ["ab", "e"]);
}

#[test]
fn empty_literals_are_captured() {
    let bundle = BundleText::from_flattened(r#"f("",'x')"#);
    assert_eq!(bundle.string_literals(), ["", "x"]);
}
