use docmill::util::{bound_diagnostic, extension_of, normalize_angle, normalize_page_order};
use std::path::Path;

#[test]
fn short_diagnostics_pass_through() {
    assert_eq!(bound_diagnostic("exit 1", 4096), "exit 1");
}

#[test]
fn long_diagnostics_are_cut_and_marked() {
    let text = "x".repeat(10_000);
    let bounded = bound_diagnostic(&text, 100);
    assert_eq!(bounded.len(), 100);
    assert!(bounded.ends_with("... (truncated)"));
}

#[test]
fn truncation_respects_char_boundaries() {
    let text = "é".repeat(100);
    let bounded = bound_diagnostic(&text, 50);
    assert!(bounded.len() <= 50);
    assert!(bounded.ends_with("... (truncated)"));
    assert!(bounded.trim_end_matches("... (truncated)").chars().all(|c| c == 'é'));
}

#[test]
fn page_orders() {
    assert_eq!(normalize_page_order("3,1,2").as_deref(), Some("3,1,2"));
    assert_eq!(normalize_page_order(" 1, 3-5 ,z").as_deref(), Some("1,3-5,z"));
    assert_eq!(normalize_page_order("2-last,1").as_deref(), Some("2-z,1"));
    assert_eq!(normalize_page_order("r1,1-r2").as_deref(), Some("r1,1-r2"));
    assert_eq!(normalize_page_order("1-z:odd").as_deref(), Some("1-z:odd"));

    assert_eq!(normalize_page_order(""), None);
    assert_eq!(normalize_page_order("1;2"), None);
    assert_eq!(normalize_page_order("1,,2"), None);
    assert_eq!(normalize_page_order("0,1"), None);
    assert_eq!(normalize_page_order("--pages"), None);
}

#[test]
fn angles() {
    assert_eq!(normalize_angle(None), Some(90));
    assert_eq!(normalize_angle(Some("")), Some(90));
    assert_eq!(normalize_angle(Some("0")), Some(90));
    assert_eq!(normalize_angle(Some("180")), Some(180));
    assert_eq!(normalize_angle(Some("-90")), Some(-90));
    assert_eq!(normalize_angle(Some("45")), None);
    assert_eq!(normalize_angle(Some("left")), None);
}

#[test]
fn extensions_are_lowercased() {
    assert_eq!(extension_of(Path::new("a/B.PDF")), "pdf");
    assert_eq!(extension_of(Path::new("README")), "");
}
