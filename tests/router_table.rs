use docmill::engine::Engine;
use docmill::router::{Operation, normalize_format, route, route_operation, supported_pairs};

#[test]
fn every_table_row_routes_to_its_engine() {
    let rows: &[(&[&str], &[&str], Engine)] = &[
        (&["jpg", "jpeg", "png"], &["pdf"], Engine::Image),
        (&["pdf"], &["jpg", "jpeg", "png"], Engine::Raster),
        (
            &["docx", "ppt", "xlsx", "csv", "html", "txt"],
            &["pdf"],
            Engine::OfficeSuite,
        ),
        (&["pdf"], &["docx", "xlsx", "ppt"], Engine::OfficeSuite),
        (&["md", "markdown", "epub"], &["pdf"], Engine::Markup),
        (&["pdf"], &["txt"], Engine::Raster),
    ];
    for (sources, targets, engine) in rows {
        for source in *sources {
            for target in *targets {
                assert_eq!(route(source, target), Some(*engine), "{source} -> {target}");
            }
        }
    }
}

#[test]
fn scenarios() {
    assert_eq!(route("docx", "pdf"), Some(Engine::OfficeSuite));
    assert_eq!(route("pdf", "png"), Some(Engine::Raster));
    assert_eq!(route("md", "pdf"), Some(Engine::Markup));
    assert_eq!(route("png", "pdf"), Some(Engine::Image));
    assert_eq!(route("pdf", "txt"), Some(Engine::Raster));
    assert_eq!(route("txt", "pdf"), Some(Engine::OfficeSuite));
    assert_eq!(route("jpg", "pdf"), Some(Engine::Image));
    assert_eq!(route("pdf", "docx"), Some(Engine::OfficeSuite));
    assert_eq!(route("docx", "png"), None);
}

#[test]
fn unknown_pairs_are_unsupported() {
    assert_eq!(route("pdf", "mp4"), None);
    assert_eq!(route("exe", "pdf"), None);
    assert_eq!(route("docx", "txt"), None);
    assert_eq!(route("pdf", "pdf"), None);
    assert_eq!(route("png", "jpg"), None);
    assert_eq!(route("", ""), None);
}

#[test]
fn formats_are_normalized_before_lookup() {
    assert_eq!(normalize_format(" .DOCX "), "docx");
    assert_eq!(route("DOCX", "PDF"), Some(Engine::OfficeSuite));
    assert_eq!(route(".png", ".pdf"), Some(Engine::Image));
}

#[test]
fn supported_pairs_agree_with_route() {
    let pairs = supported_pairs();
    assert_eq!(pairs.len(), 3 + 3 + 6 + 3 + 3 + 1);
    for pair in pairs {
        assert_eq!(route(pair.source, pair.target), Some(pair.engine));
    }
}

#[test]
fn named_operations() {
    assert_eq!(route_operation(Operation::Compress), Engine::Compression);
    assert_eq!(route_operation(Operation::ExtractText), Engine::Raster);
    assert_eq!(route_operation(Operation::ExtractImages), Engine::Raster);
    assert_eq!(route_operation(Operation::Rotate), Engine::Page);
    assert_eq!(route_operation(Operation::Reorder), Engine::Page);
    assert_eq!(route_operation(Operation::Split), Engine::Page);

    assert_eq!(Operation::Split.target_format(), "zip");
    assert_eq!(Operation::ExtractText.target_format(), "txt");
    assert_eq!(
        "extract-images".parse::<Operation>(),
        Ok(Operation::ExtractImages)
    );
    assert!("shred".parse::<Operation>().is_err());
}
