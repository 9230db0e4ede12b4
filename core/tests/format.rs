use occt_viewer_core::{default_format, FileFilter, ModelFormat};

#[test]
fn detects_formats_by_header() {
    assert_eq!(
        ModelFormat::detect("anything.bin", b"DBRep_DrawableShape\nCASCADE"),
        ModelFormat::Brep
    );
    assert_eq!(
        ModelFormat::detect("model.step", b"ISO-10303-21;\nHEADER;"),
        ModelFormat::Step
    );
    assert_eq!(ModelFormat::detect("scene.glb", b"glTF\x02\x00\x00\x00"), ModelFormat::Gltf);
}

#[test]
fn falls_back_to_extension_for_iges() {
    assert_eq!(ModelFormat::detect("bracket.IGES", b"      S      1"), ModelFormat::Iges);
    assert_eq!(ModelFormat::detect("bracket.igs", b"      S      1"), ModelFormat::Iges);
    assert_eq!(ModelFormat::detect("model.step", b"garbage"), ModelFormat::Unknown);
}

#[test]
fn filter_parses_accept_pattern() {
    let filter = FileFilter::parse(".stp, .step,,.STP ,.STEP");
    assert_eq!(filter.entries(), &[".stp", ".step", ".STP", ".STEP"]);
    assert_eq!(filter.accept_attribute(), ".stp,.step,.STP,.STEP");
}

#[test]
fn filter_matches_extensions_case_insensitively() {
    let filter = FileFilter::parse(".brep");
    assert!(filter.matches("part.brep"));
    assert!(filter.matches("PART.BREP"));
    assert!(!filter.matches(".brep"));
    assert!(!filter.matches("part.step"));
    assert!(!filter.matches("partbrep"));
}

#[test]
fn empty_filter_accepts_everything() {
    let filter = FileFilter::parse("  ");
    assert!(filter.is_unrestricted());
    assert!(filter.matches("whatever.xyz"));
}

#[test]
fn mime_entries_are_not_checked_by_name() {
    let filter = FileFilter::parse("model/step");
    assert!(filter.matches("model.bin"));
}

#[test]
fn catalog_default_builds_a_filter() {
    let filter = FileFilter::from_catalog(default_format());
    assert!(!filter.is_unrestricted());
    assert_eq!(filter.accept_attribute(), default_format().accept_pattern());
}
