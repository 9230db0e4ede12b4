#[derive(Clone, Copy, Debug)]
pub struct FormatCatalogEntry {
    pub label: &'static str,
    pub slug: &'static str,
    pub accept: &'static [&'static str],
}

include!(concat!(env!("OUT_DIR"), "/format_catalog.rs"));

impl FormatCatalogEntry {
    /// Comma-joined allow-list suitable for an `accept` attribute.
    pub fn accept_pattern(&self) -> String {
        self.accept.join(",")
    }
}

pub fn format_by_slug(slug: &str) -> Option<&'static FormatCatalogEntry> {
    let trimmed = slug.trim();
    FORMAT_CATALOG
        .iter()
        .find(|entry| entry.slug.eq_ignore_ascii_case(trimmed))
}

pub fn default_format() -> &'static FormatCatalogEntry {
    // build.rs guarantees a non-empty catalog containing the default slug.
    format_by_slug(DEFAULT_FORMAT_SLUG).unwrap_or(&FORMAT_CATALOG[0])
}
