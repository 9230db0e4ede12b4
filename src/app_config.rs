use web_sys::UrlSearchParams;

use occt_viewer_core::{default_format, format_by_slug, FileFilter, FormatCatalogEntry};

pub(crate) const DEFAULT_CONTAINER_ID: &str = "occt_container";
pub(crate) const DEFAULT_RUNTIME_FACTORY: &str = "OccApp";

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StartupModel {
    pub(crate) name: String,
    pub(crate) url: String,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ViewerConfig {
    pub(crate) container_id: String,
    pub(crate) runtime_factory: String,
    pub(crate) format_label: &'static str,
    pub(crate) filter: FileFilter,
    pub(crate) startup_model: Option<StartupModel>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct QueryOverrides {
    pub(crate) format_slug: Option<String>,
    pub(crate) model_url: Option<String>,
}

pub(crate) fn load_viewer_config() -> ViewerConfig {
    let overrides = web_sys::window()
        .and_then(|window| window.location().search().ok())
        .map(|search| parse_query_overrides(&search))
        .unwrap_or_default();
    build_viewer_config(overrides)
}

pub(crate) fn build_viewer_config(overrides: QueryOverrides) -> ViewerConfig {
    let format = overrides
        .format_slug
        .as_deref()
        .and_then(format_by_slug)
        .unwrap_or_else(default_format);
    ViewerConfig {
        container_id: env_or(option_env!("OCCT_CONTAINER_ID"), DEFAULT_CONTAINER_ID),
        runtime_factory: env_or(option_env!("OCCT_RUNTIME_FACTORY"), DEFAULT_RUNTIME_FACTORY),
        format_label: format.label,
        filter: filter_for(format),
        startup_model: overrides.model_url.map(|url| StartupModel {
            name: model_name_from_url(&url),
            url,
        }),
    }
}

pub(crate) fn parse_query_overrides(search: &str) -> QueryOverrides {
    let search = search.trim();
    if search.is_empty() {
        return QueryOverrides::default();
    }
    let Ok(params) = UrlSearchParams::new_with_str(search) else {
        return QueryOverrides::default();
    };
    QueryOverrides {
        format_slug: non_empty(params.get("format")),
        model_url: non_empty(params.get("model")),
    }
}

/// Last path segment of a model URL, without query or fragment.
pub(crate) fn model_name_from_url(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let name = path.rsplit('/').next().unwrap_or_default().trim();
    if name.is_empty() {
        "model".to_string()
    } else {
        name.to_string()
    }
}

fn filter_for(format: &FormatCatalogEntry) -> FileFilter {
    FileFilter::from_catalog(format)
}

fn env_or(value: Option<&'static str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.to_string(),
        _ => fallback.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
