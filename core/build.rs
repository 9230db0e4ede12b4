use std::collections::HashSet;
use std::env;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Deserialize)]
struct CatalogFile {
    default_slug: Option<String>,
    formats: Vec<FormatEntry>,
}

#[derive(Deserialize)]
struct FormatEntry {
    label: String,
    slug: String,
    accept: Vec<String>,
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("missing CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir.parent().unwrap_or(&manifest_dir);
    let env_path = workspace_root.join(".env");
    let env_local_path = workspace_root.join(".env.local");

    let _ = dotenvy::from_filename(&env_local_path);
    let _ = dotenvy::from_filename(&env_path);

    println!("cargo:rerun-if-env-changed=OCCT_FORMAT_CATALOG_PATH");
    println!("cargo:rerun-if-changed={}", env_path.display());
    println!("cargo:rerun-if-changed={}", env_local_path.display());

    let catalog_path = resolve_catalog_path(workspace_root);
    println!("cargo:rerun-if-changed={}", catalog_path.display());

    let contents = fs::read_to_string(&catalog_path).unwrap_or_else(|err| {
        panic!(
            "failed to read format catalog at {}: {err}",
            catalog_path.display()
        )
    });

    let catalog: CatalogFile = toml::from_str(&contents).unwrap_or_else(|err| {
        panic!(
            "failed to parse format catalog at {}: {err}",
            catalog_path.display()
        )
    });

    if catalog.formats.is_empty() {
        panic!("format catalog {} has no entries", catalog_path.display());
    }

    validate_entries(&catalog.formats, &catalog_path);

    let default_slug = catalog
        .default_slug
        .as_deref()
        .unwrap_or(catalog.formats[0].slug.as_str());
    if !catalog.formats.iter().any(|entry| entry.slug == default_slug) {
        panic!(
            "default_slug '{}' not found in {}",
            default_slug,
            catalog_path.display()
        );
    }

    let mut output = String::new();
    writeln!(
        &mut output,
        "pub const DEFAULT_FORMAT_SLUG: &str = {};",
        rust_string(default_slug)
    )
    .unwrap();
    writeln!(&mut output).unwrap();
    writeln!(
        &mut output,
        "pub const FORMAT_CATALOG: &[FormatCatalogEntry] = &["
    )
    .unwrap();

    for entry in &catalog.formats {
        let accept = entry
            .accept
            .iter()
            .map(|ext| rust_string(ext.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(&mut output, "    FormatCatalogEntry {{").unwrap();
        writeln!(&mut output, "        label: {},", rust_string(&entry.label)).unwrap();
        writeln!(&mut output, "        slug: {},", rust_string(&entry.slug)).unwrap();
        writeln!(&mut output, "        accept: &[{}],", accept).unwrap();
        writeln!(&mut output, "    }},").unwrap();
    }

    writeln!(&mut output, "];").unwrap();

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("missing OUT_DIR"));
    let out_path = out_dir.join("format_catalog.rs");
    fs::write(&out_path, output).unwrap_or_else(|err| {
        panic!("failed to write {}: {err}", out_path.display())
    });
}

fn resolve_catalog_path(workspace_root: &Path) -> PathBuf {
    let env_value = env::var("OCCT_FORMAT_CATALOG_PATH").ok();
    let raw_path = match env_value {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => workspace_root.join("formats.toml"),
    };
    if raw_path.is_relative() {
        workspace_root.join(raw_path)
    } else {
        raw_path
    }
}

fn rust_string(value: &str) -> String {
    format!("{:?}", value)
}

fn validate_entries(entries: &[FormatEntry], catalog_path: &Path) {
    let mut slugs = HashSet::new();

    for entry in entries {
        if entry.slug.trim().is_empty() {
            panic!("format slug cannot be empty in {}", catalog_path.display());
        }
        if entry.label.trim().is_empty() {
            panic!(
                "format '{}' label cannot be empty in {}",
                entry.slug,
                catalog_path.display()
            );
        }
        if entry.accept.is_empty() {
            panic!(
                "format '{}' must accept at least one extension in {}",
                entry.slug,
                catalog_path.display()
            );
        }
        for ext in &entry.accept {
            let ext = ext.trim();
            if !ext.starts_with('.') || ext.len() < 2 {
                panic!(
                    "format '{}' has invalid extension '{}' in {}",
                    entry.slug,
                    ext,
                    catalog_path.display()
                );
            }
            if ext.contains(',') {
                panic!(
                    "format '{}' extension '{}' cannot contain ',' in {}",
                    entry.slug,
                    ext,
                    catalog_path.display()
                );
            }
        }
        if !slugs.insert(entry.slug.clone()) {
            panic!(
                "duplicate format slug '{}' in {}",
                entry.slug,
                catalog_path.display()
            );
        }
    }
}
