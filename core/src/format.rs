use std::fmt;

use crate::catalog::FormatCatalogEntry;

const BREP_HEADER: &[u8] = b"DBRep_DrawableShape";
const STEP_HEADER: &[u8] = b"ISO-10303-21";
const GLTF_HEADER: &[u8] = b"glTF";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Step,
    Iges,
    Brep,
    Gltf,
    Unknown,
}

impl ModelFormat {
    /// Classifies a model by its leading bytes, falling back to the file
    /// extension for formats without a reliable magic header.
    pub fn detect(name: &str, bytes: &[u8]) -> Self {
        if bytes.starts_with(BREP_HEADER) {
            return ModelFormat::Brep;
        }
        if bytes.starts_with(GLTF_HEADER) {
            return ModelFormat::Gltf;
        }
        if bytes.starts_with(STEP_HEADER) {
            return ModelFormat::Step;
        }
        match extension(name).as_deref() {
            Some("iges") | Some("igs") => ModelFormat::Iges,
            _ => ModelFormat::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelFormat::Step => "STEP",
            ModelFormat::Iges => "IGES",
            ModelFormat::Brep => "BREP",
            ModelFormat::Gltf => "glTF",
            ModelFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.trim().rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Extension allow-list handed to the file picker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileFilter {
    entries: Vec<String>,
}

impl FileFilter {
    pub fn parse(pattern: &str) -> Self {
        let entries = pattern
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    pub fn from_catalog(entry: &FormatCatalogEntry) -> Self {
        Self {
            entries: entry.accept.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn accept_attribute(&self) -> String {
        self.entries.join(",")
    }

    pub fn is_unrestricted(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let name = name.trim();
        self.entries.iter().any(|entry| {
            // MIME entries cannot be checked against a bare name.
            if !entry.starts_with('.') {
                return true;
            }
            name.len() > entry.len()
                && name.is_char_boundary(name.len() - entry.len())
                && name[name.len() - entry.len()..].eq_ignore_ascii_case(entry)
        })
    }
}
