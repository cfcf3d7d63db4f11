use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Thumbnail sidecars and low-resolution proxy videos.
pub const DELETABLE_EXTENSIONS: &[&str] = &[".thm", ".lrv"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercased, with the leading dot; empty when the file has none.
    pub extension: String,
}

impl SourceEntry {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = lowercase_extension(&file_name);
        Self {
            path,
            file_name,
            extension,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TriageDecision {
    Delete,
    Skip,
    Process,
}

pub fn triage(entry: &SourceEntry) -> TriageDecision {
    if DELETABLE_EXTENSIONS.contains(&entry.extension.as_str()) {
        return TriageDecision::Delete;
    }

    if entry.file_name.starts_with('.') {
        return TriageDecision::Skip;
    }

    TriageDecision::Process
}

/// Everything from the last dot, so a bare `.thm` counts as a `.thm` file.
fn lowercase_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => file_name[idx..].to_lowercase(),
        _ => String::new(),
    }
}
