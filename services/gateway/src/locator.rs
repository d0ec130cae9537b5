//! Discovery of persisted indices on disk.
//!
//! An index is any immediate subdirectory of a scanned root that holds a
//! `metadata.json` descriptor written by the external builder.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";
const UNKNOWN: &str = "unknown";

/// The subset of the builder's descriptor this service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexMetadata {
    #[serde(default)]
    pub backend_name: Option<Value>,
    #[serde(default)]
    pub embedding_model: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
}

/// Descriptor values are written by another program; anything that is not
/// a string is rendered as JSON rather than rejected.
fn as_text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

impl IndexMetadata {
    pub fn declared_backend(&self) -> Option<String> {
        as_text(&self.backend_name)
    }

    pub fn declared_model(&self) -> Option<String> {
        as_text(&self.embedding_model)
    }

    pub fn backend(&self) -> String {
        self.declared_backend().unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn model(&self) -> String {
        self.declared_model().unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn created(&self) -> String {
        as_text(&self.created_at).unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub path: String,
    pub backend: String,
    pub embedding_model: String,
    pub created: String,
}

pub fn has_metadata(dir: &Path) -> bool {
    dir.join(METADATA_FILE).is_file()
}

pub fn read_metadata(dir: &Path) -> Result<IndexMetadata> {
    let content = fs::read_to_string(dir.join(METADATA_FILE))?;
    let metadata: IndexMetadata = serde_json::from_str(&content)?;
    Ok(metadata)
}

/// Subdirectories of `root` carrying a descriptor, sorted by name.
/// A missing or unreadable root yields nothing.
fn index_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && has_metadata(path))
        .collect();
    dirs.sort();
    dirs
}

/// First index found, scanning `roots` in order.
pub fn find_index(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        if let Some(dir) = index_dirs(root).into_iter().next() {
            tracing::info!("Found index at: {}", dir.display());
            return Some(dir);
        }
    }
    None
}

/// Every index under `roots`. Directories with an unreadable or malformed
/// descriptor are logged and skipped.
pub fn list_indices(roots: &[PathBuf]) -> Vec<IndexInfo> {
    let mut indices = Vec::new();

    for root in roots {
        for dir in index_dirs(root) {
            match read_metadata(&dir) {
                Ok(metadata) => indices.push(IndexInfo {
                    name: dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path: dir.display().to_string(),
                    backend: metadata.backend(),
                    embedding_model: metadata.model(),
                    created: metadata.created(),
                }),
                Err(e) => {
                    tracing::warn!("Could not read metadata for {}: {}", dir.display(), e);
                }
            }
        }
    }

    indices
}
