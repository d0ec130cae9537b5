use crate::error::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

const PASSAGES_SUFFIX: &str = ".passages.jsonl";

#[derive(Debug, Deserialize)]
struct PassageLine {
    id: Value,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Passage id to metadata, read from the `*.passages.jsonl` files the
/// builder leaves in an index directory.
#[derive(Debug, Clone, Default)]
pub struct PassageRegistry {
    entries: HashMap<String, Map<String, Value>>,
}

impl PassageRegistry {
    pub fn load(index_dir: &Path) -> Result<Self> {
        let mut registry = PassageRegistry::default();

        for entry in fs::read_dir(index_dir)? {
            let path = entry?.path();
            let is_passages = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(PASSAGES_SUFFIX))
                .unwrap_or(false);
            if path.is_file() && is_passages {
                registry.read_file(&path)?;
            }
        }

        Ok(registry)
    }

    fn read_file(&mut self, path: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PassageLine>(&line) {
                Ok(passage) => {
                    self.entries
                        .insert(super::label_key(&passage.id), passage.metadata);
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed passages in {}", skipped, path.display());
        }
        Ok(())
    }

    pub fn get(&self, passage_id: &str) -> Option<&Map<String, Value>> {
        self.entries.get(passage_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
