//! Seam to the external vector search engine.
//!
//! The gateway never searches by itself; it hands queries to a
//! [`SearchEngine`] obtained from an [`EngineLoader`] for a located index.

pub mod command;
pub mod passages;

pub use command::{CommandEngine, CommandEngineLoader};
pub use passages::PassageRegistry;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineQuery {
    pub query: String,
    pub top_k: usize,
    pub complexity: u32,
    pub recompute_embeddings: bool,
    pub sources: Vec<String>,
}

/// Engine output: parallel arrays grouped per query, already ranked.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSearchResults {
    #[serde(default)]
    pub labels: Vec<Vec<Value>>,
    #[serde(default)]
    pub distances: Vec<Vec<f64>>,
    #[serde(default)]
    pub texts: Vec<Vec<String>>,
}

/// Engines report passage ids as strings or integers.
pub fn label_key(label: &Value) -> String {
    match label {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &EngineQuery) -> Result<RawSearchResults>;

    /// Metadata registered for a passage, if the engine knows it.
    fn passage_metadata(&self, passage_id: &str) -> Option<Map<String, Value>>;

    fn document_count(&self) -> usize;

    fn backend_name(&self) -> Option<String>;

    fn embedding_model(&self) -> Option<String>;
}

/// Opens an engine over an index directory. Loading may touch many files
/// and is expected to run off the async executor.
pub trait EngineLoader: Send + Sync {
    fn load(&self, index_path: &Path) -> Result<Arc<dyn SearchEngine>>;
}
