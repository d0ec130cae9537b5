//! Wire types shared by the HTTP layer and the services.
//!
//! Field names follow the frontend's contract: search and status types are
//! snake_case, index creation types are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_top_k() -> usize {
    10
}

fn default_sources() -> Vec<String> {
    ["document", "email", "wechat", "code"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_complexity() -> u32 {
    64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default = "default_complexity")]
    pub complexity: u32,
    #[serde(default)]
    pub recompute_embeddings: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_top_k(),
            sources: default_sources(),
            complexity: default_complexity(),
            recompute_embeddings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub source: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_count: usize,
    pub query: String,
    /// Wall-clock seconds.
    pub search_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Ready,
    NoIndex,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: StatusKind,
    pub index_loaded: bool,
    pub index_path: Option<String>,
    pub total_documents: usize,
    pub backend_name: String,
    pub embedding_model: String,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCreationRequest {
    pub name: String,
    pub data_sources: Vec<String>,
    pub embedding_model: String,
    pub backend: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildAccepted {
    pub message: String,
    pub progress_id: String,
}
