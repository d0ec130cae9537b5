use super::{EngineLoader, EngineQuery, PassageRegistry, RawSearchResults, SearchEngine};
use crate::config::EngineConfig;
use crate::error::{GatewayError, Result};
use crate::locator::{read_metadata, IndexMetadata};
use crate::process::{diagnostics, run_captured};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Engine backed by an external search command that prints
/// `{"labels": .., "distances": .., "texts": ..}` on stdout.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    index_path: PathBuf,
    metadata: IndexMetadata,
    passages: PassageRegistry,
}

impl CommandEngine {
    pub fn open(config: &EngineConfig, index_path: &Path) -> Result<Self> {
        let metadata = read_metadata(index_path).map_err(|e| {
            GatewayError::Engine(format!(
                "cannot read metadata for {}: {}",
                index_path.display(),
                e
            ))
        })?;
        let passages = PassageRegistry::load(index_path)?;

        if passages.is_empty() {
            tracing::warn!(
                "No passages found in {}; results will carry no metadata",
                index_path.display()
            );
        } else {
            tracing::debug!(
                "Opened {} with {} passages",
                index_path.display(),
                passages.len()
            );
        }

        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            index_path: index_path.to_path_buf(),
            metadata,
            passages,
        })
    }

    fn command(&self, query: &EngineQuery) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--index-path")
            .arg(&self.index_path)
            .arg("--query")
            .arg(&query.query)
            .arg("--top-k")
            .arg(query.top_k.to_string())
            .arg("--complexity")
            .arg(query.complexity.to_string());
        if query.recompute_embeddings {
            command.arg("--recompute-embeddings");
        }
        if !query.sources.is_empty() {
            command.arg("--sources").arg(query.sources.join(","));
        }
        command
    }
}

#[async_trait]
impl SearchEngine for CommandEngine {
    async fn search(&self, query: &EngineQuery) -> Result<RawSearchResults> {
        let output = run_captured(self.command(query), self.timeout)
            .await?
            .ok_or_else(|| {
                GatewayError::Engine(format!(
                    "search timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?;

        if !output.status.success() {
            return Err(GatewayError::Engine(diagnostics(&output)));
        }

        let results: RawSearchResults = serde_json::from_slice(&output.stdout)?;
        Ok(results)
    }

    fn passage_metadata(&self, passage_id: &str) -> Option<Map<String, Value>> {
        self.passages.get(passage_id).cloned()
    }

    fn document_count(&self) -> usize {
        self.passages.len()
    }

    fn backend_name(&self) -> Option<String> {
        self.metadata.declared_backend()
    }

    fn embedding_model(&self) -> Option<String> {
        self.metadata.declared_model()
    }
}

#[derive(Debug, Clone)]
pub struct CommandEngineLoader {
    config: EngineConfig,
}

impl CommandEngineLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineLoader for CommandEngineLoader {
    fn load(&self, index_path: &Path) -> Result<Arc<dyn SearchEngine>> {
        Ok(Arc::new(CommandEngine::open(&self.config, index_path)?))
    }
}
