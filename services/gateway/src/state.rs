use crate::build::{BuildOrchestrator, BuildRunner, ProcessBuildRunner};
use crate::config::Config;
use crate::engine::{CommandEngineLoader, EngineLoader};
use crate::error::Result;
use crate::locator::{list_indices, IndexInfo};
use crate::search::SearchService;
use std::sync::Arc;

/// Everything a request handler can reach. Built once at startup and shared
/// behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub search: Arc<SearchService>,
    pub builds: BuildOrchestrator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let loader = Arc::new(CommandEngineLoader::new(config.engine.clone()));
        Self::with_components(config, loader, Arc::new(ProcessBuildRunner))
    }

    pub fn with_components(
        config: Config,
        loader: Arc<dyn EngineLoader>,
        runner: Arc<dyn BuildRunner>,
    ) -> Self {
        let search = Arc::new(SearchService::new(config.paths.lookup_roots(), loader));
        let builds = BuildOrchestrator::new(
            config.paths.clone(),
            config.builder.clone(),
            runner,
            Arc::clone(&search),
        );
        Self {
            config,
            search,
            builds,
        }
    }

    pub async fn list_indices(&self) -> Result<Vec<IndexInfo>> {
        let roots = self.config.paths.listing_roots();
        let indices = tokio::task::spawn_blocking(move || list_indices(&roots)).await?;
        Ok(indices)
    }
}
