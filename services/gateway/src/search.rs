use crate::engine::{label_key, EngineLoader, EngineQuery, RawSearchResults, SearchEngine};
use crate::error::{GatewayError, Result};
use crate::locator::find_index;
use crate::metrics::{SEARCH_DURATION, SEARCH_FAILURES, SEARCH_REQUESTS};
use crate::types::{SearchRequest, SearchResponse, SearchResult, StatusKind, SystemStatus};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

const UNKNOWN: &str = "unknown";
const DEFAULT_SOURCE: &str = "document";

#[derive(Clone)]
pub struct LoadedEngine {
    pub engine: Arc<dyn SearchEngine>,
    pub index_path: PathBuf,
}

/// Outcome of locating and opening an index.
#[derive(Clone)]
pub enum EngineState {
    Ready(LoadedEngine),
    NoIndex,
    Failed { index_path: PathBuf, message: String },
}

/// Owns the lazily opened engine handle and answers search and status.
pub struct SearchService {
    lookup_roots: Vec<PathBuf>,
    loader: Arc<dyn EngineLoader>,
    slot: RwLock<Option<LoadedEngine>>,
}

impl SearchService {
    pub fn new(lookup_roots: Vec<PathBuf>, loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            lookup_roots,
            loader,
            slot: RwLock::new(None),
        }
    }

    /// Returns the cached engine, or locates and opens one. Only a
    /// successful load is cached, so a missing index is looked for again on
    /// the next call.
    pub async fn current(&self) -> EngineState {
        if let Some(loaded) = self.slot.read().await.as_ref() {
            return EngineState::Ready(loaded.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(loaded) = slot.as_ref() {
            return EngineState::Ready(loaded.clone());
        }

        let roots = self.lookup_roots.clone();
        let loader = Arc::clone(&self.loader);
        let opened = tokio::task::spawn_blocking(move || {
            find_index(&roots).map(|path| {
                let engine = loader.load(&path);
                (path, engine)
            })
        })
        .await;

        match opened {
            Ok(Some((index_path, Ok(engine)))) => {
                tracing::info!("Successfully loaded index from: {}", index_path.display());
                let loaded = LoadedEngine { engine, index_path };
                *slot = Some(loaded.clone());
                EngineState::Ready(loaded)
            }
            Ok(Some((index_path, Err(e)))) => {
                tracing::error!("Failed to load index {}: {}", index_path.display(), e);
                EngineState::Failed {
                    index_path,
                    message: e.to_string(),
                }
            }
            Ok(None) => {
                tracing::warn!("No index found, serving placeholder results");
                EngineState::NoIndex
            }
            Err(e) => {
                tracing::error!("Index lookup task failed: {}", e);
                EngineState::NoIndex
            }
        }
    }

    /// Drops the cached engine; the next use opens whatever index is found.
    pub async fn reset(&self) {
        *self.slot.write().await = None;
    }

    pub async fn reload(&self) -> EngineState {
        self.reset().await;
        self.current().await
    }

    pub async fn status(&self) -> SystemStatus {
        match self.current().await {
            EngineState::Ready(loaded) => SystemStatus {
                status: StatusKind::Ready,
                index_loaded: true,
                index_path: Some(loaded.index_path.display().to_string()),
                total_documents: loaded.engine.document_count(),
                backend_name: loaded
                    .engine
                    .backend_name()
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                embedding_model: loaded
                    .engine
                    .embedding_model()
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            },
            EngineState::NoIndex => SystemStatus {
                status: StatusKind::NoIndex,
                index_loaded: false,
                index_path: None,
                total_documents: 0,
                backend_name: UNKNOWN.to_string(),
                embedding_model: UNKNOWN.to_string(),
            },
            EngineState::Failed { index_path, .. } => SystemStatus {
                status: StatusKind::Error,
                index_loaded: false,
                index_path: Some(index_path.display().to_string()),
                total_documents: 0,
                backend_name: UNKNOWN.to_string(),
                embedding_model: UNKNOWN.to_string(),
            },
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        metrics::counter!(SEARCH_REQUESTS).increment(1);

        if request.complexity == 0 {
            return Err(GatewayError::InvalidRequest(
                "complexity must be a positive integer".to_string(),
            ));
        }

        let results = match self.current().await {
            EngineState::Ready(loaded) => {
                let query = EngineQuery {
                    query: request.query.clone(),
                    top_k: request.top_k,
                    complexity: request.complexity,
                    recompute_embeddings: request.recompute_embeddings,
                    sources: request.sources.clone(),
                };
                let raw = loaded.engine.search(&query).await.map_err(|e| {
                    metrics::counter!(SEARCH_FAILURES).increment(1);
                    tracing::error!("Search error: {}", e);
                    GatewayError::SearchFailed(engine_message(e))
                })?;
                flatten_results(&raw, loaded.engine.as_ref())
            }
            EngineState::NoIndex => placeholder_results(&request.query),
            EngineState::Failed { message, .. } => {
                tracing::warn!("Index unavailable ({}), serving placeholder results", message);
                placeholder_results(&request.query)
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        metrics::histogram!(SEARCH_DURATION).record(elapsed);
        tracing::debug!(
            "Search '{}' returned {} results in {:.3}s",
            request.query,
            results.len(),
            elapsed
        );

        Ok(SearchResponse {
            total_count: results.len(),
            results,
            query: request.query.clone(),
            search_time: elapsed,
        })
    }
}

fn engine_message(error: GatewayError) -> String {
    match error {
        GatewayError::Engine(message) => message,
        other => other.to_string(),
    }
}

/// Fixed results returned while no index is available, so the frontend
/// always gets a well-formed response.
pub fn placeholder_results(query: &str) -> Vec<SearchResult> {
    vec![
        SearchResult {
            id: "mock_1".to_string(),
            content: format!(
                "Mock result for query '{}'. This would be real content from your indexed documents, emails, chat history, or code.",
                query
            ),
            score: 0.95,
            source: "document".to_string(),
            metadata: object(json!({
                "title": "Sample Document",
                "path": "/path/to/document.pdf",
                "date": "2025-08-31"
            })),
        },
        SearchResult {
            id: "mock_2".to_string(),
            content: format!(
                "Another mock result related to '{}'. In a real setup, this would come from your vector index with actual similarity scores.",
                query
            ),
            score: 0.87,
            source: "email".to_string(),
            metadata: object(json!({
                "title": "Email Subject",
                "author": "sender@example.com",
                "date": "2025-08-30"
            })),
        },
    ]
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Flattens per-query result groups in engine order. A hit without a
/// distance cannot be scored and is dropped.
pub fn flatten_results(raw: &RawSearchResults, engine: &dyn SearchEngine) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let groups = raw.labels.iter().zip(raw.distances.iter()).enumerate();
    for (i, (labels, distances)) in groups {
        let texts = raw.texts.get(i);

        for (j, (label, distance)) in labels.iter().zip(distances.iter()).enumerate() {
            let passage_id = label_key(label);
            let metadata = engine.passage_metadata(&passage_id).unwrap_or_default();
            let source = metadata
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SOURCE)
                .to_string();
            let content = texts
                .and_then(|t| t.get(j))
                .cloned()
                .unwrap_or_else(|| "No content".to_string());

            results.push(SearchResult {
                id: format!("result_{}_{}", i, j),
                content,
                score: 1.0 - distance,
                source,
                metadata,
            });
        }

        if labels.len() != distances.len() {
            tracing::debug!(
                "Result group {} has {} labels but {} distances",
                i,
                labels.len(),
                distances.len()
            );
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeEngine {
        results: Mutex<Option<Result<RawSearchResults>>>,
        passages: HashMap<String, Map<String, Value>>,
        last_query: Mutex<Option<EngineQuery>>,
    }

    impl FakeEngine {
        fn returning(raw: RawSearchResults) -> Self {
            Self {
                results: Mutex::new(Some(Ok(raw))),
                passages: HashMap::new(),
                last_query: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SearchEngine for FakeEngine {
        async fn search(&self, query: &EngineQuery) -> Result<RawSearchResults> {
            *self.last_query.lock().unwrap() = Some(query.clone());
            self.results
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(RawSearchResults::default()))
        }

        fn passage_metadata(&self, passage_id: &str) -> Option<Map<String, Value>> {
            self.passages.get(passage_id).cloned()
        }

        fn document_count(&self) -> usize {
            self.passages.len()
        }

        fn backend_name(&self) -> Option<String> {
            Some("hnsw".to_string())
        }

        fn embedding_model(&self) -> Option<String> {
            None
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
    }

    impl EngineLoader for CountingLoader {
        fn load(&self, _index_path: &Path) -> Result<Arc<dyn SearchEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::Engine("bad index".to_string()));
            }
            Ok(Arc::new(FakeEngine::returning(RawSearchResults::default())))
        }
    }

    fn raw(labels: Vec<Value>, distances: Vec<f64>, texts: Vec<&str>) -> RawSearchResults {
        RawSearchResults {
            labels: vec![labels],
            distances: vec![distances],
            texts: vec![texts.into_iter().map(String::from).collect()],
        }
    }

    #[test]
    fn test_placeholder_results_echo_query() {
        let results = placeholder_results("vector databases");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.content.contains("vector databases")));
        assert_eq!(results[0].source, "document");
        assert_eq!(results[1].source, "email");
    }

    #[test]
    fn test_flatten_scores_and_order() {
        let engine = FakeEngine::returning(RawSearchResults::default());
        let raw = raw(
            vec![json!("a"), json!("b")],
            vec![0.05, 1.5],
            vec!["first", "second"],
        );

        let results = flatten_results(&raw, &engine);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "result_0_0");
        assert_eq!(results[0].content, "first");
        assert!((results[0].score - 0.95).abs() < 1e-9);
        assert!((results[1].score - (-0.5)).abs() < 1e-9);
        assert_eq!(results[1].id, "result_0_1");
    }

    #[test]
    fn test_flatten_enriches_metadata() {
        let mut engine = FakeEngine::returning(RawSearchResults::default());
        engine.passages.insert(
            "12".to_string(),
            object(json!({"source": "email", "title": "Invoice"})),
        );
        let raw = raw(vec![json!(12), json!(13)], vec![0.1, 0.2], vec!["x"]);

        let results = flatten_results(&raw, &engine);
        assert_eq!(results[0].source, "email");
        assert_eq!(results[0].metadata["title"], "Invoice");
        assert_eq!(results[1].source, "document");
        assert!(results[1].metadata.is_empty());
        assert_eq!(results[1].content, "No content");
    }

    #[test]
    fn test_flatten_multiple_groups() {
        let engine = FakeEngine::returning(RawSearchResults::default());
        let raw = RawSearchResults {
            labels: vec![vec![json!(1)], vec![json!(2)]],
            distances: vec![vec![0.0], vec![0.5]],
            texts: vec![vec!["a".to_string()], vec!["b".to_string()]],
        };
        let ids: Vec<String> = flatten_results(&raw, &engine)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["result_0_0", "result_1_0"]);
    }

    #[tokio::test]
    async fn test_search_without_index_returns_placeholders() {
        let temp_dir = tempdir().unwrap();
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail: false,
        });
        let service = SearchService::new(vec![temp_dir.path().to_path_buf()], loader.clone());

        let response = service.search(&SearchRequest::new("hello")).await.unwrap();
        assert_eq!(response.total_count, 2);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.query, "hello");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(service.status().await.status, StatusKind::NoIndex);
    }

    #[tokio::test]
    async fn test_engine_loaded_once() {
        let temp_dir = tempdir().unwrap();
        let index = temp_dir.path().join("docs");
        fs::create_dir_all(&index).unwrap();
        fs::write(index.join("metadata.json"), "{}").unwrap();

        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail: false,
        });
        let service = SearchService::new(vec![temp_dir.path().to_path_buf()], loader.clone());

        let status = service.status().await;
        assert_eq!(status.status, StatusKind::Ready);
        assert_eq!(status.backend_name, "hnsw");
        assert_eq!(status.embedding_model, "unknown");
        let response = service.search(&SearchRequest::new("q")).await.unwrap();
        assert_eq!(response.total_count, 0);
        assert!(response.results.is_empty());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        service.reload().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_reports_error_status() {
        let temp_dir = tempdir().unwrap();
        let index = temp_dir.path().join("docs");
        fs::create_dir_all(&index).unwrap();
        fs::write(index.join("metadata.json"), "{}").unwrap();

        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail: true,
        });
        let service = SearchService::new(vec![temp_dir.path().to_path_buf()], loader);

        let status = service.status().await;
        assert_eq!(status.status, StatusKind::Error);
        assert!(!status.index_loaded);
        assert!(status.index_path.is_some());

        let response = service.search(&SearchRequest::new("q")).await.unwrap();
        assert_eq!(response.total_count, 2);
    }

    struct FixedLoader(Arc<FakeEngine>);

    impl EngineLoader for FixedLoader {
        fn load(&self, _index_path: &Path) -> Result<Arc<dyn SearchEngine>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_search_forwards_parameters() {
        let temp_dir = tempdir().unwrap();
        let index = temp_dir.path().join("docs");
        fs::create_dir_all(&index).unwrap();
        fs::write(index.join("metadata.json"), "{}").unwrap();

        let engine = Arc::new(FakeEngine::returning(raw(vec![json!(3)], vec![0.25], vec!["hit"])));
        let service = SearchService::new(
            vec![temp_dir.path().to_path_buf()],
            Arc::new(FixedLoader(engine.clone())),
        );

        let request = SearchRequest {
            query: "graphs".to_string(),
            top_k: 5,
            sources: vec!["code".to_string()],
            complexity: 32,
            recompute_embeddings: true,
        };
        let response = service.search(&request).await.unwrap();
        assert_eq!(response.total_count, 1);
        assert!((response.results[0].score - 0.75).abs() < 1e-9);

        let seen = engine.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(seen.top_k, 5);
        assert_eq!(seen.complexity, 32);
        assert!(seen.recompute_embeddings);
        assert_eq!(seen.sources, vec!["code".to_string()]);
    }

    #[tokio::test]
    async fn test_engine_error_becomes_search_failed() {
        let temp_dir = tempdir().unwrap();
        let index = temp_dir.path().join("docs");
        fs::create_dir_all(&index).unwrap();
        fs::write(index.join("metadata.json"), "{}").unwrap();

        let engine = Arc::new(FakeEngine {
            results: Mutex::new(Some(Err(GatewayError::Engine("out of memory".to_string())))),
            passages: HashMap::new(),
            last_query: Mutex::new(None),
        });
        let service = SearchService::new(
            vec![temp_dir.path().to_path_buf()],
            Arc::new(FixedLoader(engine)),
        );

        match service.search(&SearchRequest::new("q")).await {
            Err(GatewayError::SearchFailed(message)) => assert_eq!(message, "out of memory"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.total_count)),
        }
    }

    #[tokio::test]
    async fn test_zero_complexity_rejected() {
        let temp_dir = tempdir().unwrap();
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail: false,
        });
        let service = SearchService::new(vec![temp_dir.path().to_path_buf()], loader);
        let mut request = SearchRequest::new("q");
        request.complexity = 0;
        assert!(matches!(
            service.search(&request).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}
