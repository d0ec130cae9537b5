//! Background index creation.
//!
//! A request is validated synchronously, registered in the
//! [`ProgressRegistry`], and then built on a tokio task. At most
//! `max_concurrent_builds` builder processes run at once; the rest wait for
//! a slot while reporting progress 0.

pub mod name;
pub mod progress;
pub mod runner;

pub use name::validate_index_name;
pub use progress::{BuildStatus, IndexCreationProgress, ProgressRegistry};
pub use runner::{BuildInvocation, BuildRunner, ProcessBuildRunner};

use crate::config::{BuilderConfig, PathsConfig};
use crate::error::{GatewayError, Result};
use crate::locator::has_metadata;
use crate::metrics::{BUILDS_COMPLETED, BUILDS_FAILED, BUILDS_STARTED};
use crate::search::SearchService;
use crate::types::{BuildAccepted, IndexCreationRequest};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};

const STEP_WAITING: &str = "Waiting for a build slot...";
const STEP_PREPARING: &str = "Preparing data sources...";
const STEP_BUILDING: &str = "Creating embeddings and building index...";
const STEP_FINALIZING: &str = "Finalizing index...";

/// Cancel handle of the build currently registered under a name, tagged with
/// the generation of the job that owns it.
struct CancelHandle {
    generation: u64,
    sender: oneshot::Sender<()>,
}

type CancelSenders = Arc<Mutex<HashMap<String, CancelHandle>>>;

fn lock_senders(senders: &CancelSenders) -> MutexGuard<'_, HashMap<String, CancelHandle>> {
    match senders.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("BuildOrchestrator: Mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub struct BuildOrchestrator {
    paths: PathsConfig,
    builder: BuilderConfig,
    runner: Arc<dyn BuildRunner>,
    search: Arc<SearchService>,
    progress: Arc<ProgressRegistry>,
    slots: Arc<Semaphore>,
    cancels: CancelSenders,
    generations: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl BuildOrchestrator {
    pub fn new(
        paths: PathsConfig,
        builder: BuilderConfig,
        runner: Arc<dyn BuildRunner>,
        search: Arc<SearchService>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(builder.max_concurrent_builds.max(1)));
        Self {
            paths,
            builder,
            runner,
            search,
            progress: Arc::new(ProgressRegistry::new()),
            slots,
            cancels: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Validates the request, records initial progress and starts the build
    /// in the background. Returns as soon as the build is queued.
    pub async fn create(&self, request: IndexCreationRequest) -> Result<BuildAccepted> {
        validate_index_name(&request.name)?;
        if request.chunk_size == 0 {
            return Err(GatewayError::InvalidRequest(
                "chunkSize must be positive".to_string(),
            ));
        }
        if request.chunk_overlap >= request.chunk_size {
            return Err(GatewayError::InvalidRequest(
                "chunkOverlap must be smaller than chunkSize".to_string(),
            ));
        }

        let indices_root = self.paths.indices_root();
        tokio::fs::create_dir_all(&indices_root).await?;

        let index_path = indices_root.join(&request.name);
        if tokio::fs::try_exists(&index_path).await? {
            return Err(GatewayError::IndexExists(request.name.clone()));
        }

        let progress_id = request.name.clone();
        self.progress.register(&progress_id)?;
        metrics::counter!(BUILDS_STARTED).increment(1);
        tracing::info!("Index creation started: {}", progress_id);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let job = BuildJob {
            progress_id: progress_id.clone(),
            generation,
            request,
            index_path,
            paths: self.paths.clone(),
            builder: self.builder.clone(),
            runner: Arc::clone(&self.runner),
            search: Arc::clone(&self.search),
            progress: Arc::clone(&self.progress),
            slots: Arc::clone(&self.slots),
            cancels: Arc::clone(&self.cancels),
            active: Arc::clone(&self.active),
        };
        self.active.fetch_add(1, Ordering::SeqCst);

        // The job removes its own sender when it ends, which needs this lock.
        let mut cancels = lock_senders(&self.cancels);
        cancels.insert(
            progress_id.clone(),
            CancelHandle {
                generation,
                sender: cancel_tx,
            },
        );
        tokio::spawn(job.run(cancel_rx));
        drop(cancels);

        Ok(BuildAccepted {
            message: "Index creation started".to_string(),
            progress_id,
        })
    }

    pub fn get_progress(&self, progress_id: &str) -> Result<IndexCreationProgress> {
        self.progress
            .get(progress_id)
            .ok_or_else(|| GatewayError::ProgressNotFound(progress_id.to_string()))
    }

    /// Asks a queued or running build to stop. The builder process is
    /// killed and the entry ends in error.
    pub fn cancel(&self, progress_id: &str) -> Result<BuildAccepted> {
        let progress = self.get_progress(progress_id)?;
        if progress.is_terminal() {
            return Err(GatewayError::BuildNotRunning(progress_id.to_string()));
        }

        let handle = lock_senders(&self.cancels).remove(progress_id);
        match handle.map(|handle| handle.sender.send(())) {
            Some(Ok(())) => {
                tracing::info!("Index creation cancellation requested: {}", progress_id);
                Ok(BuildAccepted {
                    message: "Index creation cancellation requested".to_string(),
                    progress_id: progress_id.to_string(),
                })
            }
            _ => Err(GatewayError::BuildNotRunning(progress_id.to_string())),
        }
    }

    /// Cancels every build still in flight. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let senders: Vec<_> = lock_senders(&self.cancels).drain().collect();
        let mut cancelled = 0;
        for (progress_id, handle) in senders {
            if handle.sender.send(()).is_ok() {
                tracing::info!("Cancelling index creation: {}", progress_id);
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn active_builds(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits for background builds to finish recording their outcome.
    /// Returns false if some were still running at the deadline.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_builds() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }
}

struct BuildJob {
    progress_id: String,
    generation: u64,
    request: IndexCreationRequest,
    index_path: PathBuf,
    paths: PathsConfig,
    builder: BuilderConfig,
    runner: Arc<dyn BuildRunner>,
    search: Arc<SearchService>,
    progress: Arc<ProgressRegistry>,
    slots: Arc<Semaphore>,
    cancels: CancelSenders,
    active: Arc<AtomicUsize>,
}

impl BuildJob {
    async fn run(self, mut cancel_rx: oneshot::Receiver<()>) {
        self.progress.advance(&self.progress_id, 0, STEP_WAITING);

        // A dropped sender disables the cancel branch instead of firing it.
        let outcome = tokio::select! {
            outcome = self.execute() => outcome,
            Ok(()) = &mut cancel_rx => Err(GatewayError::Cancelled),
        };

        // Everything this job owns under its name is released before the
        // terminal state is published: once it is, a new build may register.
        self.release_cancel_handle();

        match outcome {
            Ok(()) => {
                self.search.reset().await;
                self.progress.complete(&self.progress_id);
                metrics::counter!(BUILDS_COMPLETED).increment(1);
                tracing::info!("Index created: {}", self.index_path.display());
                self.search.reload().await;
            }
            Err(e) => {
                tracing::error!("Index creation failed for {}: {}", self.progress_id, e);
                self.cleanup().await;
                self.progress.fail(&self.progress_id, &e.to_string());
                metrics::counter!(BUILDS_FAILED).increment(1);
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn release_cancel_handle(&self) {
        let mut cancels = lock_senders(&self.cancels);
        let owned = cancels
            .get(&self.progress_id)
            .is_some_and(|handle| handle.generation == self.generation);
        if owned {
            cancels.remove(&self.progress_id);
        }
    }

    async fn execute(&self) -> Result<()> {
        let _permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        self.progress.advance(&self.progress_id, 25, STEP_PREPARING);
        let invocation =
            BuildInvocation::for_request(&self.builder, &self.paths, &self.request, &self.index_path)?;

        self.progress.advance(&self.progress_id, 50, STEP_BUILDING);
        self.runner.run(&invocation).await?;

        if !has_metadata(&self.index_path) {
            return Err(GatewayError::BuildFailed(format!(
                "builder finished without writing {}",
                self.index_path.join(crate::locator::METADATA_FILE).display()
            )));
        }

        self.progress.advance(&self.progress_id, 90, STEP_FINALIZING);
        Ok(())
    }

    /// The directory did not exist when the request was accepted, so
    /// anything there now was left by this build.
    async fn cleanup(&self) {
        if !self.builder.cleanup_on_failure {
            return;
        }
        match tokio::fs::try_exists(&self.index_path).await {
            Ok(true) => match tokio::fs::remove_dir_all(&self.index_path).await {
                Ok(()) => tracing::info!(
                    "Removed partial index directory {}",
                    self.index_path.display()
                ),
                Err(e) => tracing::warn!(
                    "Could not remove partial index directory {}: {}",
                    self.index_path.display(),
                    e
                ),
            },
            Ok(false) => {}
            Err(e) => tracing::warn!("Could not inspect {}: {}", self.index_path.display(), e),
        }
    }
}
