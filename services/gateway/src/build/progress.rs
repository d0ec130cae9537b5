use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCreationProgress {
    pub status: BuildStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexCreationProgress {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            status: BuildStatus::Processing,
            progress: 0,
            current_step: "Initializing...".to_string(),
            message: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != BuildStatus::Processing
    }
}

/// Build progress keyed by index name.
///
/// Entries are never evicted; they live as long as the process. Every
/// mutation goes through here so that progress only moves forward and a
/// terminal entry is never changed again.
pub struct ProgressRegistry {
    entries: RwLock<HashMap<String, IndexCreationProgress>>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, IndexCreationProgress>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("ProgressRegistry: RwLock poisoned in read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, IndexCreationProgress>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("ProgressRegistry: RwLock poisoned in write, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Starts tracking a build. A name whose previous build is still
    /// processing is refused; a finished entry is replaced.
    pub fn register(&self, progress_id: &str) -> Result<()> {
        let mut entries = self.write();
        if let Some(existing) = entries.get(progress_id) {
            if !existing.is_terminal() {
                return Err(GatewayError::BuildInProgress(progress_id.to_string()));
            }
        }
        entries.insert(progress_id.to_string(), IndexCreationProgress::new());
        Ok(())
    }

    pub fn get(&self, progress_id: &str) -> Option<IndexCreationProgress> {
        self.read().get(progress_id).cloned()
    }

    fn update<F>(&self, progress_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut IndexCreationProgress) -> bool,
    {
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(progress_id) else {
            return false;
        };
        if entry.is_terminal() || !f(entry) {
            return false;
        }
        entry.updated_at = Utc::now();
        true
    }

    /// Moves a processing build to `progress` percent. Going backwards is
    /// ignored.
    pub fn advance(&self, progress_id: &str, progress: u8, step: &str) -> bool {
        let progress = progress.min(99);
        self.update(progress_id, |entry| {
            if progress < entry.progress {
                return false;
            }
            entry.progress = progress;
            entry.current_step = step.to_string();
            true
        })
    }

    pub fn complete(&self, progress_id: &str) -> bool {
        self.update(progress_id, |entry| {
            entry.status = BuildStatus::Completed;
            entry.progress = 100;
            entry.current_step = "Index created successfully!".to_string();
            entry.message = Some("Index created successfully".to_string());
            true
        })
    }

    pub fn fail(&self, progress_id: &str, error: &str) -> bool {
        self.update(progress_id, |entry| {
            entry.status = BuildStatus::Error;
            entry.current_step = "Index creation failed".to_string();
            entry.error = Some(error.to_string());
            true
        })
    }
}
