//! Snapshot Storage
//!
//! Persistence collaborator for sessions. The engine only produces and
//! consumes `WorkflowSnapshot` values; where they live is up to the store.
//! No durability guarantee beyond what the backing store itself provides.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flow_types::WorkflowData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::ledger::ValidityLedger;

/// Plain, serializable copy of the three pieces of session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub session_id: Uuid,
    pub flow_id: String,
    pub data: WorkflowData,
    /// Index into the effective sequence projected from `data`
    pub pointer: usize,
    pub ledger: ValidityLedger,
    pub captured_at: DateTime<Utc>,
}

/// Error type for snapshot storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("snapshot not found: {0}")]
    NotFound(Uuid),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot, replacing any previous one for the same session
    async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError>;

    async fn load(&self, session_id: Uuid) -> Result<WorkflowSnapshot, StoreError>;

    /// Removing a snapshot that does not exist is not an error
    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError>;

    async fn exists(&self, session_id: Uuid) -> Result<bool, StoreError>;
}

/// In-process store, lost with the process
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<Uuid, WorkflowSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<WorkflowSnapshot, StoreError> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound(session_id))
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.remove(&session_id);
        Ok(())
    }

    async fn exists(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.contains_key(&session_id))
    }
}

/// One pretty-printed JSON file per session under `base_path`
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    base_path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let path = self.path_for(snapshot.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(snapshot)?;

        // write-then-rename so readers never see a half-written file
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            session_id = %snapshot.session_id,
            path = %path.display(),
            "Snapshot saved"
        );
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<WorkflowSnapshot, StoreError> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, session_id: Uuid) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.path_for(session_id)).await?)
    }
}
