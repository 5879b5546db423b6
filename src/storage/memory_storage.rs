use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::session_management::{ScanSession, SessionStatus};
use crate::storage::storage_trait::SessionStore;

/// In-process session store.
///
/// A single `RwLock` guards the map, so concurrent readers never observe a
/// half-applied partial update.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, ScanSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &ScanSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StorageError::DuplicateId(session.id));
        }
        sessions.insert(session.id, session.clone());
        debug!("[{}] session stored in memory", session.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ScanSession, StorageError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        session.status = status;
        session.completed_at = completed_at;
        session.error_message = error_message;
        Ok(())
    }

    async fn set_output_file(&self, id: Uuid, output_file: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        session.output_file = Some(output_file.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScanSession>, StorageError> {
        let mut all: Vec<ScanSession> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
