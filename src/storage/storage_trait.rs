//! Session Store Trait
//!
//! This module defines the `SessionStore` trait, the durable append/update log
//! of scan sessions. Records are never deleted.
//!
//! Implementors must serialise writes to their backing medium: independent
//! session tasks call `update_status` concurrently, each for its own row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::session_management::{ScanSession, SessionStatus};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new record. Fails with `DuplicateId` if the id exists.
    async fn create(&self, session: &ScanSession) -> Result<(), StorageError>;

    /// Returns the record or `NotFound`.
    async fn get(&self, id: Uuid) -> Result<ScanSession, StorageError>;

    /// Atomic partial update of the status fields of one record.
    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<(), StorageError>;

    /// Records the artifact reference produced for the session.
    async fn set_output_file(&self, id: Uuid, output_file: &str) -> Result<(), StorageError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<ScanSession>, StorageError>;
}
