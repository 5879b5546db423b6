use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, QueryOrder, Schema, Set, SqlErr,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::session_management::{ScanSession, SessionStatus};
use crate::storage::db_entities::{ActiveModel, Column, Entity, Model};
use crate::storage::storage_trait::SessionStore;

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("bad timestamp '{}': {}", raw, e)))
}

fn read_failed(err: DbErr) -> StorageError {
    StorageError::ReadFailed(err.to_string())
}

fn write_failed(err: DbErr) -> StorageError {
    StorageError::WriteFailed(err.to_string())
}

impl Model {
    fn into_session(self) -> Result<ScanSession, StorageError> {
        Ok(ScanSession {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StorageError::ReadFailed(format!("bad id '{}': {}", self.id, e)))?,
            environment: self.environment,
            model_name: self.model_name,
            tool: self.tool.parse().map_err(|t| {
                StorageError::ReadFailed(format!("unknown tool '{}' in row {}", t, self.id))
            })?,
            probes: serde_json::from_str(&self.probes)
                .map_err(|e| StorageError::ReadFailed(format!("bad probes json: {}", e)))?,
            working_directory: self.working_directory.map(PathBuf::from),
            status: self.status.parse().map_err(StorageError::ReadFailed)?,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            error_message: self.error_message,
            output_file: self.output_file,
        })
    }
}

impl TryFrom<&ScanSession> for ActiveModel {
    type Error = StorageError;

    fn try_from(session: &ScanSession) -> Result<Self, Self::Error> {
        let probes = serde_json::to_string(&session.probes)
            .map_err(|e| StorageError::WriteFailed(format!("cannot encode probes: {}", e)))?;
        Ok(ActiveModel {
            id: Set(session.id.to_string()),
            environment: Set(session.environment.clone()),
            model_name: Set(session.model_name.clone()),
            tool: Set(session.tool.as_str().to_string()),
            probes: Set(probes),
            working_directory: Set(session
                .working_directory
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned())),
            status: Set(session.status.as_str().to_string()),
            created_at: Set(format_timestamp(session.created_at)),
            completed_at: Set(session.completed_at.map(format_timestamp)),
            output_file: Set(session.output_file.clone()),
            error_message: Set(session.error_message.clone()),
        })
    }
}

/// SQLite-backed session store.
///
/// Reads go straight to the connection pool; every write holds `write_lock`
/// so that the load-modify-store of a partial update cannot interleave with
/// another writer.
pub struct DatabaseStore {
    db: DatabaseConnection,
    write_lock: Mutex<()>,
}

impl DatabaseStore {
    /// Default database filename used in the application's working directory
    pub const DEFAULT_DB_FILE: &'static str = "vulnerability_scanner.db";

    /// Opens (creating if needed) the database at `path` and ensures the schema exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create database directory {}: {}", parent.display(), e);
                StorageError::ConnectionFailed(e.to_string())
            })?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(5).sqlx_logging(false);
        let db = Database::connect(opts).await.map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            StorageError::ConnectionFailed(e.to_string())
        })?;

        Self::create_schema(&db).await?;
        info!("DatabaseStore initialized at {}", path.display());

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    async fn create_schema(db: &DatabaseConnection) -> Result<(), StorageError> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(Entity);
        stmt.if_not_exists();
        db.execute(backend.build(&stmt)).await.map_err(write_failed)?;
        Ok(())
    }

    async fn find_model(&self, id: Uuid) -> Result<Model, StorageError> {
        Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(read_failed)?
            .ok_or(StorageError::NotFound(id))
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn create(&self, session: &ScanSession) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if Entity::find_by_id(session.id.to_string())
            .one(&self.db)
            .await
            .map_err(read_failed)?
            .is_some()
        {
            return Err(StorageError::DuplicateId(session.id));
        }

        let active = ActiveModel::try_from(session)?;
        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::DuplicateId(session.id),
                _ => write_failed(e),
            })?;
        debug!("[{}] session persisted", session.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ScanSession, StorageError> {
        self.find_model(id).await?.into_session()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut active = self.find_model(id).await?.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.completed_at = Set(completed_at.map(format_timestamp));
        active.error_message = Set(error_message);
        active.update(&self.db).await.map_err(write_failed)?;
        debug!("[{}] status persisted as {}", id, status);
        Ok(())
    }

    async fn set_output_file(&self, id: Uuid, output_file: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut active = self.find_model(id).await?.into_active_model();
        active.output_file = Set(Some(output_file.to_string()));
        active.update(&self.db).await.map_err(write_failed)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScanSession>, StorageError> {
        Entity::find()
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(read_failed)?
            .into_iter()
            .map(Model::into_session)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::ScanRequest;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, DatabaseStore) {
        let dir = TempDir::new().unwrap();
        let store = DatabaseStore::open(dir.path().join("sessions.db"))
            .await
            .unwrap();
        (dir, store)
    }

    fn session(model: &str) -> ScanSession {
        ScanSession::from_request(ScanRequest {
            environment: "sec_env".into(),
            model_name: model.into(),
            probes: vec!["test.Test".into(), "dan.Dan_11_0".into()],
            tool: "garak".into(),
            working_directory: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_db_create_and_get() {
        let (_dir, store) = temp_store().await;
        let s = session("llama3");
        store.create(&s).await.unwrap();

        let loaded = store.get(s.id).await.unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.probes, s.probes);
        assert_eq!(loaded.status, SessionStatus::Pending);
        assert_eq!(
            format_timestamp(loaded.created_at),
            format_timestamp(s.created_at)
        );
    }

    #[tokio::test]
    async fn test_db_duplicate_id_is_rejected() {
        let (_dir, store) = temp_store().await;
        let s = session("llama3");
        store.create(&s).await.unwrap();
        match store.create(&s).await {
            Err(StorageError::DuplicateId(id)) => assert_eq!(id, s.id),
            other => panic!("expected DuplicateId, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_db_missing_session() {
        let (_dir, store) = temp_store().await;
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StorageError::NotFound(_))));
        assert!(matches!(
            store
                .update_status(id, SessionStatus::Running, None, None)
                .await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_db_update_status_touches_only_status_fields() {
        let (_dir, store) = temp_store().await;
        let s = session("llama3");
        store.create(&s).await.unwrap();

        let done = Utc::now();
        store
            .update_status(s.id, SessionStatus::Failed, Some(done), Some("boom".into()))
            .await
            .unwrap();
        store.set_output_file(s.id, "garak_scan_x").await.unwrap();

        let loaded = store.get(s.id).await.unwrap();
        assert_eq!(loaded.status, SessionStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
        assert_eq!(loaded.output_file.as_deref(), Some("garak_scan_x"));
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.model_name, "llama3");
        assert_eq!(loaded.environment, "sec_env");
    }

    #[tokio::test]
    async fn test_db_list_is_newest_first() {
        let (_dir, store) = temp_store().await;
        let mut older = session("older");
        older.created_at = Utc::now() - chrono::Duration::seconds(10);
        let newer = session("newer");
        store.create(&older).await.unwrap();
        store.create(&newer).await.unwrap();

        let models: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.model_name)
            .collect();
        assert_eq!(models, vec!["newer".to_string(), "older".to_string()]);
    }

    #[tokio::test]
    async fn test_db_concurrent_updates_on_distinct_rows() {
        let (_dir, store) = temp_store().await;
        let store = Arc::new(store);
        let mut ids = Vec::new();
        for i in 0..8 {
            let s = session(&format!("model-{}", i));
            store.create(&s).await.unwrap();
            ids.push(s.id);
        }

        let tasks: Vec<_> = ids
            .iter()
            .copied()
            .map(|id| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update_status(id, SessionStatus::Running, None, None)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for id in ids {
            let loaded = store.get(id).await.unwrap();
            assert_eq!(loaded.status, SessionStatus::Running);
            assert!(loaded.error_message.is_none());
        }
    }

    #[tokio::test]
    async fn test_db_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.db");
        let s = session("llama3");
        {
            let store = DatabaseStore::open(&path).await.unwrap();
            store.create(&s).await.unwrap();
        }
        let store = DatabaseStore::open(&path).await.unwrap();
        assert_eq!(store.get(s.id).await.unwrap().model_name, "llama3");
    }
}
