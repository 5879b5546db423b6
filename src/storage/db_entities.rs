//! SeaORM entity model used by the database storage backend.
//!
//! Maps the `scan_sessions` table created by `database_storage`. Enum and
//! timestamp columns are stored as strings for portability.

use sea_orm::entity::prelude::*;

/// Scan sessions table entity model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "scan_sessions")]
pub struct Model {
    /// UUID as string primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Execution context the tool runs in
    pub environment: String,
    /// Target model tag
    pub model_name: String,
    /// Tool token ("garak" or "promptmap")
    pub tool: String,
    /// JSON array of probe identifiers
    #[sea_orm(column_type = "Text")]
    pub probes: String,
    /// Optional working directory for directory-based tools
    pub working_directory: Option<String>,
    /// Session status as lowercase string
    pub status: String,
    /// RFC3339 creation timestamp, fixed precision
    pub created_at: String,
    /// Optional RFC3339 terminal timestamp
    pub completed_at: Option<String>,
    /// Optional artifact reference
    pub output_file: Option<String>,
    /// Present iff status is "failed"
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
