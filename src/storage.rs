//! Storage subsystem
//!
//! This module provides abstractions and implementations for persisting
//! scan sessions.
//!
//! Components:
//! - `storage_trait`: the `SessionStore` trait defining a uniform API.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `memory_storage`: in-process implementation for tests and ephemeral runs.
//! - `db_entities`: SeaORM entity model for the database backend.

pub mod database_storage;
pub mod db_entities;
pub mod memory_storage;
pub mod storage_trait;

pub use database_storage::DatabaseStore;
pub use memory_storage::MemoryStore;
pub use storage_trait::SessionStore;
