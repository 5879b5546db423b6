//! Scan dispatch subsystem.
//!
//! Turns a [`ScanSession`](crate::session_management::ScanSession) into a
//! validated [`ScanCommand`] after cheap preflight checks, and enumerates the
//! execution contexts, models and probes that sessions can reference.
//!
//! Re-exports:
//! - [`ScanDispatcher`]: preflight and command construction.
//! - [`ToolRuntime`], [`CondaRuntime`]: the runtime the tools are launched through.
//! - [`OllamaCatalog`], [`probe_catalog`]: model and probe enumeration.

pub mod catalog;
pub mod dispatcher;
pub mod runtime;
pub mod types;

pub use catalog::{probe_catalog, OllamaCatalog};
pub use dispatcher::ScanDispatcher;
pub use runtime::{CondaRuntime, ToolRuntime};
pub use types::ScanCommand;
