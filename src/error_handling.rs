//! Error types shared across the crate.
//!
//! Every subsystem has its own error enum; `SessionError` is the umbrella
//! used by the session lifecycle and the web layer.

pub mod types;
