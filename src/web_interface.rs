//! HTTP and WebSocket surface.
//!
//! Plain JSON routes for enumeration and session bookkeeping, plus the
//! WebSocket route that binds an observer to a session and runs its scan.

pub mod routes;
pub mod types;
pub mod web_server;

pub use routes::{api_routes, ApiContext};
pub use types::ApiError;
pub use web_server::WebServer;
