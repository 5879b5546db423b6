//! Observer channels.
//!
//! A scan streams its progress to exactly one observer through a
//! [`ScanChannel`]. The WebSocket implementation is what the HTTP API hands
//! to the lifecycle; the in-memory one backs tests and embedding.

pub mod memory_channel;
pub mod types;
pub mod ws_channel;

pub use memory_channel::{MemoryChannel, MemoryObserver};
pub use types::ScanChannel;
pub use ws_channel::WsChannel;
