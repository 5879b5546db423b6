pub mod channel;
pub mod configuration;
pub mod error_handling;
pub mod process_streaming;
pub mod scan_dispatch;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use session_management::{SessionStatus, ToolKind};
