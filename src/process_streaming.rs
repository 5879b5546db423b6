//! Process streaming subsystem.
//!
//! Spawns an external scan command and exposes its combined output as an
//! ordered sequence of decoded, trimmed, non-blank lines.

pub mod streamer;

pub use streamer::{decode_line, ScanProcess};
