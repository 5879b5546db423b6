use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channel::types::ScanChannel;
use crate::error_handling::types::ChannelError;

#[derive(Default)]
struct Transcript {
    lines: Vec<String>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    transcript: Mutex<Transcript>,
    changed: Notify,
    disconnected: CancellationToken,
}

impl Shared {
    fn transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory [`ScanChannel`] that records every message it is given.
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

/// The observing end of a [`MemoryChannel`].
#[derive(Clone)]
pub struct MemoryObserver {
    shared: Arc<Shared>,
}

impl MemoryChannel {
    pub fn new() -> (Self, MemoryObserver) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            MemoryObserver { shared },
        )
    }
}

#[async_trait]
impl ScanChannel for MemoryChannel {
    async fn send(&mut self, line: &str) -> Result<(), ChannelError> {
        if self.shared.disconnected.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        {
            let mut transcript = self.shared.transcript();
            if transcript.closed {
                return Err(ChannelError::Closed);
            }
            transcript.lines.push(line.to_string());
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) {
        self.shared.transcript().closed = true;
        self.shared.changed.notify_waiters();
    }

    fn disconnected(&self) -> CancellationToken {
        self.shared.disconnected.clone()
    }
}

impl MemoryObserver {
    pub fn lines(&self) -> Vec<String> {
        self.shared.transcript().lines.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.transcript().closed
    }

    /// Simulates the observer going away.
    pub fn disconnect(&self) {
        self.shared.disconnected.cancel();
        self.shared.changed.notify_waiters();
    }

    /// Resolves once some received line contains `needle`.
    pub async fn wait_for(&self, needle: &str) {
        loop {
            let changed = self.shared.changed.notified();
            if self.lines().iter().any(|line| line.contains(needle)) {
                return;
            }
            changed.await;
        }
    }
}
