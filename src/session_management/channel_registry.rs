use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Map from session id to the single observer channel currently attached.
///
/// Scan output is never broadcast: a session has at most one entry, and the
/// entry's token is how a cancellation request reaches the task streaming
/// that session.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims the session for one observer. Returns `None` if another channel
    /// already holds it.
    pub fn claim(&self, session_id: Uuid) -> Option<ActiveChannelGuard> {
        let mut active = self.lock();
        if active.contains_key(&session_id) {
            debug!("[{}] channel already attached", session_id);
            return None;
        }
        let token = CancellationToken::new();
        active.insert(session_id, token.clone());
        debug!("[{}] channel attached ({} active)", session_id, active.len());
        Some(ActiveChannelGuard {
            session_id,
            token,
            registry: self.clone(),
        })
    }

    /// Requests cancellation of the scan streaming to the given session.
    /// Returns `false` when no channel is attached to it.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self, session_id: Uuid) -> bool {
        self.lock().contains_key(&session_id)
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, session_id: Uuid) {
        self.lock().remove(&session_id);
        debug!("[{}] channel released", session_id);
    }
}

/// Releases the registry entry when dropped.
pub struct ActiveChannelGuard {
    session_id: Uuid,
    token: CancellationToken,
    registry: ChannelRegistry,
}

impl ActiveChannelGuard {
    #[cfg(test)]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Token cancelled when a cancellation is requested for this session.
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for ActiveChannelGuard {
    fn drop(&mut self) {
        self.registry.release(self.session_id);
    }
}
