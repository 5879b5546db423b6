use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::ScanChannel;
use crate::error_handling::types::{DispatchError, SessionError, StorageError};
use crate::process_streaming::ScanProcess;
use crate::scan_dispatch::ScanDispatcher;
use crate::session_management::{
    ChannelRegistry, ScanRequest, ScanSession, SessionStatus, ToolKind,
};
use crate::storage::SessionStore;

const NOT_FOUND_MESSAGE: &str = "❌ Session not found";

/// Drives scan sessions from creation to a terminal status.
///
/// This is the only writer of a session's `status`, `completed_at` and
/// `error_message`. Each attached observer runs its scan on the caller's task;
/// sessions share nothing but the store, the channel registry and the
/// admission semaphore.
///
/// # Fields Overview
///
/// - `store`: durable session records
/// - `dispatcher`: preflight checks and command construction
/// - `registry`: at most one observer channel per session, plus cancellation
/// - `admission`: one permit per running scan
/// - `termination_grace`: time between SIGTERM and SIGKILL when stopping a scan
#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    dispatcher: ScanDispatcher,
    registry: ChannelRegistry,
    admission: Arc<Semaphore>,
    max_concurrent_scans: usize,
    termination_grace: Duration,
}

/// How a dispatched scan ended, before it is written back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanOutcome {
    Completed,
    ExitCode(i32),
    Signalled,
    Failed(String),
    Cancelled,
    Disconnected,
}

impl ScanOutcome {
    fn status(&self) -> SessionStatus {
        match self {
            ScanOutcome::Completed => SessionStatus::Completed,
            _ => SessionStatus::Failed,
        }
    }

    fn error_message(&self) -> Option<String> {
        match self {
            ScanOutcome::Completed => None,
            ScanOutcome::ExitCode(code) => {
                Some(format!("Process failed with return code: {}", code))
            }
            ScanOutcome::Signalled => Some("Process terminated by signal".to_string()),
            ScanOutcome::Failed(message) => Some(message.clone()),
            ScanOutcome::Cancelled => Some("Scan cancelled".to_string()),
            ScanOutcome::Disconnected => Some("WebSocket disconnected".to_string()),
        }
    }

    /// Final line for the observer. A disconnected observer gets nothing.
    fn notification(&self) -> Option<String> {
        match self {
            ScanOutcome::Completed => Some("✅ Scan completed successfully!".to_string()),
            ScanOutcome::ExitCode(code) => {
                Some(format!("❌ Scan failed with return code: {}", code))
            }
            ScanOutcome::Disconnected => None,
            other => other.error_message().map(|message| format!("❌ {}", message)),
        }
    }
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        dispatcher: ScanDispatcher,
        max_concurrent_scans: usize,
        termination_grace: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry: ChannelRegistry::new(),
            admission: Arc::new(Semaphore::new(max_concurrent_scans)),
            max_concurrent_scans,
            termination_grace,
        }
    }

    /// Validates the request and persists a new `Pending` session.
    ///
    /// Nothing is stored when validation fails.
    pub async fn create_session(&self, request: ScanRequest) -> Result<ScanSession, SessionError> {
        let session = ScanSession::from_request(request).map_err(|e| {
            debug!("Rejected scan request: {}", e);
            e
        })?;
        self.store.create(&session).await?;
        info!(
            "[{}] session created: {} on {} with {}",
            session.id, session.tool, session.environment, session.model_name
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<ScanSession, SessionError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn list_sessions(&self) -> Result<Vec<ScanSession>, SessionError> {
        Ok(self.store.list().await?)
    }

    /// Environment names the dispatcher would accept.
    pub async fn list_environments(&self) -> Result<Vec<String>, DispatchError> {
        self.dispatcher.runtime().list_environments().await
    }

    /// Number of scans currently holding an admission permit.
    #[cfg(test)]
    fn running_scans(&self) -> usize {
        self.max_concurrent_scans - self.admission.available_permits()
    }

    /// Requests that a running scan stop. The streaming task terminates the
    /// child and records the session as failed.
    pub async fn cancel(&self, id: Uuid) -> Result<(), SessionError> {
        let session = self.store.get(id).await?;
        if session.status != SessionStatus::Running || !self.registry.cancel(id) {
            return Err(SessionError::NotRunning(id));
        }
        info!("[{}] cancellation requested", id);
        Ok(())
    }

    /// Binds `channel` to the session named by `session_id` and runs the scan
    /// to completion, streaming its output.
    ///
    /// Returns once the session is terminal or the attach was refused. Every
    /// refusal sends exactly one line and closes the channel without touching
    /// the stored session.
    pub async fn attach<C: ScanChannel>(&self, session_id: &str, mut channel: C) {
        let Ok(id) = Uuid::parse_str(session_id.trim()) else {
            debug!("Attach with malformed session id {:?}", session_id);
            refuse(&mut channel, NOT_FOUND_MESSAGE).await;
            return;
        };

        let Some(guard) = self.registry.claim(id) else {
            warn!("[{}] second observer rejected", id);
            refuse(&mut channel, "❌ Session already has an observer attached").await;
            return;
        };

        let session = match self.store.get(id).await {
            Ok(session) => session,
            Err(StorageError::NotFound(_)) => {
                debug!("[{}] attach to unknown session", id);
                refuse(&mut channel, NOT_FOUND_MESSAGE).await;
                return;
            }
            Err(e) => {
                error!("[{}] failed to load session: {}", id, e);
                refuse(&mut channel, &format!("❌ {}", e)).await;
                return;
            }
        };

        if session.status != SessionStatus::Pending {
            warn!("[{}] attach refused, session is {}", id, session.status);
            refuse(
                &mut channel,
                &format!("❌ Session is already {}", session.status),
            )
            .await;
            return;
        }

        let Ok(permit) = self.admission.clone().try_acquire_owned() else {
            warn!("[{}] attach refused, scan capacity reached", id);
            let reason = SessionError::CapacityReached(self.max_concurrent_scans);
            refuse(&mut channel, &format!("❌ {}", reason)).await;
            return;
        };

        let mut session = session;
        if let Err(e) = self.persist_transition(&mut session, SessionStatus::Running, None).await {
            error!("[{}] could not mark session running: {}", id, e);
            refuse(&mut channel, &format!("❌ {}", e)).await;
            return;
        }
        info!("[{}] scan running", id);

        let outcome = self
            .execute(&session, &mut channel, guard.cancellation())
            .await;
        self.finish(session, &mut channel, outcome).await;

        drop(permit);
        drop(guard);
    }

    async fn execute<C: ScanChannel>(
        &self,
        session: &ScanSession,
        channel: &mut C,
        cancel: CancellationToken,
    ) -> ScanOutcome {
        let disconnected = channel.disconnected();

        for line in intro_lines(session) {
            if channel.send(&line).await.is_err() {
                return ScanOutcome::Disconnected;
            }
        }

        let command = match self.dispatcher.prepare(session).await {
            Ok(command) => command,
            Err(e) => {
                warn!("[{}] preflight failed: {}", session.id, e);
                return ScanOutcome::Failed(e.to_string());
            }
        };

        let running = format!("⚡ Running command: {}", command.command_line());
        if channel.send(&running).await.is_err() {
            return ScanOutcome::Disconnected;
        }

        if let Some(reference) = &command.output_reference {
            if let Err(e) = self.store.set_output_file(session.id, reference).await {
                warn!("[{}] failed to record output file: {}", session.id, e);
            }
        }

        let mut process = match ScanProcess::spawn(&command) {
            Ok(process) => process,
            Err(e) => {
                error!("[{}] {}", session.id, e);
                return ScanOutcome::Failed(e.to_string());
            }
        };
        debug!("[{}] scan process pid {:?}", session.id, process.id());

        let mut forwarded = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[{}] cancelling scan after {} lines", session.id, forwarded);
                    process.terminate(self.termination_grace).await;
                    return ScanOutcome::Cancelled;
                }
                _ = disconnected.cancelled() => {
                    info!("[{}] observer disconnected, stopping scan", session.id);
                    process.terminate(self.termination_grace).await;
                    return ScanOutcome::Disconnected;
                }
                line = process.next_line() => match line {
                    Some(Ok(line)) => {
                        if channel.send(&line).await.is_err() {
                            info!("[{}] observer gone, stopping scan", session.id);
                            process.terminate(self.termination_grace).await;
                            return ScanOutcome::Disconnected;
                        }
                        forwarded += 1;
                    }
                    Some(Err(e)) => {
                        error!("[{}] {}", session.id, e);
                        process.terminate(self.termination_grace).await;
                        return ScanOutcome::Failed(e.to_string());
                    }
                    None => break,
                },
            }
        }

        debug!("[{}] output finished after {} lines", session.id, forwarded);
        match process.wait().await {
            Ok(Some(0)) => ScanOutcome::Completed,
            Ok(Some(code)) => ScanOutcome::ExitCode(code),
            Ok(None) => ScanOutcome::Signalled,
            Err(e) => ScanOutcome::Failed(e.to_string()),
        }
    }

    /// Persists the terminal status, then tells the observer and closes.
    async fn finish<C: ScanChannel>(
        &self,
        mut session: ScanSession,
        channel: &mut C,
        outcome: ScanOutcome,
    ) {
        if let Err(e) = self
            .persist_transition(&mut session, outcome.status(), outcome.error_message())
            .await
        {
            error!("[{}] failed to persist final status: {}", session.id, e);
        }
        if let Some(notification) = outcome.notification() {
            if channel.send(&notification).await.is_err() {
                debug!("[{}] final notification not delivered", session.id);
            }
        }
        channel.close().await;
        info!("[{}] scan finished: {}", session.id, session.status);
    }

    async fn persist_transition(
        &self,
        session: &mut ScanSession,
        to: SessionStatus,
        error_message: Option<String>,
    ) -> Result<(), SessionError> {
        session.transition(to, error_message)?;
        self.store
            .update_status(
                session.id,
                session.status,
                session.completed_at,
                session.error_message.clone(),
            )
            .await?;
        Ok(())
    }
}

async fn refuse<C: ScanChannel>(channel: &mut C, line: &str) {
    let _ = channel.send(line).await;
    channel.close().await;
}

fn intro_lines(session: &ScanSession) -> Vec<String> {
    let mut lines = vec![
        format!("🚀 Starting {} scan...", session.tool.display_name()),
        format!("📋 Environment: {}", session.environment),
        format!("🤖 Model: {}", session.model_name),
    ];
    if session.tool == ToolKind::Garak {
        lines.push(format!("🔍 Probes: {}", session.probes.join(",")));
    }
    lines
}
