use std::io;
use std::process::Stdio;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, error, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::error_handling::types::StreamError;
use crate::scan_dispatch::ScanCommand;

/// A running scan process and the merged line stream of its stdout and stderr.
///
/// On unix both descriptors of the child share one pipe, so lines arrive in
/// the order the child wrote them. The child runs in its own process group so
/// that [`terminate`](ScanProcess::terminate) reaches everything it forks, and
/// it is killed if the handle is dropped.
pub struct ScanProcess {
    child: Child,
    lines: BoxStream<'static, io::Result<String>>,
}

impl ScanProcess {
    pub fn spawn(command: &ScanCommand) -> Result<Self, StreamError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(unix)]
        let (child, lines) = spawn_merged(cmd, &command.program)?;
        #[cfg(not(unix))]
        let (child, lines) = spawn_piped(cmd, &command.program)?;

        debug!("Spawned {} with pid {:?}", command.program, child.id());
        Ok(Self { child, lines })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next non-blank output line, or `None` once the output is closed.
    pub async fn next_line(&mut self) -> Option<Result<String, StreamError>> {
        while let Some(item) = self.lines.next().await {
            match item {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => return Some(Ok(line)),
                Err(e) => return Some(Err(StreamError::Read(e))),
            }
        }
        None
    }

    /// Waits for the child to exit. `None` means it was ended by a signal.
    pub async fn wait(&mut self) -> Result<Option<i32>, StreamError> {
        let status = self.child.wait().await.map_err(StreamError::Wait)?;
        debug!("Scan process exited with {}", status);
        Ok(status.code())
    }

    /// Asks the process group to stop, then forces it after `grace`.
    pub async fn terminate(&mut self, grace: Duration) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        #[cfg(unix)]
        signal_group(&mut self.child, grace).await;

        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(e) = self.child.kill().await {
                warn!("Failed to kill scan process: {}", e);
            }
        }
    }
}

/// Spawns with stdout and stderr pointing at the write end of a single pipe.
#[cfg(unix)]
fn spawn_merged(
    mut cmd: Command,
    program: &str,
) -> Result<(Child, BoxStream<'static, io::Result<String>>), StreamError> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe::Receiver;

    let (reader, writer) = io::pipe().map_err(StreamError::Spawn)?;
    let stderr_writer = writer.try_clone().map_err(StreamError::Spawn)?;
    cmd.stdout(Stdio::from(writer)).stderr(Stdio::from(stderr_writer));

    let spawned = cmd.spawn();
    // The parent's copies of the write end must be gone for EOF to arrive.
    drop(cmd);
    let child = spawned.map_err(|e| {
        error!("Failed to spawn {}: {}", program, e);
        StreamError::Spawn(e)
    })?;

    let receiver = Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(StreamError::Spawn)?;
    Ok((child, line_stream(receiver)))
}

#[cfg(not(unix))]
fn spawn_piped(
    mut cmd: Command,
    program: &str,
) -> Result<(Child, BoxStream<'static, io::Result<String>>), StreamError> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn {}: {}", program, e);
        StreamError::Spawn(e)
    })?;
    let stdout = child.stdout.take().ok_or(StreamError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(StreamError::MissingPipe("stderr"))?;
    let lines = stream::select(line_stream(stdout), line_stream(stderr)).boxed();
    Ok((child, lines))
}

#[cfg(unix)]
async fn signal_group(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let group = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pid, e);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!("Process group {} ignored SIGTERM for {:?}, killing", pid, grace);
    }
    // Stragglers that outlived the group leader.
    let _ = killpg(group, Signal::SIGKILL);
}

/// Decodes one raw output line, replacing invalid UTF-8 with U+FFFD and
/// trimming surrounding whitespace (including the line terminator).
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

fn line_stream<R>(reader: R) -> BoxStream<'static, io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let Some(mut reader) = state else {
            return None;
        };
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(decode_line(&buf)), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
