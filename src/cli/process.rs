//! Claude Code process spawning and stream transport.
//!
//! One turn maps to one short-lived `claude` process: the prompt is
//! written to stdin and stdin is closed immediately (the protocol is
//! request-then-stream, not duplex chat). Stdout is framed into lines
//! and classified into [`StreamEvent`]s; stderr is forwarded raw as
//! diagnostics. The engine enforces at most one live process per
//! endpoint by cancelling the previous turn before spawning.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use super::events::{classify, StreamEvent};
use super::framer::LineFramer;

/// Default buffer size for the transport event channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Grace period between SIGTERM and SIGKILL when a turn is cancelled.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Claude binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Event delivered by the transport to the engine, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A classified stream-json record from stdout.
    Event(StreamEvent),
    /// Raw stderr text or a transport-level failure description.
    Diagnostic(String),
    /// The process exited and all output was delivered. Sent exactly once.
    Closed,
}

/// Builder for configuring the Claude Code command line.
#[derive(Debug, Clone)]
pub struct ClaudeCommandBuilder {
    binary: PathBuf,
    resume_session: Option<String>,
    working_dir: Option<PathBuf>,
}

impl ClaudeCommandBuilder {
    /// Create a new builder for the given binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            resume_session: None,
            working_dir: None,
        }
    }

    /// Resume an existing session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session = Some(session_id.into());
        self
    }

    /// Set the working directory for the process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the binary path.
    #[must_use]
    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    /// Build the command-line arguments.
    ///
    /// The prompt is not among them; it is delivered over stdin.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(session_id) = &self.resume_session {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        args
    }
}

/// Spawn one turn of the Claude process and stream its output.
///
/// Writes `payload` to stdin and closes it, then delivers
/// [`TransportEvent`]s on the returned channel until a final `Closed`.
/// Cancelling `cancel` terminates the process; the normal exit path
/// still runs, so `Closed` is always delivered.
///
/// # Errors
///
/// Returns `SpawnError` if the process fails to spawn.
pub fn spawn_turn(
    builder: &ClaudeCommandBuilder,
    payload: String,
    cancel: CancellationToken,
    buffer: usize,
) -> Result<Receiver<TransportEvent>, SpawnError> {
    let mut cmd = Command::new(&builder.binary);
    cmd.args(builder.build_args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref dir) = builder.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(SpawnError::from_io)?;
    tracing::debug!(
        pid = ?child.id(),
        binary = %builder.binary.display(),
        resume = ?builder.resume_session,
        "Spawned claude process"
    );

    let (tx, rx) = mpsc::channel(buffer);

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                tracing::warn!(error = %err, "Failed to write prompt to stdin");
            }
            let _ = stdin.shutdown().await;
        });
    }

    let pump = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(pump_stdout(stdout, tx.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(pump_stderr(stderr, tx.clone())));

    tokio::spawn(supervise(child, cancel, tx, pump, stderr_pump));

    Ok(rx)
}

/// Read a stdout byte stream to EOF, framing and classifying each line.
///
/// The carry-over fragment is flushed through the classifier at EOF, so
/// a final record missing its newline is still recovered.
pub async fn pump_stdout<R: AsyncRead + Unpin>(mut reader: R, tx: Sender<TransportEvent>) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    if !send_classified(&tx, &line).await {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "stdout read failed");
                break;
            }
        }
    }

    if let Some(line) = framer.flush() {
        send_classified(&tx, &line).await;
    }
}

/// Forward a stderr byte stream as raw diagnostic text, never parsed.
pub async fn pump_stderr<R: AsyncRead + Unpin>(mut reader: R, tx: Sender<TransportEvent>) {
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                tracing::debug!(len = text.len(), "stderr output");
                if tx.send(TransportEvent::Diagnostic(text)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "stderr read failed");
                break;
            }
        }
    }
}

async fn send_classified(tx: &Sender<TransportEvent>, line: &str) -> bool {
    match classify(line) {
        Some(event) => tx.send(TransportEvent::Event(event)).await.is_ok(),
        None => true,
    }
}

/// Wait for process exit, killing on cancellation, then emit `Closed`.
async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    tx: Sender<TransportEvent>,
    pump: Option<tokio::task::JoinHandle<()>>,
    stderr_pump: Option<tokio::task::JoinHandle<()>>,
) {
    let mut killed = false;
    let status = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled(), if !killed => {
                killed = true;
                signal_terminate(&mut child);
            }
            () = tokio::time::sleep(TERMINATE_GRACE), if killed => {
                // Grace elapsed without exit; escalate.
                if let Err(err) = child.start_kill() {
                    tracing::debug!(error = %err, "Force kill skipped (process already gone)");
                }
            }
            status = child.wait() => break status,
        }
    };

    // All stdout was produced before exit; wait for the pumps to drain
    // and flush so every event precedes Closed.
    if let Some(pump) = pump {
        let _ = pump.await;
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.await;
    }

    match status {
        Ok(status) if status.success() || killed => {
            tracing::debug!(%status, killed, "claude process exited");
        }
        Ok(status) => {
            tracing::warn!(%status, "claude process exited with failure");
            let _ = tx
                .send(TransportEvent::Diagnostic(format!(
                    "claude exited with {status}"
                )))
                .await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to await claude process");
            let _ = tx
                .send(TransportEvent::Diagnostic(format!(
                    "failed to await claude process: {err}"
                )))
                .await;
        }
    }

    let _ = tx.send(TransportEvent::Closed).await;
}

/// Ask the process to stop. On Unix this is SIGTERM so the CLI can
/// clean up; SIGKILL follows after the grace period if it ignores it.
fn signal_terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            if kill(nix_pid, Signal::SIGTERM).is_ok() {
                return;
            }
        }
    }

    if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "Kill skipped (process already gone)");
    }
}
