//! Child process execution with cancellation.
//!
//! # Responsibilities
//! - Spawn one child with all three standard streams piped
//! - Feed stdin while draining stdout and stderr concurrently
//! - Kill and reap the child when the scope is cancelled or the deadline passes
//!
//! # Design Decisions
//! - `kill_on_drop(true)`: dropping the future (client went away) still kills the child
//! - The exit status is reported as-is; interpreting it is the caller's job
//! - A broken pipe on stdin is not an error: the tool may exit before reading everything

use std::future::pending;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

/// Everything the child produced before it exited.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Why a run did not produce a [`ToolOutput`].
#[derive(Debug)]
pub enum RunError {
    Spawn(io::Error),
    Io(io::Error),
    Cancelled,
    DeadlineExceeded(Duration),
}

enum Interrupt {
    Cancelled,
    Deadline(Duration),
}

/// Run `command` to completion with `input` on stdin.
///
/// Returns once the child has exited and both output streams hit EOF, or
/// after the child has been killed and reaped because `cancel` fired or
/// `timeout` elapsed.
pub async fn run(
    mut command: Command,
    input: Vec<u8>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<ToolOutput, RunError> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(RunError::Spawn)?;
    let pid = child.id();
    tracing::debug!(pid = ?pid, input_bytes = input.len(), "Tool process spawned");

    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let deadline = async {
        match timeout {
            Some(after) => {
                tokio::time::sleep(after).await;
                after
            }
            None => pending().await,
        }
    };

    let interrupt = tokio::select! {
        result = communicate(&mut child, stdin, stdout, stderr, input) => return result,
        _ = cancel.cancelled() => Interrupt::Cancelled,
        after = deadline => Interrupt::Deadline(after),
    };

    if let Err(e) = child.kill().await {
        tracing::warn!(pid = ?pid, error = %e, "Failed to kill tool process");
    } else {
        tracing::debug!(pid = ?pid, "Tool process killed");
    }

    Err(match interrupt {
        Interrupt::Cancelled => RunError::Cancelled,
        Interrupt::Deadline(after) => RunError::DeadlineExceeded(after),
    })
}

async fn communicate(
    child: &mut Child,
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    input: Vec<u8>,
) -> Result<ToolOutput, RunError> {
    let feed = async move {
        match stdin.write_all(&input).await {
            Ok(()) => stdin.shutdown().await,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!("Tool closed stdin before reading all input");
                Ok(())
            }
            Err(e) => Err(e),
        }
        // stdin drops here; the tool sees EOF
    };

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (fed, read_out, read_err) = tokio::join!(
        feed,
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err),
    );
    fed.map_err(RunError::Io)?;
    read_out.map_err(RunError::Io)?;
    read_err.map_err(RunError::Io)?;

    let status = child.wait().await.map_err(RunError::Io)?;

    Ok(ToolOutput {
        status,
        stdout: out,
        stderr: err,
    })
}

fn missing_pipe(name: &str) -> RunError {
    RunError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("child {} was not captured", name),
    ))
}
