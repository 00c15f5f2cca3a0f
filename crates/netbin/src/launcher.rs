//! Subprocess launcher.
//!
//! Starts the configured program for one session with caller-supplied
//! streams bound to its stdin and stdout, and hands back the stderr pipe
//! for the diagnostic drain. Once the shared cancellation token fires no new
//! programs are started; children that are already running are left alone.

use std::ffi::OsString;
use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors from starting a subprocess.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("shutting down, not starting new subprocesses")]
    Cancelled,

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },

    #[error("subprocess {0} was not captured")]
    MissingPipe(&'static str),
}

/// Starts one program, with fixed arguments, per call.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: OsString,
    args: Vec<OsString>,
    cancel: CancellationToken,
}

impl Launcher {
    pub fn new<P, I, A>(program: P, args: I, cancel: CancellationToken) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cancel,
        }
    }

    /// Start the program, copying `stdin` into its standard input and its
    /// standard output into `stdout`.
    pub fn start<R, W>(&self, stdin: R, stdout: W) -> Result<RunningChild, LaunchError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(LaunchError::Cancelled);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (Some(child_stdin), Some(child_stdout), Some(child_stderr), Some(pid)) = (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
            child.id(),
        ) else {
            let _ = child.start_kill();
            return Err(LaunchError::MissingPipe("stdio"));
        };

        debug!(pid, program = ?self.program, "Subprocess started");

        Ok(RunningChild {
            pid,
            child,
            inbound: Some(tokio::spawn(pump(stdin, child_stdin))),
            outbound: Some(tokio::spawn(pump(child_stdout, stdout))),
            diagnostics: Some(child_stderr),
        })
    }
}

/// Copy `src` to `dst` until end-of-stream, then close `dst`.
async fn pump<R, W>(mut src: R, mut dst: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut src, &mut dst).await?;
    dst.shutdown().await?;
    Ok(copied)
}

/// A started subprocess and the tasks moving its stdio.
#[derive(Debug)]
pub struct RunningChild {
    pid: u32,
    child: Child,
    inbound: Option<JoinHandle<io::Result<u64>>>,
    outbound: Option<JoinHandle<io::Result<u64>>>,
    diagnostics: Option<ChildStderr>,
}

impl RunningChild {
    /// OS process id.
    pub const fn id(&self) -> u32 {
        self.pid
    }

    /// Read end of the stderr pipe. Available once.
    pub fn take_diagnostics(&mut self) -> Option<ChildStderr> {
        self.diagnostics.take()
    }

    /// Wait for the process to exit. Calling this again returns the same
    /// status.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Wait for exit and for everything the child wrote to stdout to reach
    /// the session. Idempotent.
    ///
    /// The stdio tasks are settled even when waiting fails, so the session
    /// streams are released before the caller closes the connection.
    pub async fn finish(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await;
        let delivered = self.release_stdio().await;
        let status = status?;
        delivered?;
        Ok(status)
    }

    /// Stop feeding the child's stdin and wait for its stdout to reach
    /// end-of-stream. Both session streams are dropped on return.
    async fn release_stdio(&mut self) -> io::Result<()> {
        // Nothing reads the child's stdin any more.
        if let Some(inbound) = self.inbound.take() {
            inbound.abort();
            let _ = inbound.await;
        }

        let Some(outbound) = self.outbound.take() else {
            return Ok(());
        };
        match outbound.await {
            Ok(Ok(bytes)) => {
                debug!(pid = self.pid, bytes, "Subprocess output delivered");
                Ok(())
            }
            Ok(Err(e)) if is_disconnect(&e) => {
                debug!(pid = self.pid, error = %e, "Peer went away before output was delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(join) => Err(io::Error::other(join)),
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
    )
}
