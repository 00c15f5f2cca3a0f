//! Per-connection worker.
//!
//! Owns one accepted connection from admission to teardown: tunes the
//! socket, starts the child with the connection as its stdin/stdout, logs
//! the child's stderr, and tears everything down in an order that never
//! loses output the child already produced. Failures are logged and stay
//! inside the session.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionToken;
use crate::drain::DiagnosticDrain;
use crate::launcher::Launcher;
use crate::transport::{Session, SessionControl, Transport};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    ChildStarted,
    ChildRunning,
    DrainClosing,
    Closed,
}

/// Serves accepted connections, one child per connection.
#[derive(Debug, Clone)]
pub struct ConnectionWorker {
    launcher: Launcher,
    keepalive: Option<Duration>,
}

impl ConnectionWorker {
    pub const fn new(launcher: Launcher, keepalive: Option<Duration>) -> Self {
        Self {
            launcher,
            keepalive,
        }
    }

    /// Serve `transport` until its child has exited and all output is
    /// delivered. `token` is released when this returns, on every path.
    pub async fn serve(&self, transport: Transport, token: AdmissionToken) {
        let peer = transport.peer();
        self.run_session(transport, &peer).await;
        trace_state(&peer, SessionState::Closed);
        drop(token);
    }

    async fn run_session(&self, transport: Transport, peer: &str) {
        trace_state(peer, SessionState::Accepted);

        if let Some(period) = self.keepalive {
            if let Err(e) = transport.set_keepalive(period) {
                warn!("unable to enable keep-alive for conn {peer}: {e}");
            }
        }

        let Session {
            reader,
            writer,
            control,
        } = match transport.into_session() {
            Ok(session) => session,
            Err(e) => {
                error!("unable to set up conn {peer}: {e}");
                return;
            }
        };

        let mut child = match self.launcher.start(reader, writer) {
            Ok(child) => child,
            Err(e) => {
                error!("error starting subprocess for conn {peer}: {e}");
                close_session(peer, None, control);
                return;
            }
        };

        let pid = child.id();
        trace_state(peer, SessionState::ChildStarted);
        info!("child pid={pid}: serving conn from {peer}");

        let drain: Option<JoinHandle<()>> = child
            .take_diagnostics()
            .map(|stderr| tokio::spawn(DiagnosticDrain::new(pid).run(stderr)));
        trace_state(peer, SessionState::ChildRunning);

        match child.wait().await {
            Ok(status) => {
                let success = status.success();
                info!("child pid={pid}: exited: success={success}");
            }
            Err(e) => error!("child pid={pid}: error waiting for exit: {e}"),
        }

        if let Err(e) = control.close_read() {
            error!("child pid={pid}: error closing conn read side: {e}");
        }

        trace_state(peer, SessionState::DrainClosing);
        if let Err(e) = child.finish().await {
            error!("child pid={pid}: error completing output: {e}");
        }
        // The child's exit closed the write end of its stderr pipe.
        close_session(peer, Some(pid), control);

        if let Some(drain) = drain {
            if let Err(e) = drain.await {
                error!("child pid={pid}: diagnostic drain failed: {e}");
            }
        }
    }
}

fn close_session(peer: &str, pid: Option<u32>, control: SessionControl) {
    if let Err(e) = control.close() {
        error!(?pid, "error closing conn {peer}: {e}");
    }
}

fn trace_state(peer: &str, state: SessionState) {
    debug!(peer, ?state, "Session state");
}
