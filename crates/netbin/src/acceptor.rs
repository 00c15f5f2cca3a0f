//! Accept loop with admission control.

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionToken};
use crate::error::ServerError;
use crate::listener::Listener;
use crate::transport::Transport;
use crate::worker::ConnectionWorker;

/// Takes a token, accepts a connection, hands both to a new worker task.
pub struct Acceptor {
    listener: Listener,
    admission: Admission,
    worker: Arc<ConnectionWorker>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Acceptor {
    pub const fn new(
        listener: Listener,
        admission: Admission,
        worker: Arc<ConnectionWorker>,
        cancel: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            listener,
            admission,
            worker,
            cancel,
            tracker,
        }
    }

    /// Run until cancelled. Returns an error only for accept failures that
    /// make further accepting pointless. The listener is closed on return.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            admission,
            worker,
            cancel,
            tracker,
        } = self;

        let result = accept_loop(&listener, &admission, &worker, &cancel, &tracker).await;
        listener.close();
        result
    }
}

async fn accept_loop(
    listener: &Listener,
    admission: &Admission,
    worker: &Arc<ConnectionWorker>,
    cancel: &CancellationToken,
    tracker: &TaskTracker,
) -> Result<(), ServerError> {
    loop {
        let Some(token) = admission.acquire(cancel).await else {
            debug!("Acceptor stopped while waiting for a free slot");
            return Ok(());
        };

        let Some(transport) = accept_one(listener, cancel).await? else {
            debug!("Acceptor stopped while waiting for a connection");
            return Ok(());
        };

        spawn_worker(tracker, Arc::clone(worker), transport, token);
    }
}

/// Accept one connection, retrying errors that only concern the connection
/// being accepted. `Ok(None)` means shutdown was requested.
async fn accept_one(
    listener: &Listener,
    cancel: &CancellationToken,
) -> Result<Option<Transport>, ServerError> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(None),
            accepted = listener.accept() => match accepted {
                Ok(transport) => return Ok(Some(transport)),
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "Transient accept error, retrying");
                }
                Err(e) => return Err(ServerError::Accept(e)),
            },
        }
    }
}

fn spawn_worker(
    tracker: &TaskTracker,
    worker: Arc<ConnectionWorker>,
    transport: Transport,
    token: AdmissionToken,
) {
    info!(kind = transport.kind(), peer = %transport.peer(), "Accepted connection");
    tracker.spawn(async move { worker.serve(transport, token).await });
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}
